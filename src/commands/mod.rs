//! CLI subcommands

pub mod backtest;
pub mod optimize;

use anyhow::{Context, Result};
use session_breakout::config::TimeframePair;
use session_breakout::data::TickLoader;
use session_breakout::resample::{BarCache, SessionWindow};
use session_breakout::Config;
use tracing::info;

/// Parse comma-separated floats
fn parse_float_list(s: &str) -> Vec<f64> {
    s.split(',')
        .filter_map(|x| x.trim().parse().ok())
        .collect()
}

/// Parse a comma-separated list of "structural/execution" minute pairs, e.g. "15/1,30/1"
fn parse_timeframes(s: &str) -> Result<Vec<TimeframePair>> {
    s.split(',')
        .map(str::trim)
        .filter(|x| !x.is_empty())
        .map(|pair| {
            let (structural, execution) = pair
                .split_once('/')
                .with_context(|| format!("Timeframe '{}' is not of the form S/E", pair))?;
            Ok(TimeframePair::new(
                structural
                    .trim()
                    .parse()
                    .with_context(|| format!("Bad structural minutes in '{}'", pair))?,
                execution
                    .trim()
                    .parse()
                    .with_context(|| format!("Bad execution minutes in '{}'", pair))?,
            ))
        })
        .collect()
}

/// Load every tick file in the configured data directory and resample the given widths
fn load_bar_cache(config: &Config, widths: &[u32]) -> Result<BarCache> {
    let loader = TickLoader::from_config(config).context("Invalid data configuration")?;

    info!("Loading ticks from: {}", config.data.data_dir);
    let (ticks, stats) = loader
        .load_dir(&config.data.data_dir)
        .with_context(|| format!("Failed to load ticks from {}", config.data.data_dir))?;
    info!(
        "Loaded {} ticks from {} files ({} files skipped, {} rows skipped, {} non-trade rows)",
        ticks.len(),
        stats.files_read,
        stats.files_skipped,
        stats.rows_skipped,
        stats.rows_filtered
    );

    let window = SessionWindow::from_config(&config.session);
    let cache = BarCache::build(&ticks, widths, &window).with_context(|| {
        format!(
            "No usable session bars in {} for session {:.2}-{:.2} {}",
            config.data.data_dir, config.session.start, config.session.end, config.session.timezone
        )
    })?;
    for width in cache.widths() {
        info!("{}m: {} session bars", width, cache.get(width).len());
    }
    Ok(cache)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_float_list() {
        assert_eq!(parse_float_list("1, 2.5,x,3"), vec![1.0, 2.5, 3.0]);
    }

    #[test]
    fn test_parse_timeframes() {
        let tfs = parse_timeframes("15/1, 30/5").unwrap();
        assert_eq!(tfs, vec![TimeframePair::new(15, 1), TimeframePair::new(30, 5)]);
        assert!(parse_timeframes("15").is_err());
        assert!(parse_timeframes("a/1").is_err());
    }

    #[test]
    fn test_load_fails_when_no_tick_is_in_session() {
        let dir = tempfile::tempdir().unwrap();
        // 08:00-08:29 UTC is 03:00-03:29 Eastern, outside 09:30-16:00
        let rows: Vec<String> = (0..30)
            .map(|m| format!("2024030408{:02}00,2,10,10.5,9.5,10,1", m))
            .collect();
        std::fs::write(dir.path().join("overnight.csv"), rows.join("\n")).unwrap();

        let mut config = Config::default();
        config.data.data_dir = dir.path().display().to_string();

        let err = load_bar_cache(&config, &[1, 15]).unwrap_err();
        assert!(err
            .chain()
            .any(|cause| cause.to_string().contains("outside the session window")));
    }
}
