//! Backtest command implementation

use anyhow::{Context, Result};
use session_breakout::backtest::Backtester;
use session_breakout::report::{self, Summary};
use session_breakout::{format_hour, grid, Config};
use tracing::{debug, info};

use super::{load_bar_cache, parse_timeframes};

/// Overrides for the single parameter set to run
#[derive(Debug, Default)]
pub struct BacktestArgs {
    pub timeframe: Option<String>,
    pub reward: Option<f64>,
    pub stop_offset: Option<f64>,
    pub be_trigger: Option<f64>,
    pub cutoff: Option<f64>,
    pub trades_out: Option<String>,
}

pub fn run(config_path: Option<String>, args: BacktestArgs) -> Result<()> {
    info!("Starting backtest");

    let config = match &config_path {
        Some(path) => {
            let config = Config::from_file(path)?;
            info!("Loaded configuration from: {}", path);
            config
        }
        None => {
            info!("No configuration file given, using defaults");
            Config::default()
        }
    };

    // Start from the first parameter set of the configured sweep
    let mut params = grid::checked_parameter_sets(&config.sweep)?.remove(0);

    if let Some(tf) = &args.timeframe {
        let pair = parse_timeframes(tf)?
            .into_iter()
            .next()
            .context("Empty --timeframe")?;
        info!("Overriding timeframe to: {}", pair.label);
        params.timeframe = pair.label;
        params.structural_minutes = pair.structural;
        params.execution_minutes = pair.execution;
    }
    if let Some(r) = args.reward {
        info!("Overriding reward multiple to: {}", r);
        params.reward_multiple = r;
    }
    if let Some(stop) = args.stop_offset {
        info!("Overriding stop offset to: {}", stop);
        params.stop_offset = stop;
    }
    if let Some(be) = args.be_trigger {
        info!("Overriding breakeven trigger to: {}", be);
        params.be_trigger = be;
    }
    if let Some(cutoff) = args.cutoff {
        info!("Overriding entry cutoff to: {}", format_hour(cutoff));
        params.entry_cutoff = Some(cutoff);
    }
    debug!("Parameters: {:?}", params);

    // validate the overridden set with the same rules as a config file
    let mut checked = config.clone();
    checked.sweep.presets = Some(vec![params.clone()]);
    checked
        .validate()
        .context("Invalid parameters after command-line overrides")?;

    let cache = load_bar_cache(&config, &grid::required_widths(std::slice::from_ref(&params)))?;

    let mut backtester = Backtester::from_config(&config);
    info!("Running backtest...");
    let result = backtester.run_cached(&params, &cache);
    result.log_summary();

    let summary = Summary::from_outcomes(&result.outcomes());

    println!("\n{}", "=".repeat(60));
    println!("BACKTEST RESULTS");
    println!("{}", "=".repeat(60));
    println!("Parameters:         {}", params.label());
    println!("Setups:             {}", result.stats.setups);
    println!("Trades:             {}", result.trades.len());
    println!("Resolved Trades:    {}", summary.trades);
    println!("Unresolved Trades:  {}", result.unresolved());
    println!("Average R:          {:.3}", summary.avg_r);
    println!("Std Dev R:          {:.3}", summary.std_r);
    println!("Total R:            {:.2}", summary.total_r);
    println!("Win Rate:           {:.2}%", summary.win_rate * 100.0);
    println!("Breakeven Rate:     {:.2}%", summary.breakeven_rate * 100.0);
    println!("Loss Rate:          {:.2}%", summary.loss_rate * 100.0);
    println!("{}", "=".repeat(60));

    if let Some(path) = &args.trades_out {
        report::write_csv(path, &report::trade_rows(&result))
            .with_context(|| format!("Failed to write trade log to {}", path))?;
        info!("Trade log written to: {}", path);
    }

    info!("Backtest completed successfully");

    Ok(())
}
