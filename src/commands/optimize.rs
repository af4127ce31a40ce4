//! Optimize command implementation with progress tracking and custom parameter support

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use session_breakout::backtest::BacktestResult;
use session_breakout::config::GroupBy;
use session_breakout::optimizer::Optimizer;
use session_breakout::{grid, report, Config};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::info;

use super::{load_bar_cache, parse_float_list, parse_timeframes};

/// Command-line overrides for the sweep
#[derive(Debug, Default)]
pub struct OptimizeArgs {
    pub timeframes: Option<String>,
    pub r_multiples: Option<String>,
    pub stop_offsets: Option<String>,
    pub be_triggers: Option<String>,
    pub cutoffs: Option<String>,
    pub group_by: Option<String>,
    pub min_trades: Option<usize>,
    pub top: Option<usize>,
    pub output: Option<String>,
    pub sequential: bool,
}

fn parse_group_by(s: &str) -> Result<GroupBy> {
    match s {
        "parameter_set" => Ok(GroupBy::ParameterSet),
        "entry_cutoff" => Ok(GroupBy::EntryCutoff),
        other => bail!(
            "Unknown grouping: {}. Available: parameter_set, entry_cutoff",
            other
        ),
    }
}

/// Apply CLI overrides to the sweep and report settings
fn apply_overrides(config: &mut Config, args: &OptimizeArgs) -> Result<()> {
    if let Some(tfs) = &args.timeframes {
        config.sweep.timeframes = parse_timeframes(tfs)?;
    }
    if let Some(r) = &args.r_multiples {
        config.sweep.r_multiples = parse_float_list(r);
    }
    if let Some(stops) = &args.stop_offsets {
        config.sweep.stop_offsets = parse_float_list(stops);
    }
    if let Some(bes) = &args.be_triggers {
        config.sweep.be_triggers = parse_float_list(bes);
    }
    if let Some(cutoffs) = &args.cutoffs {
        config.sweep.entry_cutoffs = parse_float_list(cutoffs);
    }
    if let Some(group_by) = &args.group_by {
        config.sweep.group_by = parse_group_by(group_by)?;
    }
    if let Some(min) = args.min_trades {
        config.report.min_trades = min;
    }
    if let Some(top) = args.top {
        config.report.top = top;
    }
    if let Some(output) = &args.output {
        config.data.output = output.clone();
    }

    config
        .validate()
        .context("Invalid configuration after command-line overrides")?;
    Ok(())
}

pub fn run(config_path: Option<String>, args: OptimizeArgs) -> Result<()> {
    info!("Starting optimization");

    let mut config = match &config_path {
        Some(path) => {
            let config = Config::from_file(path)?;
            info!("Loaded configuration from: {}", path);
            config
        }
        None => Config::default(),
    };
    apply_overrides(&mut config, &args)?;

    let sets = grid::checked_parameter_sets(&config.sweep)?;
    let widths = grid::required_widths(&sets);
    info!(
        "Parameter combinations: {} (bar widths {:?})",
        sets.len(),
        widths
    );

    let cache = load_bar_cache(&config, &widths)?;

    // Print summary
    println!("\n{}", "=".repeat(70));
    println!("OPTIMIZATION SUMMARY");
    println!("{}", "=".repeat(70));
    println!(
        "  Timeframes:    {:?}",
        config
            .sweep
            .timeframes
            .iter()
            .map(|t| t.label.as_str())
            .collect::<Vec<_>>()
    );
    println!("  R multiples:   {:?}", config.sweep.r_multiples);
    println!("  Stop offsets:  {:?}", config.sweep.stop_offsets);
    println!("  BE triggers:   {:?}", config.sweep.be_triggers);
    println!("  Cutoffs:       {:?}", config.sweep.entry_cutoffs);
    println!("  Total tests:   {}", sets.len());
    println!("  Mode:          {}", if args.sequential { "sequential" } else { "parallel" });
    println!("{}\n", "=".repeat(70));

    // Create single progress bar (tqdm style)
    let pb = ProgressBar::new(sets.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("⚡ {percent:>3}%|{bar:40}| {pos}/{len} [{elapsed}<{eta}, {per_sec:.2}] ✓ {msg}")?
            .progress_chars("█░ "),
    );

    let optimizer = Optimizer::new(config);
    let min_trades = optimizer.config().report.min_trades;
    let valid_count = AtomicUsize::new(0);

    let on_result = |result: &BacktestResult| {
        pb.inc(1);
        if result.outcomes().len() >= min_trades {
            let count = valid_count.fetch_add(1, Ordering::Relaxed) + 1;
            pb.set_message(format!("{} valid", count));
        }
    };

    let results: Vec<BacktestResult> = if args.sequential {
        optimizer.optimize_sequential_with(&cache, &sets, on_result)
    } else {
        optimizer.optimize_with(&cache, &sets, on_result)
    };

    pb.finish_with_message(format!("{} valid", valid_count.load(Ordering::Relaxed)));
    println!();

    let config = optimizer.config();
    let rows = report::summarize(&results, config.sweep.group_by);
    let ranked = report::rank(rows, config.report.min_trades);
    info!(
        "{} of {} rows have at least {} trades",
        ranked.len(),
        results.len(),
        config.report.min_trades
    );

    report::write_csv(&config.data.output, &ranked)
        .with_context(|| format!("Failed to write results to {}", config.data.output))?;
    info!("Results written to: {}", config.data.output);

    if ranked.is_empty() {
        println!(
            "No parameter set reached {} trades; wrote an empty table to {}",
            config.report.min_trades, config.data.output
        );
        return Ok(());
    }

    report::print_table(&ranked, config.report.top);
    println!("Results written to: {}", config.data.output);

    info!("Optimization completed successfully");

    Ok(())
}
