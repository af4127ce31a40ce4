//! Session breakout backtester - main entry point
//!
//! This binary provides two subcommands:
//! - backtest: Run one parameter set and print its statistics
//! - optimize: Sweep the parameter grid and rank every combination

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

use commands::backtest::BacktestArgs;
use commands::optimize::OptimizeArgs;

#[derive(Parser, Debug)]
#[command(name = "session-breakout")]
#[command(about = "Intraday breakout-continuation backtester with parameter sweeps", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a single parameter set
    Backtest {
        /// Path to configuration file (defaults are used when omitted)
        #[arg(short, long)]
        config: Option<String>,

        /// Timeframe pair as structural/execution minutes. E.g., "15/1"
        #[arg(long)]
        timeframe: Option<String>,

        /// Reward multiple (target distance in R)
        #[arg(short, long)]
        reward: Option<f64>,

        /// Stop offset beyond the swing extreme, in price units
        #[arg(short, long)]
        stop: Option<f64>,

        /// Breakeven trigger as a fraction of risk
        #[arg(long)]
        be: Option<f64>,

        /// Latest structural bar time allowed to open a setup, in fractional hours. E.g., 14.5
        #[arg(long)]
        cutoff: Option<f64>,

        /// Write the trade log to this CSV file
        #[arg(long)]
        trades: Option<String>,
    },

    /// Sweep strategy parameters
    Optimize {
        /// Path to base configuration file (defaults are used when omitted)
        #[arg(short, long)]
        config: Option<String>,

        /// Timeframe pairs to test (comma-separated structural/execution minutes). E.g., "15/1,30/1"
        #[arg(long)]
        timeframes: Option<String>,

        /// Reward multiples to test (comma-separated). E.g., "2,3"
        #[arg(long)]
        r_multiples: Option<String>,

        /// Stop offsets to test (comma-separated). E.g., "0,0.5,1"
        #[arg(long)]
        stop_offsets: Option<String>,

        /// Breakeven triggers to test (comma-separated). E.g., "0.5,1.0,1.5"
        #[arg(long)]
        be_triggers: Option<String>,

        /// Entry cutoffs to test, in fractional hours (comma-separated). E.g., "14,14.5,15"
        #[arg(long)]
        cutoffs: Option<String>,

        /// Row grouping (parameter_set or entry_cutoff)
        #[arg(long)]
        group_by: Option<String>,

        /// Minimum trade count for a row to be ranked
        #[arg(long)]
        min_trades: Option<usize>,

        /// Number of top results to show
        #[arg(short, long)]
        top: Option<usize>,

        /// Output CSV path
        #[arg(short, long)]
        output: Option<String>,

        /// Run sequentially instead of parallel
        #[arg(long)]
        sequential: bool,
    },
}

fn setup_logging(verbose: bool, command_name: &str, file_only: bool) -> Result<()> {
    // Create logs directory
    std::fs::create_dir_all("logs")?;

    // Create log file with naming pattern: {command}_{date}.log
    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = PathBuf::from("logs").join(&log_filename);

    let level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let file_appender = tracing_appender::rolling::never("logs", &log_filename);

    if file_only {
        // Optimizer: keep the console for the progress bar
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_target(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(false);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .init();
    } else {
        let console_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(true);

        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_target(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(false);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer)
            .init();

        info!("Logging initialized");
        info!("Log file: {}", log_path.display());
    }

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let (command_name, file_only) = match &cli.command {
        Commands::Backtest { .. } => ("backtest", false),
        Commands::Optimize { .. } => ("optimize", true),
    };

    setup_logging(cli.verbose, command_name, file_only)?;

    match cli.command {
        Commands::Backtest {
            config,
            timeframe,
            reward,
            stop,
            be,
            cutoff,
            trades,
        } => commands::backtest::run(
            config,
            BacktestArgs {
                timeframe,
                reward,
                stop_offset: stop,
                be_trigger: be,
                cutoff,
                trades_out: trades,
            },
        ),

        Commands::Optimize {
            config,
            timeframes,
            r_multiples,
            stop_offsets,
            be_triggers,
            cutoffs,
            group_by,
            min_trades,
            top,
            output,
            sequential,
        } => commands::optimize::run(
            config,
            OptimizeArgs {
                timeframes,
                r_multiples,
                stop_offsets,
                be_triggers,
                cutoffs,
                group_by,
                min_trades,
                top,
                output,
                sequential,
            },
        ),
    }
}
