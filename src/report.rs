//! Summary statistics, ranking and CSV output

use ordered_float::OrderedFloat;
use serde::Serialize;
use statrs::statistics::Statistics;
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::path::Path;

use crate::backtest::BacktestResult;
use crate::config::GroupBy;
use crate::types::format_hour;
use crate::{Direction, TradeOutcome};

/// Aggregate statistics of one outcome sequence
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Summary {
    pub trades: usize,
    pub avg_r: f64,
    pub std_r: f64,
    pub total_r: f64,
    /// Fraction of outcomes > 0
    pub win_rate: f64,
    /// Fraction of outcomes == 0
    pub breakeven_rate: f64,
    /// Fraction of outcomes < 0
    pub loss_rate: f64,
}

impl Summary {
    /// Empty input gives all zeros; `std_r` is 0 below two outcomes
    pub fn from_outcomes(outcomes: &[f64]) -> Self {
        let n = outcomes.len();
        if n == 0 {
            return Summary::default();
        }

        let total = n as f64;
        let fraction = |pred: fn(f64) -> bool| {
            outcomes.iter().filter(|&&r| pred(r)).count() as f64 / total
        };

        Summary {
            trades: n,
            avg_r: outcomes.iter().mean(),
            std_r: if n < 2 { 0.0 } else { outcomes.iter().std_dev() },
            total_r: outcomes.iter().sum(),
            win_rate: fraction(|r| r > 0.0),
            breakeven_rate: fraction(|r| r == 0.0),
            loss_rate: fraction(|r| r < 0.0),
        }
    }
}

/// One line of the ranked output table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRow {
    pub label: String,
    pub structural_minutes: Option<u32>,
    pub execution_minutes: Option<u32>,
    pub reward_multiple: Option<f64>,
    pub stop_offset: Option<f64>,
    pub be_trigger: Option<f64>,
    pub entry_cutoff: Option<String>,
    pub trades: usize,
    pub avg_r: f64,
    pub std_r: f64,
    pub total_r: f64,
    pub win_rate: f64,
    pub breakeven_rate: f64,
    pub loss_rate: f64,
}

impl SummaryRow {
    fn new(label: String, summary: Summary) -> Self {
        SummaryRow {
            label,
            structural_minutes: None,
            execution_minutes: None,
            reward_multiple: None,
            stop_offset: None,
            be_trigger: None,
            entry_cutoff: None,
            trades: summary.trades,
            avg_r: summary.avg_r,
            std_r: summary.std_r,
            total_r: summary.total_r,
            win_rate: summary.win_rate,
            breakeven_rate: summary.breakeven_rate,
            loss_rate: summary.loss_rate,
        }
    }

    fn from_result(result: &BacktestResult) -> Self {
        let p = &result.params;
        SummaryRow {
            structural_minutes: Some(p.structural_minutes),
            execution_minutes: Some(p.execution_minutes),
            reward_multiple: Some(p.reward_multiple),
            stop_offset: Some(p.stop_offset),
            be_trigger: Some(p.be_trigger),
            entry_cutoff: p.entry_cutoff.map(format_hour),
            ..SummaryRow::new(p.label(), Summary::from_outcomes(&result.outcomes()))
        }
    }
}

/// Reduce sweep results to summary rows, in input order (or cutoff order when pooling)
pub fn summarize(results: &[BacktestResult], group_by: GroupBy) -> Vec<SummaryRow> {
    match group_by {
        GroupBy::ParameterSet => results.iter().map(SummaryRow::from_result).collect(),
        GroupBy::EntryCutoff => {
            let mut pooled: BTreeMap<Option<OrderedFloat<f64>>, Vec<f64>> = BTreeMap::new();
            for result in results {
                pooled
                    .entry(result.params.entry_cutoff.map(OrderedFloat))
                    .or_default()
                    .extend(result.outcomes());
            }

            pooled
                .into_iter()
                .map(|(cutoff, outcomes)| {
                    let cutoff = cutoff.map(|c| format_hour(c.into_inner()));
                    let label = match &cutoff {
                        Some(hhmm) => format!("Cutoff={}", hhmm),
                        None => "No cutoff".to_string(),
                    };
                    SummaryRow {
                        entry_cutoff: cutoff,
                        ..SummaryRow::new(label, Summary::from_outcomes(&outcomes))
                    }
                })
                .collect()
        }
    }
}

/// Drop rows with fewer than `min_trades` outcomes, best mean R first.
/// Ties keep their input order.
pub fn rank(rows: Vec<SummaryRow>, min_trades: usize) -> Vec<SummaryRow> {
    let mut kept: Vec<SummaryRow> = rows
        .into_iter()
        .filter(|row| row.trades >= min_trades)
        .collect();
    kept.sort_by_key(|row| Reverse(OrderedFloat(row.avg_r)));
    kept
}

/// Write rows with a header line
pub fn write_csv<P: AsRef<Path>, T: Serialize>(path: P, rows: &[T]) -> Result<(), csv::Error> {
    let mut wtr = csv::Writer::from_path(path)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Print the first `top` rows
pub fn print_table(rows: &[SummaryRow], top: usize) {
    let display_count = top.min(rows.len());
    println!("\n{}", "=".repeat(110));
    println!("TOP {} PARAMETER SETS (sorted by avg R)", display_count);
    println!("{}", "=".repeat(110));
    println!(
        "{:<4} {:>7} {:>7} {:>8} {:>7} {:>6} {:>6} {:>6} | Parameters",
        "Rank", "AvgR", "StdR", "TotalR", "Trades", "Win%", "BE%", "Loss%"
    );
    println!("{}", "-".repeat(110));

    for (i, row) in rows.iter().take(top).enumerate() {
        println!(
            "{:<4} {:>7.3} {:>7.3} {:>8.1} {:>7} {:>6.1} {:>6.1} {:>6.1} | {}",
            i + 1,
            row.avg_r,
            row.std_r,
            row.total_r,
            row.trades,
            row.win_rate * 100.0,
            row.breakeven_rate * 100.0,
            row.loss_rate * 100.0,
            row.label
        );
    }
    println!("{}", "=".repeat(110));
}

/// Flat trade-log line
#[derive(Debug, Clone, Serialize)]
pub struct TradeRow {
    pub day: String,
    pub direction: Direction,
    pub setup_time: String,
    pub level: f64,
    pub entry_time: String,
    pub entry: f64,
    pub stop: f64,
    pub target: f64,
    pub risk: f64,
    pub breakeven: bool,
    pub exit_time: Option<String>,
    pub outcome: &'static str,
    pub r: Option<f64>,
}

pub fn trade_rows(result: &BacktestResult) -> Vec<TradeRow> {
    const TIME_FMT: &str = "%Y-%m-%d %H:%M:%S";

    result
        .trades
        .iter()
        .map(|t| TradeRow {
            day: t.day.to_string(),
            direction: t.direction,
            setup_time: t.setup_time.format(TIME_FMT).to_string(),
            level: t.level,
            entry_time: t.entry_time.format(TIME_FMT).to_string(),
            entry: t.entry,
            stop: t.stop,
            target: t.target,
            risk: t.risk,
            breakeven: t.breakeven,
            exit_time: t.exit_time.map(|e| e.format(TIME_FMT).to_string()),
            outcome: match t.outcome {
                TradeOutcome::Win(_) => "win",
                TradeOutcome::Breakeven => "breakeven",
                TradeOutcome::Loss => "loss",
                TradeOutcome::Unresolved => "unresolved",
            },
            r: t.outcome.r_multiple(),
        })
        .collect()
}
