//! Backtesting engine
//!
//! Runs one parameter set over pre-built structural and execution bars:
//! structural bar pairs are scanned in time order, each one gated by the
//! entry cutoff and the risk governor, then handed to the trade simulator.

use std::collections::HashMap;
use tracing::{debug, info};

use crate::config::Config;
use crate::resample::BarCache;
use crate::risk::{self, RiskGovernor};
use crate::setup;
use crate::simulator::{SkipReason, TradeSimulator};
use crate::{ParameterSet, PriceBar, TradeRecord};

/// Backtest engine
pub struct Backtester {
    simulator: TradeSimulator,
    governor: Box<dyn RiskGovernor>,
}

impl Backtester {
    pub fn new(simulator: TradeSimulator, governor: Box<dyn RiskGovernor>) -> Self {
        Backtester {
            simulator,
            governor,
        }
    }

    /// Engine with the entry search, swing width and governor named in the config
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            TradeSimulator::from_mode(config.engine.entry_search, config.engine.swing_lookback),
            risk::governor_for(config),
        )
    }

    /// Run using the bars for this parameter set's widths from `cache`
    pub fn run_cached(&mut self, params: &ParameterSet, cache: &BarCache) -> BacktestResult {
        self.run(
            params,
            cache.get(params.structural_minutes),
            cache.get(params.execution_minutes),
        )
    }

    /// Run one parameter set. Ledgers start empty on every call.
    pub fn run(
        &mut self,
        params: &ParameterSet,
        structural: &[PriceBar],
        execution: &[PriceBar],
    ) -> BacktestResult {
        self.governor.reset();

        let mut trades = Vec::new();
        let mut stats = RunStats::default();
        let same_day = self.governor.day_scoped();

        for pair in structural.windows(2) {
            let (prev, cur) = (&pair[0], &pair[1]);

            if let Some(cutoff) = params.entry_cutoff {
                if cur.fractional_hour() > cutoff {
                    stats.past_cutoff += 1;
                    continue;
                }
            }

            let day = cur.day();
            if !self.governor.allows(day) {
                stats.governed += 1;
                continue;
            }

            let Some(setup) = setup::detect(prev, cur) else {
                continue;
            };
            stats.setups += 1;

            match self.simulator.simulate(&setup, execution, params, same_day) {
                Ok(record) => {
                    debug!(
                        "{} {} setup at {}: entry {:.4} stop {:.4} -> {:?}",
                        params.label(),
                        record.direction,
                        record.setup_time,
                        record.entry,
                        record.stop,
                        record.outcome
                    );
                    self.governor
                        .record(day, record.outcome.r_multiple().unwrap_or(0.0));
                    trades.push(record);
                }
                Err(reason) => {
                    *stats.skipped.entry(reason).or_insert(0) += 1;
                }
            }
        }

        debug!(
            "{} ({} search, swing width {}): {} setups, {} trades, {} skipped",
            params.label(),
            self.simulator.search_name(),
            self.simulator.swing_width(),
            stats.setups,
            trades.len(),
            stats.skipped.values().sum::<usize>()
        );

        BacktestResult {
            params: params.clone(),
            trades,
            stats,
        }
    }
}

/// Bookkeeping for one run
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RunStats {
    pub setups: usize,
    /// Structural bars ignored because they came after the entry cutoff
    pub past_cutoff: usize,
    /// Structural bars ignored because the day's limits were reached
    pub governed: usize,
    pub skipped: HashMap<SkipReason, usize>,
}

#[derive(Debug, Clone)]
pub struct BacktestResult {
    pub params: ParameterSet,
    pub trades: Vec<TradeRecord>,
    pub stats: RunStats,
}

impl BacktestResult {
    /// R-multiples of the trades that reached an exit, in time order
    pub fn outcomes(&self) -> Vec<f64> {
        self.trades
            .iter()
            .filter_map(|t| t.outcome.r_multiple())
            .collect()
    }

    pub fn unresolved(&self) -> usize {
        self.trades
            .iter()
            .filter(|t| !t.outcome.is_resolved())
            .count()
    }

    pub fn log_summary(&self) {
        info!(
            "{}: {} setups, {} trades ({} unresolved), {} past cutoff, {} blocked by daily limits",
            self.params.label(),
            self.stats.setups,
            self.trades.len(),
            self.unresolved(),
            self.stats.past_cutoff,
            self.stats.governed
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EntrySearchMode;
    use crate::risk::{DailyLimits, Unlimited};
    use crate::TradeOutcome;
    use chrono::{Duration, NaiveDate, NaiveDateTime};

    fn day_start(d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, d)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    fn params() -> ParameterSet {
        ParameterSet {
            timeframe: "15m/1m".to_string(),
            structural_minutes: 15,
            execution_minutes: 1,
            reward_multiple: 2.0,
            stop_offset: 0.0,
            be_trigger: 1.0,
            entry_cutoff: None,
        }
    }

    /// Structural pair that forms a long setup at `day_start + 15m`, level 12
    fn structural(d: u32) -> Vec<PriceBar> {
        vec![
            PriceBar::new(day_start(d), 10.0, 12.0, 9.0, 11.0).unwrap(),
            PriceBar::new(day_start(d) + Duration::minutes(15), 11.0, 13.0, 10.0, 12.5).unwrap(),
        ]
    }

    /// Execution bars after the setup that stop out at -1R
    fn losing_execution(d: u32) -> Vec<PriceBar> {
        let t0 = day_start(d) + Duration::minutes(15);
        [
            (12.0, 12.1, 11.9, 12.0),
            (12.0, 12.0, 11.85, 11.9),
            (11.9, 11.95, 11.8, 11.9),
            (11.9, 11.98, 11.85, 11.95),
            (11.95, 12.2, 11.9, 12.1),
            (12.1, 12.15, 11.5, 11.6),
            (11.6, 11.7, 11.4, 11.5),
        ]
        .iter()
        .enumerate()
        .map(|(i, &(o, h, l, c))| {
            PriceBar::new(t0 + Duration::minutes(i as i64 + 1), o, h, l, c).unwrap()
        })
        .collect()
    }

    fn engine(daily: bool) -> Backtester {
        let governor: Box<dyn RiskGovernor> = if daily {
            Box::new(DailyLimits::default().build())
        } else {
            Box::new(Unlimited)
        };
        Backtester::new(
            TradeSimulator::from_mode(EntrySearchMode::RunningSwing, 2),
            governor,
        )
    }

    #[test]
    fn test_single_losing_trade() {
        let result = engine(true).run(&params(), &structural(4), &losing_execution(4));
        assert_eq!(result.trades.len(), 1);
        assert_eq!(result.trades[0].outcome, TradeOutcome::Loss);
        assert_eq!(result.outcomes(), vec![-1.0]);
        assert_eq!(result.stats.setups, 1);
    }

    #[test]
    fn test_cutoff_blocks_late_setups() {
        let mut p = params();
        p.entry_cutoff = Some(10.0);
        let result = engine(true).run(&p, &structural(4), &losing_execution(4));
        assert!(result.trades.is_empty());
        assert_eq!(result.stats.past_cutoff, 1);

        p.entry_cutoff = Some(10.25);
        let result = engine(true).run(&p, &structural(4), &losing_execution(4));
        assert_eq!(result.trades.len(), 1);
    }

    #[test]
    fn test_loss_limit_blocks_second_setup_same_day() {
        // two identical setups on the same day, a loss on the first
        let mut structural_bars = structural(4);
        let later = day_start(4) + Duration::minutes(45);
        structural_bars.push(PriceBar::new(later, 12.5, 13.0, 12.4, 12.8).unwrap());
        structural_bars.push(
            PriceBar::new(later + Duration::minutes(15), 12.8, 13.5, 12.7, 13.2).unwrap(),
        );

        let result = engine(true).run(&params(), &structural_bars, &losing_execution(4));
        assert_eq!(result.trades.len(), 1);
        assert!(result.stats.governed > 0);

        // without daily limits the later pairs are evaluated
        let result = engine(false).run(&params(), &structural_bars, &losing_execution(4));
        assert!(result.stats.governed == 0);
        assert!(result.stats.setups >= 2);
    }

    #[test]
    fn test_runs_do_not_share_ledgers() {
        let mut bt = engine(true);
        let first = bt.run(&params(), &structural(4), &losing_execution(4));
        let second = bt.run(&params(), &structural(4), &losing_execution(4));
        assert_eq!(first.outcomes(), second.outcomes());
    }

    #[test]
    fn test_insufficient_execution_bars_skipped() {
        let result = engine(true).run(&params(), &structural(4), &losing_execution(4)[..2]);
        assert!(result.trades.is_empty());
        assert_eq!(
            result.stats.skipped.get(&SkipReason::InsufficientBars),
            Some(&1)
        );
    }
}
