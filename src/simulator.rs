//! Trade simulation on the execution timeframe
//!
//! A setup becomes a trade in two phases:
//!
//! 1. **Entry** – scan execution bars for a swing point on the stop side of
//!    the trade and a close beyond the breakout level. How the swing and the
//!    entry bar relate is decided by an [`EntrySearch`] implementation.
//! 2. **Management** – walk forward from the entry bar. On every bar, in this
//!    order: move the stop to entry once price has travelled `be_trigger × risk`,
//!    check the stop, check the target. Stop before target within one bar is
//!    a modelling simplification: the worse event is assumed to print first.

use serde::{Deserialize, Serialize};

use crate::config::EntrySearchMode;
use crate::swing::{self, SwingKind};
use crate::{Direction, ParameterSet, PriceBar, Setup, Trade, TradeOutcome, TradeRecord};

/// Bar at which a trade is entered and the stop that goes with it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Entry {
    pub index: usize,
    pub price: f64,
    pub stop: f64,
}

/// Why a setup did not produce a trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SkipReason {
    /// Fewer than two swing windows of execution bars after the setup
    InsufficientBars,
    /// No qualifying swing/close combination before the bars ran out
    NoEntry,
    /// Stop on or beyond the entry price
    DegenerateRisk,
}

/// Strategy for locating the entry bar and its stop anchor
pub trait EntrySearch: Send + Sync {
    fn name(&self) -> &'static str;

    /// Find the entry for `setup` in `bars` (execution bars after the setup).
    ///
    /// Only indices with `swing_width` bars on both sides are considered.
    fn find_entry(
        &self,
        setup: &Setup,
        bars: &[PriceBar],
        swing_width: usize,
        stop_offset: f64,
    ) -> Option<Entry>;
}

/// Remembers every swing seen while scanning; the stop hangs off the most
/// recent one when a close finally crosses the level.
#[derive(Debug, Default, Clone, Copy)]
pub struct RunningSwing;

/// The crossing bar must itself be the swing point.
#[derive(Debug, Default, Clone, Copy)]
pub struct LatestSwing;

impl EntrySearch for RunningSwing {
    fn name(&self) -> &'static str {
        "running_swing"
    }

    fn find_entry(
        &self,
        setup: &Setup,
        bars: &[PriceBar],
        swing_width: usize,
        stop_offset: f64,
    ) -> Option<Entry> {
        let kind = SwingKind::for_direction(setup.direction);
        let values = extremes(kind, bars);
        let mut last_swing = None;

        for idx in scan_range(bars.len(), swing_width) {
            if swing::is_swing(kind, &values, idx, swing_width) {
                last_swing = Some(values[idx]);
            }
            if let Some(anchor) = last_swing {
                if closes_beyond(setup, &bars[idx]) {
                    return Some(Entry {
                        index: idx,
                        price: bars[idx].close,
                        stop: offset_stop(setup.direction, anchor, stop_offset),
                    });
                }
            }
        }
        None
    }
}

impl EntrySearch for LatestSwing {
    fn name(&self) -> &'static str {
        "latest_swing"
    }

    fn find_entry(
        &self,
        setup: &Setup,
        bars: &[PriceBar],
        swing_width: usize,
        stop_offset: f64,
    ) -> Option<Entry> {
        let kind = SwingKind::for_direction(setup.direction);
        let values = extremes(kind, bars);

        scan_range(bars.len(), swing_width)
            .find(|&idx| {
                swing::is_swing(kind, &values, idx, swing_width) && closes_beyond(setup, &bars[idx])
            })
            .map(|idx| Entry {
                index: idx,
                price: bars[idx].close,
                stop: offset_stop(setup.direction, values[idx], stop_offset),
            })
    }
}

/// Build the entry search selected in the config
pub fn entry_search_for(mode: EntrySearchMode) -> Box<dyn EntrySearch> {
    match mode {
        EntrySearchMode::RunningSwing => Box::new(RunningSwing),
        EntrySearchMode::LatestSwing => Box::new(LatestSwing),
    }
}

fn scan_range(len: usize, width: usize) -> std::ops::Range<usize> {
    width..len.saturating_sub(width)
}

fn extremes(kind: SwingKind, bars: &[PriceBar]) -> Vec<f64> {
    bars.iter()
        .map(|b| match kind {
            SwingKind::Low => b.low,
            SwingKind::High => b.high,
        })
        .collect()
}

fn closes_beyond(setup: &Setup, bar: &PriceBar) -> bool {
    match setup.direction {
        Direction::Long => bar.close > setup.level,
        Direction::Short => bar.close < setup.level,
    }
}

fn offset_stop(direction: Direction, anchor: f64, offset: f64) -> f64 {
    match direction {
        Direction::Long => anchor - offset,
        Direction::Short => anchor + offset,
    }
}

/// Execution bars strictly after the setup; with `same_day`, only that trading day
pub fn execution_window<'a>(bars: &'a [PriceBar], setup: &Setup, same_day: bool) -> &'a [PriceBar] {
    let start = bars.partition_point(|b| b.time <= setup.time);
    let after = &bars[start..];
    if same_day {
        let end = after.partition_point(|b| b.day() <= setup.day);
        &after[..end]
    } else {
        after
    }
}

/// Walk `bars` (starting at the entry bar) until the trade exits.
///
/// Returns the outcome and the index of the exit bar, if any.
pub fn manage(
    trade: &mut Trade,
    bars: &[PriceBar],
    be_trigger: f64,
    reward_multiple: f64,
) -> (TradeOutcome, Option<usize>) {
    let be_distance = be_trigger * trade.risk;

    for (i, bar) in bars.iter().enumerate() {
        if !trade.is_breakeven() {
            let reached = match trade.direction {
                Direction::Long => bar.high >= trade.entry + be_distance,
                Direction::Short => bar.low <= trade.entry - be_distance,
            };
            if reached {
                trade.move_to_breakeven();
            }
        }

        let stopped = match trade.direction {
            Direction::Long => bar.low <= trade.stop,
            Direction::Short => bar.high >= trade.stop,
        };
        if stopped {
            let outcome = if trade.is_breakeven() {
                TradeOutcome::Breakeven
            } else {
                TradeOutcome::Loss
            };
            return (outcome, Some(i));
        }

        let target_hit = match trade.direction {
            Direction::Long => bar.high >= trade.target,
            Direction::Short => bar.low <= trade.target,
        };
        if target_hit {
            return (TradeOutcome::Win(reward_multiple), Some(i));
        }
    }

    (TradeOutcome::Unresolved, None)
}

/// Entry search plus trade management for one parameter set
pub struct TradeSimulator {
    search: Box<dyn EntrySearch>,
    swing_width: usize,
}

impl TradeSimulator {
    pub fn new(search: Box<dyn EntrySearch>, swing_width: usize) -> Self {
        Self {
            search,
            swing_width,
        }
    }

    pub fn from_mode(mode: EntrySearchMode, swing_width: usize) -> Self {
        Self::new(entry_search_for(mode), swing_width)
    }

    pub fn search_name(&self) -> &'static str {
        self.search.name()
    }

    pub fn swing_width(&self) -> usize {
        self.swing_width
    }

    /// Simulate one setup against the full execution series
    pub fn simulate(
        &self,
        setup: &Setup,
        execution: &[PriceBar],
        params: &ParameterSet,
        same_day: bool,
    ) -> Result<TradeRecord, SkipReason> {
        let bars = execution_window(execution, setup, same_day);
        self.simulate_window(setup, bars, params)
    }

    /// Simulate one setup against bars already restricted to its window
    pub fn simulate_window(
        &self,
        setup: &Setup,
        bars: &[PriceBar],
        params: &ParameterSet,
    ) -> Result<TradeRecord, SkipReason> {
        if bars.len() < self.swing_width * 2 {
            return Err(SkipReason::InsufficientBars);
        }

        let entry = self
            .search
            .find_entry(setup, bars, self.swing_width, params.stop_offset)
            .ok_or(SkipReason::NoEntry)?;

        let mut trade = Trade::open(
            setup.direction,
            entry.price,
            entry.stop,
            params.reward_multiple,
        )
        .ok_or(SkipReason::DegenerateRisk)?;

        let managed = &bars[entry.index..];
        let (outcome, exit) = manage(
            &mut trade,
            managed,
            params.be_trigger,
            params.reward_multiple,
        );

        Ok(TradeRecord {
            day: setup.day,
            direction: setup.direction,
            setup_time: setup.time,
            level: setup.level,
            entry_time: bars[entry.index].time,
            entry: trade.entry,
            stop: trade.initial_stop,
            target: trade.target,
            risk: trade.risk,
            breakeven: trade.is_breakeven(),
            exit_time: exit.map(|i| managed[i].time),
            outcome,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, NaiveDateTime};

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 4)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    /// One-minute bars starting at 10:01 from (open, high, low, close)
    fn bars(rows: &[(f64, f64, f64, f64)]) -> Vec<PriceBar> {
        rows.iter()
            .enumerate()
            .map(|(i, &(o, h, l, c))| {
                PriceBar::new(start() + Duration::minutes(i as i64 + 1), o, h, l, c).unwrap()
            })
            .collect()
    }

    fn long_setup() -> Setup {
        Setup {
            direction: Direction::Long,
            level: 12.0,
            time: start(),
            day: start().date(),
        }
    }

    fn params(r: f64, offset: f64, be: f64) -> ParameterSet {
        ParameterSet {
            timeframe: "15m/1m".to_string(),
            structural_minutes: 15,
            execution_minutes: 1,
            reward_multiple: r,
            stop_offset: offset,
            be_trigger: be,
            entry_cutoff: None,
        }
    }

    #[test]
    fn test_running_swing_uses_earlier_swing() {
        // swing low 11.8 at index 2, close above 12 first at index 4
        let series = bars(&[
            (12.0, 12.1, 11.9, 12.0),
            (12.0, 12.0, 11.85, 11.9),
            (11.9, 11.95, 11.8, 11.9),
            (11.9, 11.98, 11.85, 11.95),
            (11.95, 12.2, 11.9, 12.1),
            (12.1, 12.3, 12.0, 12.2),
            (12.2, 12.4, 12.1, 12.3),
        ]);
        let entry = RunningSwing
            .find_entry(&long_setup(), &series, 2, 0.1)
            .unwrap();
        assert_eq!(entry.index, 4);
        assert_eq!(entry.price, 12.1);
        assert!((entry.stop - 11.7).abs() < 1e-9);

        // index 4 is not itself a swing low
        assert!(LatestSwing
            .find_entry(&long_setup(), &series, 2, 0.1)
            .is_none());
    }

    #[test]
    fn test_latest_swing_requires_swing_on_entry_bar() {
        let series = bars(&[
            (12.5, 12.6, 12.3, 12.4),
            (12.4, 12.5, 12.2, 12.3),
            (12.3, 12.4, 12.1, 12.35),
            (12.35, 12.5, 12.25, 12.45),
            (12.45, 12.6, 12.3, 12.5),
        ]);
        let entry = LatestSwing
            .find_entry(&long_setup(), &series, 2, 0.0)
            .unwrap();
        assert_eq!(entry.index, 2);
        assert_eq!(entry.price, 12.35);
        assert_eq!(entry.stop, 12.1);
    }

    #[test]
    fn test_short_entry() {
        let setup = Setup {
            direction: Direction::Short,
            level: 10.0,
            time: start(),
            day: start().date(),
        };
        let series = bars(&[
            (9.9, 10.0, 9.8, 9.9),
            (9.9, 10.1, 9.85, 9.95),
            (9.95, 10.3, 9.9, 9.95),
            (9.95, 10.1, 9.7, 9.8),
            (9.8, 9.9, 9.6, 9.7),
        ]);
        let entry = RunningSwing.find_entry(&setup, &series, 2, 0.5).unwrap();
        assert_eq!(entry.index, 2);
        assert!((entry.stop - 10.8).abs() < 1e-9);
    }

    #[test]
    fn test_manage_target_hit() {
        let mut trade = Trade::open(Direction::Long, 100.0, 98.0, 2.0).unwrap();
        let series = bars(&[
            (100.0, 100.5, 99.5, 100.0),
            (100.0, 101.0, 99.0, 100.5),
            (100.5, 104.5, 100.2, 104.0),
        ]);
        let (outcome, exit) = manage(&mut trade, &series, 1.5, 2.0);
        assert_eq!(outcome, TradeOutcome::Win(2.0));
        assert_eq!(exit, Some(2));
    }

    #[test]
    fn test_manage_loss_is_minus_one() {
        let mut trade = Trade::open(Direction::Long, 100.0, 98.0, 2.0).unwrap();
        let series = bars(&[(100.0, 100.5, 99.0, 99.5), (99.5, 99.6, 90.0, 91.0)]);
        let (outcome, exit) = manage(&mut trade, &series, 1.0, 2.0);
        assert_eq!(outcome, TradeOutcome::Loss);
        assert_eq!(outcome.r_multiple(), Some(-1.0));
        assert_eq!(exit, Some(1));
        assert!(!trade.is_breakeven());
    }

    #[test]
    fn test_manage_breakeven_exit() {
        let mut trade = Trade::open(Direction::Long, 100.0, 98.0, 2.0).unwrap();
        let series = bars(&[
            (100.0, 102.1, 100.1, 102.0),
            (102.0, 102.5, 101.0, 101.5),
            (101.5, 101.6, 99.9, 100.0),
        ]);
        let (outcome, exit) = manage(&mut trade, &series, 1.0, 2.0);
        assert_eq!(outcome, TradeOutcome::Breakeven);
        assert_eq!(exit, Some(2));
        assert_eq!(trade.stop, 100.0);
    }

    #[test]
    fn test_manage_stop_checked_before_target() {
        let mut trade = Trade::open(Direction::Long, 100.0, 98.0, 2.0).unwrap();
        let series = bars(&[(100.0, 105.0, 97.0, 101.0)]);
        let (outcome, _) = manage(&mut trade, &series, 3.0, 2.0);
        assert_eq!(outcome, TradeOutcome::Loss);

        // trigger below target: the same bar moves the stop and then takes it out
        let mut trade = Trade::open(Direction::Long, 100.0, 98.0, 2.0).unwrap();
        let (outcome, _) = manage(&mut trade, &series, 1.0, 2.0);
        assert_eq!(outcome, TradeOutcome::Breakeven);
    }

    #[test]
    fn test_manage_short_target_hit() {
        let mut trade = Trade::open(Direction::Short, 100.0, 102.0, 2.0).unwrap();
        assert_eq!(trade.target, 96.0);
        let series = bars(&[
            (100.0, 100.5, 99.5, 100.0),
            (100.0, 101.0, 99.0, 99.5),
            (99.5, 99.8, 95.5, 96.0),
        ]);
        let (outcome, exit) = manage(&mut trade, &series, 1.5, 2.0);
        assert_eq!(outcome, TradeOutcome::Win(2.0));
        assert_eq!(exit, Some(2));
        assert!(trade.is_breakeven());
    }

    #[test]
    fn test_manage_short_breakeven_exit() {
        let mut trade = Trade::open(Direction::Short, 100.0, 102.0, 2.0).unwrap();
        let series = bars(&[
            (99.5, 99.8, 97.9, 98.0),
            (98.0, 98.5, 97.5, 98.2),
            (98.2, 100.1, 98.1, 100.0),
        ]);
        let (outcome, exit) = manage(&mut trade, &series, 1.0, 2.0);
        assert_eq!(outcome, TradeOutcome::Breakeven);
        assert_eq!(outcome.r_multiple(), Some(0.0));
        assert_eq!(exit, Some(2));
        assert_eq!(trade.stop, 100.0);
    }

    #[test]
    fn test_manage_short_loss_is_minus_one() {
        let mut trade = Trade::open(Direction::Short, 100.0, 102.0, 2.0).unwrap();
        let series = bars(&[(100.0, 101.0, 99.5, 100.8), (100.8, 102.5, 100.5, 102.2)]);
        let (outcome, exit) = manage(&mut trade, &series, 1.0, 2.0);
        assert_eq!(outcome, TradeOutcome::Loss);
        assert_eq!(outcome.r_multiple(), Some(-1.0));
        assert_eq!(exit, Some(1));
        assert!(!trade.is_breakeven());
    }

    #[test]
    fn test_manage_short_stop_checked_before_target() {
        let mut trade = Trade::open(Direction::Short, 100.0, 102.0, 2.0).unwrap();
        let series = bars(&[(100.0, 102.5, 95.0, 99.0)]);
        let (outcome, _) = manage(&mut trade, &series, 3.0, 2.0);
        assert_eq!(outcome, TradeOutcome::Loss);
    }

    #[test]
    fn test_manage_unresolved() {
        let mut trade = Trade::open(Direction::Short, 100.0, 101.0, 3.0).unwrap();
        let series = bars(&[(100.0, 100.5, 99.5, 100.0), (100.0, 100.6, 99.0, 99.2)]);
        let (outcome, exit) = manage(&mut trade, &series, 1.5, 3.0);
        assert_eq!(outcome, TradeOutcome::Unresolved);
        assert_eq!(exit, None);
    }

    #[test]
    fn test_breakeven_never_reverts() {
        let mut trade = Trade::open(Direction::Long, 100.0, 98.0, 5.0).unwrap();
        let series = bars(&[
            (100.0, 101.5, 100.2, 101.0),
            (101.0, 101.2, 100.5, 100.8),
            (100.8, 100.9, 100.3, 100.4),
        ]);
        let (outcome, _) = manage(&mut trade, &series, 0.5, 5.0);
        assert_eq!(outcome, TradeOutcome::Unresolved);
        assert!(trade.is_breakeven());
        assert_eq!(trade.stop, 100.0);
    }

    #[test]
    fn test_execution_window_same_day() {
        let mut series = bars(&[
            (1.0, 1.0, 1.0, 1.0),
            (1.0, 1.0, 1.0, 1.0),
            (1.0, 1.0, 1.0, 1.0),
        ]);
        series.push(PriceBar::new(start() + Duration::days(1), 1.0, 1.0, 1.0, 1.0).unwrap());
        let mut setup = long_setup();
        setup.time = series[0].time;

        assert_eq!(execution_window(&series, &setup, false).len(), 3);
        assert_eq!(execution_window(&series, &setup, true).len(), 2);
    }

    #[test]
    fn test_simulator_from_mode() {
        let sim = TradeSimulator::from_mode(EntrySearchMode::LatestSwing, 3);
        assert_eq!(sim.search_name(), "latest_swing");
        assert_eq!(sim.swing_width(), 3);
        let sim = TradeSimulator::from_mode(EntrySearchMode::default(), 2);
        assert_eq!(sim.search_name(), "running_swing");
    }

    #[test]
    fn test_simulate_skips() {
        let sim = TradeSimulator::from_mode(EntrySearchMode::RunningSwing, 2);
        let few = bars(&[(12.0, 12.1, 11.9, 12.0)]);
        assert_eq!(
            sim.simulate(&long_setup(), &few, &params(2.0, 0.0, 1.0), true),
            Err(SkipReason::InsufficientBars)
        );

        let flat = bars(&[(11.0, 11.0, 11.0, 11.0); 6]);
        assert_eq!(
            sim.simulate(&long_setup(), &flat, &params(2.0, 0.0, 1.0), true),
            Err(SkipReason::NoEntry)
        );
    }

    #[test]
    fn test_simulate_degenerate_risk() {
        // swing bar closes on its low: entry == stop with no offset
        let series = bars(&[
            (12.6, 12.7, 12.5, 12.6),
            (12.6, 12.6, 12.4, 12.5),
            (12.5, 12.5, 12.3, 12.3),
            (12.4, 12.5, 12.35, 12.45),
            (12.45, 12.5, 12.4, 12.45),
        ]);
        let sim = TradeSimulator::from_mode(EntrySearchMode::RunningSwing, 2);
        assert_eq!(
            sim.simulate(&long_setup(), &series, &params(2.0, 0.0, 1.0), true),
            Err(SkipReason::DegenerateRisk)
        );

        let record = sim
            .simulate(&long_setup(), &series, &params(2.0, 0.5, 1.0), true)
            .unwrap();
        assert!((record.risk - 0.5).abs() < 1e-9);
        assert!((record.target - 13.3).abs() < 1e-9);
    }
}
