//! Core data types used across the backtester

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for bar data
#[derive(Debug, Error, PartialEq)]
pub enum BarValidationError {
    #[error("high ({high}) must be >= low ({low})")]
    HighLessThanLow { high: f64, low: f64 },

    #[error("open ({open}) must be between low ({low}) and high ({high})")]
    OpenOutOfRange { open: f64, low: f64, high: f64 },

    #[error("close ({close}) must be between low ({low}) and high ({high})")]
    CloseOutOfRange { close: f64, low: f64, high: f64 },

    #[error("prices must be finite: open={open}, high={high}, low={low}, close={close}")]
    NonFinitePrice {
        open: f64,
        high: f64,
        low: f64,
        close: f64,
    },
}

/// A single trade observation after time zone normalization.
///
/// `time` is wall-clock time in the session time zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub time: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

/// OHLC bar labeled by the right edge of its interval, in session-local time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub time: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl PriceBar {
    /// Create a new bar with validation
    pub fn new(
        time: NaiveDateTime,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
    ) -> Result<Self, BarValidationError> {
        let bar = Self::new_unchecked(time, open, high, low, close);
        bar.validate()?;
        Ok(bar)
    }

    /// Create a bar without validation (resampler output is consistent by construction)
    pub fn new_unchecked(time: NaiveDateTime, open: f64, high: f64, low: f64, close: f64) -> Self {
        Self {
            time,
            open,
            high,
            low,
            close,
        }
    }

    pub fn validate(&self) -> Result<(), BarValidationError> {
        if ![self.open, self.high, self.low, self.close]
            .iter()
            .all(|p| p.is_finite())
        {
            return Err(BarValidationError::NonFinitePrice {
                open: self.open,
                high: self.high,
                low: self.low,
                close: self.close,
            });
        }

        if self.high < self.low {
            return Err(BarValidationError::HighLessThanLow {
                high: self.high,
                low: self.low,
            });
        }

        if self.open < self.low || self.open > self.high {
            return Err(BarValidationError::OpenOutOfRange {
                open: self.open,
                low: self.low,
                high: self.high,
            });
        }

        if self.close < self.low || self.close > self.high {
            return Err(BarValidationError::CloseOutOfRange {
                close: self.close,
                low: self.low,
                high: self.high,
            });
        }

        Ok(())
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }

    /// Trading day the bar belongs to
    pub fn day(&self) -> NaiveDate {
        self.time.date()
    }

    /// Label time as fractional hours since midnight (09:30 -> 9.5)
    pub fn fractional_hour(&self) -> f64 {
        fractional_hour(&self.time)
    }
}

/// Wall-clock time as fractional hours since midnight
pub fn fractional_hour(time: &NaiveDateTime) -> f64 {
    time.hour() as f64 + time.minute() as f64 / 60.0
}

/// Trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Long => write!(f, "long"),
            Direction::Short => write!(f, "short"),
        }
    }
}

/// Breakout-continuation setup found on the structural timeframe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Setup {
    pub direction: Direction,
    /// Previous bar's high (long) or low (short)
    pub level: f64,
    /// Label time of the structural bar that completed the pattern
    pub time: NaiveDateTime,
    pub day: NaiveDate,
}

/// An open trade while it is being managed.
///
/// `risk` is always positive; `Trade::open` refuses to build anything else.
#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    pub direction: Direction,
    pub entry: f64,
    pub initial_stop: f64,
    pub stop: f64,
    pub risk: f64,
    pub target: f64,
    breakeven: bool,
}

impl Trade {
    /// Open a trade, or `None` when the stop is not on the losing side of entry
    pub fn open(direction: Direction, entry: f64, stop: f64, reward_multiple: f64) -> Option<Self> {
        let risk = match direction {
            Direction::Long => entry - stop,
            Direction::Short => stop - entry,
        };
        if risk.is_nan() || risk <= 0.0 {
            return None;
        }

        let target = match direction {
            Direction::Long => entry + reward_multiple * risk,
            Direction::Short => entry - reward_multiple * risk,
        };

        Some(Self {
            direction,
            entry,
            initial_stop: stop,
            stop,
            risk,
            target,
            breakeven: false,
        })
    }

    pub fn is_breakeven(&self) -> bool {
        self.breakeven
    }

    /// Move the stop to entry. Only the first call has any effect.
    pub fn move_to_breakeven(&mut self) -> bool {
        if self.breakeven {
            return false;
        }
        self.stop = self.entry;
        self.breakeven = true;
        true
    }
}

/// Final result of a managed trade
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "r", rename_all = "lowercase")]
pub enum TradeOutcome {
    /// Target hit, worth the reward multiple
    Win(f64),
    /// Stopped out at entry after the breakeven move
    Breakeven,
    /// Stopped out at the initial stop, always -1R
    Loss,
    /// Ran out of bars before any exit
    Unresolved,
}

impl TradeOutcome {
    /// Normalized R value; `None` for trades without a result
    pub fn r_multiple(&self) -> Option<f64> {
        match self {
            TradeOutcome::Win(r) => Some(*r),
            TradeOutcome::Breakeven => Some(0.0),
            TradeOutcome::Loss => Some(-1.0),
            TradeOutcome::Unresolved => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(self, TradeOutcome::Unresolved)
    }
}

/// Everything worth keeping about one simulated trade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub day: NaiveDate,
    pub direction: Direction,
    pub setup_time: NaiveDateTime,
    pub level: f64,
    pub entry_time: NaiveDateTime,
    pub entry: f64,
    pub stop: f64,
    pub target: f64,
    pub risk: f64,
    pub breakeven: bool,
    pub exit_time: Option<NaiveDateTime>,
    pub outcome: TradeOutcome,
}

/// One point of the parameter sweep
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    /// Human label for the timeframe pair, e.g. "15m/1m"
    pub timeframe: String,
    pub structural_minutes: u32,
    pub execution_minutes: u32,
    pub reward_multiple: f64,
    pub stop_offset: f64,
    /// Fraction of risk price must travel before the stop moves to entry
    pub be_trigger: f64,
    /// Last structural bar time (fractional hours) allowed to open a setup
    #[serde(default)]
    pub entry_cutoff: Option<f64>,
}

impl ParameterSet {
    pub fn label(&self) -> String {
        let mut label = format!(
            "{} | R={} | Stop={} | BE={}",
            self.timeframe, self.reward_multiple, self.stop_offset, self.be_trigger
        );
        if let Some(cutoff) = self.entry_cutoff {
            label.push_str(&format!(" | Cutoff={}", format_hour(cutoff)));
        }
        label
    }
}

/// 14.5 -> "14:30"
pub fn format_hour(hour: f64) -> String {
    let total_minutes = (hour * 60.0).round() as i64;
    format!("{:02}:{:02}", total_minutes / 60, total_minutes % 60)
}
