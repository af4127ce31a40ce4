//! Configuration management
//!
//! Loads the JSON run configuration. Every field has a default matching the
//! New York session setup the strategy was designed around, so a config file
//! only needs to name what it changes.

use anyhow::{Context, Result};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::resample::MINUTES_PER_DAY;
use crate::swing::DEFAULT_SWING_WIDTH;
use crate::ParameterSet;

/// Invalid configuration values
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("unknown time zone: {0}")]
    UnknownTimeZone(String),

    #[error("session start ({start}) must be before session end ({end}), both within 0..=24")]
    InvalidSession { start: f64, end: f64 },

    #[error("timeframe '{0}' has a zero-minute width")]
    ZeroWidth(String),

    #[error("timeframe '{label}': {width}m does not divide a 1440-minute day")]
    UnalignedWidth { label: String, width: u32 },

    #[error("entry cutoff must be within 0..=24 hours, got {0}")]
    InvalidCutoff(f64),

    #[error("reward multiple must be positive, got {0}")]
    NonPositiveReward(f64),

    #[error("stop offset must be non-negative, got {0}")]
    NegativeStopOffset(f64),

    #[error("breakeven trigger must be positive, got {0}")]
    NonPositiveTrigger(f64),

    #[error("swing lookback must be at least 1")]
    ZeroLookback,

    #[error("sweep produced no parameter sets")]
    EmptySweep,
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data: DataConfig,
    pub session: SessionConfig,
    pub engine: EngineConfig,
    pub risk: RiskConfig,
    pub sweep: SweepConfig,
    pub report: ReportConfig,
}

impl Config {
    /// Load configuration from JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).context("Failed to read config file")?;
        let config: Config =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    /// Check value ranges that serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.session.tz()?;
        self.data.source_tz()?;

        let SessionConfig { start, end, .. } = self.session;
        if !(0.0..=24.0).contains(&start) || !(0.0..=24.0).contains(&end) || start >= end {
            return Err(ConfigError::InvalidSession { start, end });
        }

        if self.engine.swing_lookback == 0 {
            return Err(ConfigError::ZeroLookback);
        }

        for tf in &self.sweep.timeframes {
            check_widths(&tf.label, &[tf.structural, tf.execution])?;
        }
        if let Some(presets) = &self.sweep.presets {
            for p in presets {
                check_widths(&p.timeframe, &[p.structural_minutes, p.execution_minutes])?;
            }
        }

        if let Some(c) = self
            .sweep
            .all_entry_cutoffs()
            .iter()
            .find(|c| !(0.0..=24.0).contains(*c))
        {
            return Err(ConfigError::InvalidCutoff(*c));
        }

        let rewards = self.sweep.all_reward_multiples();
        if let Some(r) = rewards.iter().find(|r| **r <= 0.0) {
            return Err(ConfigError::NonPositiveReward(*r));
        }
        if let Some(s) = self.sweep.all_stop_offsets().iter().find(|s| **s < 0.0) {
            return Err(ConfigError::NegativeStopOffset(*s));
        }
        if let Some(b) = self.sweep.all_be_triggers().iter().find(|b| **b <= 0.0) {
            return Err(ConfigError::NonPositiveTrigger(*b));
        }

        Ok(())
    }
}

fn check_widths(label: &str, widths: &[u32]) -> Result<(), ConfigError> {
    for &width in widths {
        if width == 0 {
            return Err(ConfigError::ZeroWidth(label.to_string()));
        }
        if MINUTES_PER_DAY % width != 0 {
            return Err(ConfigError::UnalignedWidth {
                label: label.to_string(),
                width,
            });
        }
    }
    Ok(())
}

/// Input files and output location
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub data_dir: String,
    pub file_extension: String,
    /// Value of the record-type column that marks trade ticks
    pub trade_record_type: i64,
    /// Time zone the raw timestamps are written in
    pub source_timezone: String,
    pub output: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        DataConfig {
            data_dir: ".".to_string(),
            file_extension: "csv".to_string(),
            trade_record_type: 2,
            source_timezone: "UTC".to_string(),
            output: "BEST_STRATEGIES.csv".to_string(),
        }
    }
}

impl DataConfig {
    pub fn source_tz(&self) -> Result<Tz, ConfigError> {
        parse_tz(&self.source_timezone)
    }
}

/// Trading session window, in fractional hours of the venue time zone
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub timezone: String,
    pub start: f64,
    pub end: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            timezone: "US/Eastern".to_string(),
            start: 9.5,
            end: 16.0,
        }
    }
}

impl SessionConfig {
    pub fn tz(&self) -> Result<Tz, ConfigError> {
        parse_tz(&self.timezone)
    }
}

fn parse_tz(name: &str) -> Result<Tz, ConfigError> {
    name.parse::<Tz>()
        .map_err(|_| ConfigError::UnknownTimeZone(name.to_string()))
}

/// How the entry bar and its stop anchor are located
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntrySearchMode {
    /// Stop anchored at the most recent swing seen so far
    #[default]
    RunningSwing,
    /// Entry bar must itself be the swing
    LatestSwing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub swing_lookback: usize,
    pub entry_search: EntrySearchMode,
    /// Enforce the daily loss/profit/trade-count limits
    pub daily_limits: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            swing_lookback: DEFAULT_SWING_WIDTH,
            entry_search: EntrySearchMode::RunningSwing,
            daily_limits: true,
        }
    }
}

/// Daily limits, all in R
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub daily_loss_limit: f64,
    pub daily_profit_cap: f64,
    pub max_trades_per_day: usize,
}

impl Default for RiskConfig {
    fn default() -> Self {
        RiskConfig {
            daily_loss_limit: -1.0,
            daily_profit_cap: 2.0,
            max_trades_per_day: 3,
        }
    }
}

/// A named structural/execution timeframe pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeframePair {
    pub label: String,
    pub structural: u32,
    pub execution: u32,
}

impl TimeframePair {
    pub fn new(structural: u32, execution: u32) -> Self {
        Self {
            label: format!("{}m/{}m", structural, execution),
            structural,
            execution,
        }
    }
}

/// How outcome sequences are grouped into summary rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupBy {
    /// One row per parameter set
    #[default]
    ParameterSet,
    /// Outcomes of every parameter set sharing a cutoff pooled into one row
    EntryCutoff,
}

/// Parameter grid
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub timeframes: Vec<TimeframePair>,
    pub r_multiples: Vec<f64>,
    pub stop_offsets: Vec<f64>,
    pub be_triggers: Vec<f64>,
    /// Empty means no cutoff
    pub entry_cutoffs: Vec<f64>,
    /// Explicit parameter sets; replaces the cross-product when present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presets: Option<Vec<ParameterSet>>,
    pub group_by: GroupBy,
}

impl Default for SweepConfig {
    fn default() -> Self {
        SweepConfig {
            timeframes: vec![
                TimeframePair::new(15, 1),
                TimeframePair::new(30, 1),
                TimeframePair::new(60, 1),
            ],
            r_multiples: vec![2.0],
            stop_offsets: (0..=10).map(f64::from).collect(),
            be_triggers: vec![0.5, 1.0, 1.5],
            entry_cutoffs: Vec::new(),
            presets: None,
            group_by: GroupBy::ParameterSet,
        }
    }
}

impl SweepConfig {
    fn all_reward_multiples(&self) -> Vec<f64> {
        match &self.presets {
            Some(presets) => presets.iter().map(|p| p.reward_multiple).collect(),
            None => self.r_multiples.clone(),
        }
    }

    fn all_entry_cutoffs(&self) -> Vec<f64> {
        match &self.presets {
            Some(presets) => presets.iter().filter_map(|p| p.entry_cutoff).collect(),
            None => self.entry_cutoffs.clone(),
        }
    }

    fn all_stop_offsets(&self) -> Vec<f64> {
        match &self.presets {
            Some(presets) => presets.iter().map(|p| p.stop_offset).collect(),
            None => self.stop_offsets.clone(),
        }
    }

    fn all_be_triggers(&self) -> Vec<f64> {
        match &self.presets {
            Some(presets) => presets.iter().map(|p| p.be_trigger).collect(),
            None => self.be_triggers.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Parameter sets with fewer trades are left out of the ranking
    pub min_trades: usize,
    /// Rows printed to the console
    pub top: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        ReportConfig {
            min_trades: 250,
            top: 20,
        }
    }
}
