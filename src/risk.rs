//! Daily risk governance
//!
//! Keeps one ledger per trading day (cumulative R and trade count) and stops
//! new setups once the day's loss limit, profit cap or trade cap is reached.
//! Ledgers are created lazily on the first setup of the day and are never
//! shared between parameter sets.
//!
//! All amounts are in R, so there is no currency or position sizing here.

use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::debug;

use crate::config::{Config, RiskConfig};

/// Per-day running totals
#[derive(Debug, Clone, PartialEq)]
pub struct DailyLedger {
    pub day: NaiveDate,
    pub cumulative_r: f64,
    pub trades: usize,
}

impl DailyLedger {
    pub fn new(day: NaiveDate) -> Self {
        Self {
            day,
            cumulative_r: 0.0,
            trades: 0,
        }
    }
}

/// Gatekeeper consulted before every setup and told about every trade
pub trait RiskGovernor: Send {
    /// Whether a new setup may be evaluated on `day`
    fn allows(&mut self, day: NaiveDate) -> bool;

    /// Book a finished trade worth `r` on `day`
    fn record(&mut self, day: NaiveDate, r: f64);

    /// Whether trades must be managed within their own trading day
    fn day_scoped(&self) -> bool;

    /// Forget all ledgers
    fn reset(&mut self);
}

/// No daily limits; trades may run across days
#[derive(Debug, Default, Clone, Copy)]
pub struct Unlimited;

impl RiskGovernor for Unlimited {
    fn allows(&mut self, _day: NaiveDate) -> bool {
        true
    }

    fn record(&mut self, _day: NaiveDate, _r: f64) {}

    fn day_scoped(&self) -> bool {
        false
    }

    fn reset(&mut self) {}
}

/// Limits for [`DailyRiskGovernor`] using builder pattern
#[derive(Debug, Clone, PartialEq)]
pub struct DailyLimits {
    /// Stop for the day once cumulative R is at or below this
    pub loss_limit: f64,
    /// Stop for the day once cumulative R is at or above this
    pub profit_cap: f64,
    pub max_trades: usize,
}

impl Default for DailyLimits {
    fn default() -> Self {
        Self {
            loss_limit: -1.0,
            profit_cap: 2.0,
            max_trades: 3,
        }
    }
}

impl DailyLimits {
    pub fn from_config(config: &RiskConfig) -> Self {
        Self {
            loss_limit: config.daily_loss_limit,
            profit_cap: config.daily_profit_cap,
            max_trades: config.max_trades_per_day,
        }
    }

    pub fn with_loss_limit(mut self, limit: f64) -> Self {
        self.loss_limit = limit;
        self
    }

    pub fn with_profit_cap(mut self, cap: f64) -> Self {
        self.profit_cap = cap;
        self
    }

    pub fn with_max_trades(mut self, max: usize) -> Self {
        self.max_trades = max;
        self
    }

    pub fn build(self) -> DailyRiskGovernor {
        DailyRiskGovernor::new(self)
    }

    /// Whether `ledger` has hit any limit
    pub fn exhausted(&self, ledger: &DailyLedger) -> bool {
        ledger.cumulative_r <= self.loss_limit
            || ledger.cumulative_r >= self.profit_cap
            || ledger.trades >= self.max_trades
    }
}

/// Daily loss/profit/trade-count governor
#[derive(Debug, Clone)]
pub struct DailyRiskGovernor {
    limits: DailyLimits,
    ledgers: BTreeMap<NaiveDate, DailyLedger>,
}

impl DailyRiskGovernor {
    pub fn new(limits: DailyLimits) -> Self {
        Self {
            limits,
            ledgers: BTreeMap::new(),
        }
    }

    pub fn limits(&self) -> &DailyLimits {
        &self.limits
    }

    pub fn ledger(&self, day: NaiveDate) -> Option<&DailyLedger> {
        self.ledgers.get(&day)
    }

    pub fn ledgers(&self) -> impl Iterator<Item = &DailyLedger> {
        self.ledgers.values()
    }
}

impl RiskGovernor for DailyRiskGovernor {
    fn allows(&mut self, day: NaiveDate) -> bool {
        let ledger = self
            .ledgers
            .entry(day)
            .or_insert_with(|| DailyLedger::new(day));

        if self.limits.exhausted(ledger) {
            debug!(
                "{}: daily limits reached ({:.2}R over {} trades)",
                day, ledger.cumulative_r, ledger.trades
            );
            return false;
        }
        true
    }

    fn record(&mut self, day: NaiveDate, r: f64) {
        let ledger = self
            .ledgers
            .entry(day)
            .or_insert_with(|| DailyLedger::new(day));
        ledger.cumulative_r += r;
        ledger.trades += 1;
    }

    fn day_scoped(&self) -> bool {
        true
    }

    fn reset(&mut self) {
        self.ledgers.clear();
    }
}

/// Governor selected by the config
pub fn governor_for(config: &Config) -> Box<dyn RiskGovernor> {
    if config.engine.daily_limits {
        let governor = DailyLimits::from_config(&config.risk).build();
        debug!("Daily limits: {:?}", governor.limits());
        Box::new(governor)
    } else {
        Box::new(Unlimited)
    }
}
