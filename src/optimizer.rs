//! Parameter sweep
//!
//! Runs every parameter set over the same read-only bar cache. Sets are
//! independent: each task builds its own engine (and with it fresh daily
//! ledgers), so results are merged only when collected.

use indicatif::ProgressBar;
use rayon::prelude::*;

use crate::backtest::{BacktestResult, Backtester};
use crate::config::Config;
use crate::resample::BarCache;
use crate::ParameterSet;

/// Sweep orchestrator bound to one immutable configuration
pub struct Optimizer {
    config: Config,
}

impl Optimizer {
    pub fn new(config: Config) -> Self {
        Optimizer { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run all parameter sets in parallel. Results keep the order of `sets`.
    pub fn optimize(&self, cache: &BarCache, sets: &[ParameterSet]) -> Vec<BacktestResult> {
        tracing::info!("Testing {} parameter combinations", sets.len());

        sets.par_iter()
            .map(|params| self.run_one(cache, params))
            .collect()
    }

    /// Run in parallel, ticking `progress_bar` once per finished set
    pub fn optimize_with_progress(
        &self,
        cache: &BarCache,
        sets: &[ParameterSet],
        progress_bar: &ProgressBar,
    ) -> Vec<BacktestResult> {
        self.optimize_with(cache, sets, |_| progress_bar.inc(1))
    }

    /// Run in parallel, calling `on_result` from the worker as each set finishes
    pub fn optimize_with<F>(
        &self,
        cache: &BarCache,
        sets: &[ParameterSet],
        on_result: F,
    ) -> Vec<BacktestResult>
    where
        F: Fn(&BacktestResult) + Sync,
    {
        tracing::info!(
            "Testing {} parameter combinations with progress",
            sets.len()
        );

        sets.par_iter()
            .map(|params| {
                let result = self.run_one(cache, params);
                on_result(&result);
                result
            })
            .collect()
    }

    /// Run sequentially (for debugging)
    pub fn optimize_sequential(
        &self,
        cache: &BarCache,
        sets: &[ParameterSet],
    ) -> Vec<BacktestResult> {
        self.optimize_sequential_with(cache, sets, |_| {})
    }

    pub fn optimize_sequential_with<F>(
        &self,
        cache: &BarCache,
        sets: &[ParameterSet],
        on_result: F,
    ) -> Vec<BacktestResult>
    where
        F: Fn(&BacktestResult),
    {
        tracing::info!(
            "Testing {} parameter combinations sequentially",
            sets.len()
        );

        sets.iter()
            .map(|params| {
                let result = self.run_one(cache, params);
                on_result(&result);
                result
            })
            .collect()
    }

    fn run_one(&self, cache: &BarCache, params: &ParameterSet) -> BacktestResult {
        let mut backtester = Backtester::from_config(&self.config);
        let result = backtester.run_cached(params, cache);
        tracing::debug!(
            "{}: {} trades",
            params.label(),
            result.trades.len()
        );
        result
    }
}
