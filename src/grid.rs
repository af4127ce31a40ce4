//! Parameter set generation
//!
//! Expands the sweep section of the config into the list of parameter sets
//! to simulate: either the explicit presets, or the cross-product
//! cutoff × timeframe pair × R × stop offset × breakeven trigger.

use itertools::iproduct;

use crate::config::{ConfigError, SweepConfig};
use crate::ParameterSet;

/// All parameter sets described by `sweep`, in deterministic order
pub fn parameter_sets(sweep: &SweepConfig) -> Vec<ParameterSet> {
    if let Some(presets) = &sweep.presets {
        return presets.clone();
    }

    let cutoffs: Vec<Option<f64>> = if sweep.entry_cutoffs.is_empty() {
        vec![None]
    } else {
        sweep.entry_cutoffs.iter().copied().map(Some).collect()
    };

    iproduct!(
        &cutoffs,
        &sweep.timeframes,
        &sweep.r_multiples,
        &sweep.stop_offsets,
        &sweep.be_triggers
    )
    .map(|(cutoff, tf, r, stop, be)| ParameterSet {
        timeframe: tf.label.clone(),
        structural_minutes: tf.structural,
        execution_minutes: tf.execution,
        reward_multiple: *r,
        stop_offset: *stop,
        be_trigger: *be,
        entry_cutoff: *cutoff,
    })
    .collect()
}

/// Same as [`parameter_sets`] but an empty sweep is an error
pub fn checked_parameter_sets(sweep: &SweepConfig) -> Result<Vec<ParameterSet>, ConfigError> {
    let sets = parameter_sets(sweep);
    if sets.is_empty() {
        return Err(ConfigError::EmptySweep);
    }
    Ok(sets)
}

pub fn total_combinations(sweep: &SweepConfig) -> usize {
    match &sweep.presets {
        Some(presets) => presets.len(),
        None => {
            sweep.entry_cutoffs.len().max(1)
                * sweep.timeframes.len()
                * sweep.r_multiples.len()
                * sweep.stop_offsets.len()
                * sweep.be_triggers.len()
        }
    }
}

/// Every bar width the given sets need, sorted and deduplicated
pub fn required_widths(sets: &[ParameterSet]) -> Vec<u32> {
    let mut widths: Vec<u32> = sets
        .iter()
        .flat_map(|p| [p.structural_minutes, p.execution_minutes])
        .collect();
    widths.sort_unstable();
    widths.dedup();
    widths
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimeframePair;

    #[test]
    fn test_default_grid_size() {
        let sweep = SweepConfig::default();
        let sets = parameter_sets(&sweep);
        assert_eq!(sets.len(), 3 * 11 * 3);
        assert_eq!(sets.len(), total_combinations(&sweep));
        assert!(sets.iter().all(|p| p.entry_cutoff.is_none()));
    }

    #[test]
    fn test_cutoffs_are_outermost() {
        let sweep = SweepConfig {
            timeframes: vec![TimeframePair::new(15, 1)],
            r_multiples: vec![2.0],
            stop_offsets: vec![0.0, 1.0],
            be_triggers: vec![1.0],
            entry_cutoffs: vec![14.0, 15.5],
            ..Default::default()
        };
        let sets = parameter_sets(&sweep);
        assert_eq!(sets.len(), 4);
        assert_eq!(sets[0].entry_cutoff, Some(14.0));
        assert_eq!(sets[1].entry_cutoff, Some(14.0));
        assert_eq!(sets[1].stop_offset, 1.0);
        assert_eq!(sets[2].entry_cutoff, Some(15.5));
        assert_eq!(total_combinations(&sweep), 4);
    }

    #[test]
    fn test_presets_replace_grid() {
        let preset = ParameterSet {
            timeframe: "30m".to_string(),
            structural_minutes: 30,
            execution_minutes: 30,
            reward_multiple: 2.0,
            stop_offset: 2.0,
            be_trigger: 1.0,
            entry_cutoff: None,
        };
        let sweep = SweepConfig {
            presets: Some(vec![preset.clone()]),
            ..Default::default()
        };
        assert_eq!(parameter_sets(&sweep), vec![preset]);
        assert_eq!(total_combinations(&sweep), 1);
    }

    #[test]
    fn test_empty_sweep_is_error() {
        let sweep = SweepConfig {
            r_multiples: vec![],
            ..Default::default()
        };
        assert_eq!(checked_parameter_sets(&sweep), Err(ConfigError::EmptySweep));
    }

    #[test]
    fn test_required_widths() {
        let sets = parameter_sets(&SweepConfig::default());
        assert_eq!(required_widths(&sets), vec![1, 15, 30, 60]);
    }
}
