//! Exogenous per-epoch inputs
//!
//! The engine pulls one `EpochInputs` per epoch from an `InputFeed`. Fitting
//! those inputs to historical data happens elsewhere; `ScheduledFeed` simply
//! replays a prepared schedule.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::FeedError;
use crate::population::{ProfileMix, StakeDistribution};
use crate::rss::RewardFunction;

/// Configuration values replaced from this epoch on. `None` keeps the
/// previous epoch's value.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParameterOverrides {
    pub n: Option<usize>,
    pub k: Option<usize>,
    pub a0: Option<f64>,
    pub max_pools: Option<usize>,
    pub min_pledge: Option<f64>,
    pub absolute_utility_threshold: Option<f64>,
    pub relative_utility_threshold: Option<f64>,
    pub cost_min: Option<f64>,
    pub cost_max: Option<f64>,
    pub extra_pool_cost_fraction: Option<f64>,
    pub max_iterations: Option<usize>,
    pub seed: Option<u64>,
    pub total_stake: Option<f64>,
    pub inactive_stake_fraction: Option<f64>,
    pub abstain_utility: Option<f64>,
    pub reward_function: Option<RewardFunction>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EpochInputs {
    pub overrides: ParameterOverrides,
    pub stake_distribution: Option<StakeDistribution>,
    pub agent_profile_mix: Option<ProfileMix>,
    pub agent_count_delta: usize, // agents joining this epoch
}

impl EpochInputs {
    pub fn with_overrides(overrides: ParameterOverrides) -> Self {
        Self {
            overrides,
            ..Default::default()
        }
    }

    pub fn with_growth(agent_count_delta: usize) -> Self {
        Self {
            agent_count_delta,
            ..Default::default()
        }
    }
}

pub trait InputFeed {
    /// Inputs for `epoch`. Failing here aborts the run; the engine never
    /// falls back to an earlier epoch's inputs.
    fn inputs_for(&mut self, epoch: u64) -> Result<EpochInputs, FeedError>;
}

/// Epoch-indexed schedule. Epochs listed explicitly get their entry; any
/// other epoch up to `last_epoch` gets no changes. Past `last_epoch` the feed
/// reports the epoch as unavailable.
#[derive(Clone, Debug, Default)]
pub struct ScheduledFeed {
    entries: BTreeMap<u64, EpochInputs>,
    last_epoch: Option<u64>,
}

impl ScheduledFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed that supplies empty inputs for every epoch.
    pub fn unbounded() -> Self {
        Self {
            entries: BTreeMap::new(),
            last_epoch: Some(u64::MAX),
        }
    }

    pub fn at(mut self, epoch: u64, inputs: EpochInputs) -> Self {
        self.entries.insert(epoch, inputs);
        self.last_epoch = Some(self.last_epoch.map_or(epoch, |last| last.max(epoch)));
        self
    }

    pub fn through(mut self, epoch: u64) -> Self {
        self.last_epoch = Some(self.last_epoch.map_or(epoch, |last| last.max(epoch)));
        self
    }

    pub fn last_epoch(&self) -> Option<u64> {
        self.last_epoch
    }
}

impl InputFeed for ScheduledFeed {
    fn inputs_for(&mut self, epoch: u64) -> Result<EpochInputs, FeedError> {
        match self.last_epoch {
            Some(last) if epoch <= last => {
                Ok(self.entries.get(&epoch).cloned().unwrap_or_default())
            }
            _ => Err(FeedError::Unavailable { epoch }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheduled_feed_fills_gaps() {
        let mut feed = ScheduledFeed::new()
            .at(0, EpochInputs::with_growth(10))
            .at(3, EpochInputs::with_growth(5));

        assert_eq!(feed.inputs_for(0).unwrap().agent_count_delta, 10);
        assert_eq!(feed.inputs_for(1).unwrap(), EpochInputs::default());
        assert_eq!(feed.inputs_for(3).unwrap().agent_count_delta, 5);
        assert_eq!(
            feed.inputs_for(4),
            Err(FeedError::Unavailable { epoch: 4 })
        );
    }

    #[test]
    fn test_empty_feed_is_unavailable() {
        let mut feed = ScheduledFeed::new();
        assert_eq!(
            feed.inputs_for(0),
            Err(FeedError::Unavailable { epoch: 0 })
        );
        let mut feed = ScheduledFeed::new().through(2);
        assert!(feed.inputs_for(2).is_ok());
    }

    #[test]
    fn test_inputs_deserialize_from_partial_json() {
        let inputs: EpochInputs =
            serde_json::from_str(r#"{"overrides": {"k": 500}, "agent_count_delta": 3}"#).unwrap();
        assert_eq!(inputs.overrides.k, Some(500));
        assert_eq!(inputs.overrides.a0, None);
        assert_eq!(inputs.agent_count_delta, 3);
    }
}
