//! Simulation configuration
//!
//! One `SimulationConfig` describes a run. It is validated once before the
//! first epoch, and again every time the input feed overrides part of it.
//! Loading it from a file or command line is left to the caller; the serde
//! derives accept partial documents and fill the rest from `Default`.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::feed::ParameterOverrides;
use crate::population::{ProfileMix, Recruitment, StakeDistribution};
use crate::rss::{RewardFunction, RewardSharingScheme};

const MARGIN_STEP: f64 = 0.05;
const MARGIN_STEPS: usize = 6; // 0.00 ..= 0.30

/// Bounds on the candidate strategies each agent considers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorerSettings {
    pub top_pools: usize,           // delegation targets per ranking
    pub margin_grid: Vec<f64>,      // margins tried when operating
    pub pledge_fractions: Vec<f64>, // fractions of own stake tried as pledge
}

impl Default for ExplorerSettings {
    fn default() -> Self {
        Self {
            top_pools: 10,
            margin_grid: (0..=MARGIN_STEPS).map(|i| i as f64 * MARGIN_STEP).collect(),
            pledge_fractions: vec![1.0, 0.5],
        }
    }
}

impl ExplorerSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.top_pools == 0 {
            return Err(ConfigError::NotPositive {
                field: "explorer.top_pools",
            });
        }
        if self.margin_grid.is_empty() {
            return Err(ConfigError::EmptyGrid {
                field: "explorer.margin_grid",
            });
        }
        for &margin in &self.margin_grid {
            if !(0.0..=1.0).contains(&margin) {
                return Err(ConfigError::OutOfRange {
                    field: "explorer.margin_grid",
                    range: "[0, 1]",
                    value: margin,
                });
            }
        }
        if self.pledge_fractions.is_empty() {
            return Err(ConfigError::EmptyGrid {
                field: "explorer.pledge_fractions",
            });
        }
        for &fraction in &self.pledge_fractions {
            if !(fraction > 0.0 && fraction <= 1.0) {
                return Err(ConfigError::OutOfRange {
                    field: "explorer.pledge_fractions",
                    range: "(0, 1]",
                    value: fraction,
                });
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub n: usize,
    pub k: usize,
    pub a0: f64,
    pub max_pools: usize,
    pub min_pledge: f64,
    pub absolute_utility_threshold: f64,
    pub relative_utility_threshold: f64,
    pub cost_min: f64,
    pub cost_max: f64,
    pub extra_pool_cost_fraction: f64,
    pub max_iterations: usize,
    pub seed: u64,
    pub total_stake: f64,
    pub inactive_stake_fraction: f64, // share of total stake that never participates
    pub abstain_utility: f64,
    pub reward_function: RewardFunction,
    pub stake_distribution: StakeDistribution,
    pub agent_profile_mix: ProfileMix,
    pub explorer: ExplorerSettings,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            n: 1000,
            k: 100,
            a0: 0.3,
            max_pools: 1000,
            min_pledge: 0.0,
            absolute_utility_threshold: 1e-9,
            relative_utility_threshold: 0.0,
            cost_min: 1e-5,
            cost_max: 1e-4,
            extra_pool_cost_fraction: 0.4,
            max_iterations: 1000,
            seed: 42,
            total_stake: 1.0,
            inactive_stake_fraction: 0.0,
            abstain_utility: 0.0,
            reward_function: RewardFunction::Cardano,
            stake_distribution: StakeDistribution::default(),
            agent_profile_mix: ProfileMix::default(),
            explorer: ExplorerSettings::default(),
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive_count("n", self.n)?;
        positive_count("k", self.k)?;
        positive_count("max_pools", self.max_pools)?;
        positive_count("max_iterations", self.max_iterations)?;
        if self.max_pools < self.k {
            return Err(ConfigError::MaxPoolsBelowK {
                max_pools: self.max_pools,
                k: self.k,
            });
        }

        non_negative("a0", self.a0)?;
        non_negative("min_pledge", self.min_pledge)?;
        non_negative("absolute_utility_threshold", self.absolute_utility_threshold)?;
        non_negative("relative_utility_threshold", self.relative_utility_threshold)?;
        non_negative("cost_min", self.cost_min)?;
        non_negative("cost_max", self.cost_max)?;
        non_negative("extra_pool_cost_fraction", self.extra_pool_cost_fraction)?;
        if self.cost_min > self.cost_max {
            return Err(ConfigError::CostRange {
                min: self.cost_min,
                max: self.cost_max,
            });
        }

        if !self.total_stake.is_finite() {
            return Err(ConfigError::NotFinite {
                field: "total_stake",
                value: self.total_stake,
            });
        }
        if self.total_stake <= 0.0 {
            return Err(ConfigError::NotPositive {
                field: "total_stake",
            });
        }
        if !(0.0..1.0).contains(&self.inactive_stake_fraction) {
            return Err(ConfigError::OutOfRange {
                field: "inactive_stake_fraction",
                range: "[0, 1)",
                value: self.inactive_stake_fraction,
            });
        }
        if !self.abstain_utility.is_finite() {
            return Err(ConfigError::NotFinite {
                field: "abstain_utility",
                value: self.abstain_utility,
            });
        }

        self.stake_distribution.validate()?;
        self.agent_profile_mix.validate()?;
        self.explorer.validate()
    }

    /// Copy with the given overrides applied. The result is not validated.
    pub fn with_overrides(&self, overrides: &ParameterOverrides) -> Self {
        let mut next = self.clone();
        let o = overrides;
        if let Some(v) = o.n {
            next.n = v;
        }
        if let Some(v) = o.k {
            next.k = v;
        }
        if let Some(v) = o.a0 {
            next.a0 = v;
        }
        if let Some(v) = o.max_pools {
            next.max_pools = v;
        }
        if let Some(v) = o.min_pledge {
            next.min_pledge = v;
        }
        if let Some(v) = o.absolute_utility_threshold {
            next.absolute_utility_threshold = v;
        }
        if let Some(v) = o.relative_utility_threshold {
            next.relative_utility_threshold = v;
        }
        if let Some(v) = o.cost_min {
            next.cost_min = v;
        }
        if let Some(v) = o.cost_max {
            next.cost_max = v;
        }
        if let Some(v) = o.extra_pool_cost_fraction {
            next.extra_pool_cost_fraction = v;
        }
        if let Some(v) = o.max_iterations {
            next.max_iterations = v;
        }
        if let Some(v) = o.seed {
            next.seed = v;
        }
        if let Some(v) = o.total_stake {
            next.total_stake = v;
        }
        if let Some(v) = o.inactive_stake_fraction {
            next.inactive_stake_fraction = v;
        }
        if let Some(v) = o.abstain_utility {
            next.abstain_utility = v;
        }
        if let Some(v) = o.reward_function {
            next.reward_function = v;
        }
        next
    }

    pub fn scheme(&self) -> RewardSharingScheme {
        RewardSharingScheme {
            k: self.k,
            a0: self.a0,
            total_stake: self.total_stake,
            extra_pool_cost_fraction: self.extra_pool_cost_fraction,
            function: self.reward_function,
        }
    }

    /// Stake held by participating agents after normalisation.
    pub fn active_stake(&self) -> f64 {
        self.total_stake * (1.0 - self.inactive_stake_fraction)
    }

    pub fn recruitment(&self) -> Recruitment<'_> {
        Recruitment {
            stakes: &self.stake_distribution,
            profiles: &self.agent_profile_mix,
            cost_min: self.cost_min,
            cost_max: self.cost_max,
        }
    }
}

fn positive_count(field: &'static str, value: usize) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::NotPositive { field });
    }
    Ok(())
}

fn non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() {
        return Err(ConfigError::NotFinite { field, value });
    }
    if value < 0.0 {
        return Err(ConfigError::Negative { field, value });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = SimulationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.explorer.margin_grid.len(), 7);
        assert!((config.explorer.margin_grid[6] - 0.30).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_out_of_domain_values() {
        let cases: Vec<(SimulationConfig, ConfigError)> = vec![
            (
                SimulationConfig {
                    k: 0,
                    ..Default::default()
                },
                ConfigError::NotPositive { field: "k" },
            ),
            (
                SimulationConfig {
                    absolute_utility_threshold: -1.0,
                    ..Default::default()
                },
                ConfigError::Negative {
                    field: "absolute_utility_threshold",
                    value: -1.0,
                },
            ),
            (
                SimulationConfig {
                    cost_min: 2e-4,
                    ..Default::default()
                },
                ConfigError::CostRange {
                    min: 2e-4,
                    max: 1e-4,
                },
            ),
            (
                SimulationConfig {
                    max_pools: 50,
                    ..Default::default()
                },
                ConfigError::MaxPoolsBelowK {
                    max_pools: 50,
                    k: 100,
                },
            ),
            (
                SimulationConfig {
                    inactive_stake_fraction: 1.0,
                    ..Default::default()
                },
                ConfigError::OutOfRange {
                    field: "inactive_stake_fraction",
                    range: "[0, 1)",
                    value: 1.0,
                },
            ),
        ];

        for (config, expected) in cases {
            assert_eq!(config.validate(), Err(expected));
        }
    }

    #[test]
    fn test_rejects_bad_explorer_grids() {
        let mut config = SimulationConfig::default();
        config.explorer.margin_grid.clear();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::EmptyGrid { .. })
        ));

        let mut config = SimulationConfig::default();
        config.explorer.pledge_fractions = vec![0.0];
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_overrides_replace_only_given_fields() {
        let base = SimulationConfig::default();
        let overrides = ParameterOverrides {
            k: Some(500),
            a0: Some(0.1),
            ..Default::default()
        };
        let next = base.with_overrides(&overrides);

        assert_eq!(next.k, 500);
        assert_eq!(next.a0, 0.1);
        assert_eq!(next.n, base.n);
        assert_eq!(next.seed, base.seed);
    }

    #[test]
    fn test_partial_document_fills_defaults() {
        let config: SimulationConfig = serde_json::from_str(r#"{"k": 150, "seed": 7}"#).unwrap();
        assert_eq!(config.k, 150);
        assert_eq!(config.seed, 7);
        assert_eq!(config.n, 1000);
        assert_eq!(config.explorer, ExplorerSettings::default());
    }
}
