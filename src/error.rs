//! Error types for the simulation engine
//!
//! Configuration and data-feed failures abort a run. Numerical anomalies and
//! convergence failures are soft conditions recorded in the epoch snapshot,
//! so they are not represented here.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SimulationError>;

/// Unified error type for simulation runs
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Data feed error: {0}")]
    DataFeed(#[from] FeedError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A parameter outside its documented domain
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{field} must be positive")]
    NotPositive { field: &'static str },

    #[error("{field} must be a non-negative finite number, got {value}")]
    Negative { field: &'static str, value: f64 },

    #[error("{field} must be finite, got {value}")]
    NotFinite { field: &'static str, value: f64 },

    #[error("{field} must lie in {range}, got {value}")]
    OutOfRange {
        field: &'static str,
        range: &'static str,
        value: f64,
    },

    #[error("cost_min ({min}) exceeds cost_max ({max})")]
    CostRange { min: f64, max: f64 },

    #[error("max_pools ({max_pools}) must be at least k ({k})")]
    MaxPoolsBelowK { max_pools: usize, k: usize },

    #[error("agent profile mix must be non-negative and sum to 1, got {sum}")]
    ProfileMix { sum: f64 },

    #[error("invalid stake distribution: {0}")]
    StakeDistribution(String),

    #[error("{field} must not be empty")]
    EmptyGrid { field: &'static str },
}

/// The external input feed could not supply usable inputs for an epoch
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeedError {
    #[error("no inputs available for epoch {epoch}")]
    Unavailable { epoch: u64 },

    #[error("inputs for epoch {epoch} are invalid: {source}")]
    InvalidParameters {
        epoch: u64,
        #[source]
        source: ConfigError,
    },

    #[error("epoch {epoch} requests {requested} agents but the population already has {current}")]
    PopulationShrink {
        epoch: u64,
        current: usize,
        requested: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_converts() {
        let err: SimulationError = ConfigError::CostRange { min: 2.0, max: 1.0 }.into();
        assert!(matches!(err, SimulationError::Configuration(_)));
        assert_eq!(
            err.to_string(),
            "Configuration error: cost_min (2) exceeds cost_max (1)"
        );
    }

    #[test]
    fn test_feed_error_keeps_source() {
        let err = FeedError::InvalidParameters {
            epoch: 3,
            source: ConfigError::NotPositive { field: "k" },
        };
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("k must be positive"));
    }
}
