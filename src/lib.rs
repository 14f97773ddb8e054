//! Stake Pool Reward Sharing Simulation Library
//!
//! This library provides an agent-based model of a proof-of-stake
//! stake-pool ecosystem. Every epoch the stakeholders play asynchronous
//! best-response rounds under a configurable Reward Sharing Scheme until
//! nobody wants to move, and the resulting pool landscape is reported.
//!
//! ## Modules
//!
//! - `population`: Stakeholders, behavioral profiles and stake distributions
//! - `strategy`: Abstain / delegate / operate strategies
//! - `pool`: Pools derived from the current strategies
//! - `rss`: Reward Sharing Scheme (saturation-capped pool rewards)
//! - `utility`: Best-response utility of a candidate strategy
//! - `explorer`: Bounded candidate strategies per behavioral profile
//! - `ordering`: Seeded per-round agent order
//! - `state`: Global state shared by one epoch
//! - `engine`: Epoch loop and equilibrium search
//! - `feed`: Exogenous per-epoch inputs
//! - `report`: Epoch snapshots and reporters
//! - `config`: Run configuration and validation
//! - `error`: Error types
//!
//! ## Usage
//!
//! ```bash
//! # Multi-epoch run with population growth and a k change
//! cargo run --bin epochs --release
//!
//! # Pool reward as a function of stake and pledge
//! cargo run --bin reward_curve --release
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod explorer;
pub mod feed;
pub mod ordering;
pub mod pool;
pub mod population;
pub mod report;
pub mod rss;
pub mod state;
pub mod strategy;
pub mod utility;

pub use config::{ExplorerSettings, SimulationConfig};
pub use engine::{CancellationFlag, EnginePhase, EquilibriumEngine, RunSummary, Termination};
pub use error::{ConfigError, FeedError, Result, SimulationError};
pub use feed::{EpochInputs, InputFeed, ParameterOverrides, ScheduledFeed};
pub use report::{EpochSnapshot, EquilibriumStatus, JsonLinesReporter, Reporter, SnapshotLog};
