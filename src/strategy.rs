//! Stakeholder strategies
//!
//! A strategy is an immutable value; replacing an agent's strategy is the only
//! unit of state mutation in the engine.

use serde::{Deserialize, Serialize};

use crate::population::AgentId;

/// A pool is identified by the agent operating it (one pool per operator).
pub type PoolId = AgentId;

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum Strategy {
    #[default]
    Abstain,
    Delegate(PoolId),
    OperatePool { pledge: f64, margin: f64, cost: f64 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StrategyKind {
    Abstain,
    Delegate,
    OperatePool,
}

impl StrategyKind {
    pub fn all() -> Vec<Self> {
        vec![Self::Abstain, Self::Delegate, Self::OperatePool]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Abstain => "abstain",
            Self::Delegate => "delegate",
            Self::OperatePool => "operate",
        }
    }
}

impl Strategy {
    pub fn kind(&self) -> StrategyKind {
        match self {
            Self::Abstain => StrategyKind::Abstain,
            Self::Delegate(_) => StrategyKind::Delegate,
            Self::OperatePool { .. } => StrategyKind::OperatePool,
        }
    }

    pub fn delegation_target(&self) -> Option<PoolId> {
        match self {
            Self::Delegate(pool) => Some(*pool),
            _ => None,
        }
    }

    pub fn is_operating(&self) -> bool {
        matches!(self, Self::OperatePool { .. })
    }

    pub fn pledge(&self) -> f64 {
        match self {
            Self::OperatePool { pledge, .. } => *pledge,
            _ => 0.0,
        }
    }

    /// Checks the per-strategy invariants against the owner's stake.
    ///
    /// An operator must pledge a positive amount no larger than its stake and
    /// no smaller than `min_pledge`, with a margin in `[0, 1]`.
    pub fn is_valid_for(&self, stake: f64, min_pledge: f64) -> bool {
        match *self {
            Self::Abstain | Self::Delegate(_) => true,
            Self::OperatePool {
                pledge,
                margin,
                cost,
            } => {
                pledge.is_finite()
                    && pledge > 0.0
                    && pledge <= stake
                    && pledge >= min_pledge
                    && (0.0..=1.0).contains(&margin)
                    && cost.is_finite()
                    && cost >= 0.0
            }
        }
    }
}
