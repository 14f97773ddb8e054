//! Reward Sharing Scheme
//!
//! Pool rewards are expressed as fractions of the epoch reward pot. Stake and
//! pledge are taken relative to the total stake and capped at the saturation
//! point z0 = 1/k, so a pool gains nothing by growing past 1/k of the stake.
//!
//! ## Reward Curves
//! - Cardano: pledge benefit grows with how close the pool is to saturation
//! - Flat pledge benefit: pledge adds a fixed a0-weighted bonus
//!
//! ## Sharing
//! After the pool cost is paid the operator takes its margin, and the rest is
//! split pro-rata between pledge and delegations. A pool that cannot cover its
//! cost distributes nothing; its operator absorbs the loss.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RewardFunction {
    #[default]
    Cardano,
    FlatPledgeBenefit,
}

impl RewardFunction {
    pub fn all() -> Vec<Self> {
        vec![Self::Cardano, Self::FlatPledgeBenefit]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Cardano => "Cardano",
            Self::FlatPledgeBenefit => "Flat pledge benefit",
        }
    }
}

/// Arithmetic that had to be resolved to zero instead of failing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NumericalAnomaly {
    ZeroTotalStake,
    ZeroPoolStake,
    NonFiniteUtility,
}

/// Economic terms of one (possibly hypothetical) pool.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PoolTerms {
    pub stake: f64, // pledge plus delegations
    pub pledge: f64,
    pub margin: f64,
    pub cost: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PoolReward {
    pub gross: f64,
    pub cost: f64,
    pub profit: f64, // negative when the pool cannot cover its cost
}

impl PoolReward {
    pub fn distributable(&self) -> f64 {
        self.profit.max(0.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RewardSharingScheme {
    pub k: usize,
    pub a0: f64,
    pub total_stake: f64,
    pub extra_pool_cost_fraction: f64,
    pub function: RewardFunction,
}

impl RewardSharingScheme {
    /// Relative saturation point.
    pub fn z0(&self) -> f64 {
        1.0 / self.k as f64
    }

    pub fn saturation_threshold(&self) -> f64 {
        self.total_stake * self.z0()
    }

    pub fn is_saturated(&self, pool_stake: f64) -> bool {
        pool_stake >= self.saturation_threshold()
    }

    pub fn gross_reward(&self, pool_stake: f64, pledge: f64) -> Result<f64, NumericalAnomaly> {
        if !(self.total_stake.is_finite() && self.total_stake > 0.0) {
            return Err(NumericalAnomaly::ZeroTotalStake);
        }
        let z0 = self.z0();
        let sigma = (pool_stake / self.total_stake).clamp(0.0, z0);
        let lambda = (pledge / self.total_stake).clamp(0.0, z0);

        let reward = match self.function {
            RewardFunction::Cardano => {
                let pledge_factor = (sigma - lambda * (z0 - sigma) / z0) / z0;
                (sigma + lambda * self.a0 * pledge_factor) / (1.0 + self.a0)
            }
            RewardFunction::FlatPledgeBenefit => (sigma + self.a0 * lambda) / (1.0 + self.a0),
        };
        finite(reward)
    }

    /// Pool cost once the network runs more than k pools.
    pub fn effective_cost(&self, cost: f64, pool_count: usize) -> f64 {
        let excess = pool_count.saturating_sub(self.k) as f64;
        cost * (1.0 + self.extra_pool_cost_fraction * excess / self.k as f64)
    }

    pub fn pool_reward(
        &self,
        terms: &PoolTerms,
        pool_count: usize,
    ) -> Result<PoolReward, NumericalAnomaly> {
        let gross = self.gross_reward(terms.stake, terms.pledge)?;
        let cost = self.effective_cost(terms.cost, pool_count);
        Ok(PoolReward {
            gross,
            cost,
            profit: finite(gross - cost)?,
        })
    }

    /// Operator's take: margin plus its pledge's share of the remainder, or the
    /// full loss when the pool does not cover its cost.
    pub fn operator_utility(
        &self,
        terms: &PoolTerms,
        pool_count: usize,
    ) -> Result<f64, NumericalAnomaly> {
        let reward = self.pool_reward(terms, pool_count)?;
        if reward.profit <= 0.0 {
            return Ok(reward.profit);
        }
        if terms.stake <= 0.0 {
            return Err(NumericalAnomaly::ZeroPoolStake);
        }
        let pledge_share = (1.0 - terms.margin) * terms.pledge / terms.stake;
        finite(reward.profit * (terms.margin + pledge_share))
    }

    /// Delegator's pro-rata share of what remains after the operator's margin.
    pub fn delegator_utility(
        &self,
        terms: &PoolTerms,
        delegated: f64,
        pool_count: usize,
    ) -> Result<f64, NumericalAnomaly> {
        let reward = self.pool_reward(terms, pool_count)?;
        if reward.profit <= 0.0 {
            return Ok(0.0);
        }
        if terms.stake <= 0.0 {
            return Err(NumericalAnomaly::ZeroPoolStake);
        }
        finite((1.0 - terms.margin) * reward.distributable() * delegated / terms.stake)
    }

    /// Expected per-unit delegator reward once the pool saturates.
    pub fn desirability(
        &self,
        pledge: f64,
        margin: f64,
        cost: f64,
        pool_count: usize,
    ) -> Result<f64, NumericalAnomaly> {
        let saturated = self.saturation_threshold();
        let terms = PoolTerms {
            stake: saturated.max(pledge),
            pledge,
            margin,
            cost,
        };
        let reward = self.pool_reward(&terms, pool_count)?;
        finite((1.0 - margin) * reward.distributable() / self.z0())
    }
}

fn finite(value: f64) -> Result<f64, NumericalAnomaly> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(NumericalAnomaly::NonFiniteUtility)
    }
}
