//! Derived stake pools
//!
//! Pools are never stored on their own: they are rebuilt from the operators'
//! strategies plus every delegation pointing at them. Delegations to an id
//! whose owner is not operating are remembered but count towards nothing
//! until that owner opens a pool again.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::population::{Agent, AgentId, AgentPopulation};
use crate::rss::PoolTerms;
use crate::strategy::{PoolId, Strategy};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Pool {
    pub id: PoolId,
    pub owner: AgentId,
    pub pledge: f64,
    pub margin: f64,
    pub cost: f64,
    pub total_delegated_stake: f64, // pledge plus delegations, never below pledge
}

impl Pool {
    pub fn terms(&self) -> PoolTerms {
        PoolTerms {
            stake: self.total_delegated_stake,
            pledge: self.pledge,
            margin: self.margin,
            cost: self.cost,
        }
    }

    /// Stake delegated by agents other than the operator.
    pub fn external_stake(&self) -> f64 {
        self.total_delegated_stake - self.pledge
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PoolBook {
    pools: BTreeMap<PoolId, Pool>,
    delegations: BTreeMap<PoolId, f64>,
}

impl PoolBook {
    pub fn from_population(population: &AgentPopulation) -> Self {
        let mut delegations: BTreeMap<PoolId, f64> = BTreeMap::new();
        for agent in population.iter() {
            if let Some(target) = agent.strategy.delegation_target() {
                *delegations.entry(target).or_insert(0.0) += agent.stake;
            }
        }

        let mut book = Self {
            pools: BTreeMap::new(),
            delegations,
        };
        for agent in population.iter() {
            book.open(agent.id, &agent.strategy);
        }
        book
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    pub fn get(&self, id: PoolId) -> Option<&Pool> {
        self.pools.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Pool> {
        self.pools.values()
    }

    /// Stake delegated to `id` by other agents, whether or not the pool is open.
    pub fn delegated_to(&self, id: PoolId) -> f64 {
        self.delegations.get(&id).copied().unwrap_or(0.0)
    }

    pub fn total_pool_stake(&self) -> f64 {
        self.pools.values().map(|p| p.total_delegated_stake).sum()
    }

    /// Updates the book for `agent` switching from its current strategy to
    /// `next`. Only the pools the agent leaves or joins are touched.
    pub(crate) fn apply_move(&mut self, agent: &Agent, next: &Strategy) {
        match agent.strategy {
            Strategy::Delegate(target) => self.shift_delegation(target, -agent.stake),
            Strategy::OperatePool { .. } => {
                self.pools.remove(&agent.id);
            }
            Strategy::Abstain => {}
        }
        match *next {
            Strategy::Delegate(target) => self.shift_delegation(target, agent.stake),
            Strategy::OperatePool { .. } => self.open(agent.id, next),
            Strategy::Abstain => {}
        }
    }

    fn open(&mut self, owner: AgentId, strategy: &Strategy) {
        if let Strategy::OperatePool {
            pledge,
            margin,
            cost,
        } = *strategy
        {
            let pool = Pool {
                id: owner,
                owner,
                pledge,
                margin,
                cost,
                total_delegated_stake: pledge + self.delegated_to(owner),
            };
            self.pools.insert(owner, pool);
        }
    }

    fn shift_delegation(&mut self, target: PoolId, amount: f64) {
        let entry = self.delegations.entry(target).or_insert(0.0);
        *entry += amount;
        let delegated = if *entry > 0.0 {
            *entry
        } else {
            self.delegations.remove(&target);
            0.0
        };
        if let Some(pool) = self.pools.get_mut(&target) {
            pool.total_delegated_stake = pool.pledge + delegated;
        }
    }
}
