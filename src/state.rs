//! Global simulation state
//!
//! The engine owns the only mutable `GlobalState`. Everything else reads it
//! by shared reference, so utilities and candidate sets are pure functions of
//! one state value.

use crate::config::SimulationConfig;
use crate::population::{AgentId, AgentPopulation};
use crate::pool::PoolBook;
use crate::rss::RewardSharingScheme;
use crate::strategy::Strategy;

#[derive(Clone, Debug)]
pub struct GlobalState {
    pub epoch: u64,
    pub population: AgentPopulation,
    pub pools: PoolBook,
    pub parameters: SimulationConfig, // effective parameters for this epoch
    scheme: RewardSharingScheme,
}

impl GlobalState {
    pub fn new(epoch: u64, population: AgentPopulation, parameters: SimulationConfig) -> Self {
        let pools = PoolBook::from_population(&population);
        let scheme = parameters.scheme();
        Self {
            epoch,
            population,
            pools,
            parameters,
            scheme,
        }
    }

    pub fn scheme(&self) -> &RewardSharingScheme {
        &self.scheme
    }

    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    pub(crate) fn set_parameters(&mut self, parameters: SimulationConfig) {
        self.scheme = parameters.scheme();
        self.parameters = parameters;
    }

    pub(crate) fn rebuild_pools(&mut self) {
        self.pools = PoolBook::from_population(&self.population);
    }

    /// Commits one agent's move, updating only the pools it touches.
    pub(crate) fn apply_move(&mut self, id: AgentId, next: Strategy) {
        if let Some(agent) = self.population.get(id) {
            self.pools.apply_move(agent, &next);
            self.population.set_strategy(id, next);
        }
    }
}
