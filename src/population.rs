//! Stakeholder population
//!
//! Holds every agent with its stake, behavioral profile, operating cost and
//! current strategy. Profiles and costs are fixed when an agent is created;
//! stakes may be rescaled at epoch boundaries; strategies are replaced only
//! by the equilibrium engine.
//!
//! ## Stake Distributions
//! - Pareto (heavy-tailed, scale 1)
//! - Flat (every agent holds the same stake)
//! - Explicit (a fixed list, cycled over agent ids)

use std::collections::BTreeMap;

use rand::distributions::WeightedIndex;
use rand::prelude::*;
use rand_distr::Pareto;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::strategy::{PoolId, Strategy};

pub type AgentId = usize;

const MIX_TOLERANCE: f64 = 1e-9;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BehaviorProfile {
    NonMyopic, // rational, long horizon
    Myopic,    // greedy, follows current pool size
    Abstainer, // never participates
}

impl BehaviorProfile {
    pub fn all() -> Vec<Self> {
        vec![Self::NonMyopic, Self::Myopic, Self::Abstainer]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::NonMyopic => "Non-myopic",
            Self::Myopic => "Myopic",
            Self::Abstainer => "Abstainer",
        }
    }
}

/// Fractions of new agents assigned to each profile.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProfileMix {
    pub non_myopic: f64,
    pub myopic: f64,
    pub abstainer: f64,
}

impl Default for ProfileMix {
    fn default() -> Self {
        Self {
            non_myopic: 1.0,
            myopic: 0.0,
            abstainer: 0.0,
        }
    }
}

impl ProfileMix {
    pub fn new(non_myopic: f64, myopic: f64, abstainer: f64) -> Self {
        Self {
            non_myopic,
            myopic,
            abstainer,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let weights = self.weights();
        let sum: f64 = weights.iter().sum();
        let all_valid = weights.iter().all(|w| w.is_finite() && *w >= 0.0);
        if !all_valid || (sum - 1.0).abs() > MIX_TOLERANCE {
            return Err(ConfigError::ProfileMix { sum });
        }
        Ok(())
    }

    fn weights(&self) -> [f64; 3] {
        [self.non_myopic, self.myopic, self.abstainer]
    }

    fn sampler(&self) -> Result<WeightedIndex<f64>, ConfigError> {
        self.validate()?;
        WeightedIndex::new(self.weights()).map_err(|_| ConfigError::ProfileMix {
            sum: self.weights().iter().sum(),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum StakeDistribution {
    Pareto { shape: f64 },
    Flat,
    Explicit { stakes: Vec<f64> },
}

impl Default for StakeDistribution {
    fn default() -> Self {
        Self::Pareto { shape: 2.0 }
    }
}

impl StakeDistribution {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Self::Pareto { shape } => {
                if !shape.is_finite() || *shape <= 0.0 {
                    return Err(ConfigError::StakeDistribution(format!(
                        "pareto shape must be positive, got {}",
                        shape
                    )));
                }
            }
            Self::Flat => {}
            Self::Explicit { stakes } => {
                if stakes.is_empty() {
                    return Err(ConfigError::StakeDistribution(
                        "explicit stake list is empty".to_string(),
                    ));
                }
                if let Some(bad) = stakes.iter().find(|s| !s.is_finite() || **s < 0.0) {
                    return Err(ConfigError::StakeDistribution(format!(
                        "explicit stakes must be non-negative, got {}",
                        bad
                    )));
                }
            }
        }
        Ok(())
    }

    fn sampler(&self) -> Result<StakeSampler<'_>, ConfigError> {
        self.validate()?;
        Ok(match self {
            Self::Pareto { shape } => StakeSampler::Pareto(
                Pareto::new(1.0, *shape)
                    .map_err(|e| ConfigError::StakeDistribution(e.to_string()))?,
            ),
            Self::Flat => StakeSampler::Flat,
            Self::Explicit { stakes } => StakeSampler::Explicit(stakes),
        })
    }
}

enum StakeSampler<'a> {
    Pareto(Pareto<f64>),
    Flat,
    Explicit(&'a [f64]),
}

impl StakeSampler<'_> {
    fn sample(&self, index: usize, rng: &mut impl Rng) -> f64 {
        match self {
            Self::Pareto(pareto) => pareto.sample(rng),
            Self::Flat => 1.0,
            Self::Explicit(stakes) => stakes[index % stakes.len()],
        }
    }
}

#[derive(Clone, Debug)]
pub struct Recruitment<'a> {
    pub stakes: &'a StakeDistribution,
    pub profiles: &'a ProfileMix,
    pub cost_min: f64,
    pub cost_max: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub stake: f64,
    pub profile: BehaviorProfile,
    pub cost: f64, // cost of operating one pool
    pub strategy: Strategy,
}

impl Agent {
    pub fn new(id: AgentId, stake: f64, cost: f64, profile: BehaviorProfile) -> Self {
        Self {
            id,
            stake,
            profile,
            cost,
            strategy: Strategy::Abstain,
        }
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn operate_with_margin(&self, margin: f64) -> Strategy {
        Strategy::OperatePool {
            pledge: self.stake,
            margin,
            cost: self.cost,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentPopulation {
    agents: Vec<Agent>,
}

impl AgentPopulation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a population from pre-made agents. Ids are reassigned to match
    /// positions, so agent `i` always lives at index `i`.
    pub fn from_agents(agents: Vec<Agent>) -> Self {
        let agents = agents
            .into_iter()
            .enumerate()
            .map(|(id, agent)| Agent { id, ..agent })
            .collect();
        Self { agents }
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn get(&self, id: AgentId) -> Option<&Agent> {
        self.agents.get(id)
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn iter(&self) -> impl Iterator<Item = &Agent> {
        self.agents.iter()
    }

    pub fn total_stake(&self) -> f64 {
        self.agents.iter().map(|a| a.stake).sum()
    }

    pub fn operator_count(&self) -> usize {
        self.agents.iter().filter(|a| a.strategy.is_operating()).count()
    }

    pub(crate) fn set_strategy(&mut self, id: AgentId, strategy: Strategy) {
        if let Some(agent) = self.agents.get_mut(id) {
            agent.strategy = strategy;
        }
    }

    /// Appends `count` abstaining agents drawn from `recruitment`.
    pub(crate) fn grow(
        &mut self,
        count: usize,
        recruitment: &Recruitment<'_>,
        rng: &mut impl Rng,
    ) -> Result<(), ConfigError> {
        if count == 0 {
            return Ok(());
        }
        let stakes = recruitment.stakes.sampler()?;
        let profiles = recruitment.profiles.sampler()?;
        let profile_table = BehaviorProfile::all();

        for _ in 0..count {
            let id = self.agents.len();
            let stake = stakes.sample(id, rng);
            let cost = rng.gen_range(recruitment.cost_min..=recruitment.cost_max);
            let profile = profile_table[profiles.sample(rng)];
            self.agents.push(Agent::new(id, stake, cost, profile));
        }
        Ok(())
    }

    /// Re-samples every stake from `distribution` and hands the values out by
    /// rank: the agent with the largest stake receives the largest sample.
    pub(crate) fn reassign_stakes(
        &mut self,
        distribution: &StakeDistribution,
        rng: &mut impl Rng,
    ) -> Result<(), ConfigError> {
        let sampler = distribution.sampler()?;
        let mut samples: Vec<f64> = (0..self.agents.len())
            .map(|i| sampler.sample(i, rng))
            .collect();
        samples.sort_by(|a, b| b.total_cmp(a));

        let mut ranked: Vec<AgentId> = (0..self.agents.len()).collect();
        ranked.sort_by(|&a, &b| {
            self.agents[b]
                .stake
                .total_cmp(&self.agents[a].stake)
                .then(a.cmp(&b))
        });

        for (id, new_stake) in ranked.into_iter().zip(samples) {
            let agent = &mut self.agents[id];
            let ratio = if agent.stake > 0.0 {
                new_stake / agent.stake
            } else {
                0.0
            };
            agent.stake = new_stake;
            agent.strategy = scale_pledge(agent.strategy, ratio, new_stake);
        }
        Ok(())
    }

    /// Scales all stakes (and pledges) so they sum to `target`.
    /// Returns `None` when the population holds no stake to scale.
    pub(crate) fn normalize(&mut self, target: f64) -> Option<f64> {
        let total = self.total_stake();
        if !(total.is_finite() && total > 0.0) {
            return None;
        }
        let factor = target / total;
        for agent in &mut self.agents {
            agent.stake *= factor;
            agent.strategy = scale_pledge(agent.strategy, factor, agent.stake);
        }
        Some(factor)
    }

    /// Restores the population invariants after parameters or stakes changed.
    ///
    /// - Abstainers always abstain
    /// - Pledges never exceed stake and never fall below `min_pledge`
    /// - Nobody delegates to their own id
    /// - At most `max_pools` pools, dropping the smallest first
    ///
    /// Returns the number of strategies that had to be replaced or clamped.
    pub(crate) fn repair_strategies(&mut self, min_pledge: f64, max_pools: usize) -> usize {
        let mut repairs = 0;

        for agent in &mut self.agents {
            let repaired = match agent.strategy {
                _ if agent.profile == BehaviorProfile::Abstainer => Strategy::Abstain,
                Strategy::Delegate(pool) if pool == agent.id => Strategy::Abstain,
                Strategy::OperatePool {
                    pledge,
                    margin,
                    cost,
                } => {
                    let clamped = Strategy::OperatePool {
                        pledge: pledge.min(agent.stake),
                        margin,
                        cost,
                    };
                    if clamped.is_valid_for(agent.stake, min_pledge) {
                        clamped
                    } else {
                        Strategy::Abstain
                    }
                }
                other => other,
            };
            if repaired != agent.strategy {
                agent.strategy = repaired;
                repairs += 1;
            }
        }

        let operators = self.operator_count();
        if operators > max_pools {
            let mut delegated: BTreeMap<PoolId, f64> = BTreeMap::new();
            for agent in &self.agents {
                if let Some(pool) = agent.strategy.delegation_target() {
                    *delegated.entry(pool).or_insert(0.0) += agent.stake;
                }
            }
            let mut pools: Vec<(PoolId, f64)> = self
                .agents
                .iter()
                .filter(|a| a.strategy.is_operating())
                .map(|a| {
                    let stake = a.strategy.pledge() + delegated.get(&a.id).copied().unwrap_or(0.0);
                    (a.id, stake)
                })
                .collect();
            // smallest first, newest (highest id) first among equals
            pools.sort_by(|a, b| a.1.total_cmp(&b.1).then(b.0.cmp(&a.0)));
            for (owner, _) in pools.into_iter().take(operators - max_pools) {
                self.agents[owner].strategy = Strategy::Abstain;
                repairs += 1;
            }
        }

        repairs
    }
}

fn scale_pledge(strategy: Strategy, factor: f64, stake: f64) -> Strategy {
    match strategy {
        Strategy::OperatePool {
            pledge,
            margin,
            cost,
        } => Strategy::OperatePool {
            pledge: (pledge * factor).min(stake),
            margin,
            cost,
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_chacha::ChaCha8Rng;

    fn recruitment<'a>(stakes: &'a StakeDistribution, mix: &'a ProfileMix) -> Recruitment<'a> {
        Recruitment {
            stakes,
            profiles: mix,
            cost_min: 1e-5,
            cost_max: 1e-4,
        }
    }

    #[test]
    fn test_grow_assigns_sequential_ids_and_costs() {
        let stakes = StakeDistribution::default();
        let mix = ProfileMix::new(0.5, 0.3, 0.2);
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut population = AgentPopulation::new();
        population.grow(200, &recruitment(&stakes, &mix), &mut rng).unwrap();

        assert_eq!(population.len(), 200);
        for (i, agent) in population.iter().enumerate() {
            assert_eq!(agent.id, i);
            assert!(agent.stake >= 1.0); // pareto scale
            assert!(agent.cost >= 1e-5 && agent.cost <= 1e-4);
            assert_eq!(agent.strategy, Strategy::Abstain);
        }
        let abstainers = population
            .iter()
            .filter(|a| a.profile == BehaviorProfile::Abstainer)
            .count();
        assert!(abstainers > 0 && abstainers < 200);
    }

    #[test]
    fn test_profile_mix_validation() {
        assert!(ProfileMix::new(0.5, 0.5, 0.0).validate().is_ok());
        assert!(ProfileMix::new(0.5, 0.4, 0.0).validate().is_err());
        assert!(ProfileMix::new(1.5, -0.5, 0.0).validate().is_err());
    }

    #[test]
    fn test_normalize_scales_pledges() {
        let agents = vec![
            Agent::new(0, 3.0, 0.0, BehaviorProfile::NonMyopic).with_strategy(
                Strategy::OperatePool {
                    pledge: 3.0,
                    margin: 0.1,
                    cost: 0.0,
                },
            ),
            Agent::new(1, 1.0, 0.0, BehaviorProfile::NonMyopic),
        ];
        let mut population = AgentPopulation::from_agents(agents);
        let factor = population.normalize(1.0).unwrap();

        assert!((factor - 0.25).abs() < 1e-12);
        assert!((population.total_stake() - 1.0).abs() < 1e-12);
        let operator = population.get(0).unwrap();
        assert!((operator.strategy.pledge() - operator.stake).abs() < 1e-15);
        assert!(operator.strategy.pledge() <= operator.stake);
    }

    #[test]
    fn test_normalize_empty_population() {
        let mut population = AgentPopulation::new();
        assert_eq!(population.normalize(1.0), None);
    }

    #[test]
    fn test_reassign_stakes_preserves_rank() {
        let agents = vec![
            Agent::new(0, 1.0, 0.0, BehaviorProfile::Myopic),
            Agent::new(1, 5.0, 0.0, BehaviorProfile::Myopic),
            Agent::new(2, 3.0, 0.0, BehaviorProfile::Myopic),
        ];
        let mut population = AgentPopulation::from_agents(agents);
        let explicit = StakeDistribution::Explicit {
            stakes: vec![10.0, 30.0, 20.0],
        };
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        population.reassign_stakes(&explicit, &mut rng).unwrap();

        let stakes: Vec<f64> = population.iter().map(|a| a.stake).collect();
        assert_eq!(stakes, vec![10.0, 30.0, 20.0]);
    }

    #[test]
    fn test_repair_strategies() {
        let agents = vec![
            // abstainer profile holding an operator strategy
            Agent::new(0, 1.0, 0.0, BehaviorProfile::Abstainer).with_strategy(Strategy::Delegate(1)),
            // pledge above stake gets clamped
            Agent::new(1, 1.0, 0.0, BehaviorProfile::NonMyopic).with_strategy(
                Strategy::OperatePool {
                    pledge: 2.0,
                    margin: 0.0,
                    cost: 0.0,
                },
            ),
            // pledge below min pledge is dropped
            Agent::new(2, 0.05, 0.0, BehaviorProfile::NonMyopic).with_strategy(
                Strategy::OperatePool {
                    pledge: 0.05,
                    margin: 0.0,
                    cost: 0.0,
                },
            ),
            // self delegation
            Agent::new(3, 1.0, 0.0, BehaviorProfile::Myopic).with_strategy(Strategy::Delegate(3)),
        ];
        let mut population = AgentPopulation::from_agents(agents);
        let repairs = population.repair_strategies(0.1, 10);

        assert_eq!(repairs, 4);
        assert_eq!(population.get(0).unwrap().strategy, Strategy::Abstain);
        assert_eq!(population.get(1).unwrap().strategy.pledge(), 1.0);
        assert_eq!(population.get(2).unwrap().strategy, Strategy::Abstain);
        assert_eq!(population.get(3).unwrap().strategy, Strategy::Abstain);
    }

    #[test]
    fn test_repair_closes_smallest_pools_over_limit() {
        let operate = |pledge: f64| Strategy::OperatePool {
            pledge,
            margin: 0.0,
            cost: 0.0,
        };
        let agents = vec![
            Agent::new(0, 1.0, 0.0, BehaviorProfile::NonMyopic).with_strategy(operate(1.0)),
            Agent::new(1, 2.0, 0.0, BehaviorProfile::NonMyopic).with_strategy(operate(2.0)),
            Agent::new(2, 0.5, 0.0, BehaviorProfile::NonMyopic).with_strategy(operate(0.5)),
            Agent::new(3, 5.0, 0.0, BehaviorProfile::NonMyopic).with_strategy(Strategy::Delegate(2)),
        ];
        let mut population = AgentPopulation::from_agents(agents);
        population.repair_strategies(0.0, 2);

        // pool 0 is the smallest once pool 2's delegation is counted
        assert_eq!(population.operator_count(), 2);
        assert_eq!(population.get(0).unwrap().strategy, Strategy::Abstain);
        assert!(population.get(2).unwrap().strategy.is_operating());
    }
}
