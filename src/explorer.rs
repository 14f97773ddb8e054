//! Strategy explorer
//!
//! Exhaustive best response is out of reach, so each agent only considers a
//! bounded candidate set. This is an approximation of true best response and
//! the equilibria found are equilibria over these sets only.
//!
//! ## Candidate Order
//! The order below is also the tie-break order used by the engine:
//! 1. The agent's current strategy
//! 2. Abstain
//! 3. Delegation to the largest pools by current stake
//! 4. Non-myopic only: delegation to the most desirable unsaturated pools
//! 5. Operating a pool, for each pledge level and margin in the grid
//!
//! Duplicates keep their first position. Abstainers only ever see Abstain.
//!
//! An operator's unpledged stake is not delegated anywhere and earns nothing,
//! so partial pledges are dominated by a full or saturating pledge.

use crate::config::ExplorerSettings;
use crate::pool::Pool;
use crate::population::{Agent, BehaviorProfile};
use crate::state::GlobalState;
use crate::strategy::{PoolId, Strategy};

pub fn candidate_strategies(state: &GlobalState, agent: &Agent) -> Vec<Strategy> {
    if agent.profile == BehaviorProfile::Abstainer {
        return vec![Strategy::Abstain];
    }
    let settings = &state.parameters.explorer;

    let mut candidates = Vec::new();
    push_unique(&mut candidates, agent.strategy);
    push_unique(&mut candidates, Strategy::Abstain);

    for target in largest_pools(state, agent, settings.top_pools) {
        push_unique(&mut candidates, Strategy::Delegate(target));
    }
    if agent.profile == BehaviorProfile::NonMyopic {
        for target in most_desirable_pools(state, agent, settings.top_pools) {
            push_unique(&mut candidates, Strategy::Delegate(target));
        }
    }

    let may_open = agent.strategy.is_operating() || state.pool_count() < state.parameters.max_pools;
    if may_open {
        for candidate in operate_candidates(state, agent, settings) {
            push_unique(&mut candidates, candidate);
        }
    }
    candidates
}

fn push_unique(candidates: &mut Vec<Strategy>, candidate: Strategy) {
    if !candidates.contains(&candidate) {
        candidates.push(candidate);
    }
}

fn other_pools<'a>(state: &'a GlobalState, agent: &'a Agent) -> impl Iterator<Item = &'a Pool> {
    state.pools.iter().filter(move |pool| pool.id != agent.id)
}

/// Pools with the most stake right now, larger first, lower id on ties.
fn largest_pools(state: &GlobalState, agent: &Agent, limit: usize) -> Vec<PoolId> {
    let mut pools: Vec<&Pool> = other_pools(state, agent).collect();
    pools.sort_by(|a, b| {
        b.total_delegated_stake
            .total_cmp(&a.total_delegated_stake)
            .then(a.id.cmp(&b.id))
    });
    pools.into_iter().take(limit).map(|pool| pool.id).collect()
}

/// Unsaturated pools ranked by what a delegator earns per unit once they
/// fill up, so room to grow counts and current size does not.
fn most_desirable_pools(state: &GlobalState, agent: &Agent, limit: usize) -> Vec<PoolId> {
    let rss = state.scheme();
    let pool_count = state.pool_count();
    let mut ranked: Vec<(PoolId, f64)> = other_pools(state, agent)
        .filter(|pool| !rss.is_saturated(pool.total_delegated_stake))
        .map(|pool| {
            let desirability = rss
                .desirability(pool.pledge, pool.margin, pool.cost, pool_count)
                .unwrap_or(0.0);
            (pool.id, desirability)
        })
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked.into_iter().take(limit).map(|(id, _)| id).collect()
}

fn operate_candidates(
    state: &GlobalState,
    agent: &Agent,
    settings: &ExplorerSettings,
) -> Vec<Strategy> {
    let min_pledge = state.parameters.min_pledge;
    let saturation = state.scheme().saturation_threshold();

    let mut pledges: Vec<f64> = settings
        .pledge_fractions
        .iter()
        .map(|fraction| fraction * agent.stake)
        .collect();
    if agent.stake > saturation {
        pledges.push(saturation);
    }

    let mut candidates = Vec::new();
    for pledge in pledges {
        if !(pledge > 0.0 && pledge >= min_pledge) {
            continue;
        }
        for &margin in &settings.margin_grid {
            candidates.push(Strategy::OperatePool {
                pledge,
                margin,
                cost: agent.cost,
            });
        }
    }
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulationConfig;
    use crate::population::AgentPopulation;

    fn operate(pledge: f64) -> Strategy {
        Strategy::OperatePool {
            pledge,
            margin: 0.0,
            cost: 1e-4,
        }
    }

    fn config() -> SimulationConfig {
        let mut config = SimulationConfig {
            k: 10,
            max_pools: 10,
            ..Default::default()
        };
        config.explorer.top_pools = 2;
        config.explorer.margin_grid = vec![0.0, 0.1];
        config.explorer.pledge_fractions = vec![1.0, 0.5];
        config
    }

    // pools 0, 1, 2 with stakes 0.15 (saturated), 0.06 and 0.03
    fn state_with(config: SimulationConfig, newcomer: BehaviorProfile) -> GlobalState {
        let agents = vec![
            Agent::new(0, 0.05, 1e-4, BehaviorProfile::NonMyopic).with_strategy(operate(0.05)),
            Agent::new(1, 0.04, 1e-4, BehaviorProfile::NonMyopic).with_strategy(operate(0.04)),
            Agent::new(2, 0.03, 1e-4, BehaviorProfile::NonMyopic).with_strategy(operate(0.03)),
            Agent::new(3, 0.10, 1e-4, BehaviorProfile::Myopic).with_strategy(Strategy::Delegate(0)),
            Agent::new(4, 0.02, 1e-4, BehaviorProfile::Myopic).with_strategy(Strategy::Delegate(1)),
            Agent::new(5, 0.30, 1e-4, newcomer),
        ];
        GlobalState::new(0, AgentPopulation::from_agents(agents), config)
    }

    #[test]
    fn test_abstainer_only_abstains() {
        let state = state_with(config(), BehaviorProfile::Abstainer);
        let agent = state.population.get(5).unwrap();
        assert_eq!(candidate_strategies(&state, agent), vec![Strategy::Abstain]);
    }

    #[test]
    fn test_myopic_follows_largest_pools() {
        let state = state_with(config(), BehaviorProfile::Myopic);
        let agent = state.population.get(5).unwrap();
        let candidates = candidate_strategies(&state, agent);

        assert_eq!(candidates[0], Strategy::Abstain);
        assert_eq!(candidates[1], Strategy::Delegate(0));
        assert_eq!(candidates[2], Strategy::Delegate(1));
        assert!(!candidates.contains(&Strategy::Delegate(2)));
    }

    #[test]
    fn test_non_myopic_adds_unsaturated_pools() {
        let state = state_with(config(), BehaviorProfile::NonMyopic);
        let agent = state.population.get(5).unwrap();
        let candidates = candidate_strategies(&state, agent);

        assert!(candidates.contains(&Strategy::Delegate(0)));
        assert!(candidates.contains(&Strategy::Delegate(1)));
        assert!(candidates.contains(&Strategy::Delegate(2)));
    }

    #[test]
    fn test_current_strategy_comes_first_and_own_pool_is_skipped() {
        let state = state_with(config(), BehaviorProfile::NonMyopic);
        let operator = state.population.get(1).unwrap();
        let candidates = candidate_strategies(&state, operator);

        assert_eq!(candidates[0], operator.strategy);
        assert_eq!(candidates[1], Strategy::Abstain);
        assert!(!candidates.contains(&Strategy::Delegate(1)));
        // the current strategy is not repeated by the operate grid
        let repeats = candidates.iter().filter(|c| **c == operator.strategy).count();
        assert_eq!(repeats, 1);
    }

    #[test]
    fn test_operate_grid_and_saturation_pledge() {
        let state = state_with(config(), BehaviorProfile::NonMyopic);
        let agent = state.population.get(5).unwrap();
        let pledges: Vec<f64> = candidate_strategies(&state, agent)
            .iter()
            .filter(|c| c.is_operating())
            .map(|c| c.pledge())
            .collect();

        // stake 0.3 above saturation 0.1: full, half and saturating pledge, two margins each
        assert_eq!(pledges.len(), 6);
        assert!(pledges.contains(&0.3));
        assert!(pledges.contains(&0.15));
        assert!(pledges.contains(&0.1));
    }

    #[test]
    fn test_min_pledge_filters_operate_candidates() {
        let mut config = config();
        config.min_pledge = 0.2;
        let state = state_with(config, BehaviorProfile::NonMyopic);
        let agent = state.population.get(5).unwrap();
        let operating: Vec<Strategy> = candidate_strategies(&state, agent)
            .into_iter()
            .filter(|c| c.is_operating())
            .collect();

        assert_eq!(operating.len(), 2);
        assert!(operating.iter().all(|c| c.pledge() >= 0.2));
    }

    #[test]
    fn test_no_new_pools_at_max_pools() {
        let mut config = config();
        config.k = 3;
        config.max_pools = 3;
        let state = state_with(config, BehaviorProfile::NonMyopic);

        let newcomer = state.population.get(5).unwrap();
        assert!(!candidate_strategies(&state, newcomer)
            .iter()
            .any(|c| c.is_operating()));

        // an existing operator may still re-price its pool
        let operator = state.population.get(2).unwrap();
        let operating = candidate_strategies(&state, operator)
            .iter()
            .filter(|c| c.is_operating())
            .count();
        assert!(operating > 1);
    }
}
