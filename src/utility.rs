//! Utility model
//!
//! Utilities are best-response evaluations: the agent under evaluation swaps
//! its current strategy for the candidate while every other agent stays put.
//! Only the agent's own contribution is removed and re-added, and the pool
//! count is adjusted when the candidate opens or closes its pool.
//!
//! Arithmetic that cannot be carried out (no stake in the system, a
//! non-finite result) yields zero utility and reports the anomaly instead of
//! failing.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::population::Agent;
use crate::rss::{NumericalAnomaly, PoolTerms};
use crate::state::GlobalState;
use crate::strategy::{PoolId, Strategy};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Evaluation {
    pub strategy: Strategy,
    pub utility: f64,
    pub anomaly: Option<NumericalAnomaly>,
}

pub fn evaluate(state: &GlobalState, agent: &Agent, candidate: &Strategy) -> Evaluation {
    let outcome = match *candidate {
        Strategy::Abstain => Ok(state.parameters.abstain_utility),
        Strategy::Delegate(target) => delegation_utility(state, agent, target),
        Strategy::OperatePool {
            pledge,
            margin,
            cost,
        } => {
            let pool_count = state.pool_count() + usize::from(!agent.strategy.is_operating());
            let terms = PoolTerms {
                stake: pledge + state.pools.delegated_to(agent.id),
                pledge,
                margin,
                cost,
            };
            state.scheme().operator_utility(&terms, pool_count)
        }
    };

    match outcome {
        Ok(utility) if utility.is_finite() => Evaluation {
            strategy: *candidate,
            utility,
            anomaly: None,
        },
        Ok(_) => Evaluation {
            strategy: *candidate,
            utility: 0.0,
            anomaly: Some(NumericalAnomaly::NonFiniteUtility),
        },
        Err(anomaly) => Evaluation {
            strategy: *candidate,
            utility: 0.0,
            anomaly: Some(anomaly),
        },
    }
}

fn delegation_utility(
    state: &GlobalState,
    agent: &Agent,
    target: PoolId,
) -> Result<f64, NumericalAnomaly> {
    if target == agent.id {
        return Ok(0.0);
    }
    let Some(pool) = state.pools.get(target) else {
        return Ok(0.0);
    };

    // delegating closes the agent's own pool, if any
    let pool_count = state
        .pool_count()
        .saturating_sub(usize::from(agent.strategy.is_operating()));
    let joining = if agent.strategy.delegation_target() == Some(target) {
        0.0
    } else {
        agent.stake
    };
    let terms = PoolTerms {
        stake: pool.total_delegated_stake + joining,
        ..pool.terms()
    };
    state
        .scheme()
        .delegator_utility(&terms, agent.stake, pool_count)
}

/// Evaluates every candidate, returning results in candidate order.
///
/// With the `parallel` feature the candidates are evaluated concurrently;
/// the state is only read, so the results are identical either way.
pub fn evaluate_all(state: &GlobalState, agent: &Agent, candidates: &[Strategy]) -> Vec<Evaluation> {
    #[cfg(feature = "parallel")]
    {
        candidates
            .par_iter()
            .map(|candidate| evaluate(state, agent, candidate))
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    {
        candidates
            .iter()
            .map(|candidate| evaluate(state, agent, candidate))
            .collect()
    }
}
