//! Epoch snapshots and reporters
//!
//! At every epoch commit the engine captures an `EpochSnapshot` of the
//! committed state and hands it to a `Reporter`. Snapshots only contain
//! ordered collections, so the same run always serializes to the same bytes.
//!
//! ## Metrics
//! - Pool count and the stake, pledge and margin of every pool
//! - Mean utility per behavioral profile
//! - Delegator and abstainer counts, delegated stake fraction
//! - Total pledge and mean gross pool reward
//! - Nakamoto coefficient over pool stake
//! - Numerical anomalies and strategy repairs seen during the epoch

use std::collections::BTreeMap;
use std::io::Write;

use serde::Serialize;

use crate::error::Result;
use crate::population::{AgentId, BehaviorProfile};
use crate::rss::NumericalAnomaly;
use crate::state::GlobalState;
use crate::strategy::{PoolId, Strategy};
use crate::utility;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum EquilibriumStatus {
    Converged,
    IterationLimitReached,
    Interrupted,
}

impl EquilibriumStatus {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Converged => "converged",
            Self::IterationLimitReached => "iteration limit",
            Self::Interrupted => "interrupted",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AnomalyCounts {
    pub zero_total_stake: u64,
    pub zero_pool_stake: u64,
    pub non_finite_utility: u64,
}

impl AnomalyCounts {
    pub fn record(&mut self, anomaly: NumericalAnomaly) {
        match anomaly {
            NumericalAnomaly::ZeroTotalStake => self.zero_total_stake += 1,
            NumericalAnomaly::ZeroPoolStake => self.zero_pool_stake += 1,
            NumericalAnomaly::NonFiniteUtility => self.non_finite_utility += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.zero_total_stake + self.zero_pool_stake + self.non_finite_utility
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PoolStake {
    pub pool_id: PoolId,
    pub owner: AgentId,
    pub stake: f64,
    pub pledge: f64,
    pub margin: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EpochSnapshot {
    pub epoch: u64,
    pub status: EquilibriumStatus,
    pub converged: bool,
    pub iterations_used: usize,
    pub pool_count: usize,
    pub stake_distribution_across_pools: Vec<PoolStake>,
    pub mean_utility_by_profile: BTreeMap<BehaviorProfile, f64>,
    pub delegator_count: usize,
    pub abstainer_count: usize,
    pub delegated_stake_fraction: f64,
    pub total_pledge: f64,
    pub mean_pool_reward: f64, // gross, before costs
    pub nakamoto_coefficient: usize,
    pub k: usize,
    pub a0: f64,
    pub anomalies: AnomalyCounts,
    pub repairs: usize,
}

impl EpochSnapshot {
    /// Captures the committed state. Anomalies met while computing utilities
    /// for the snapshot are added to those recorded during the search.
    pub fn capture(
        state: &GlobalState,
        status: EquilibriumStatus,
        iterations_used: usize,
        mut anomalies: AnomalyCounts,
        repairs: usize,
    ) -> Self {
        let rss = state.scheme();

        let stake_distribution_across_pools: Vec<PoolStake> = state
            .pools
            .iter()
            .map(|pool| PoolStake {
                pool_id: pool.id,
                owner: pool.owner,
                stake: pool.total_delegated_stake,
                pledge: pool.pledge,
                margin: pool.margin,
            })
            .collect();

        let mut utility_sums: BTreeMap<BehaviorProfile, (f64, usize)> = BTreeMap::new();
        let mut delegator_count = 0;
        let mut abstainer_count = 0;
        for agent in state.population.iter() {
            let eval = utility::evaluate(state, agent, &agent.strategy);
            if let Some(anomaly) = eval.anomaly {
                anomalies.record(anomaly);
            }
            let entry = utility_sums.entry(agent.profile).or_insert((0.0, 0));
            entry.0 += eval.utility;
            entry.1 += 1;

            match agent.strategy {
                Strategy::Delegate(target) if state.pools.get(target).is_some() => {
                    delegator_count += 1
                }
                Strategy::Abstain => abstainer_count += 1,
                _ => {}
            }
        }
        let mean_utility_by_profile = utility_sums
            .into_iter()
            .map(|(profile, (sum, count))| (profile, sum / count as f64))
            .collect();

        let mut gross_total = 0.0;
        for pool in state.pools.iter() {
            match rss.gross_reward(pool.total_delegated_stake, pool.pledge) {
                Ok(gross) => gross_total += gross,
                Err(anomaly) => anomalies.record(anomaly),
            }
        }
        let pool_count = state.pool_count();
        let mean_pool_reward = if pool_count > 0 {
            gross_total / pool_count as f64
        } else {
            0.0
        };

        let total_stake = state.parameters.total_stake;
        let delegated_stake_fraction = if total_stake > 0.0 {
            state.pools.total_pool_stake() / total_stake
        } else {
            0.0
        };

        Self {
            epoch: state.epoch,
            status,
            converged: status == EquilibriumStatus::Converged,
            iterations_used,
            pool_count,
            nakamoto_coefficient: nakamoto_coefficient(&stake_distribution_across_pools),
            stake_distribution_across_pools,
            mean_utility_by_profile,
            delegator_count,
            abstainer_count,
            delegated_stake_fraction,
            total_pledge: state.pools.iter().map(|pool| pool.pledge).sum(),
            mean_pool_reward,
            k: state.parameters.k,
            a0: state.parameters.a0,
            anomalies,
            repairs,
        }
    }

    pub fn print(&self) {
        println!("  Epoch:                   {}", self.epoch);
        println!(
            "  Status:                  {} after {} rounds",
            self.status.name(),
            self.iterations_used
        );
        println!("  k / a0:                  {} / {:.3}", self.k, self.a0);
        println!("  Pools:                   {}", self.pool_count);
        println!("  Delegators:              {}", self.delegator_count);
        println!("  Abstainers:              {}", self.abstainer_count);
        println!(
            "  Delegated stake:         {:.2}%",
            self.delegated_stake_fraction * 100.0
        );
        println!("  Total pledge:            {:.4}", self.total_pledge);
        println!("  Mean pool reward:        {:.6}", self.mean_pool_reward);
        println!("  Nakamoto coefficient:    {}", self.nakamoto_coefficient);
        for (profile, utility) in &self.mean_utility_by_profile {
            println!("  Mean utility ({:<10}): {:.3e}", profile.name(), utility);
        }
        if self.anomalies.total() > 0 {
            println!("  Numerical anomalies:     {}", self.anomalies.total());
        }
    }
}

/// Fewest pools that together hold more than half of all pooled stake.
fn nakamoto_coefficient(pools: &[PoolStake]) -> usize {
    let mut stakes: Vec<f64> = pools.iter().map(|p| p.stake).collect();
    stakes.sort_by(|a, b| b.total_cmp(a));
    let half = stakes.iter().sum::<f64>() / 2.0;

    let mut running = 0.0;
    for (i, stake) in stakes.iter().enumerate() {
        running += stake;
        if running > half {
            return i + 1;
        }
    }
    0
}

pub trait Reporter {
    fn report(&mut self, snapshot: &EpochSnapshot) -> Result<()>;
}

#[derive(Clone, Debug, Default)]
pub struct SnapshotLog {
    pub snapshots: Vec<EpochSnapshot>,
}

impl SnapshotLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<&EpochSnapshot> {
        self.snapshots.last()
    }
}

impl Reporter for SnapshotLog {
    fn report(&mut self, snapshot: &EpochSnapshot) -> Result<()> {
        self.snapshots.push(snapshot.clone());
        Ok(())
    }
}

pub struct JsonLinesReporter<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesReporter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> Reporter for JsonLinesReporter<W> {
    fn report(&mut self, snapshot: &EpochSnapshot) -> Result<()> {
        serde_json::to_writer(&mut self.writer, snapshot)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulationConfig;
    use crate::population::{Agent, AgentPopulation};

    fn pool_stake(pool_id: PoolId, stake: f64) -> PoolStake {
        PoolStake {
            pool_id,
            owner: pool_id,
            stake,
            pledge: 0.0,
            margin: 0.0,
        }
    }

    fn state() -> GlobalState {
        let operate = |pledge: f64| Strategy::OperatePool {
            pledge,
            margin: 0.0,
            cost: 1e-4,
        };
        let agents = vec![
            Agent::new(0, 0.2, 1e-4, BehaviorProfile::NonMyopic).with_strategy(operate(0.2)),
            Agent::new(1, 0.1, 1e-4, BehaviorProfile::NonMyopic).with_strategy(operate(0.1)),
            Agent::new(2, 0.3, 1e-4, BehaviorProfile::Myopic).with_strategy(Strategy::Delegate(0)),
            Agent::new(3, 0.1, 1e-4, BehaviorProfile::Myopic).with_strategy(Strategy::Delegate(7)),
            Agent::new(4, 0.3, 1e-4, BehaviorProfile::Abstainer),
        ];
        let config = SimulationConfig {
            k: 2,
            max_pools: 2,
            ..Default::default()
        };
        GlobalState::new(4, AgentPopulation::from_agents(agents), config)
    }

    #[test]
    fn test_nakamoto_coefficient() {
        assert_eq!(nakamoto_coefficient(&[]), 0);
        let pools = vec![pool_stake(0, 0.5), pool_stake(1, 0.3), pool_stake(2, 0.2)];
        assert_eq!(nakamoto_coefficient(&pools), 2);
        let pools = vec![pool_stake(0, 0.6), pool_stake(1, 0.4)];
        assert_eq!(nakamoto_coefficient(&pools), 1);
    }

    #[test]
    fn test_capture_metrics() {
        let snapshot = EpochSnapshot::capture(
            &state(),
            EquilibriumStatus::Converged,
            3,
            AnomalyCounts::default(),
            1,
        );

        assert_eq!(snapshot.epoch, 4);
        assert!(snapshot.converged);
        assert_eq!(snapshot.pool_count, 2);
        assert_eq!(snapshot.delegator_count, 1); // pool 7 does not exist
        assert_eq!(snapshot.abstainer_count, 1);
        assert!((snapshot.delegated_stake_fraction - 0.6).abs() < 1e-12);
        assert!((snapshot.total_pledge - 0.3).abs() < 1e-12);
        assert_eq!(snapshot.nakamoto_coefficient, 1);
        assert_eq!(snapshot.repairs, 1);
        assert_eq!(snapshot.mean_utility_by_profile.len(), 3);
        assert_eq!(
            snapshot.mean_utility_by_profile[&BehaviorProfile::Abstainer],
            0.0
        );
        assert!(snapshot.mean_pool_reward > 0.0);
    }

    #[test]
    fn test_json_lines_one_line_per_snapshot() {
        let snapshot = EpochSnapshot::capture(
            &state(),
            EquilibriumStatus::IterationLimitReached,
            10,
            AnomalyCounts::default(),
            0,
        );
        let mut reporter = JsonLinesReporter::new(Vec::new());
        reporter.report(&snapshot).unwrap();
        reporter.report(&snapshot).unwrap();

        let output = String::from_utf8(reporter.into_inner()).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], lines[1]);
        assert!(lines[0].contains("\"status\":\"IterationLimitReached\""));
        assert!(lines[0].contains("\"converged\":false"));
    }

    #[test]
    fn test_anomaly_counts() {
        let mut counts = AnomalyCounts::default();
        counts.record(NumericalAnomaly::ZeroPoolStake);
        counts.record(NumericalAnomaly::ZeroPoolStake);
        counts.record(NumericalAnomaly::NonFiniteUtility);
        assert_eq!(counts.zero_pool_stake, 2);
        assert_eq!(counts.total(), 3);
    }
}
