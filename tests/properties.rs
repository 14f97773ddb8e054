//! Invariants that must hold in every committed epoch, whatever the seed
//! and population mix.

use proptest::prelude::*;

use rss_simulation::population::{BehaviorProfile, ProfileMix, StakeDistribution};
use rss_simulation::strategy::Strategy;
use rss_simulation::{EpochInputs, EquilibriumEngine, ScheduledFeed, SimulationConfig, SnapshotLog};

fn config(seed: u64, myopic: f64, abstainer: f64, min_pledge: f64) -> SimulationConfig {
    SimulationConfig {
        n: 30,
        k: 5,
        max_pools: 8,
        seed,
        min_pledge,
        max_iterations: 15,
        stake_distribution: StakeDistribution::Pareto { shape: 1.5 },
        agent_profile_mix: ProfileMix::new(1.0 - myopic - abstainer, myopic, abstainer),
        ..Default::default()
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn test_committed_state_invariants(
        seed in any::<u64>(),
        myopic in 0.0f64..0.5,
        abstainer in 0.0f64..0.5,
        min_pledge in 0.0f64..0.02,
    ) {
        let config = config(seed, myopic, abstainer, min_pledge);
        let max_pools = config.max_pools;
        let mut engine = EquilibriumEngine::new(config).unwrap();
        let mut feed = ScheduledFeed::new()
            .at(1, EpochInputs::with_growth(10))
            .through(2);

        for _ in 0..3 {
            let snapshot = engine.run_epoch(&mut feed).unwrap();
            let state = engine.state();

            prop_assert!(snapshot.pool_count <= max_pools);
            for agent in state.population.iter() {
                if agent.profile == BehaviorProfile::Abstainer {
                    prop_assert_eq!(agent.strategy, Strategy::Abstain);
                }
                if let Strategy::OperatePool { pledge, margin, .. } = agent.strategy {
                    prop_assert!(pledge <= agent.stake);
                    prop_assert!(pledge >= min_pledge);
                    prop_assert!((0.0..=1.0).contains(&margin));
                }
                prop_assert_ne!(agent.strategy, Strategy::Delegate(agent.id));
            }
            for pool in state.pools.iter() {
                prop_assert!(pool.total_delegated_stake >= pool.pledge);
            }
            for utility in snapshot.mean_utility_by_profile.values() {
                prop_assert!(utility.is_finite());
            }
        }
    }

    #[test]
    fn test_same_seed_same_trajectory(seed in any::<u64>()) {
        let run = || {
            let mut engine = EquilibriumEngine::new(config(seed, 0.3, 0.1, 0.0)).unwrap();
            let mut log = SnapshotLog::new();
            engine.run(&mut ScheduledFeed::new().through(1), &mut log, 2).unwrap();
            log.snapshots
        };
        prop_assert_eq!(run(), run());
    }
}
