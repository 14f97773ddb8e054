//! Multi-Epoch Simulation Binary
//!
//! Runs the equilibrium engine over several epochs with population growth
//! and a mid-run increase of k, printing one row per committed epoch.
//!
//! ## Usage
//! ```bash
//! cargo run --bin epochs --release
//! RUST_LOG=debug cargo run --bin epochs --release
//! ```

use rss_simulation::population::ProfileMix;
use rss_simulation::{
    EpochInputs, EquilibriumEngine, ParameterOverrides, Result, ScheduledFeed, SimulationConfig,
    SnapshotLog,
};
use tracing_subscriber::EnvFilter;

const EPOCHS: usize = 6;
const K_CHANGE_EPOCH: u64 = 3;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = SimulationConfig {
        n: 300,
        k: 20,
        max_pools: 100,
        a0: 0.3,
        max_iterations: 200,
        agent_profile_mix: ProfileMix::new(0.6, 0.3, 0.1),
        ..Default::default()
    };

    println!("=======================================================");
    println!("  Stake Pool Equilibrium Simulation");
    println!("  Asynchronous best response under the Cardano RSS");
    println!("=======================================================");
    println!();
    println!("Parameters:");
    println!("  Agents: {}, k: {}, a0: {}", config.n, config.k, config.a0);
    println!("  Epochs: {}, k raised to 40 at epoch {}", EPOCHS, K_CHANGE_EPOCH);
    println!();

    let raise_k = ParameterOverrides {
        k: Some(40),
        ..Default::default()
    };
    let mut feed = ScheduledFeed::new()
        .at(1, EpochInputs::with_growth(50))
        .at(2, EpochInputs::with_growth(50))
        .at(K_CHANGE_EPOCH, EpochInputs::with_overrides(raise_k))
        .through(EPOCHS as u64 - 1);

    let mut engine = EquilibriumEngine::new(config)?;
    let mut log = SnapshotLog::new();
    let summary = engine.run(&mut feed, &mut log, EPOCHS)?;

    println!("| Epoch | k  | Pools | Rounds | Converged | Delegated | Nakamoto | Mean reward |");
    println!("|-------|----|-------|--------|-----------|-----------|----------|-------------|");
    for s in &log.snapshots {
        println!(
            "| {:>5} | {:>2} | {:>5} | {:>6} | {:>9} | {:>8.1}% | {:>8} | {:>11.6} |",
            s.epoch,
            s.k,
            s.pool_count,
            s.iterations_used,
            if s.converged { "yes" } else { "no" },
            s.delegated_stake_fraction * 100.0,
            s.nakamoto_coefficient,
            s.mean_pool_reward
        );
    }
    println!();

    if let Some(last) = log.last() {
        println!("Final epoch:");
        println!("{}", "-".repeat(50));
        last.print();
    }
    println!();
    println!(
        "Committed {} epochs ({:?})",
        summary.epochs_committed, summary.termination
    );
    Ok(())
}
