//! Reward Curve Binary
//!
//! Prints gross pool reward against pool stake for several pledge levels,
//! for each supported reward curve. Rewards stop growing at saturation.
//!
//! ## Usage
//! ```bash
//! cargo run --bin reward_curve --release
//! ```

use rss_simulation::rss::{RewardFunction, RewardSharingScheme};
use rss_simulation::SimulationConfig;

const STAKE_STEPS: [f64; 8] = [0.125, 0.25, 0.5, 0.75, 1.0, 1.25, 1.5, 2.0];
const PLEDGE_LEVELS: [f64; 4] = [0.0, 0.1, 0.5, 1.0];

fn main() {
    let config = SimulationConfig::default();

    println!("=======================================================");
    println!("  Reward Sharing Scheme Curves");
    println!("  k = {}, a0 = {}", config.k, config.a0);
    println!("=======================================================");
    println!();

    for function in RewardFunction::all() {
        let rss = RewardSharingScheme {
            function,
            ..config.scheme()
        };
        let saturation = rss.saturation_threshold();

        println!("Reward curve: {}", function.name());
        println!("{}", "-".repeat(50));
        print!("| Stake / sat |");
        for pledge in PLEDGE_LEVELS {
            print!(" pledge {:>4.0}% |", pledge * 100.0);
        }
        println!();
        print!("|-------------|");
        for _ in PLEDGE_LEVELS {
            print!("--------------|");
        }
        println!();

        for step in STAKE_STEPS {
            let stake = saturation * step;
            print!("| {:>11.3} |", step);
            for level in PLEDGE_LEVELS {
                let pledge = (saturation * level).min(stake);
                let reward = rss.gross_reward(stake, pledge).unwrap_or(0.0);
                print!(" {:>12.3e} |", reward);
            }
            println!();
        }
        println!();
    }
}
