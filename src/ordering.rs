//! Per-round agent processing order
//!
//! Each best-response round visits the agents in a fresh permutation. The
//! permutation is a pure function of `(seed, epoch, round)`: a ChaCha8 stream
//! keyed by the seed, selected by the epoch and positioned by the round, then
//! a Fisher-Yates shuffle. No process-wide random source is involved.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::population::AgentId;

/// ChaCha word-position stride between rounds; one round never consumes
/// anywhere near 2^36 words.
const ROUND_STRIDE_BITS: u32 = 36;

/// Stream reserved for population sampling, disjoint from every epoch stream.
const POPULATION_STREAM: u64 = 1 << 63;

pub fn round_order(seed: u64, epoch: u64, round: usize, agent_count: usize) -> Vec<AgentId> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(epoch & !POPULATION_STREAM);
    rng.set_word_pos((round as u128) << ROUND_STRIDE_BITS);

    let mut order: Vec<AgentId> = (0..agent_count).collect();
    order.shuffle(&mut rng);
    order
}

/// Generator for the agents created or re-staked at the start of `epoch`.
pub fn population_rng(seed: u64, epoch: u64) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(POPULATION_STREAM | epoch);
    rng
}
