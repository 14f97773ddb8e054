//! Equilibrium engine
//!
//! Drives the simulation epoch by epoch. Each epoch reconciles the population
//! with the feed's inputs, then runs asynchronous best-response rounds until
//! no agent moves or the iteration limit is hit, and finally commits a
//! snapshot to the reporter.
//!
//! ## Phases
//! `EpochStart -> BestResponseRound -> Converged | IterationLimitReached |
//! Interrupted -> EpochCommit -> EpochStart | Terminated`
//!
//! ## Best Response
//! Agents are visited in a seeded per-round permutation and always see the
//! latest state, including moves made earlier in the same round. A move is
//! accepted only when its gain strictly exceeds both the absolute threshold
//! and the relative threshold times the current utility. Among equal
//! utilities the earliest candidate wins, and the current strategy is always
//! enumerated first.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, trace, warn};

use crate::config::SimulationConfig;
use crate::error::{FeedError, Result};
use crate::explorer;
use crate::feed::{EpochInputs, InputFeed};
use crate::ordering;
use crate::population::{AgentId, AgentPopulation};
use crate::report::{AnomalyCounts, EpochSnapshot, EquilibriumStatus, Reporter};
use crate::state::GlobalState;
use crate::utility::{self, Evaluation};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnginePhase {
    EpochStart,
    BestResponseRound,
    Converged,
    IterationLimitReached,
    Interrupted,
    EpochCommit,
    Terminated,
}

impl EnginePhase {
    pub fn name(&self) -> &'static str {
        match self {
            Self::EpochStart => "epoch start",
            Self::BestResponseRound => "best-response round",
            Self::Converged => "converged",
            Self::IterationLimitReached => "iteration limit reached",
            Self::Interrupted => "interrupted",
            Self::EpochCommit => "epoch commit",
            Self::Terminated => "terminated",
        }
    }
}

/// Shared stop request. Checked before every round and every epoch, so the
/// state is never left halfway through a round.
#[derive(Clone, Debug, Default)]
pub struct CancellationFlag {
    flag: Arc<AtomicBool>,
}

impl CancellationFlag {
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RoundOutcome {
    pub round: usize,
    pub moves: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Termination {
    EpochsCompleted,
    Cancelled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunSummary {
    pub epochs_committed: usize,
    pub last_epoch: Option<u64>,
    pub termination: Termination,
}

pub struct EquilibriumEngine {
    state: GlobalState,
    phase: EnginePhase,
    next_epoch: u64,
    epochs_begun: usize,
    rounds: usize,
    anomalies: AnomalyCounts,
    repairs: usize,
    cancel: CancellationFlag,
}

impl EquilibriumEngine {
    /// Engine starting from an empty population, grown to `n` in the first
    /// epoch. Fails if the configuration is invalid.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        Self::with_population(config, AgentPopulation::new())
    }

    pub fn with_population(config: SimulationConfig, population: AgentPopulation) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            state: GlobalState::new(0, population, config),
            phase: EnginePhase::EpochStart,
            next_epoch: 0,
            epochs_begun: 0,
            rounds: 0,
            anomalies: AnomalyCounts::default(),
            repairs: 0,
            cancel: CancellationFlag::default(),
        })
    }

    pub fn cancellation(&self) -> CancellationFlag {
        self.cancel.clone()
    }

    pub fn phase(&self) -> EnginePhase {
        self.phase
    }

    pub fn state(&self) -> &GlobalState {
        &self.state
    }

    pub fn rounds(&self) -> usize {
        self.rounds
    }

    /// Pulls the next epoch's inputs and reconciles the population with them.
    pub fn begin_epoch(&mut self, feed: &mut impl InputFeed) -> Result<()> {
        self.phase = EnginePhase::EpochStart;
        let epoch = self.next_epoch;
        let inputs = feed.inputs_for(epoch)?;
        let parameters = self.epoch_parameters(epoch, &inputs)?;
        let first = self.epochs_begun == 0;

        let current = self.state.population.len();
        let requested = if first { Some(parameters.n) } else { inputs.overrides.n };
        let grown = if first {
            current
        } else {
            current + inputs.agent_count_delta
        };
        let target = match requested {
            Some(requested) if requested < current => {
                return Err(FeedError::PopulationShrink {
                    epoch,
                    current,
                    requested,
                }
                .into());
            }
            Some(requested) => grown.max(requested),
            None => grown,
        };

        let mut rng = ordering::population_rng(parameters.seed, epoch);
        let population = &mut self.state.population;
        // a new distribution re-stakes everyone who already exists
        if !first && inputs.stake_distribution.is_some() {
            population
                .reassign_stakes(&parameters.stake_distribution, &mut rng)
                .map_err(|source| FeedError::InvalidParameters { epoch, source })?;
        }
        population
            .grow(target - current, &parameters.recruitment(), &mut rng)
            .map_err(|source| FeedError::InvalidParameters { epoch, source })?;
        if population.normalize(parameters.active_stake()).is_none() {
            warn!("Epoch {}: population holds no stake to normalize", epoch);
        }
        let repairs = population.repair_strategies(parameters.min_pledge, parameters.max_pools);
        if repairs > 0 {
            warn!("Epoch {}: repaired {} strategies", epoch, repairs);
        }

        info!(
            "Epoch {} started: {} agents, k={}, a0={}",
            epoch,
            population.len(),
            parameters.k,
            parameters.a0
        );

        self.state.epoch = epoch;
        self.state.set_parameters(parameters);
        self.state.rebuild_pools();
        self.epochs_begun += 1;
        self.rounds = 0;
        self.anomalies = AnomalyCounts::default();
        self.repairs = repairs;
        self.phase = EnginePhase::BestResponseRound;
        Ok(())
    }

    /// Previous parameters with this epoch's overrides on top, re-validated.
    fn epoch_parameters(&self, epoch: u64, inputs: &EpochInputs) -> Result<SimulationConfig> {
        let mut parameters = self.state.parameters.with_overrides(&inputs.overrides);
        if let Some(distribution) = &inputs.stake_distribution {
            parameters.stake_distribution = distribution.clone();
        }
        if let Some(mix) = &inputs.agent_profile_mix {
            parameters.agent_profile_mix = mix.clone();
        }
        parameters
            .validate()
            .map_err(|source| FeedError::InvalidParameters { epoch, source })?;
        Ok(parameters)
    }

    pub fn run_round(&mut self) -> RoundOutcome {
        self.phase = EnginePhase::BestResponseRound;
        let round = self.rounds;
        let parameters = &self.state.parameters;
        let order = ordering::round_order(
            parameters.seed,
            self.state.epoch,
            round,
            self.state.population.len(),
        );

        self.state.rebuild_pools();
        let mut moves = 0;
        for id in order {
            if self.best_response(id) {
                moves += 1;
            }
        }

        self.rounds += 1;
        debug!(
            "Epoch {} round {}: {} moves, {} pools",
            self.state.epoch,
            round,
            moves,
            self.state.pool_count()
        );
        RoundOutcome { round, moves }
    }

    /// Lets one agent reconsider its strategy. Returns whether it moved.
    fn best_response(&mut self, id: AgentId) -> bool {
        let Some(agent) = self.state.population.get(id).cloned() else {
            return false;
        };
        let candidates = explorer::candidate_strategies(&self.state, &agent);
        let evaluations = utility::evaluate_all(&self.state, &agent, &candidates);
        for eval in &evaluations {
            if let Some(anomaly) = eval.anomaly {
                self.anomalies.record(anomaly);
            }
        }

        let current = match evaluations.first() {
            Some(first) if first.strategy == agent.strategy => *first,
            _ => {
                let eval = utility::evaluate(&self.state, &agent, &agent.strategy);
                if let Some(anomaly) = eval.anomaly {
                    self.anomalies.record(anomaly);
                }
                eval
            }
        };

        let mut best: Evaluation = current;
        for eval in &evaluations {
            if eval.utility > best.utility {
                best = *eval;
            }
        }
        if best.strategy == agent.strategy {
            return false;
        }

        let parameters = &self.state.parameters;
        let gain = best.utility - current.utility;
        let clears_absolute = gain > parameters.absolute_utility_threshold;
        let clears_relative = gain > parameters.relative_utility_threshold * current.utility.abs();
        if !(clears_absolute && clears_relative) {
            return false;
        }

        trace!(
            "Agent {}: {} -> {} (gain {:.3e})",
            id,
            agent.strategy.kind().name(),
            best.strategy.kind().name(),
            gain
        );
        self.state.apply_move(id, best.strategy);
        true
    }

    /// Runs rounds until a round without moves, the iteration limit, or a
    /// cancellation request.
    pub fn search_equilibrium(&mut self) -> EquilibriumStatus {
        let max_iterations = self.state.parameters.max_iterations;
        let status = loop {
            if self.cancel.is_cancelled() {
                break EquilibriumStatus::Interrupted;
            }
            if self.rounds >= max_iterations {
                warn!(
                    "Epoch {}: no equilibrium after {} rounds",
                    self.state.epoch, self.rounds
                );
                break EquilibriumStatus::IterationLimitReached;
            }
            if self.run_round().moves == 0 {
                break EquilibriumStatus::Converged;
            }
        };

        self.phase = match status {
            EquilibriumStatus::Converged => EnginePhase::Converged,
            EquilibriumStatus::IterationLimitReached => EnginePhase::IterationLimitReached,
            EquilibriumStatus::Interrupted => EnginePhase::Interrupted,
        };
        status
    }

    /// Captures the epoch's snapshot and advances to the next epoch.
    pub fn commit_epoch(&mut self, status: EquilibriumStatus) -> EpochSnapshot {
        self.phase = EnginePhase::EpochCommit;
        let snapshot = EpochSnapshot::capture(
            &self.state,
            status,
            self.rounds,
            self.anomalies,
            self.repairs,
        );

        if snapshot.anomalies.total() > 0 {
            warn!(
                "Epoch {}: {} numerical anomalies resolved to zero",
                snapshot.epoch,
                snapshot.anomalies.total()
            );
        }
        info!(
            "Epoch {} committed: {} pools, {} after {} rounds",
            snapshot.epoch,
            snapshot.pool_count,
            status.name(),
            snapshot.iterations_used
        );

        self.next_epoch = self.state.epoch + 1;
        self.phase = EnginePhase::EpochStart;
        snapshot
    }

    pub fn run_epoch(&mut self, feed: &mut impl InputFeed) -> Result<EpochSnapshot> {
        self.begin_epoch(feed)?;
        let status = self.search_equilibrium();
        Ok(self.commit_epoch(status))
    }

    /// Runs up to `epochs` epochs, reporting each committed snapshot.
    ///
    /// Feed and reporter errors abort the run. A cancelled epoch is still
    /// committed and reported before the run stops.
    pub fn run(
        &mut self,
        feed: &mut impl InputFeed,
        reporter: &mut impl Reporter,
        epochs: usize,
    ) -> Result<RunSummary> {
        let mut summary = RunSummary {
            epochs_committed: 0,
            last_epoch: None,
            termination: Termination::EpochsCompleted,
        };

        for _ in 0..epochs {
            if self.cancel.is_cancelled() {
                summary.termination = Termination::Cancelled;
                break;
            }
            let snapshot = self.run_epoch(feed)?;
            reporter.report(&snapshot)?;
            summary.epochs_committed += 1;
            summary.last_epoch = Some(snapshot.epoch);
            if snapshot.status == EquilibriumStatus::Interrupted {
                summary.termination = Termination::Cancelled;
                break;
            }
        }

        self.phase = EnginePhase::Terminated;
        Ok(summary)
    }

    /// Snapshot of the state as it stands, without committing the epoch.
    pub fn snapshot(&self) -> EpochSnapshot {
        let status = match self.phase {
            EnginePhase::Converged => EquilibriumStatus::Converged,
            EnginePhase::IterationLimitReached => EquilibriumStatus::IterationLimitReached,
            _ => EquilibriumStatus::Interrupted,
        };
        EpochSnapshot::capture(
            &self.state,
            status,
            self.rounds,
            self.anomalies,
            self.repairs,
        )
    }
}
