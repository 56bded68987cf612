//! Embedding driver for the dungeon simulation.
//!
//! Wraps [`RoundStateMachine`] with a seeded deterministic RNG and a small
//! control surface for frontends: feed one [`PlayerIntent`] per tick, drain
//! the accumulated event queue, and raise out-of-band notifications such as
//! objective completion or a pending level-up menu. All randomness flows
//! through the stored generator, so a given seed and intent script always
//! replays the same run.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crawl_core::{
    PlayerIntent, RoundError, RoundPhase, RoundStateMachine, SimConfig, SimEvent, Stage,
    StageContent,
};

/// Errors surfaced to the embedding frontend.
#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error(transparent)]
    Round(#[from] RoundError),
}

pub type Result<T> = std::result::Result<T, SimulationError>;

/// Installs a tracing subscriber honoring `RUST_LOG`. Call once at startup;
/// later calls are ignored.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

/// A running simulation: the round state machine plus its seeded RNG.
pub struct Simulation {
    machine: RoundStateMachine,
    rng: ChaCha8Rng,
    seed: u64,
}

impl Simulation {
    pub fn new(config: SimConfig, content: StageContent, seed: u64) -> Result<Self> {
        let machine = RoundStateMachine::new(config, content)?;
        tracing::info!(seed, "simulation created");
        Ok(Self {
            machine,
            rng: ChaCha8Rng::seed_from_u64(seed),
            seed,
        })
    }

    /// A simulation over the built-in content catalog with default tuning.
    pub fn builtin(seed: u64) -> Result<Self> {
        Self::new(
            SimConfig::default(),
            crawl_content::builtin::stage_content(),
            seed,
        )
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn phase(&self) -> RoundPhase {
        self.machine.phase()
    }

    pub fn stage(&self) -> &Stage {
        self.machine.stage()
    }

    pub fn experience(&self) -> u32 {
        self.machine.experience()
    }

    /// Advances the simulation by one tick.
    pub fn tick(&mut self, intent: PlayerIntent) -> Result<RoundPhase> {
        let before = self.machine.phase();
        let after = self.machine.tick(intent, &mut self.rng)?;
        if after != before {
            tracing::debug!(from = %before, to = %after, "phase transition");
        }
        Ok(after)
    }

    /// Runs idle ticks until the machine reaches `phase` or `limit` ticks
    /// elapse. Returns true when the phase was reached.
    pub fn run_until(&mut self, phase: RoundPhase, limit: u32) -> Result<bool> {
        for _ in 0..limit {
            if self.machine.phase() == phase {
                return Ok(true);
            }
            self.tick(PlayerIntent::NONE)?;
        }
        Ok(self.machine.phase() == phase)
    }

    /// Hands the accumulated event queue to the caller.
    pub fn drain_events(&mut self) -> Vec<SimEvent> {
        self.machine.drain_events()
    }

    /// Tears the current stage down and rearms for the next one. Legal in
    /// any phase; the next tick rebuilds.
    pub fn new_stage(&mut self) {
        tracing::info!(
            completed = self.machine.stage().index,
            "advancing to the next stage"
        );
        self.machine.new_stage();
    }

    // ----- notification latches -----

    /// The player reached the stage objective. Consumed at the next win
    /// checkpoint; duplicates within a stage are ignored.
    pub fn objective_reached(&mut self, xp: u32) {
        self.machine.notifications().objective_reached(xp);
    }

    /// The player was defeated. Consumed at the next lose checkpoint.
    pub fn player_defeated(&mut self) {
        self.machine.notifications().player_defeated();
    }

    /// A level-up menu is open. The end-of-round gate holds until resolved.
    pub fn level_up_pending(&mut self) {
        self.machine.notifications().level_up_pending();
    }

    pub fn level_ups_resolved(&mut self) {
        self.machine.notifications().level_ups_resolved();
    }
}
