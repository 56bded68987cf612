//! Outbound event stream for rendering, audio, and UI collaborators.
//!
//! The core never calls into presentation code. It appends events to a
//! queue the external driver drains after each tick.

use crate::round::RoundPhase;
use crate::state::{AgentId, Direction, GridPos};

/// One simulation-visible occurrence. Ordering within a tick is the order
/// things actually happened.
#[derive(Clone, Debug, PartialEq)]
pub enum SimEvent {
    /// The round state machine entered a new phase.
    PhaseEntered { phase: RoundPhase, round: u32 },

    /// A new stage finished building.
    StageBuilt {
        stage_index: u32,
        segments: usize,
        objective: Option<GridPos>,
    },

    AgentSpawned {
        agent: AgentId,
        position: GridPos,
    },
    AgentMoved {
        agent: AgentId,
        from: GridPos,
        to: GridPos,
    },
    AgentDamaged {
        agent: AgentId,
        amount: u32,
        remaining: u32,
    },
    AgentDied {
        agent: AgentId,
        position: GridPos,
    },
    /// An enemy became aware of the player.
    AgentAlerted {
        agent: AgentId,
        /// Alerted by a nearby ally's shout rather than by sight.
        by_shout: bool,
    },

    AttackLanded {
        attacker: AgentId,
        facing: Direction,
        /// Every cell the swing touched, for effect placement.
        cells: Vec<GridPos>,
    },

    PickupSpawned {
        name: String,
        position: GridPos,
    },
    PickupCollected {
        name: String,
        position: GridPos,
    },

    /// Cells to decorate with movement or attack indicators while the
    /// player is choosing.
    IndicatorCells {
        agent: AgentId,
        cells: Vec<GridPos>,
    },

    WeaponDiscarded {
        agent: AgentId,
        weapon: String,
    },
}
