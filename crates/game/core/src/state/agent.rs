use crate::combat::Weapon;

use super::{AgentId, Direction, GridPos, ResourceMeter};

/// Movement temperament the turn planner uses for an enemy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ApproachKind {
    /// Spread out to enable more simultaneous attackers.
    #[default]
    Spread,
    /// Beeline at the player regardless of crowding.
    Direct,
}

/// Which side of the board an agent fights for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[strum(serialize_all = "snake_case")]
pub enum Faction {
    Player,
    Enemy,
}

/// Stage of a multi-tick attack. The external driver advances one stage
/// boundary at a time; the core never suspends mid-computation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AttackStage {
    Windup,
    Resolve,
    Recover,
}

/// Explicit multi-tick action phase: a current-progress counter resumed
/// on the next tick by the same driver, so nothing suspends mid-update.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ActionPhase {
    #[default]
    Idle,
    /// Moving one cell toward `to`; resolves when `progress` reaches the
    /// configured ticks-per-cell.
    Moving { to: GridPos, progress: u32 },
    /// Attacking along `facing` at `range`.
    Attacking {
        facing: Direction,
        range: u8,
        stage: AttackStage,
        progress: u32,
    },
}

impl ActionPhase {
    pub fn is_idle(&self) -> bool {
        matches!(self, ActionPhase::Idle)
    }
}

/// One agent on the board: the player or an enemy.
///
/// Agents are created by the spawn allocator (enemies) or stage setup
/// (player) and marked dead rather than removed mid-round, so roster
/// indices held by the enemy phase stay valid.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Agent {
    pub id: AgentId,
    pub faction: Faction,
    pub position: GridPos,
    pub health: ResourceMeter,
    pub move_points: u32,
    pub move_points_max: u32,
    /// Carried weapons. Empty means unarmed; the active weapon is always
    /// `weapons[active_weapon]` when non-empty.
    pub weapons: Vec<Weapon>,
    pub active_weapon: usize,
    /// Enemy only: aware of the player and eligible to act this round.
    pub alert: bool,
    /// The one non-move action this round has been spent.
    pub action_done: bool,
    pub phase: ActionPhase,
    /// Enemy only: how the turn planner positions this agent.
    pub approach: ApproachKind,
}

impl Agent {
    pub fn new(id: AgentId, faction: Faction, position: GridPos, health_max: u32) -> Self {
        Self {
            id,
            faction,
            position,
            health: ResourceMeter::full(health_max),
            move_points: 0,
            move_points_max: 4,
            weapons: Vec::new(),
            active_weapon: 0,
            alert: false,
            action_done: false,
            phase: ActionPhase::Idle,
            approach: ApproachKind::default(),
        }
    }

    pub fn with_approach(mut self, approach: ApproachKind) -> Self {
        self.approach = approach;
        self
    }

    pub fn with_move_points(mut self, max: u32) -> Self {
        self.move_points_max = max;
        self.move_points = max;
        self
    }

    pub fn with_weapon(mut self, weapon: Weapon) -> Self {
        self.weapons.push(weapon);
        self.active_weapon = self.weapons.len() - 1;
        self
    }

    pub fn is_alive(&self) -> bool {
        !self.health.is_empty()
    }

    /// The equipped weapon, or `None` when fighting unarmed.
    pub fn weapon(&self) -> Option<&Weapon> {
        self.weapons.get(self.active_weapon)
    }

    pub fn weapon_mut(&mut self) -> Option<&mut Weapon> {
        self.weapons.get_mut(self.active_weapon)
    }

    /// Cycles the active weapon slot. No-op when carrying fewer than two.
    pub fn switch_weapon(&mut self) {
        if self.weapons.len() > 1 {
            self.active_weapon = (self.active_weapon + 1) % self.weapons.len();
        }
    }

    /// Drops the active weapon entirely. The agent falls back to unarmed
    /// strikes until another weapon is picked up.
    pub fn discard_weapon(&mut self) -> Option<Weapon> {
        if self.weapons.is_empty() {
            return None;
        }
        let dropped = self.weapons.remove(self.active_weapon);
        if self.active_weapon >= self.weapons.len() {
            self.active_weapon = 0;
        }
        Some(dropped)
    }

    /// Resets per-round counters ahead of this agent's turn.
    pub fn round_prep(&mut self) {
        self.move_points = self.move_points_max;
        self.action_done = false;
        self.phase = ActionPhase::Idle;
    }
}
