//! Round and stage orchestration.
//!
//! One stage runs as a cycle of phases: the player's turn, a win
//! checkpoint, every eligible enemy's turn, a lose checkpoint, and an
//! end-of-round gate for pending level-ups. Win and lose conditions arrive
//! as latched notifications and are consumed only at the checkpoint
//! states, so an out-of-phase notification can never desynchronize the
//! cycle.

use std::collections::VecDeque;

use rand::Rng;

use crate::ai::{EnemyTurnPlanner, TurnPlan};
use crate::combat::{Weapon, WeaponSpec};
use crate::config::SimConfig;
use crate::events::SimEvent;
use crate::level::{LevelGraph, LevelGraphBuilder, SegmentTemplate};
use crate::spawn::{EnemyArchetype, LootArchetype, LootKind, Pickup, SpawnAllocator};
use crate::state::{
    ActionPhase, Agent, AgentId, AttackStage, Direction, Faction, GridPos, PlayerIntent,
};

/// The phases of one stage cycle. `StageComplete` and `StageFailed` are
/// absorbing until [`RoundStateMachine::new_stage`] is called.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum RoundPhase {
    StageInit,
    PlayerActive,
    PlayerWinCheck,
    EnemyActive,
    PlayerLoseCheck,
    EndRound,
    StageComplete,
    StageFailed,
}

/// Errors that can occur while driving a stage.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RoundError {
    #[error("content catalog has no segment templates")]
    EmptyCatalog,
    #[error("end cap index {end_cap} is out of bounds for {templates} templates")]
    EndCapOutOfBounds { end_cap: usize, templates: usize },
    #[error("generated level has no walkable cells")]
    NoWalkableCells,
}

/// Latched out-of-band signals from external collaborators (and from the
/// simulation itself). Raising one never changes the phase directly; the
/// checkpoint states consume them in order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Notifications {
    objective_xp: Option<u32>,
    defeated: bool,
    level_up_pending: bool,
}

impl Notifications {
    /// The player reached the stage objective. The first notification wins;
    /// duplicates within a stage are ignored.
    pub fn objective_reached(&mut self, xp: u32) {
        self.objective_xp.get_or_insert(xp);
    }

    pub fn player_defeated(&mut self) {
        self.defeated = true;
    }

    pub fn level_up_pending(&mut self) {
        self.level_up_pending = true;
    }

    pub fn level_ups_resolved(&mut self) {
        self.level_up_pending = false;
    }

    pub fn is_level_up_pending(&self) -> bool {
        self.level_up_pending
    }

    fn take_objective(&mut self) -> Option<u32> {
        self.objective_xp.take()
    }

    fn take_defeated(&mut self) -> bool {
        std::mem::take(&mut self.defeated)
    }

    /// Drops stage-scoped latches. A pending level-up survives into the
    /// next stage so its menu still gets shown.
    fn clear_stage(&mut self) {
        self.objective_xp = None;
        self.defeated = false;
    }
}

/// Everything the stage builder draws from: authored templates and
/// archetype catalogs plus the player's starting kit.
#[derive(Clone, Debug)]
pub struct StageContent {
    pub templates: Vec<SegmentTemplate>,
    /// Index of the universal end-cap template.
    pub end_cap: usize,
    pub enemies: Vec<EnemyArchetype>,
    pub loot: Vec<LootArchetype>,
    pub player_health: u32,
    pub player_move_points: u32,
    pub player_weapon: WeaponSpec,
    /// Experience granted when the objective is reached.
    pub objective_xp: u32,
}

/// Per-stage simulation state.
#[derive(Debug, Default)]
pub struct Stage {
    /// 1-based stage counter driving the difficulty curve.
    pub index: u32,
    /// 1-based round counter within the stage.
    pub round: u32,
    pub level: LevelGraph,
    pub agents: Vec<Agent>,
    pub pickups: Vec<Pickup>,
}

impl Stage {
    pub fn player(&self) -> Option<&Agent> {
        self.agents.iter().find(|a| a.id == AgentId::PLAYER)
    }

    pub fn living_enemies(&self) -> impl Iterator<Item = &Agent> {
        self.agents
            .iter()
            .filter(|a| a.faction == Faction::Enemy && a.is_alive())
    }

    /// Drops every per-stage collection. Partial clears leak stale links
    /// into the next stage, so everything goes at once.
    fn clear(&mut self) {
        self.round = 0;
        self.level.clear();
        self.agents.clear();
        self.pickups.clear();
    }
}

struct ActivePlan {
    agent: AgentId,
    plan: TurnPlan,
}

/// Drives the phase cycle. The external driver calls [`tick`] once per
/// simulation tick with the player's current intent.
///
/// [`tick`]: RoundStateMachine::tick
pub struct RoundStateMachine {
    config: SimConfig,
    content: StageContent,
    phase: RoundPhase,
    stage: Stage,
    notifications: Notifications,
    events: Vec<SimEvent>,
    roster: Vec<AgentId>,
    roster_index: usize,
    active_plan: Option<ActivePlan>,
    next_agent_id: u32,
    experience: u32,
}

impl RoundStateMachine {
    pub fn new(config: SimConfig, content: StageContent) -> Result<Self, RoundError> {
        if content.templates.is_empty() {
            return Err(RoundError::EmptyCatalog);
        }
        if content.end_cap >= content.templates.len() {
            return Err(RoundError::EndCapOutOfBounds {
                end_cap: content.end_cap,
                templates: content.templates.len(),
            });
        }
        Ok(Self {
            config,
            content,
            phase: RoundPhase::StageInit,
            stage: Stage {
                index: 1,
                ..Stage::default()
            },
            notifications: Notifications::default(),
            events: Vec::new(),
            roster: Vec::new(),
            roster_index: 0,
            active_plan: None,
            next_agent_id: 1,
            experience: 0,
        })
    }

    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    pub fn stage(&self) -> &Stage {
        &self.stage
    }

    pub fn experience(&self) -> u32 {
        self.experience
    }

    /// Latch surface for external collaborators.
    pub fn notifications(&mut self) -> &mut Notifications {
        &mut self.notifications
    }

    /// Hands the accumulated event queue to the caller.
    pub fn drain_events(&mut self) -> Vec<SimEvent> {
        std::mem::take(&mut self.events)
    }

    /// Tears the stage down and rearms the machine. Legal from any phase;
    /// the next tick rebuilds.
    pub fn new_stage(&mut self) {
        self.stage.clear();
        self.stage.index += 1;
        self.roster.clear();
        self.roster_index = 0;
        self.active_plan = None;
        self.events.clear();
        self.notifications.clear_stage();
        self.next_agent_id = 1;
        self.phase = RoundPhase::StageInit;
    }

    /// Advances the simulation by one tick.
    pub fn tick<R: Rng>(
        &mut self,
        intent: PlayerIntent,
        rng: &mut R,
    ) -> Result<RoundPhase, RoundError> {
        match self.phase {
            RoundPhase::StageInit => {
                self.build_stage(rng)?;
                if self.notifications.is_level_up_pending() {
                    // Resolve the upgrade menu before the first round.
                    self.enter(RoundPhase::EndRound);
                } else {
                    self.enter(RoundPhase::PlayerActive);
                }
            }
            RoundPhase::PlayerActive => {
                if self.player_tick(intent) {
                    self.enter(RoundPhase::PlayerWinCheck);
                }
            }
            RoundPhase::PlayerWinCheck => {
                if let Some(xp) = self.notifications.take_objective() {
                    self.experience += xp;
                    self.enter(RoundPhase::StageComplete);
                } else {
                    self.enter_enemy_phase();
                    self.enter(RoundPhase::EnemyActive);
                }
            }
            RoundPhase::EnemyActive => {
                if self.enemy_tick(rng) {
                    self.enter(RoundPhase::PlayerLoseCheck);
                }
            }
            RoundPhase::PlayerLoseCheck => {
                let player_dead = self.stage.player().map_or(true, |p| !p.is_alive());
                if self.notifications.take_defeated() || player_dead {
                    self.enter(RoundPhase::StageFailed);
                } else {
                    self.enter(RoundPhase::EndRound);
                }
            }
            RoundPhase::EndRound => {
                // Held here while a level-up menu is open.
                if !self.notifications.is_level_up_pending() {
                    self.stage.round += 1;
                    if let Some(idx) = self.agent_index(AgentId::PLAYER) {
                        self.stage.agents[idx].round_prep();
                    }
                    self.enter(RoundPhase::PlayerActive);
                }
            }
            RoundPhase::StageComplete | RoundPhase::StageFailed => {}
        }
        Ok(self.phase)
    }

    fn enter(&mut self, phase: RoundPhase) {
        self.phase = phase;
        self.events.push(SimEvent::PhaseEntered {
            phase,
            round: self.stage.round,
        });
    }

    fn agent_index(&self, id: AgentId) -> Option<usize> {
        self.stage.agents.iter().position(|a| a.id == id)
    }

    fn player_position(&self) -> Option<GridPos> {
        self.stage.player().map(|p| p.position)
    }

    fn occupied_by_living(&self, cell: GridPos, except: AgentId) -> bool {
        self.stage
            .agents
            .iter()
            .any(|a| a.id != except && a.is_alive() && a.position == cell)
    }

    // ----- stage construction -----

    fn build_stage<R: Rng>(&mut self, rng: &mut R) -> Result<(), RoundError> {
        let (placed, report) = LevelGraphBuilder::new(
            &self.config,
            &self.content.templates,
            self.content.end_cap,
        )
        .build(rng);

        let hub = placed[0];
        let start_cell = self.content.templates[hub.template]
            .center_floor_cell()
            .map(|(x, y)| hub.offset.offset(x, y));

        self.stage.level =
            LevelGraph::assemble(&self.content.templates, placed, report.objective_cell);
        let start = start_cell
            .or_else(|| self.stage.level.nav.positions().next())
            .ok_or(RoundError::NoWalkableCells)?;

        self.events.push(SimEvent::StageBuilt {
            stage_index: self.stage.index,
            segments: self.stage.level.segments.len(),
            objective: self.stage.level.objective,
        });

        let player = Agent::new(AgentId::PLAYER, Faction::Player, start, self.content.player_health)
            .with_move_points(self.content.player_move_points)
            .with_weapon(Weapon::from_spec(&self.content.player_weapon));
        self.events.push(SimEvent::AgentSpawned {
            agent: player.id,
            position: start,
        });
        self.stage.agents.push(player);
        // Nothing else spawns under the player's feet.
        if let Some(node) = self.stage.level.nav.node_at(start) {
            self.stage.level.spawn_points.retain(|&n| n != node);
        }

        let allocator = SpawnAllocator::new(&self.config);
        let (pickups, _) = allocator.allocate_loot(
            &mut self.stage.level,
            &self.content.loot,
            self.config.difficulty.loot_budget(self.stage.index),
            start,
            rng,
        );
        for pickup in &pickups {
            self.events.push(SimEvent::PickupSpawned {
                name: pickup.name.clone(),
                position: pickup.position,
            });
        }
        self.stage.pickups = pickups;

        let (enemies, _) = allocator.allocate_enemies(
            &mut self.stage.level,
            &self.content.enemies,
            self.config.difficulty.enemy_budget(self.stage.index),
            self.config.difficulty.enemy_strength(self.stage.index),
            start,
            &mut self.next_agent_id,
            rng,
        );
        for enemy in &enemies {
            self.events.push(SimEvent::AgentSpawned {
                agent: enemy.id,
                position: enemy.position,
            });
        }
        self.stage.agents.extend(enemies);

        self.stage.round = 1;
        if let Some(idx) = self.agent_index(AgentId::PLAYER) {
            self.stage.agents[idx].round_prep();
        }
        Ok(())
    }

    // ----- player turn -----

    /// One tick of the player's turn. Returns true when the turn is over.
    fn player_tick(&mut self, intent: PlayerIntent) -> bool {
        let Some(pidx) = self.agent_index(AgentId::PLAYER) else {
            tracing::error!("no player agent on the board");
            return true;
        };
        if !self.stage.agents[pidx].is_alive() {
            return true;
        }

        match self.stage.agents[pidx].phase {
            ActionPhase::Moving { .. } => {
                if self.advance_move(pidx) {
                    self.collect_pickup(pidx);
                    let pos = self.stage.agents[pidx].position;
                    if self.stage.level.objective == Some(pos) {
                        self.notifications
                            .objective_reached(self.content.objective_xp);
                    }
                }
                false
            }
            ActionPhase::Attacking { .. } => {
                self.advance_attack(pidx);
                false
            }
            ActionPhase::Idle => self.player_idle(pidx, intent),
        }
    }

    fn player_idle(&mut self, pidx: usize, intent: PlayerIntent) -> bool {
        if intent.switch_weapon {
            self.stage.agents[pidx].switch_weapon();
        }
        if intent.discard_weapon {
            if let Some(weapon) = self.stage.agents[pidx].discard_weapon() {
                self.events.push(SimEvent::WeaponDiscarded {
                    agent: AgentId::PLAYER,
                    weapon: weapon.name,
                });
            }
        }

        if intent.confirm {
            if let Some(facing) = intent.direction {
                if !self.stage.agents[pidx].action_done {
                    self.begin_player_attack(pidx, facing);
                }
            }
            return false;
        }

        if let Some(direction) = intent.direction {
            self.try_player_move(pidx, direction);
            return false;
        }

        let agent = &self.stage.agents[pidx];
        intent.cancel || (agent.action_done && agent.move_points == 0)
    }

    fn try_player_move(&mut self, pidx: usize, direction: Direction) {
        let position = self.stage.agents[pidx].position;
        if self.stage.level.nav.node_at(position).is_none() {
            tracing::error!(
                %position,
                "player stands on a cell with no navigation node"
            );
            return;
        }
        if self.stage.agents[pidx].move_points == 0 {
            return;
        }
        let to = position.step(direction);
        if self.stage.level.nav.node_at(to).is_some()
            && !self.occupied_by_living(to, AgentId::PLAYER)
        {
            self.stage.agents[pidx].phase = ActionPhase::Moving { to, progress: 0 };
        }
    }

    fn begin_player_attack(&mut self, pidx: usize, facing: Direction) {
        let weapon = self.stage.agents[pidx]
            .weapon()
            .cloned()
            .unwrap_or_else(Weapon::unarmed);
        let origin = self.stage.agents[pidx].position;
        let (dx, dy) = facing.delta();

        // First range along the axis whose swing reaches a living enemy;
        // ranges past a wall are never selectable.
        let mut range = weapon.range_min;
        for candidate in weapon.range_min..=weapon.range_max {
            let aim = origin.offset(dx * i32::from(candidate), dy * i32::from(candidate));
            if self.stage.level.nav.node_at(aim).is_none() {
                break;
            }
            let hits_enemy = weapon.hit_cells(origin, facing, candidate).iter().any(
                |&(cell, _)| {
                    self.stage
                        .agents
                        .iter()
                        .any(|a| a.faction == Faction::Enemy && a.is_alive() && a.position == cell)
                },
            );
            if hits_enemy {
                range = candidate;
                break;
            }
        }

        self.events.push(SimEvent::IndicatorCells {
            agent: AgentId::PLAYER,
            cells: weapon
                .hit_cells(origin, facing, range)
                .iter()
                .map(|&(cell, _)| cell)
                .collect(),
        });
        self.stage.agents[pidx].phase = ActionPhase::Attacking {
            facing,
            range,
            stage: AttackStage::Windup,
            progress: 0,
        };
    }

    // ----- enemy phase -----

    /// Builds the acting roster on entry to `EnemyActive`: every alert
    /// enemy, every enemy inside the camera window, and the shout cascade
    /// of the freshly alerted. Nearest to the player acts first.
    fn enter_enemy_phase(&mut self) {
        self.roster.clear();
        self.roster_index = 0;
        self.active_plan = None;
        let Some(player_pos) = self.player_position() else {
            return;
        };

        let mut fresh: VecDeque<usize> = VecDeque::new();
        for idx in 0..self.stage.agents.len() {
            let agent = &self.stage.agents[idx];
            if agent.faction != Faction::Enemy || !agent.is_alive() || agent.alert {
                continue;
            }
            let dx = agent.position.x - player_pos.x;
            let dy = agent.position.y - player_pos.y;
            if self.config.in_camera_window(dx, dy) {
                self.stage.agents[idx].alert = true;
                self.events.push(SimEvent::AgentAlerted {
                    agent: self.stage.agents[idx].id,
                    by_shout: false,
                });
                fresh.push_back(idx);
            }
        }

        while let Some(idx) = fresh.pop_front() {
            let shout_from = self.stage.agents[idx].position;
            for other in 0..self.stage.agents.len() {
                let agent = &self.stage.agents[other];
                if agent.faction != Faction::Enemy || !agent.is_alive() || agent.alert {
                    continue;
                }
                if agent.position.manhattan(shout_from) <= self.config.shout_radius {
                    self.stage.agents[other].alert = true;
                    self.events.push(SimEvent::AgentAlerted {
                        agent: self.stage.agents[other].id,
                        by_shout: true,
                    });
                    fresh.push_back(other);
                }
            }
        }

        let mut roster: Vec<(u32, AgentId)> = self
            .stage
            .agents
            .iter()
            .filter(|a| a.faction == Faction::Enemy && a.is_alive() && a.alert)
            .map(|a| (a.position.manhattan(player_pos), a.id))
            .collect();
        roster.sort();
        self.roster = roster.into_iter().map(|(_, id)| id).collect();
    }

    /// One tick of the enemy phase. Returns true once the roster is spent.
    fn enemy_tick<R: Rng>(&mut self, rng: &mut R) -> bool {
        loop {
            let Some(&id) = self.roster.get(self.roster_index) else {
                return true;
            };
            // Dead or missing entries are skipped without consuming a turn.
            let Some(idx) = self.agent_index(id) else {
                self.roster_index += 1;
                self.active_plan = None;
                continue;
            };
            if !self.stage.agents[idx].is_alive() {
                self.roster_index += 1;
                self.active_plan = None;
                continue;
            }

            if self.enemy_turn_tick(idx, rng) {
                self.roster_index += 1;
                self.active_plan = None;
            }
            return false;
        }
    }

    /// One tick of a single enemy's turn. Returns true when the turn ends.
    fn enemy_turn_tick<R: Rng>(&mut self, idx: usize, rng: &mut R) -> bool {
        match self.stage.agents[idx].phase {
            ActionPhase::Moving { .. } => {
                self.advance_move(idx);
                false
            }
            ActionPhase::Attacking { .. } => self.advance_attack(idx),
            ActionPhase::Idle => {
                let id = self.stage.agents[idx].id;
                if self.active_plan.as_ref().map(|p| p.agent) != Some(id) {
                    self.stage.agents[idx].round_prep();
                    let position = self.stage.agents[idx].position;
                    if self.stage.level.nav.node_at(position).is_none() {
                        tracing::error!(
                            agent = %id,
                            %position,
                            "agent stands on a cell with no navigation node; skipping its turn"
                        );
                        return true;
                    }
                    let plan = self.plan_enemy(idx, rng);
                    self.active_plan = Some(ActivePlan { agent: id, plan });
                }
                self.step_enemy_plan(idx, rng)
            }
        }
    }

    fn plan_enemy<R: Rng>(&mut self, idx: usize, rng: &mut R) -> TurnPlan {
        let Some(player_pos) = self.player_position() else {
            return TurnPlan::Hold;
        };
        let enemy = self.stage.agents[idx].clone();
        let others: Vec<Agent> = self
            .stage
            .agents
            .iter()
            .enumerate()
            .filter(|&(i, _)| i != idx)
            .map(|(_, a)| a.clone())
            .collect();
        let planner = EnemyTurnPlanner::for_approach(&self.config, enemy.approach);
        planner.plan(&enemy, player_pos, &others, &mut self.stage.level.nav, rng)
    }

    /// Advances the stored plan by one action. Returns true when the plan
    /// (and so the turn) is finished.
    fn step_enemy_plan<R: Rng>(&mut self, idx: usize, rng: &mut R) -> bool {
        let Some(mut active) = self.active_plan.take() else {
            return true;
        };
        let id = self.stage.agents[idx].id;

        let done = match &mut active.plan {
            TurnPlan::Hold => true,
            TurnPlan::Approach { path } => match path.peek_next() {
                Some(step) if self.stage.agents[idx].move_points > 0 => {
                    let to = self.stage.agents[idx].position.step(step);
                    // The board may have shifted since planning; yielding
                    // the rest of the turn is the fallback.
                    if self.occupied_by_living(to, id) {
                        true
                    } else {
                        path.pop_next();
                        self.stage.agents[idx].phase = ActionPhase::Moving { to, progress: 0 };
                        false
                    }
                }
                _ => true,
            },
            TurnPlan::AttackFrom { path, attack_from } => {
                let attack_from = *attack_from;
                if let Some(step) = path.peek_next() {
                    if self.stage.agents[idx].move_points == 0 {
                        true
                    } else {
                        let to = self.stage.agents[idx].position.step(step);
                        if self.occupied_by_living(to, id) {
                            true
                        } else {
                            path.pop_next();
                            self.stage.agents[idx].phase =
                                ActionPhase::Moving { to, progress: 0 };
                            false
                        }
                    }
                } else if self.stage.agents[idx].position != attack_from
                    || self.stage.agents[idx].action_done
                {
                    true
                } else {
                    !self.begin_enemy_attack(idx, rng)
                }
            }
        };

        if !done {
            self.active_plan = Some(active);
        }
        done
    }

    /// Re-resolves range against the player's current cell and starts the
    /// swing. Returns false when no range hits anymore.
    fn begin_enemy_attack<R: Rng>(&mut self, idx: usize, rng: &mut R) -> bool {
        let Some(player_pos) = self.player_position() else {
            return false;
        };
        let attacker = self.stage.agents[idx].clone();
        let others: Vec<Agent> = self
            .stage
            .agents
            .iter()
            .enumerate()
            .filter(|&(i, _)| i != idx)
            .map(|(_, a)| a.clone())
            .collect();
        let planner = EnemyTurnPlanner::for_approach(&self.config, attacker.approach);
        let Some(resolution) =
            planner.resolve_attack(&attacker, player_pos, &others, &self.stage.level.nav, rng)
        else {
            return false;
        };
        self.stage.agents[idx].phase = ActionPhase::Attacking {
            facing: resolution.facing,
            range: resolution.range,
            stage: AttackStage::Windup,
            progress: 0,
        };
        true
    }

    // ----- shared action phases -----

    /// Advances a Moving phase by one tick. Returns true when the move
    /// just committed.
    fn advance_move(&mut self, idx: usize) -> bool {
        let ActionPhase::Moving { to, progress } = self.stage.agents[idx].phase else {
            return false;
        };
        let progress = progress + 1;
        if progress < self.config.move_ticks {
            self.stage.agents[idx].phase = ActionPhase::Moving { to, progress };
            return false;
        }
        let from = self.stage.agents[idx].position;
        self.stage.agents[idx].position = to;
        self.stage.agents[idx].move_points = self.stage.agents[idx].move_points.saturating_sub(1);
        self.stage.agents[idx].phase = ActionPhase::Idle;
        self.events.push(SimEvent::AgentMoved {
            agent: self.stage.agents[idx].id,
            from,
            to,
        });
        true
    }

    /// Advances an Attacking phase by one tick. Damage lands on the
    /// windup-to-resolve boundary. Returns true when the swing is over.
    fn advance_attack(&mut self, idx: usize) -> bool {
        let ActionPhase::Attacking {
            facing,
            range,
            stage,
            progress,
        } = self.stage.agents[idx].phase
        else {
            return false;
        };
        let progress = progress + 1;
        if progress < self.config.attack_stage_ticks {
            self.stage.agents[idx].phase = ActionPhase::Attacking {
                facing,
                range,
                stage,
                progress,
            };
            return false;
        }
        match stage {
            AttackStage::Windup => {
                self.stage.agents[idx].phase = ActionPhase::Attacking {
                    facing,
                    range,
                    stage: AttackStage::Resolve,
                    progress: 0,
                };
                self.resolve_swing(idx, facing, range);
                false
            }
            AttackStage::Resolve => {
                self.stage.agents[idx].phase = ActionPhase::Attacking {
                    facing,
                    range,
                    stage: AttackStage::Recover,
                    progress: 0,
                };
                false
            }
            AttackStage::Recover => {
                self.stage.agents[idx].phase = ActionPhase::Idle;
                self.stage.agents[idx].action_done = true;
                true
            }
        }
    }

    fn resolve_swing(&mut self, idx: usize, facing: Direction, range: u8) {
        let attacker = self.stage.agents[idx].id;
        let origin = self.stage.agents[idx].position;
        let weapon = self.stage.agents[idx]
            .weapon()
            .cloned()
            .unwrap_or_else(Weapon::unarmed);

        if let Some(carried) = self.stage.agents[idx].weapon_mut() {
            carried.consume_ammo();
            if carried.is_spent() {
                if let Some(spent) = self.stage.agents[idx].discard_weapon() {
                    self.events.push(SimEvent::WeaponDiscarded {
                        agent: attacker,
                        weapon: spent.name,
                    });
                }
            }
        }

        let hits = weapon.hit_cells(origin, facing, range);
        self.events.push(SimEvent::AttackLanded {
            attacker,
            facing,
            cells: hits.iter().map(|&(cell, _)| cell).collect(),
        });

        for &(cell, damage) in &hits {
            for target in 0..self.stage.agents.len() {
                if target == idx
                    || !self.stage.agents[target].is_alive()
                    || self.stage.agents[target].position != cell
                {
                    continue;
                }
                let removed = self.stage.agents[target].health.deplete(damage);
                self.events.push(SimEvent::AgentDamaged {
                    agent: self.stage.agents[target].id,
                    amount: removed,
                    remaining: self.stage.agents[target].health.current,
                });
                if !self.stage.agents[target].is_alive() {
                    self.events.push(SimEvent::AgentDied {
                        agent: self.stage.agents[target].id,
                        position: cell,
                    });
                    if self.stage.agents[target].id == AgentId::PLAYER {
                        self.notifications.player_defeated();
                    }
                }
            }
        }
    }

    fn collect_pickup(&mut self, pidx: usize) {
        let position = self.stage.agents[pidx].position;
        let Some(found) = self
            .stage
            .pickups
            .iter()
            .position(|p| p.position == position)
        else {
            return;
        };
        let pickup = self.stage.pickups.remove(found);
        match &pickup.kind {
            LootKind::Health(amount) => {
                self.stage.agents[pidx].health.restore(*amount);
            }
            LootKind::Armor(amount) => {
                let health = &mut self.stage.agents[pidx].health;
                health.maximum += amount;
                health.restore(*amount);
            }
            LootKind::Ammo(amount) => {
                if let Some(weapon) = self.stage.agents[pidx].weapon_mut() {
                    if let Some(ammo) = weapon.ammo.as_mut() {
                        *ammo += amount;
                    }
                }
            }
            LootKind::Weapon(spec) => {
                let weapon = Weapon::from_spec(spec);
                self.stage.agents[pidx].weapons.push(weapon);
                self.stage.agents[pidx].active_weapon = self.stage.agents[pidx].weapons.len() - 1;
            }
        }
        self.events.push(SimEvent::PickupCollected {
            name: pickup.name,
            position,
        });
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::config::TaperTier;
    use crate::level::{ExitFlags, PlacedSegment};

    fn catalog(dim: i32) -> (Vec<SegmentTemplate>, usize) {
        let open = |exits| SegmentTemplate::new("t", dim, exits, vec![true; (dim * dim) as usize]);
        let templates = vec![
            open(ExitFlags::all()),
            open(ExitFlags::LEFT | ExitFlags::RIGHT),
            open(ExitFlags::DOWN),
            open(ExitFlags::empty()),
        ];
        (templates, 3)
    }

    fn config() -> SimConfig {
        SimConfig {
            segment_dim: 4,
            taper: vec![
                TaperTier::new(4, 2, 4),
                TaperTier::new(6, 1, 3),
                TaperTier::new(8, 0, 1),
            ],
            objective_min_segments: 6,
            objective_min_distance: 2,
            move_ticks: 2,
            attack_stage_ticks: 1,
            ..SimConfig::default()
        }
    }

    fn content() -> StageContent {
        let (templates, end_cap) = catalog(4);
        StageContent {
            templates,
            end_cap,
            enemies: Vec::new(),
            loot: Vec::new(),
            player_health: 10,
            player_move_points: 4,
            player_weapon: WeaponSpec::unarmed(),
            objective_xp: 5,
        }
    }

    fn machine() -> RoundStateMachine {
        RoundStateMachine::new(config(), content()).expect("catalog is valid")
    }

    fn rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(17)
    }

    #[test]
    fn invalid_catalogs_are_rejected() {
        let mut empty = content();
        empty.templates.clear();
        assert_eq!(
            RoundStateMachine::new(config(), empty).err(),
            Some(RoundError::EmptyCatalog)
        );

        let mut bad_cap = content();
        bad_cap.end_cap = 99;
        assert!(matches!(
            RoundStateMachine::new(config(), bad_cap).err(),
            Some(RoundError::EndCapOutOfBounds { .. })
        ));
    }

    #[test]
    fn stage_init_builds_and_hands_control_to_the_player() {
        let mut machine = machine();
        let mut rng = rng();
        assert_eq!(machine.phase(), RoundPhase::StageInit);

        let phase = machine.tick(PlayerIntent::NONE, &mut rng).unwrap();
        assert_eq!(phase, RoundPhase::PlayerActive);
        assert!(!machine.stage().level.segments.is_empty());
        assert!(machine.stage().level.nav.len() > 0);
        assert_eq!(machine.stage().round, 1);

        let player = machine.stage().player().expect("player spawned");
        assert!(machine.stage().level.nav.node_at(player.position).is_some());

        let events = machine.drain_events();
        assert!(events
            .iter()
            .any(|e| matches!(e, SimEvent::StageBuilt { .. })));
        assert!(events.iter().any(
            |e| matches!(e, SimEvent::AgentSpawned { agent, .. } if *agent == AgentId::PLAYER)
        ));
    }

    #[test]
    fn new_stage_resets_from_any_phase() {
        let mut machine = machine();
        let mut rng = rng();
        // Walk a few phases in, then tear down.
        for _ in 0..3 {
            machine.tick(PlayerIntent::confirm(), &mut rng).unwrap();
        }
        machine.new_stage();

        assert_eq!(machine.phase(), RoundPhase::StageInit);
        assert!(machine.stage().level.segments.is_empty());
        assert_eq!(machine.stage().level.nav.len(), 0);
        assert!(machine.stage().level.spawn_points.is_empty());
        assert!(machine.stage().agents.is_empty());
        assert!(machine.stage().pickups.is_empty());
        assert_eq!(machine.stage().index, 2);

        // And the machine rebuilds cleanly.
        let phase = machine.tick(PlayerIntent::NONE, &mut rng).unwrap();
        assert_eq!(phase, RoundPhase::PlayerActive);
    }

    #[test]
    fn objective_notification_completes_the_stage() {
        let mut machine = machine();
        let mut rng = rng();
        machine.tick(PlayerIntent::NONE, &mut rng).unwrap();

        machine.notifications().objective_reached(5);
        machine.notifications().objective_reached(99); // duplicate ignored

        let mut cancel = PlayerIntent::NONE;
        cancel.cancel = true;
        let phase = machine.tick(cancel, &mut rng).unwrap();
        assert_eq!(phase, RoundPhase::PlayerWinCheck);

        let phase = machine.tick(PlayerIntent::NONE, &mut rng).unwrap();
        assert_eq!(phase, RoundPhase::StageComplete);
        assert_eq!(machine.experience(), 5);

        // Absorbing until torn down.
        let phase = machine.tick(PlayerIntent::NONE, &mut rng).unwrap();
        assert_eq!(phase, RoundPhase::StageComplete);
    }

    #[test]
    fn defeat_notification_fails_the_stage() {
        let mut machine = machine();
        let mut rng = rng();
        machine.tick(PlayerIntent::NONE, &mut rng).unwrap();

        machine.notifications().player_defeated();

        let mut cancel = PlayerIntent::NONE;
        cancel.cancel = true;
        machine.tick(cancel, &mut rng).unwrap(); // -> win check
        machine.tick(PlayerIntent::NONE, &mut rng).unwrap(); // -> enemy phase
        machine.tick(PlayerIntent::NONE, &mut rng).unwrap(); // roster empty -> lose check
        let phase = machine.tick(PlayerIntent::NONE, &mut rng).unwrap();
        assert_eq!(phase, RoundPhase::StageFailed);
    }

    #[test]
    fn pending_level_up_holds_the_end_round_gate() {
        let mut machine = machine();
        let mut rng = rng();
        machine.notifications().level_up_pending();

        // Stage init routes straight to the gate.
        let phase = machine.tick(PlayerIntent::NONE, &mut rng).unwrap();
        assert_eq!(phase, RoundPhase::EndRound);
        let phase = machine.tick(PlayerIntent::NONE, &mut rng).unwrap();
        assert_eq!(phase, RoundPhase::EndRound);

        machine.notifications().level_ups_resolved();
        let phase = machine.tick(PlayerIntent::NONE, &mut rng).unwrap();
        assert_eq!(phase, RoundPhase::PlayerActive);
    }

    #[test]
    fn player_move_commits_after_the_configured_ticks() {
        let mut machine = machine();
        let mut rng = rng();
        machine.tick(PlayerIntent::NONE, &mut rng).unwrap();

        let start = machine.stage().player().unwrap().position;
        let direction = Direction::ALL
            .into_iter()
            .find(|&d| machine.stage().level.nav.node_at(start.step(d)).is_some())
            .expect("player has a walkable neighbor");

        machine
            .tick(PlayerIntent::move_toward(direction), &mut rng)
            .unwrap();
        // move_ticks is 2 in the test config: one more tick to commit.
        machine.tick(PlayerIntent::NONE, &mut rng).unwrap();
        machine.tick(PlayerIntent::NONE, &mut rng).unwrap();

        let player = machine.stage().player().unwrap();
        assert_eq!(player.position, start.step(direction));
        assert_eq!(player.move_points, 3);
        assert!(machine
            .drain_events()
            .iter()
            .any(|e| matches!(e, SimEvent::AgentMoved { .. })));
    }

    #[test]
    fn a_full_round_returns_to_the_player() {
        let mut machine = machine();
        let mut rng = rng();
        machine.tick(PlayerIntent::NONE, &mut rng).unwrap();
        assert_eq!(machine.stage().round, 1);

        let mut cancel = PlayerIntent::NONE;
        cancel.cancel = true;
        machine.tick(cancel, &mut rng).unwrap(); // -> win check
        machine.tick(PlayerIntent::NONE, &mut rng).unwrap(); // -> enemy phase
        machine.tick(PlayerIntent::NONE, &mut rng).unwrap(); // -> lose check
        machine.tick(PlayerIntent::NONE, &mut rng).unwrap(); // -> end round
        let phase = machine.tick(PlayerIntent::NONE, &mut rng).unwrap();
        assert_eq!(phase, RoundPhase::PlayerActive);
        assert_eq!(machine.stage().round, 2);
    }

    /// A built machine whose level is swapped for one open 30x30 room, the
    /// player standing at (15, 5) with three hand-placed enemies. Against
    /// the default camera half-extents (12x7) and shout radius (6):
    /// #10 at (26, 5) is inside the camera window, #11 at (29, 5) is
    /// outside it but 3 cells from #10, and #12 at (15, 13) is beyond both.
    fn machine_with_watchers() -> (RoundStateMachine, ChaCha8Rng) {
        let mut machine = machine();
        let mut rng = rng();
        machine.tick(PlayerIntent::NONE, &mut rng).unwrap();

        let room = SegmentTemplate::new("room", 30, ExitFlags::empty(), vec![true; 900]);
        machine.stage.level =
            LevelGraph::assemble(&[room], vec![PlacedSegment::new(0, GridPos::ORIGIN)], None);
        let pidx = machine.agent_index(AgentId::PLAYER).unwrap();
        machine.stage.agents[pidx].position = GridPos::new(15, 5);
        for (id, pos) in [(10, (26, 5)), (11, (29, 5)), (12, (15, 13))] {
            machine.stage.agents.push(Agent::new(
                AgentId(id),
                Faction::Enemy,
                GridPos::new(pos.0, pos.1),
                3,
            ));
        }
        machine.drain_events();
        (machine, rng)
    }

    #[test]
    fn enemy_phase_alerts_by_sight_then_shout_and_acts_nearest_first() {
        let (mut machine, mut rng) = machine_with_watchers();

        let mut cancel = PlayerIntent::NONE;
        cancel.cancel = true;
        machine.tick(cancel, &mut rng).unwrap(); // -> win check
        let phase = machine.tick(PlayerIntent::NONE, &mut rng).unwrap();
        assert_eq!(phase, RoundPhase::EnemyActive);

        // The seen enemy and the one it shouted at, nearest to the player
        // acting first. The far enemy never wakes.
        assert_eq!(machine.roster, vec![AgentId(10), AgentId(11)]);
        let alert =
            |m: &RoundStateMachine, id| m.stage.agents[m.agent_index(id).unwrap()].alert;
        assert!(alert(&machine, AgentId(10)));
        assert!(alert(&machine, AgentId(11)));
        assert!(!alert(&machine, AgentId(12)));

        let events = machine.drain_events();
        assert!(events.contains(&SimEvent::AgentAlerted {
            agent: AgentId(10),
            by_shout: false,
        }));
        assert!(events.contains(&SimEvent::AgentAlerted {
            agent: AgentId(11),
            by_shout: true,
        }));
        assert!(!events
            .iter()
            .any(|e| matches!(e, SimEvent::AgentAlerted { agent, .. } if *agent == AgentId(12))));
    }

    #[test]
    fn dead_roster_entries_are_skipped_without_consuming_a_tick() {
        let (mut machine, mut rng) = machine_with_watchers();

        let mut cancel = PlayerIntent::NONE;
        cancel.cancel = true;
        machine.tick(cancel, &mut rng).unwrap();
        machine.tick(PlayerIntent::NONE, &mut rng).unwrap();
        assert_eq!(machine.roster, vec![AgentId(10), AgentId(11)]);

        // The first roster entry dies before it gets to act.
        let idx = machine.agent_index(AgentId(10)).unwrap();
        machine.stage.agents[idx].health.deplete(99);

        // One tick skips the corpse and already starts the next entry's
        // turn instead of spending the tick on the skip.
        let phase = machine.tick(PlayerIntent::NONE, &mut rng).unwrap();
        assert_eq!(phase, RoundPhase::EnemyActive);
        assert_eq!(machine.roster_index, 1);
        assert_eq!(
            machine.active_plan.as_ref().map(|p| p.agent),
            Some(AgentId(11))
        );
    }

    #[test]
    fn reaching_the_objective_cell_raises_the_win_latch() {
        // Drive the machine until the player walks onto the objective by
        // teleporting the player adjacent to it first.
        let mut machine = machine();
        let mut rng = rng();
        machine.tick(PlayerIntent::NONE, &mut rng).unwrap();

        let objective = machine.stage().level.objective.expect("objective sited");
        let adjacent = Direction::ALL
            .into_iter()
            .map(|d| objective.step(d))
            .find(|&cell| machine.stage().level.nav.node_at(cell).is_some())
            .expect("objective has a walkable neighbor");
        let pidx = machine
            .stage
            .agents
            .iter()
            .position(|a| a.id == AgentId::PLAYER)
            .unwrap();
        machine.stage.agents[pidx].position = adjacent;

        let direction = adjacent.direction_to(objective).unwrap();
        machine
            .tick(PlayerIntent::move_toward(direction), &mut rng)
            .unwrap();
        machine.tick(PlayerIntent::NONE, &mut rng).unwrap();
        machine.tick(PlayerIntent::NONE, &mut rng).unwrap();

        let mut cancel = PlayerIntent::NONE;
        cancel.cancel = true;
        machine.tick(cancel, &mut rng).unwrap();
        let phase = machine.tick(PlayerIntent::NONE, &mut rng).unwrap();
        assert_eq!(phase, RoundPhase::StageComplete);
        assert_eq!(machine.experience(), 5);
    }
}
