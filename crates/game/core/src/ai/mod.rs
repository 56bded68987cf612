//! Per-enemy turn planning: attack-square selection, approach routing, and
//! attack-time range resolution.
//!
//! Behavior is composed from small strategy objects chosen at construction
//! time. The targeting policy proposes attack squares; the movement policy
//! ranks the reachable ones.

use std::collections::BTreeSet;

use rand::{Rng, RngCore};

use crate::combat::{AttackResolution, Weapon};
use crate::config::SimConfig;
use crate::nav::{NavGraph, PathFinder, PathResult};
use crate::state::{Agent, ApproachKind, Direction, Faction, GridPos};

/// What the active enemy intends to do with this turn.
#[derive(Clone, Debug, PartialEq)]
pub enum TurnPlan {
    /// Walk `path` (possibly empty) to `attack_from`, then attack. The
    /// actual facing and range are re-resolved against the player's
    /// position at the moment of the swing.
    AttackFrom {
        path: PathResult,
        attack_from: GridPos,
    },
    /// No attack square is reachable this round; close the distance.
    Approach { path: PathResult },
    /// No route to anything useful.
    Hold,
}

/// A reachable attack square with the data the movement policy ranks on.
#[derive(Clone, Debug, PartialEq)]
pub struct MoveCandidate {
    pub position: GridPos,
    pub distance_to_player: u32,
    pub route_len: usize,
    pub allied_hits: u32,
}

/// Proposes the squares an attack could be delivered from.
pub trait TargetingPolicy {
    /// Every square from which `weapon` would hit `target`, with the facing
    /// and range of the shot. Unpruned; the planner filters for
    /// reachability and line blockage.
    fn attack_candidates(&self, weapon: &Weapon, target: GridPos)
        -> Vec<(GridPos, Direction, u8)>;
}

/// Inverts the weapon's orthogonal hit pattern over its range band.
#[derive(Clone, Copy, Debug, Default)]
pub struct PatternTargeting;

impl TargetingPolicy for PatternTargeting {
    fn attack_candidates(
        &self,
        weapon: &Weapon,
        target: GridPos,
    ) -> Vec<(GridPos, Direction, u8)> {
        weapon.attack_origins(target)
    }
}

/// Ranks reachable attack squares against each other.
pub trait MovementPolicy {
    /// True when `candidate` should replace `incumbent` as the pick.
    fn prefer(
        &self,
        candidate: &MoveCandidate,
        incumbent: &MoveCandidate,
        rng: &mut dyn RngCore,
    ) -> bool;
}

/// Default temperament: farthest square from the player first, then the
/// longer route, then fewer allied hits. Spreads enemies out so more of
/// them can attack at once.
#[derive(Clone, Copy, Debug, Default)]
pub struct SpreadMovement;

impl MovementPolicy for SpreadMovement {
    fn prefer(
        &self,
        candidate: &MoveCandidate,
        incumbent: &MoveCandidate,
        rng: &mut dyn RngCore,
    ) -> bool {
        if candidate.distance_to_player != incumbent.distance_to_player {
            return candidate.distance_to_player > incumbent.distance_to_player;
        }
        if candidate.route_len != incumbent.route_len {
            return candidate.route_len > incumbent.route_len;
        }
        if candidate.allied_hits != incumbent.allied_hits {
            return candidate.allied_hits < incumbent.allied_hits;
        }
        rng.gen_bool(0.5)
    }
}

/// Beeline temperament: nearest square, shortest route.
#[derive(Clone, Copy, Debug, Default)]
pub struct DirectMovement;

impl MovementPolicy for DirectMovement {
    fn prefer(
        &self,
        candidate: &MoveCandidate,
        incumbent: &MoveCandidate,
        rng: &mut dyn RngCore,
    ) -> bool {
        if candidate.distance_to_player != incumbent.distance_to_player {
            return candidate.distance_to_player < incumbent.distance_to_player;
        }
        if candidate.route_len != incumbent.route_len {
            return candidate.route_len < incumbent.route_len;
        }
        if candidate.allied_hits != incumbent.allied_hits {
            return candidate.allied_hits < incumbent.allied_hits;
        }
        rng.gen_bool(0.5)
    }
}

/// Plans one enemy turn. Stateless between turns; every call works from
/// the current board.
pub struct EnemyTurnPlanner<'a> {
    config: &'a SimConfig,
    targeting: Box<dyn TargetingPolicy>,
    movement: Box<dyn MovementPolicy>,
}

impl<'a> EnemyTurnPlanner<'a> {
    pub fn new(
        config: &'a SimConfig,
        targeting: Box<dyn TargetingPolicy>,
        movement: Box<dyn MovementPolicy>,
    ) -> Self {
        Self {
            config,
            targeting,
            movement,
        }
    }

    /// Standard composition for an archetype's approach kind.
    pub fn for_approach(config: &'a SimConfig, approach: ApproachKind) -> Self {
        let movement: Box<dyn MovementPolicy> = match approach {
            ApproachKind::Spread => Box::new(SpreadMovement),
            ApproachKind::Direct => Box::new(DirectMovement),
        };
        Self::new(config, Box::new(PatternTargeting), movement)
    }

    /// Chooses what `enemy` does this turn. `others` is every other agent
    /// on the board, the player included.
    pub fn plan<R: Rng>(
        &self,
        enemy: &Agent,
        player: GridPos,
        others: &[Agent],
        graph: &mut NavGraph,
        rng: &mut R,
    ) -> TurnPlan {
        let weapon = enemy.weapon().cloned().unwrap_or_else(Weapon::unarmed);

        let occupied: BTreeSet<GridPos> = others
            .iter()
            .filter(|a| a.is_alive())
            .map(|a| a.position)
            .collect();
        let allies: Vec<GridPos> = others
            .iter()
            .filter(|a| a.is_alive() && a.faction == Faction::Enemy)
            .map(|a| a.position)
            .collect();

        let mut candidates = self.targeting.attack_candidates(&weapon, player);
        candidates.sort_by_key(|&(pos, facing, range)| (pos, facing.index(), range));
        candidates.dedup();
        candidates.retain(|&(pos, facing, range)| {
            graph.node_at(pos).is_some()
                && pos.manhattan(enemy.position) <= enemy.move_points
                && (pos == enemy.position || !occupied.contains(&pos))
                && !Self::line_blocked(graph, &occupied, pos, facing, range)
        });

        // Collapse candidates sharing a square (the diagonal two-facing
        // case) to the facing that hits the fewest allies.
        let mut by_square: Vec<(GridPos, u32)> = Vec::new();
        for &(pos, facing, range) in &candidates {
            let allied_hits = weapon
                .hit_cells(pos, facing, range)
                .iter()
                .filter(|(cell, _)| *cell != player && allies.contains(cell))
                .count() as u32;
            match by_square.iter_mut().find(|(p, _)| *p == pos) {
                Some((_, best)) => {
                    if allied_hits < *best {
                        *best = allied_hits;
                    }
                }
                None => by_square.push((pos, allied_hits)),
            }
        }

        let mut best: Option<(MoveCandidate, PathResult)> = None;
        for (pos, allied_hits) in by_square {
            // Standing on a candidate already is a zero-cost option, but the
            // policy may still find a strictly better square.
            let path = if pos == enemy.position {
                PathResult::EMPTY
            } else {
                let found = PathFinder::new(graph).find(
                    enemy.position,
                    pos,
                    &occupied,
                    true,
                    enemy.move_points,
                    rng,
                );
                if found.is_empty() {
                    continue;
                }
                found
            };
            let candidate = MoveCandidate {
                position: pos,
                distance_to_player: pos.manhattan(player),
                route_len: path.len(),
                allied_hits,
            };
            let replace = match &best {
                Some((incumbent, _)) => self.movement.prefer(&candidate, incumbent, rng),
                None => true,
            };
            if replace {
                best = Some((candidate, path));
            }
        }

        if let Some((candidate, path)) = best {
            return TurnPlan::AttackFrom {
                path,
                attack_from: candidate.position,
            };
        }

        // Nothing attackable this round; head for the player's own cell so
        // melee contact eventually happens.
        let approach = PathFinder::new(graph).plan(
            enemy.position,
            player,
            &occupied,
            self.config.max_path_distance,
            rng,
        );
        if approach.is_empty() {
            TurnPlan::Hold
        } else {
            TurnPlan::Approach { path: approach }
        }
    }

    /// True when a living agent or a wall sits on the shot line strictly
    /// between the attack square and the aim cell.
    fn line_blocked(
        graph: &NavGraph,
        occupied: &BTreeSet<GridPos>,
        origin: GridPos,
        facing: Direction,
        range: u8,
    ) -> bool {
        let (dx, dy) = facing.delta();
        for k in 1..i32::from(range) {
            let cell = origin.offset(dx * k, dy * k);
            if graph.node_at(cell).is_none() || occupied.contains(&cell) {
                return true;
            }
        }
        false
    }

    /// Attack-time range resolution against the player's *current* cell:
    /// scan outward along each axis, stop at the first physically blocked
    /// square, and pick the combination that hits the player with the
    /// fewest allied hits. Blockage reads the same as [`line_blocked`] at
    /// plan time: a wall ends the axis outright, a living body ends it
    /// after its own cell (the body itself is still a legal aim square).
    ///
    /// [`line_blocked`]: Self::line_blocked
    pub fn resolve_attack<R: Rng>(
        &self,
        attacker: &Agent,
        player: GridPos,
        others: &[Agent],
        graph: &NavGraph,
        rng: &mut R,
    ) -> Option<AttackResolution> {
        let weapon = attacker.weapon().cloned().unwrap_or_else(Weapon::unarmed);
        let occupied: BTreeSet<GridPos> = others
            .iter()
            .filter(|a| a.is_alive())
            .map(|a| a.position)
            .collect();
        let allies: Vec<GridPos> = others
            .iter()
            .filter(|a| a.is_alive() && a.faction == Faction::Enemy)
            .map(|a| a.position)
            .collect();

        let mut best: Option<AttackResolution> = None;
        for facing in Direction::ALL {
            let (dx, dy) = facing.delta();
            for range in 1..=weapon.range_max {
                let aim = attacker
                    .position
                    .offset(dx * i32::from(range), dy * i32::from(range));
                if graph.node_at(aim).is_none() {
                    break;
                }

                if range >= weapon.range_min {
                    let hits = weapon.hit_cells(attacker.position, facing, range);
                    let resolution = AttackResolution {
                        facing,
                        range,
                        hits_target: hits.iter().any(|&(cell, _)| cell == player),
                        allied_hits: hits
                            .iter()
                            .filter(|(cell, _)| *cell != player && allies.contains(cell))
                            .count() as u32,
                    };

                    let replace = match &best {
                        Some(incumbent) => {
                            if resolution.hits_target != incumbent.hits_target {
                                resolution.hits_target
                            } else if resolution.allied_hits != incumbent.allied_hits {
                                resolution.allied_hits < incumbent.allied_hits
                            } else {
                                rng.gen_bool(0.5)
                            }
                        }
                        None => true,
                    };
                    if replace {
                        best = Some(resolution);
                    }
                }

                if occupied.contains(&aim) {
                    break;
                }
            }
        }

        best.filter(|r| r.hits_target)
    }
}
