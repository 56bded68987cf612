//! Budget-based enemy and loot placement on navigation nodes.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::combat::{Weapon, WeaponSpec};
use crate::config::SimConfig;
use crate::level::LevelGraph;
use crate::state::{Agent, AgentId, ApproachKind, Faction, GridPos};

/// One spawnable enemy type with its budget cost.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EnemyArchetype {
    pub name: String,
    pub cost: f64,
    pub health: u32,
    pub move_points: u32,
    pub weapon: WeaponSpec,
    pub approach: ApproachKind,
}

/// What a pickup does when collected.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LootKind {
    Health(u32),
    Ammo(u32),
    Armor(u32),
    Weapon(WeaponSpec),
}

/// One spawnable pickup type with its budget cost.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LootArchetype {
    pub name: String,
    pub cost: f64,
    pub kind: LootKind,
}

/// A pickup sitting on the floor.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Pickup {
    pub name: String,
    pub position: GridPos,
    pub kind: LootKind,
}

/// Outcome of one allocation run.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpawnReport {
    pub spent: f64,
    pub spawned: usize,
    /// Spawn points ran out while budget remained; degraded stage.
    pub exhausted: bool,
}

/// Budgeted spawner. Each accepted spawn point is consumed from the level's
/// candidate list, so enemies, loot, and later stages never overlap.
pub struct SpawnAllocator<'a> {
    config: &'a SimConfig,
}

impl<'a> SpawnAllocator<'a> {
    pub fn new(config: &'a SimConfig) -> Self {
        Self { config }
    }

    /// Draws a random unconsumed spawn point outside the player's
    /// visibility rectangle. Every draw is consumed, accepted or not, so
    /// the loop cannot revisit a rejected point.
    fn draw_spawn_point<R: Rng>(
        &self,
        level: &mut LevelGraph,
        player: GridPos,
        rng: &mut R,
    ) -> Option<GridPos> {
        let mut rejects = 0;
        while rejects < self.config.spawn_iteration_cap {
            if level.spawn_points.is_empty() {
                tracing::warn!("spawn point candidates exhausted");
                return None;
            }
            let pick = rng.gen_range(0..level.spawn_points.len());
            let node = level.spawn_points.swap_remove(pick);
            let position = level.nav.node(node).position;

            if self
                .config
                .spawn_point_visible(position.x - player.x, position.y - player.y)
            {
                rejects += 1;
                continue;
            }
            return Some(position);
        }
        tracing::warn!(
            cap = self.config.spawn_iteration_cap,
            "spawn draw loop hit the safety cap"
        );
        None
    }

    /// Eligible archetype indices: cost at most `ceiling`, with the single
    /// globally-weakest type always included so a valid choice exists even
    /// on a nearly-spent budget.
    fn eligible_by_cost<C: Fn(usize) -> f64>(count: usize, cost: C, ceiling: f64) -> Vec<usize> {
        let mut eligible: Vec<usize> = (0..count).filter(|&i| cost(i) <= ceiling).collect();
        if eligible.is_empty() {
            if let Some(weakest) = (0..count).min_by(|&a, &b| cost(a).total_cmp(&cost(b))) {
                eligible.push(weakest);
            }
        }
        eligible
    }

    /// Spends `budget` on enemies. `individual_strength` caps the cost
    /// ceiling of any single spawn. Agent ids are handed out from
    /// `next_id`.
    pub fn allocate_enemies<R: Rng>(
        &self,
        level: &mut LevelGraph,
        archetypes: &[EnemyArchetype],
        budget: f64,
        individual_strength: f64,
        player: GridPos,
        next_id: &mut u32,
        rng: &mut R,
    ) -> (Vec<Agent>, SpawnReport) {
        let mut agents = Vec::new();
        let mut remaining = budget;
        let mut exhausted = false;

        while remaining > 0.0 && !archetypes.is_empty() {
            let Some(position) = self.draw_spawn_point(level, player, rng) else {
                exhausted = true;
                break;
            };

            let ceiling = individual_strength.min(remaining);
            let eligible = Self::eligible_by_cost(archetypes.len(), |i| archetypes[i].cost, ceiling);
            let Some(&pick) = eligible.choose(rng) else {
                break;
            };
            let archetype = &archetypes[pick];

            let agent = Agent::new(AgentId(*next_id), Faction::Enemy, position, archetype.health)
                .with_move_points(archetype.move_points)
                .with_weapon(Weapon::from_spec(&archetype.weapon))
                .with_approach(archetype.approach);
            *next_id += 1;
            remaining -= archetype.cost;
            agents.push(agent);
        }

        let report = SpawnReport {
            spent: budget - remaining,
            spawned: agents.len(),
            exhausted,
        };
        (agents, report)
    }

    /// Spends `budget` on loot with the same loop against a separate pool.
    /// Visible points are excluded exactly as for enemies.
    pub fn allocate_loot<R: Rng>(
        &self,
        level: &mut LevelGraph,
        archetypes: &[LootArchetype],
        budget: f64,
        player: GridPos,
        rng: &mut R,
    ) -> (Vec<Pickup>, SpawnReport) {
        let mut pickups = Vec::new();
        let mut remaining = budget;
        let mut exhausted = false;

        while remaining > 0.0 && !archetypes.is_empty() {
            let Some(position) = self.draw_spawn_point(level, player, rng) else {
                exhausted = true;
                break;
            };

            let eligible =
                Self::eligible_by_cost(archetypes.len(), |i| archetypes[i].cost, remaining);
            let Some(&pick) = eligible.choose(rng) else {
                break;
            };
            let archetype = &archetypes[pick];

            pickups.push(Pickup {
                name: archetype.name.clone(),
                position,
                kind: archetype.kind.clone(),
            });
            remaining -= archetype.cost;
        }

        let report = SpawnReport {
            spent: budget - remaining,
            spawned: pickups.len(),
            exhausted,
        };
        (pickups, report)
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::level::{ExitFlags, PlacedSegment, SegmentTemplate};

    fn level(dim: i32) -> LevelGraph {
        let template =
            SegmentTemplate::new("room", dim, ExitFlags::empty(), vec![true; (dim * dim) as usize]);
        LevelGraph::assemble(
            &[template],
            vec![PlacedSegment::new(0, GridPos::ORIGIN)],
            None,
        )
    }

    fn archetypes() -> Vec<EnemyArchetype> {
        let mk = |name: &str, cost: f64| EnemyArchetype {
            name: name.into(),
            cost,
            health: 3,
            move_points: 4,
            weapon: WeaponSpec::unarmed(),
            approach: ApproachKind::Spread,
        };
        vec![mk("rat", 0.5), mk("thug", 1.0), mk("ogre", 4.0)]
    }

    fn far_player() -> GridPos {
        // Far enough that the whole room is outside the rejection window.
        GridPos::new(-1000, -1000)
    }

    #[test]
    fn spending_never_overshoots_by_more_than_the_last_item() {
        let config = SimConfig::default();
        let allocator = SpawnAllocator::new(&config);
        let max_cost = 4.0;
        for seed in 0..10 {
            let mut level = level(30);
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let mut next_id = 1;
            let budget = 20.0;
            let (_, report) = allocator.allocate_enemies(
                &mut level,
                &archetypes(),
                budget,
                2.0,
                far_player(),
                &mut next_id,
                &mut rng,
            );
            assert!(report.spent > 0.0);
            assert!(report.spent <= budget + max_cost);
        }
    }

    #[test]
    fn ceiling_filters_expensive_archetypes() {
        let config = SimConfig::default();
        let allocator = SpawnAllocator::new(&config);
        let mut level = level(30);
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut next_id = 1;
        // Individual strength 1.0 excludes the 4.0-cost ogre entirely.
        let (agents, _) = allocator.allocate_enemies(
            &mut level,
            &archetypes(),
            10.0,
            1.0,
            far_player(),
            &mut next_id,
            &mut rng,
        );
        assert!(!agents.is_empty());
        assert!(agents.iter().all(|a| a.health.maximum == 3));
        assert!(agents
            .iter()
            .all(|a| a.id != AgentId::PLAYER && a.faction == Faction::Enemy));
    }

    #[test]
    fn weakest_archetype_is_always_eligible() {
        let eligible = SpawnAllocator::eligible_by_cost(3, |i| [5.0, 3.0, 9.0][i], 1.0);
        assert_eq!(eligible, vec![1]);
    }

    #[test]
    fn never_spawns_inside_the_visibility_window() {
        let config = SimConfig::default();
        let allocator = SpawnAllocator::new(&config);
        let mut level = level(40);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut next_id = 1;
        let player = GridPos::new(20, 20);
        let (agents, _) = allocator.allocate_enemies(
            &mut level,
            &archetypes(),
            15.0,
            2.0,
            player,
            &mut next_id,
            &mut rng,
        );
        for agent in &agents {
            assert!(!config.spawn_point_visible(
                agent.position.x - player.x,
                agent.position.y - player.y
            ));
        }
    }

    #[test]
    fn exhausting_points_stops_without_spending_the_rest() {
        let config = SimConfig::default();
        let allocator = SpawnAllocator::new(&config);
        // A tiny room centered on the player: every point is visible.
        let mut level = level(4);
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut next_id = 1;
        let (agents, report) = allocator.allocate_enemies(
            &mut level,
            &archetypes(),
            100.0,
            2.0,
            GridPos::new(2, 2),
            &mut next_id,
            &mut rng,
        );
        assert!(agents.is_empty());
        assert!(report.exhausted);
        assert_eq!(report.spent, 0.0);
    }

    #[test]
    fn consumed_points_are_never_reused() {
        let config = SimConfig::default();
        let allocator = SpawnAllocator::new(&config);
        let mut level = level(30);
        let total = level.spawn_points.len();
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let mut next_id = 1;
        let (agents, _) = allocator.allocate_enemies(
            &mut level,
            &archetypes(),
            12.0,
            2.0,
            far_player(),
            &mut next_id,
            &mut rng,
        );
        let mut positions: Vec<GridPos> = agents.iter().map(|a| a.position).collect();
        positions.sort();
        positions.dedup();
        assert_eq!(positions.len(), agents.len(), "duplicate spawn position");
        assert!(level.spawn_points.len() < total);
    }
}
