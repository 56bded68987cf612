//! Built-in content catalog.
//!
//! Segment masks are authored as ASCII rows, top row first; `.` is floor
//! and anything else is wall. Exit openings must line up across segment
//! seams, so every template keeps its openings centered on the boundary.

use crawl_core::{
    ApproachKind, EnemyArchetype, ExitFlags, LootArchetype, LootKind, SegmentTemplate,
    StageContent, WeaponSpec,
};

/// Edge length shared by every built-in template.
pub const SEGMENT_DIM: i32 = 14;

fn parse_mask(dim: i32, rows: &[&str]) -> Vec<bool> {
    debug_assert_eq!(rows.len(), dim as usize);
    let mut floor = vec![false; (dim * dim) as usize];
    for (r, row) in rows.iter().enumerate() {
        debug_assert_eq!(row.len(), dim as usize, "row {r} has the wrong width");
        // Rows are authored top-down; y grows upward.
        let y = dim as usize - 1 - r;
        for (x, cell) in row.chars().enumerate() {
            floor[y * dim as usize + x] = cell == '.';
        }
    }
    floor
}

fn template(name: &str, exits: ExitFlags, rows: &[&str]) -> SegmentTemplate {
    SegmentTemplate::new(name, SEGMENT_DIM, exits, parse_mask(SEGMENT_DIM, rows))
}

/// The built-in segment catalog and the index of its universal end cap.
pub fn segment_templates() -> (Vec<SegmentTemplate>, usize) {
    let hub_cross = template(
        "hub_cross",
        ExitFlags::all(),
        &[
            "#####....#####",
            "#............#",
            "#............#",
            "#............#",
            "#....####....#",
            ".....####.....",
            "..............",
            "..............",
            ".....####.....",
            "#....####....#",
            "#............#",
            "#............#",
            "#............#",
            "#####....#####",
        ],
    );
    let corridor_ew = template(
        "corridor_ew",
        ExitFlags::LEFT | ExitFlags::RIGHT,
        &[
            "##############",
            "##############",
            "##############",
            "##############",
            "##############",
            "..............",
            "..............",
            "..............",
            "..............",
            "##############",
            "##############",
            "##############",
            "##############",
            "##############",
        ],
    );
    let corridor_ns = template(
        "corridor_ns",
        ExitFlags::UP | ExitFlags::DOWN,
        &[
            "#####....#####",
            "#####....#####",
            "#####....#####",
            "#####....#####",
            "#####....#####",
            "#####....#####",
            "#####....#####",
            "#####....#####",
            "#####....#####",
            "#####....#####",
            "#####....#####",
            "#####....#####",
            "#####....#####",
            "#####....#####",
        ],
    );
    let junction_up = template(
        "junction_up",
        ExitFlags::UP | ExitFlags::LEFT | ExitFlags::RIGHT,
        &[
            "#####....#####",
            "#............#",
            "#............#",
            "#............#",
            "#............#",
            "..............",
            "..............",
            "..............",
            "..............",
            "#............#",
            "#............#",
            "#............#",
            "#............#",
            "##############",
        ],
    );
    let junction_down = template(
        "junction_down",
        ExitFlags::DOWN | ExitFlags::LEFT | ExitFlags::RIGHT,
        &[
            "##############",
            "#............#",
            "#............#",
            "#............#",
            "#............#",
            "..............",
            "..............",
            "..............",
            "..............",
            "#............#",
            "#............#",
            "#............#",
            "#............#",
            "#####....#####",
        ],
    );
    let vault = template(
        "vault",
        ExitFlags::DOWN,
        &[
            "##############",
            "#............#",
            "#............#",
            "#............#",
            "#............#",
            "#............#",
            "#............#",
            "#............#",
            "#............#",
            "#............#",
            "#............#",
            "#............#",
            "#............#",
            "#####....#####",
        ],
    );
    // The rotunda opens toward whichever seam it was attached through;
    // unconnected sides face walls or void, which never link.
    let rotunda = template(
        "rotunda",
        ExitFlags::empty(),
        &[
            "#####....#####",
            "#............#",
            "#............#",
            "#............#",
            "#............#",
            "..............",
            "..............",
            "..............",
            "..............",
            "#............#",
            "#............#",
            "#............#",
            "#............#",
            "#####....#####",
        ],
    );

    let templates = vec![
        hub_cross,
        corridor_ew,
        corridor_ns,
        junction_up,
        junction_down,
        vault,
        rotunda,
    ];
    let end_cap = templates.len() - 1;
    (templates, end_cap)
}

// ----- weapons -----

pub fn rusty_knife() -> WeaponSpec {
    WeaponSpec {
        name: "rusty knife".into(),
        range_min: 1,
        range_max: 1,
        ammo: None,
        hit_pattern: vec![((0, 0), 2)],
    }
}

pub fn spear() -> WeaponSpec {
    WeaponSpec {
        name: "spear".into(),
        range_min: 1,
        range_max: 2,
        ammo: None,
        hit_pattern: vec![((0, 0), 2), ((0, 1), 1)],
    }
}

pub fn shortbow() -> WeaponSpec {
    WeaponSpec {
        name: "shortbow".into(),
        range_min: 2,
        range_max: 5,
        ammo: Some(12),
        hit_pattern: vec![((0, 0), 2)],
    }
}

pub fn crossbow() -> WeaponSpec {
    WeaponSpec {
        name: "crossbow".into(),
        range_min: 2,
        range_max: 6,
        ammo: Some(6),
        hit_pattern: vec![((0, 0), 3)],
    }
}

// ----- archetypes -----

pub fn enemy_archetypes() -> Vec<EnemyArchetype> {
    vec![
        EnemyArchetype {
            name: "rat".into(),
            cost: 0.5,
            health: 2,
            move_points: 5,
            weapon: WeaponSpec::unarmed(),
            approach: ApproachKind::Direct,
        },
        EnemyArchetype {
            name: "thug".into(),
            cost: 1.0,
            health: 4,
            move_points: 4,
            weapon: rusty_knife(),
            approach: ApproachKind::Spread,
        },
        EnemyArchetype {
            name: "spearman".into(),
            cost: 2.0,
            health: 5,
            move_points: 4,
            weapon: spear(),
            approach: ApproachKind::Spread,
        },
        EnemyArchetype {
            name: "archer".into(),
            cost: 3.0,
            health: 3,
            move_points: 4,
            weapon: shortbow(),
            approach: ApproachKind::Spread,
        },
        EnemyArchetype {
            name: "brute".into(),
            cost: 4.0,
            health: 8,
            move_points: 3,
            weapon: spear(),
            approach: ApproachKind::Direct,
        },
    ]
}

pub fn loot_archetypes() -> Vec<LootArchetype> {
    vec![
        LootArchetype {
            name: "bandage".into(),
            cost: 2.0,
            kind: LootKind::Health(4),
        },
        LootArchetype {
            name: "medkit".into(),
            cost: 5.0,
            kind: LootKind::Health(10),
        },
        LootArchetype {
            name: "quiver".into(),
            cost: 3.0,
            kind: LootKind::Ammo(8),
        },
        LootArchetype {
            name: "chainmail".into(),
            cost: 6.0,
            kind: LootKind::Armor(3),
        },
        LootArchetype {
            name: "spear".into(),
            cost: 4.0,
            kind: LootKind::Weapon(spear()),
        },
        LootArchetype {
            name: "crossbow".into(),
            cost: 8.0,
            kind: LootKind::Weapon(crossbow()),
        },
    ]
}

/// The full built-in stage catalog, ready for the round state machine.
pub fn stage_content() -> StageContent {
    let (templates, end_cap) = segment_templates();
    StageContent {
        templates,
        end_cap,
        enemies: enemy_archetypes(),
        loot: loot_archetypes(),
        player_health: 12,
        player_move_points: 4,
        player_weapon: rusty_knife(),
        objective_xp: 25,
    }
}

#[cfg(test)]
mod tests {
    use crawl_core::{RoundStateMachine, SimConfig};

    use super::*;

    #[test]
    fn every_template_mask_is_well_formed() {
        let (templates, _) = segment_templates();
        for t in &templates {
            assert_eq!(t.dim, SEGMENT_DIM);
            assert_eq!(t.floor.len(), (SEGMENT_DIM * SEGMENT_DIM) as usize);
            assert!(t.center_floor_cell().is_some(), "{} has no floor", t.name);
        }
    }

    #[test]
    fn end_cap_has_no_exits() {
        let (templates, end_cap) = segment_templates();
        assert_eq!(templates[end_cap].exit_count(), 0);
    }

    #[test]
    fn hub_bucket_is_populated() {
        let (templates, _) = segment_templates();
        assert!(templates
            .iter()
            .any(|t| (3..=4).contains(&t.exit_count())));
    }

    #[test]
    fn exit_openings_reach_the_boundary() {
        // An exit is only usable if floor actually touches that edge.
        let (templates, _) = segment_templates();
        let d = SEGMENT_DIM;
        for t in &templates {
            if t.exits.has(crawl_core::Direction::Up) {
                assert!((0..d).any(|x| t.is_floor(x, d - 1)), "{}", t.name);
            }
            if t.exits.has(crawl_core::Direction::Down) {
                assert!((0..d).any(|x| t.is_floor(x, 0)), "{}", t.name);
            }
            if t.exits.has(crawl_core::Direction::Left) {
                assert!((0..d).any(|y| t.is_floor(0, y)), "{}", t.name);
            }
            if t.exits.has(crawl_core::Direction::Right) {
                assert!((0..d).any(|y| t.is_floor(d - 1, y)), "{}", t.name);
            }
        }
    }

    #[test]
    fn archetype_costs_are_positive() {
        assert!(enemy_archetypes().iter().all(|a| a.cost > 0.0));
        assert!(loot_archetypes().iter().all(|a| a.cost > 0.0));
    }

    #[test]
    fn builtin_catalog_is_accepted_by_the_state_machine() {
        assert!(RoundStateMachine::new(SimConfig::default(), stage_content()).is_ok());
    }
}
