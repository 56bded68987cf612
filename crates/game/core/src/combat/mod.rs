//! Weapons: orthogonal hit patterns, facing rotation, and range limits.

use arrayvec::ArrayVec;

use crate::state::{Direction, GridPos};

/// Hard cap on pattern size; big enough for every authored weapon.
pub const MAX_HIT_POINTS: usize = 16;

/// Longest range any weapon may reach; catalog values are clamped to it.
pub const MAX_WEAPON_RANGE: u8 = 6;

/// Authoring-time description of a weapon. Patterns are authored for an
/// attacker facing up; the other facings are derived by rotation.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WeaponSpec {
    pub name: String,
    pub range_min: u8,
    pub range_max: u8,
    /// `None` means infinite (an unarmed strike never runs out).
    pub ammo: Option<u32>,
    /// Cells hit relative to the aim point, with per-cell damage.
    pub hit_pattern: Vec<((i32, i32), u32)>,
}

impl WeaponSpec {
    /// The weapon every agent falls back to with empty hands: a range-1
    /// strike on the aim cell.
    pub fn unarmed() -> Self {
        Self {
            name: "unarmed strike".into(),
            range_min: 1,
            range_max: 1,
            ammo: None,
            hit_pattern: vec![((0, 0), 1)],
        }
    }
}

/// The chosen attack parameters after range resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttackResolution {
    pub facing: Direction,
    pub range: u8,
    pub hits_target: bool,
    pub allied_hits: u32,
}

/// A weapon instance carried by an agent: validated spec data plus the
/// live ammo counter.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Weapon {
    pub name: String,
    pub range_min: u8,
    pub range_max: u8,
    pub ammo: Option<u32>,
    hit_pattern: ArrayVec<((i32, i32), u32), MAX_HIT_POINTS>,
}

impl Weapon {
    /// Instantiates a weapon, clamping out-of-range values into the legal
    /// band. Oversized patterns are truncated with a warning rather than
    /// rejected.
    pub fn from_spec(spec: &WeaponSpec) -> Self {
        let range_max = spec.range_max.clamp(1, MAX_WEAPON_RANGE);
        let range_min = spec.range_min.clamp(1, range_max);

        let mut hit_pattern = ArrayVec::new();
        for &entry in spec.hit_pattern.iter().take(MAX_HIT_POINTS) {
            hit_pattern.push(entry);
        }
        if spec.hit_pattern.len() > MAX_HIT_POINTS {
            tracing::warn!(
                weapon = %spec.name,
                points = spec.hit_pattern.len(),
                "hit pattern truncated to {MAX_HIT_POINTS} points"
            );
        }
        if hit_pattern.is_empty() {
            tracing::warn!(weapon = %spec.name, "weapon has no valid target locations");
        }

        Self {
            name: spec.name.clone(),
            range_min,
            range_max,
            ammo: spec.ammo,
            hit_pattern,
        }
    }

    pub fn unarmed() -> Self {
        Self::from_spec(&WeaponSpec::unarmed())
    }

    /// True once a finite-ammo weapon is empty and must be discarded.
    pub fn is_spent(&self) -> bool {
        self.ammo == Some(0)
    }

    /// Consumes one round. Infinite weapons are untouched.
    pub fn consume_ammo(&mut self) {
        if let Some(ammo) = self.ammo.as_mut() {
            *ammo = ammo.saturating_sub(1);
        }
    }

    /// Rotates an up-facing pattern offset into the given facing.
    fn rotate(facing: Direction, (ox, oy): (i32, i32)) -> (i32, i32) {
        match facing {
            Direction::Up => (ox, oy),
            Direction::Down => (-ox, -oy),
            Direction::Right => (oy, -ox),
            Direction::Left => (-oy, ox),
        }
    }

    /// Every cell hit (with damage) when attacking from `origin` along
    /// `facing` at `range`. The aim point is `origin + facing * range`.
    pub fn hit_cells(
        &self,
        origin: GridPos,
        facing: Direction,
        range: u8,
    ) -> ArrayVec<(GridPos, u32), MAX_HIT_POINTS> {
        let (fx, fy) = facing.delta();
        let aim = origin.offset(fx * i32::from(range), fy * i32::from(range));

        self.hit_pattern
            .iter()
            .map(|&((ox, oy), damage)| {
                let (rx, ry) = Self::rotate(facing, (ox, oy));
                (aim.offset(rx, ry), damage)
            })
            .collect()
    }

    /// Every square from which an attack would hit `target`, given this
    /// weapon's hit pattern and range band: the candidate set the enemy
    /// turn planner prunes and scores.
    pub fn attack_origins(&self, target: GridPos) -> Vec<(GridPos, Direction, u8)> {
        let mut origins = Vec::new();
        for facing in Direction::ALL {
            let (fx, fy) = facing.delta();
            for range in self.range_min..=self.range_max {
                for &((ox, oy), _) in &self.hit_pattern {
                    let (rx, ry) = Self::rotate(facing, (ox, oy));
                    // target = origin + facing*range + rotated offset
                    let origin = target.offset(
                        -(fx * i32::from(range)) - rx,
                        -(fy * i32::from(range)) - ry,
                    );
                    if origin != target {
                        origins.push((origin, facing, range));
                    }
                }
            }
        }
        origins
    }
}
