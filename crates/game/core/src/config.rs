/// One tier of branch tapering: once `at_count` segments are placed, the
/// template pool is re-filtered to templates whose exit count lies in
/// `exit_min..=exit_max`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TaperTier {
    pub at_count: usize,
    pub exit_min: u8,
    pub exit_max: u8,
}

impl TaperTier {
    pub const fn new(at_count: usize, exit_min: u8, exit_max: u8) -> Self {
        Self {
            at_count,
            exit_min,
            exit_max,
        }
    }
}

/// Exponential per-stage difficulty scaling: `budget = base * index^exponent`.
/// Player upgrade multipliers are applied by the caller on top of this.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DifficultyCurve {
    pub enemy_budget_base: f64,
    pub enemy_budget_exponent: f64,
    pub enemy_strength_base: f64,
    pub enemy_strength_exponent: f64,
    pub loot_budget_base: f64,
    pub loot_budget_exponent: f64,
}

impl DifficultyCurve {
    fn scale(base: f64, exponent: f64, stage_index: u32) -> f64 {
        base * f64::from(stage_index.max(1)).powf(exponent)
    }

    /// Total enemy strength budget for the given 1-based stage index.
    pub fn enemy_budget(&self, stage_index: u32) -> f64 {
        Self::scale(self.enemy_budget_base, self.enemy_budget_exponent, stage_index)
    }

    /// Target strength of each individual enemy.
    pub fn enemy_strength(&self, stage_index: u32) -> f64 {
        Self::scale(
            self.enemy_strength_base,
            self.enemy_strength_exponent,
            stage_index,
        )
    }

    /// Total loot power budget for the given 1-based stage index.
    pub fn loot_budget(&self, stage_index: u32) -> f64 {
        Self::scale(self.loot_budget_base, self.loot_budget_exponent, stage_index)
    }
}

impl Default for DifficultyCurve {
    fn default() -> Self {
        Self {
            enemy_budget_base: SimConfig::DEFAULT_ENEMY_BUDGET_BASE,
            enemy_budget_exponent: SimConfig::DEFAULT_ENEMY_BUDGET_EXPONENT,
            enemy_strength_base: SimConfig::DEFAULT_ENEMY_STRENGTH_BASE,
            enemy_strength_exponent: SimConfig::DEFAULT_ENEMY_STRENGTH_EXPONENT,
            loot_budget_base: SimConfig::DEFAULT_LOOT_BUDGET_BASE,
            loot_budget_exponent: SimConfig::DEFAULT_LOOT_BUDGET_EXPONENT,
        }
    }
}

/// Simulation configuration: a single immutable value injected at startup
/// and threaded through constructors. There is no global mutable state.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SimConfig {
    /// Required x and y dimension of every tile segment template.
    pub segment_dim: i32,

    /// Branch-narrowing thresholds applied in order as placed-count grows.
    pub taper: Vec<TaperTier>,

    /// Infinite-loop guard on the generation loop.
    pub generation_iteration_cap: u32,

    /// Infinite-loop guard on each spawn-point draw loop.
    pub spawn_iteration_cap: u32,

    /// Default maximum path length (in f-cost) for pathfinding calls.
    pub max_path_distance: u32,

    /// Manhattan radius within which a freshly-alerted enemy wakes allies.
    pub shout_radius: u32,

    /// Half-extents of the camera visibility window, in cells.
    pub camera_half_width: i32,
    pub camera_half_height: i32,

    /// Extra margin added to the visibility window when rejecting spawn
    /// points, so nothing ever pops in on-screen.
    pub spawn_visibility_margin: i32,

    /// Minimum placed segments before the objective may be sited.
    pub objective_min_segments: usize,

    /// Minimum segment-grid Manhattan distance from the origin before the
    /// objective may be sited.
    pub objective_min_distance: u32,

    pub difficulty: DifficultyCurve,

    /// Ticks for one cell of movement.
    pub move_ticks: u32,

    /// Ticks per attack stage (windup, resolve, recover).
    pub attack_stage_ticks: u32,
}

impl SimConfig {
    // ===== default tuning =====
    pub const DEFAULT_SEGMENT_DIM: i32 = 14;
    pub const DEFAULT_GENERATION_CAP: u32 = 100;
    pub const DEFAULT_SPAWN_CAP: u32 = 100;
    pub const DEFAULT_MAX_PATH_DISTANCE: u32 = 25;
    pub const DEFAULT_SHOUT_RADIUS: u32 = 6;
    pub const DEFAULT_CAMERA_HALF_WIDTH: i32 = 12;
    pub const DEFAULT_CAMERA_HALF_HEIGHT: i32 = 7;
    pub const DEFAULT_SPAWN_MARGIN: i32 = 2;
    pub const DEFAULT_ENEMY_BUDGET_BASE: f64 = 100.0;
    pub const DEFAULT_ENEMY_BUDGET_EXPONENT: f64 = 1.2;
    pub const DEFAULT_ENEMY_STRENGTH_BASE: f64 = 1.0;
    pub const DEFAULT_ENEMY_STRENGTH_EXPONENT: f64 = 0.6;
    pub const DEFAULT_LOOT_BUDGET_BASE: f64 = 20.0;
    pub const DEFAULT_LOOT_BUDGET_EXPONENT: f64 = 0.8;

    pub fn new() -> Self {
        Self {
            segment_dim: Self::DEFAULT_SEGMENT_DIM,
            taper: vec![
                TaperTier::new(10, 2, 4),
                TaperTier::new(15, 1, 3),
                TaperTier::new(20, 0, 1),
            ],
            generation_iteration_cap: Self::DEFAULT_GENERATION_CAP,
            spawn_iteration_cap: Self::DEFAULT_SPAWN_CAP,
            max_path_distance: Self::DEFAULT_MAX_PATH_DISTANCE,
            shout_radius: Self::DEFAULT_SHOUT_RADIUS,
            camera_half_width: Self::DEFAULT_CAMERA_HALF_WIDTH,
            camera_half_height: Self::DEFAULT_CAMERA_HALF_HEIGHT,
            spawn_visibility_margin: Self::DEFAULT_SPAWN_MARGIN,
            objective_min_segments: 12,
            objective_min_distance: 3,
            difficulty: DifficultyCurve::default(),
            move_ticks: 4,
            attack_stage_ticks: 3,
        }
    }

    /// The initial exit-count bucket used before any taper tier applies.
    /// Hub templates come from the same bucket.
    pub fn initial_exit_bucket(&self) -> (u8, u8) {
        (3, 4)
    }

    /// Exit-count bucket in force once `placed` segments exist.
    pub fn exit_bucket_at(&self, placed: usize) -> (u8, u8) {
        let mut bucket = self.initial_exit_bucket();
        for tier in &self.taper {
            if placed >= tier.at_count {
                bucket = (tier.exit_min, tier.exit_max);
            }
        }
        bucket
    }

    /// True when a spawn point at `offset` from the player would be visible
    /// (camera window plus margin) and must be rejected.
    pub fn spawn_point_visible(&self, dx: i32, dy: i32) -> bool {
        dx.abs() <= self.camera_half_width + self.spawn_visibility_margin
            && dy.abs() <= self.camera_half_height + self.spawn_visibility_margin
    }

    /// True when a cell at `offset` from the player is inside the camera
    /// visibility window (used for enemy activation).
    pub fn in_camera_window(&self, dx: i32, dy: i32) -> bool {
        dx.abs() <= self.camera_half_width && dy.abs() <= self.camera_half_height
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_bucket_narrows_with_placed_count() {
        let config = SimConfig::default();
        assert_eq!(config.exit_bucket_at(0), (3, 4));
        assert_eq!(config.exit_bucket_at(9), (3, 4));
        assert_eq!(config.exit_bucket_at(10), (2, 4));
        assert_eq!(config.exit_bucket_at(15), (1, 3));
        assert_eq!(config.exit_bucket_at(20), (0, 1));
        assert_eq!(config.exit_bucket_at(50), (0, 1));
    }

    #[test]
    fn difficulty_curve_scales_with_stage_index() {
        let curve = DifficultyCurve::default();
        assert_eq!(curve.enemy_budget(1), 100.0);
        assert!(curve.enemy_budget(2) > curve.enemy_budget(1));
        assert!(curve.loot_budget(3) > curve.loot_budget(2));
        // Stage index 0 is clamped to 1 rather than zeroing the budget.
        assert_eq!(curve.enemy_budget(0), curve.enemy_budget(1));
    }

    #[test]
    fn spawn_rejection_rectangle_includes_margin() {
        let config = SimConfig::default();
        let w = config.camera_half_width + config.spawn_visibility_margin;
        assert!(config.spawn_point_visible(w, 0));
        assert!(!config.spawn_point_visible(w + 1, 0));
        let h = config.camera_half_height + config.spawn_visibility_margin;
        assert!(config.spawn_point_visible(0, h));
        assert!(!config.spawn_point_visible(0, h + 1));
    }
}
