use std::collections::BTreeSet;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::config::SimConfig;
use crate::state::{Direction, GridPos};

use super::{PlacedSegment, SegmentId, SegmentTemplate};

/// Outcome of a generation run. `complete` is false when the iteration cap
/// fired; the level is then degraded but still playable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenerationReport {
    pub complete: bool,
    pub iterations: u32,
    pub objective_segment: Option<SegmentId>,
    pub objective_cell: Option<GridPos>,
}

/// Assembles a connected, closed graph of tile segments: a hub at the
/// origin, random growth with branch tapering, and one sited objective.
pub struct LevelGraphBuilder<'a> {
    config: &'a SimConfig,
    templates: &'a [SegmentTemplate],
    /// Index of the designated universal end cap, used when no template in
    /// the current pool can connect to a chosen direction.
    end_cap: usize,
}

impl<'a> LevelGraphBuilder<'a> {
    pub fn new(config: &'a SimConfig, templates: &'a [SegmentTemplate], end_cap: usize) -> Self {
        debug_assert!(end_cap < templates.len());
        Self {
            config,
            templates,
            end_cap,
        }
    }

    fn pool_for_bucket(&self, exit_min: u8, exit_max: u8) -> Vec<usize> {
        (0..self.templates.len())
            .filter(|&i| {
                let count = self.templates[i].exit_count();
                count >= exit_min && count <= exit_max
            })
            .collect()
    }

    /// Exit directions of `placed` that are still open: the flag is set and
    /// no segment occupies the neighboring slot.
    fn open_directions(
        &self,
        placed: &PlacedSegment,
        occupied: &BTreeSet<GridPos>,
    ) -> Vec<Direction> {
        let dim = self.config.segment_dim;
        let template = &self.templates[placed.template];
        Direction::ALL
            .into_iter()
            .filter(|&dir| {
                if !template.exits.has(dir) {
                    return false;
                }
                let (dx, dy) = dir.delta();
                !occupied.contains(&placed.offset.offset(dx * dim, dy * dim))
            })
            .collect()
    }

    fn objective_cell(&self, placed: &PlacedSegment) -> Option<GridPos> {
        let (x, y) = self.templates[placed.template].center_floor_cell()?;
        Some(placed.offset.offset(x, y))
    }

    /// Runs generation to completion. Returns the placed segments plus a
    /// report; degraded termination (cap hit) is logged, never fatal.
    pub fn build<R: Rng>(&self, rng: &mut R) -> (Vec<PlacedSegment>, GenerationReport) {
        let dim = self.config.segment_dim;
        let (hub_min, hub_max) = self.config.initial_exit_bucket();
        let mut pool = self.pool_for_bucket(hub_min, hub_max);
        if pool.is_empty() {
            tracing::error!("no hub templates with {hub_min}-{hub_max} exits; using full catalog");
            pool = (0..self.templates.len()).collect();
        }

        let mut placed: Vec<PlacedSegment> = Vec::new();
        let mut occupied: BTreeSet<GridPos> = BTreeSet::new();
        let mut objective: Option<SegmentId> = None;

        // Hub segment at the origin.
        let hub = pool.choose(rng).copied().unwrap_or(self.end_cap);
        placed.push(PlacedSegment::new(hub, GridPos::ORIGIN));
        occupied.insert(GridPos::ORIGIN);

        let mut complete = false;
        let mut iterations = 0;
        while iterations < self.config.generation_iteration_cap {
            iterations += 1;

            // First segment with an unresolved exit.
            let Some(base_idx) = placed.iter().position(|s| !s.exits_done) else {
                complete = true;
                break;
            };

            let options = self.open_directions(&placed[base_idx], &occupied);
            if options.is_empty() {
                placed[base_idx].exits_done = true;
                continue;
            }
            // Using the final open exit closes this segment; a segment is
            // about to be placed there.
            if options.len() == 1 {
                placed[base_idx].exits_done = true;
            }
            let Some(&direction) = options.choose(rng) else {
                continue;
            };

            let connectable: Vec<usize> = pool
                .iter()
                .copied()
                .filter(|&i| self.templates[i].can_connect(direction))
                .collect();
            let template = match connectable.choose(rng) {
                Some(&idx) => idx,
                None => {
                    tracing::warn!(
                        ?direction,
                        placed = placed.len(),
                        "no connectable template in pool; falling back to end cap"
                    );
                    self.end_cap
                }
            };

            let (dx, dy) = direction.delta();
            let offset = placed[base_idx].offset.offset(dx * dim, dy * dim);
            let mut segment = PlacedSegment::new(template, offset);
            if self.templates[template].exit_count() <= 1 {
                // Dead ends and caps are done the moment they land.
                segment.exits_done = true;
            }
            placed.push(segment);
            occupied.insert(offset);

            // Narrow the branching pool as the level grows.
            for tier in &self.config.taper {
                if placed.len() == tier.at_count {
                    pool = self.pool_for_bucket(tier.exit_min, tier.exit_max);
                }
            }

            // Site the objective once the level is both big and far enough.
            if objective.is_none()
                && placed.len() >= self.config.objective_min_segments
                && segment.segment_distance(dim) >= self.config.objective_min_distance
            {
                objective = Some(SegmentId(placed.len() - 1));
            }
        }

        if !complete {
            tracing::error!(
                iterations,
                placed = placed.len(),
                "generation hit the iteration cap; level may be incomplete"
            );
        }

        if objective.is_none() {
            // The loop closed before the thresholds were both met; fall back
            // to the last segment placed.
            objective = Some(SegmentId(placed.len() - 1));
        }
        let objective_cell =
            objective.and_then(|SegmentId(idx)| self.objective_cell(&placed[idx]));

        (
            placed,
            GenerationReport {
                complete,
                iterations,
                objective_segment: objective,
                objective_cell,
            },
        )
    }
}
