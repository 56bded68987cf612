//! Procedural level assembly from modular tile segments.

mod builder;
mod segment;

pub use builder::{GenerationReport, LevelGraphBuilder};
pub use segment::{ExitFlags, PlacedSegment, SegmentId, SegmentTemplate};

use crate::nav::{NavGraph, NodeId};
use crate::state::GridPos;

/// The assembled level: placed segments, the navigation graph built over
/// their walkable cells, the unconsumed spawn-point candidates, and the
/// objective cell once sited.
#[derive(Debug, Default)]
pub struct LevelGraph {
    pub segments: Vec<PlacedSegment>,
    pub nav: NavGraph,
    pub spawn_points: Vec<NodeId>,
    pub objective: Option<GridPos>,
}

impl LevelGraph {
    /// Assembles the level from generation output. Spawn-point candidates
    /// start as every navigation node.
    pub fn assemble(
        templates: &[SegmentTemplate],
        segments: Vec<PlacedSegment>,
        objective: Option<GridPos>,
    ) -> Self {
        let nav = NavGraph::build(templates, &segments);
        let spawn_points = nav.node_ids().collect();
        Self {
            segments,
            nav,
            spawn_points,
            objective,
        }
    }

    /// Drops every per-stage collection. Partial clears leak stale links
    /// into the next stage, so everything goes at once.
    pub fn clear(&mut self) {
        self.segments.clear();
        self.nav = NavGraph::default();
        self.spawn_points.clear();
        self.objective = None;
    }
}
