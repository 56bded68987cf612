use std::collections::BTreeSet;

use rand::Rng;

use crate::state::{Direction, GridPos};

use super::{NavGraph, NodeId, SearchStatus};

/// When the obstructed path is this many times longer than the direct
/// path, the dual-pass resolver gives up on detouring. Lets agents queue
/// up behind each other instead of taking huge flanking loops, while still
/// permitting reasonable flanks.
const DETOUR_FACTOR: usize = 4;

/// An ordered sequence of unit steps, listed from the *last* move to the
/// *first*: walking it in order and popping from the end yields forward
/// traversal. Empty means unreachable or over the requested maximum.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PathResult {
    steps: Vec<Direction>,
}

impl PathResult {
    pub const EMPTY: Self = Self { steps: Vec::new() };

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Steps in stored order (last move first).
    pub fn steps(&self) -> &[Direction] {
        &self.steps
    }

    /// Removes and returns the next forward step.
    pub fn pop_next(&mut self) -> Option<Direction> {
        self.steps.pop()
    }

    /// The next forward step without consuming it.
    pub fn peek_next(&self) -> Option<Direction> {
        self.steps.last().copied()
    }
}

/// Bounded-cost dual-mode pathfinder over a [`NavGraph`].
///
/// Borrows the graph mutably for the duration of a call: the transient
/// per-node search state has a single writer by construction, and every
/// touched node lands on the graph's dirty list so the next search can
/// reset exactly those nodes.
pub struct PathFinder<'a> {
    graph: &'a mut NavGraph,
}

impl<'a> PathFinder<'a> {
    pub fn new(graph: &'a mut NavGraph) -> Self {
        Self { graph }
    }

    /// Single-pass search.
    ///
    /// Flood-fill variant of uniform-cost search with a Manhattan heuristic
    /// (admissible and consistent on 4-connected grids): repeatedly settle
    /// the frontier node with the lowest f, tie-breaking on lowest h and
    /// then a coin flip. The coin flip is intentional: it diversifies the
    /// routes different agents take through identical terrain.
    ///
    /// Nodes whose f exceeds `max_distance` are rejected. When
    /// `avoid_occupied` is set, cells in `occupied` (other than the origin
    /// and target) are rejected outright.
    pub fn find<R: Rng>(
        &mut self,
        origin: GridPos,
        target: GridPos,
        occupied: &BTreeSet<GridPos>,
        avoid_occupied: bool,
        max_distance: u32,
        rng: &mut R,
    ) -> PathResult {
        self.graph.clear_dirty();

        let (Some(origin_id), Some(target_id)) =
            (self.graph.node_at(origin), self.graph.node_at(target))
        else {
            return PathResult::EMPTY;
        };
        if origin_id == target_id {
            return PathResult::EMPTY;
        }
        // Even the straight line is over budget; nothing to visit.
        if origin.manhattan(target) > max_distance {
            return PathResult::EMPTY;
        }

        {
            let node = self.graph.node_mut(origin_id);
            node.status = SearchStatus::Frontier;
            node.g_cost = 0;
            node.h_cost = origin.manhattan(target);
            node.f_cost = node.h_cost;
        }
        self.graph.dirty.push(origin_id);

        let mut frontier: Vec<NodeId> = vec![origin_id];

        while let Some(current_id) = self.take_best(&mut frontier, rng) {
            self.graph.node_mut(current_id).status = SearchStatus::Settled;
            if current_id == target_id {
                return self.materialize(origin_id, target_id);
            }

            let current = *self.graph.node(current_id);
            for neighbor_id in current.neighbors.into_iter().flatten() {
                let neighbor = self.graph.node(neighbor_id);
                if neighbor.status != SearchStatus::Unvisited {
                    continue;
                }
                let position = neighbor.position;
                let g = current.g_cost + 1;
                let h = position.manhattan(target);
                let f = g + h;

                let over_budget = f > max_distance;
                let occupied_cell = avoid_occupied
                    && position != origin
                    && position != target
                    && occupied.contains(&position);

                let node = self.graph.node_mut(neighbor_id);
                if over_budget || occupied_cell {
                    node.status = SearchStatus::Blocked;
                } else {
                    node.status = SearchStatus::Frontier;
                    node.g_cost = g;
                    node.h_cost = h;
                    node.f_cost = f;
                    node.predecessor = Some(current_id);
                    frontier.push(neighbor_id);
                }
                self.graph.dirty.push(neighbor_id);
            }
        }

        PathResult::EMPTY
    }

    /// Dual-pass motion plan: an obstructed "open" pass first, then a
    /// "direct" pass that ignores agents. Prefers the open path unless it
    /// is empty, over the bound, or more than [`DETOUR_FACTOR`]x the direct
    /// length, in which case the direct path is used.
    pub fn plan<R: Rng>(
        &mut self,
        origin: GridPos,
        target: GridPos,
        occupied: &BTreeSet<GridPos>,
        max_distance: u32,
        rng: &mut R,
    ) -> PathResult {
        let open = self.find(origin, target, occupied, true, max_distance, rng);
        let direct = self.find(origin, target, occupied, false, max_distance, rng);

        if open.is_empty() || open.len() > max_distance as usize {
            return direct;
        }
        if !direct.is_empty() && open.len() > DETOUR_FACTOR * direct.len() {
            return direct;
        }
        open
    }

    /// Picks the frontier entry with the lowest f, tie-break lowest h,
    /// second tie-break coin flip, and removes it from the list.
    fn take_best<R: Rng>(&self, frontier: &mut Vec<NodeId>, rng: &mut R) -> Option<NodeId> {
        if frontier.is_empty() {
            return None;
        }
        let mut best = 0;
        for i in 1..frontier.len() {
            let candidate = self.graph.node(frontier[i]);
            let leader = self.graph.node(frontier[best]);
            if candidate.f_cost < leader.f_cost
                || (candidate.f_cost == leader.f_cost && candidate.h_cost < leader.h_cost)
                || (candidate.f_cost == leader.f_cost
                    && candidate.h_cost == leader.h_cost
                    && rng.gen_bool(0.5))
            {
                best = i;
            }
        }
        Some(frontier.swap_remove(best))
    }

    /// Iterative walk of predecessor links from target back to origin,
    /// emitting the travel direction of each step.
    fn materialize(&self, origin_id: NodeId, target_id: NodeId) -> PathResult {
        let mut steps = Vec::new();
        let mut cursor = target_id;

        while cursor != origin_id {
            let node = self.graph.node(cursor);
            let Some(pred_id) = node.predecessor else {
                tracing::error!(
                    position = %node.position,
                    "settled node without predecessor; navigation graph corrupt"
                );
                return PathResult::EMPTY;
            };
            let pred = self.graph.node(pred_id);
            let Some(direction) = pred.position.direction_to(node.position) else {
                tracing::error!(
                    from = %pred.position,
                    to = %node.position,
                    "predecessor offset is not a unit step; navigation graph corrupt"
                );
                return PathResult::EMPTY;
            };
            steps.push(direction);
            if steps.len() > self.graph.len() {
                tracing::error!("predecessor chain cycles; navigation graph corrupt");
                return PathResult::EMPTY;
            }
            cursor = pred_id;
        }

        PathResult { steps }
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::level::{ExitFlags, PlacedSegment, SegmentTemplate};

    fn corridor(length: i32) -> NavGraph {
        // A 1-wide open corridor along y == 0, built as one custom segment.
        let dim = length;
        let mut floor = vec![false; (dim * dim) as usize];
        for x in 0..dim {
            floor[x as usize] = true;
        }
        let template = SegmentTemplate::new("corridor", dim, ExitFlags::empty(), floor);
        NavGraph::build(&[template], &[PlacedSegment::new(0, GridPos::ORIGIN)])
    }

    fn open_room(dim: i32) -> NavGraph {
        let template =
            SegmentTemplate::new("room", dim, ExitFlags::empty(), vec![true; (dim * dim) as usize]);
        NavGraph::build(&[template], &[PlacedSegment::new(0, GridPos::ORIGIN)])
    }

    fn rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(42)
    }

    #[test]
    fn corridor_path_is_exact_manhattan_steps() {
        let mut graph = corridor(8);
        let mut rng = rng();
        let path = PathFinder::new(&mut graph).find(
            GridPos::new(0, 0),
            GridPos::new(3, 0),
            &BTreeSet::new(),
            false,
            25,
            &mut rng,
        );
        // Reverse-walk order; on a straight corridor every step is east.
        assert_eq!(
            path.steps(),
            &[Direction::Right, Direction::Right, Direction::Right]
        );
        assert_eq!(path.len(), 3);
    }

    #[test]
    fn unobstructed_path_length_equals_manhattan_distance() {
        let mut graph = open_room(9);
        let mut rng = rng();
        let origin = GridPos::new(1, 1);
        for target in [GridPos::new(7, 1), GridPos::new(4, 6), GridPos::new(1, 8)] {
            let path = PathFinder::new(&mut graph).find(
                origin,
                target,
                &BTreeSet::new(),
                false,
                25,
                &mut rng,
            );
            assert_eq!(path.len() as u32, origin.manhattan(target));

            // Steps sum to the straight-line offset.
            let (mut dx, mut dy) = (0, 0);
            for step in path.steps() {
                let (sx, sy) = step.delta();
                dx += sx;
                dy += sy;
            }
            assert_eq!(GridPos::new(origin.x + dx, origin.y + dy), target);
        }
    }

    #[test]
    fn results_never_exceed_max_distance() {
        let mut graph = open_room(12);
        let mut rng = rng();
        let path = PathFinder::new(&mut graph).find(
            GridPos::new(0, 0),
            GridPos::new(11, 11),
            &BTreeSet::new(),
            false,
            10,
            &mut rng,
        );
        assert!(path.is_empty(), "22-step target is out of a 10-step budget");

        // And no visited node carries an f-cost over the bound.
        for id in graph.node_ids() {
            let node = graph.node(id);
            if node.status() != SearchStatus::Unvisited
                && node.status() != SearchStatus::Blocked
            {
                assert!(node.f_cost() <= 10);
            }
        }
    }

    #[test]
    fn occupied_cells_are_rejected_in_open_mode() {
        let mut graph = corridor(6);
        let mut rng = rng();
        let occupied = BTreeSet::from([GridPos::new(2, 0)]);
        let open = PathFinder::new(&mut graph).find(
            GridPos::new(0, 0),
            GridPos::new(4, 0),
            &occupied,
            true,
            25,
            &mut rng,
        );
        assert!(open.is_empty(), "a 1-wide corridor cannot be flanked");

        let direct = PathFinder::new(&mut graph).find(
            GridPos::new(0, 0),
            GridPos::new(4, 0),
            &occupied,
            false,
            25,
            &mut rng,
        );
        assert_eq!(direct.len(), 4);
    }

    #[test]
    fn origin_and_target_are_exempt_from_occupancy() {
        let mut graph = corridor(6);
        let mut rng = rng();
        let occupied = BTreeSet::from([GridPos::new(0, 0), GridPos::new(4, 0)]);
        let path = PathFinder::new(&mut graph).find(
            GridPos::new(0, 0),
            GridPos::new(4, 0),
            &occupied,
            true,
            25,
            &mut rng,
        );
        assert_eq!(path.len(), 4);
    }

    #[test]
    fn dual_pass_falls_back_to_the_direct_path() {
        let mut graph = corridor(6);
        let mut rng = rng();
        let occupied = BTreeSet::from([GridPos::new(2, 0)]);
        let plan = PathFinder::new(&mut graph).plan(
            GridPos::new(0, 0),
            GridPos::new(4, 0),
            &occupied,
            25,
            &mut rng,
        );
        // Open pass is empty, so the resolver returns the direct path.
        assert_eq!(plan.len(), 4);
    }

    #[test]
    fn dirty_list_reset_keeps_back_to_back_searches_clean() {
        let mut graph = open_room(9);
        let mut rng = rng();
        let origin = GridPos::new(0, 0);
        let target = GridPos::new(5, 3);

        let first = PathFinder::new(&mut graph).find(
            origin,
            target,
            &BTreeSet::new(),
            false,
            25,
            &mut rng,
        );
        // A second search over the same scratch space must still succeed
        // with a minimal-length result.
        let second = PathFinder::new(&mut graph).find(
            origin,
            target,
            &BTreeSet::new(),
            false,
            25,
            &mut rng,
        );
        assert_eq!(first.len(), 8);
        assert_eq!(second.len(), 8);
    }

    #[test]
    fn same_cell_and_missing_nodes_yield_empty() {
        let mut graph = corridor(4);
        let mut rng = rng();
        let mut finder = PathFinder::new(&mut graph);
        let same = finder.find(
            GridPos::ORIGIN,
            GridPos::ORIGIN,
            &BTreeSet::new(),
            false,
            25,
            &mut rng,
        );
        assert!(same.is_empty());
        let off_graph = finder.find(
            GridPos::ORIGIN,
            GridPos::new(0, 3),
            &BTreeSet::new(),
            false,
            25,
            &mut rng,
        );
        assert!(off_graph.is_empty());
    }

    #[test]
    fn pop_next_walks_the_path_forward() {
        let mut graph = corridor(5);
        let mut rng = rng();
        let mut path = PathFinder::new(&mut graph).find(
            GridPos::new(0, 0),
            GridPos::new(2, 0),
            &BTreeSet::new(),
            false,
            25,
            &mut rng,
        );
        let mut cursor = GridPos::new(0, 0);
        while let Some(step) = path.pop_next() {
            cursor = cursor.step(step);
        }
        assert_eq!(cursor, GridPos::new(2, 0));
    }
}
