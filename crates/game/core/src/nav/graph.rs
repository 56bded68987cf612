use std::collections::BTreeMap;

use crate::level::{PlacedSegment, SegmentTemplate};
use crate::state::{Direction, GridPos};

/// Index of a node within the navigation graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeId(pub u32);

impl NodeId {
    #[inline]
    pub(crate) fn idx(self) -> usize {
        self.0 as usize
    }
}

/// Search lifecycle of a node during one pathfinding call. Transient:
/// reset via the dirty list before the next search.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SearchStatus {
    #[default]
    Unvisited,
    /// Initialized with costs but not yet settled.
    Frontier,
    Settled,
    /// Rejected: over the distance bound or occupied.
    Blocked,
}

/// One walkable cell. Neighbor links are permanent (built once per stage);
/// the search fields are scratch space owned by the current pathfinding
/// call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NavNode {
    pub position: GridPos,
    /// Up/right/down/left, indexed by [`Direction::index`]. Links exist
    /// only between nodes exactly one grid unit apart, orthogonally.
    pub neighbors: [Option<NodeId>; 4],
    pub(crate) status: SearchStatus,
    pub(crate) g_cost: u32,
    pub(crate) h_cost: u32,
    pub(crate) f_cost: u32,
    pub(crate) predecessor: Option<NodeId>,
}

impl NavNode {
    fn new(position: GridPos) -> Self {
        Self {
            position,
            neighbors: [None; 4],
            status: SearchStatus::Unvisited,
            g_cost: 0,
            h_cost: 0,
            f_cost: 0,
            predecessor: None,
        }
    }

    pub(crate) fn reset_search(&mut self) {
        self.status = SearchStatus::Unvisited;
        self.g_cost = 0;
        self.h_cost = 0;
        self.f_cost = 0;
        self.predecessor = None;
    }

    pub fn status(&self) -> SearchStatus {
        self.status
    }

    pub fn f_cost(&self) -> u32 {
        self.f_cost
    }
}

/// The navigation graph: one node per walkable cell of every placed
/// segment, with orthogonal unit adjacency.
#[derive(Clone, Debug, Default)]
pub struct NavGraph {
    nodes: Vec<NavNode>,
    index: BTreeMap<GridPos, NodeId>,
    /// Nodes touched by the current search; clearing exactly these before
    /// the next call keeps reset cost O(visited).
    pub(crate) dirty: Vec<NodeId>,
}

impl NavGraph {
    /// Instantiates one node per walkable cell at world position, then
    /// classifies neighbors by exact unit offset into the four links.
    pub fn build(templates: &[SegmentTemplate], segments: &[PlacedSegment]) -> Self {
        let mut graph = NavGraph::default();

        for segment in segments {
            let template = &templates[segment.template];
            for y in 0..template.dim {
                for x in 0..template.dim {
                    if template.is_floor(x, y) {
                        graph.insert(segment.offset.offset(x, y));
                    }
                }
            }
        }
        graph.link_neighbors();
        graph
    }

    fn insert(&mut self, position: GridPos) -> NodeId {
        if let Some(&existing) = self.index.get(&position) {
            return existing;
        }
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(NavNode::new(position));
        self.index.insert(position, id);
        id
    }

    fn link_neighbors(&mut self) {
        for idx in 0..self.nodes.len() {
            let position = self.nodes[idx].position;
            for direction in Direction::ALL {
                let neighbor = self.index.get(&position.step(direction)).copied();
                self.nodes[idx].neighbors[direction.index()] = neighbor;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &NavNode {
        &self.nodes[id.idx()]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut NavNode {
        &mut self.nodes[id.idx()]
    }

    /// Node occupying the given world cell, if the cell is walkable.
    pub fn node_at(&self, position: GridPos) -> Option<NodeId> {
        self.index.get(&position).copied()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len() as u32).map(NodeId)
    }

    pub fn positions(&self) -> impl Iterator<Item = GridPos> + '_ {
        self.nodes.iter().map(|n| n.position)
    }

    /// Clears the scratch fields of every node the previous search touched.
    /// Mandatory before each search; omitting it corrupts the next one.
    pub(crate) fn clear_dirty(&mut self) {
        while let Some(id) = self.dirty.pop() {
            self.nodes[id.idx()].reset_search();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::ExitFlags;

    fn one_segment_graph() -> NavGraph {
        // 3x3 fully walkable segment at the origin.
        let template = SegmentTemplate::new("open", 3, ExitFlags::empty(), vec![true; 9]);
        let placed = vec![PlacedSegment::new(0, GridPos::ORIGIN)];
        NavGraph::build(&[template], &placed)
    }

    #[test]
    fn builds_one_node_per_floor_cell() {
        let graph = one_segment_graph();
        assert_eq!(graph.len(), 9);
        assert!(graph.node_at(GridPos::new(2, 2)).is_some());
        assert!(graph.node_at(GridPos::new(3, 0)).is_none());
    }

    #[test]
    fn links_are_exact_unit_offsets() {
        let graph = one_segment_graph();
        let center = graph.node_at(GridPos::new(1, 1)).unwrap();
        let node = graph.node(center);
        for direction in Direction::ALL {
            let linked = node.neighbors[direction.index()].expect("center has 4 neighbors");
            assert_eq!(
                graph.node(linked).position,
                GridPos::new(1, 1).step(direction)
            );
        }

        let corner = graph.node_at(GridPos::ORIGIN).unwrap();
        let corner_links = graph
            .node(corner)
            .neighbors
            .iter()
            .filter(|n| n.is_some())
            .count();
        assert_eq!(corner_links, 2);
    }

    #[test]
    fn adjacent_segments_join_across_the_seam() {
        let template = SegmentTemplate::new("open", 3, ExitFlags::all(), vec![true; 9]);
        let placed = vec![
            PlacedSegment::new(0, GridPos::ORIGIN),
            PlacedSegment::new(0, GridPos::new(3, 0)),
        ];
        let graph = NavGraph::build(&[template], &placed);
        assert_eq!(graph.len(), 18);

        let west = graph.node_at(GridPos::new(2, 1)).unwrap();
        let east = graph.node_at(GridPos::new(3, 1)).unwrap();
        assert_eq!(
            graph.node(west).neighbors[Direction::Right.index()],
            Some(east)
        );
        assert_eq!(
            graph.node(east).neighbors[Direction::Left.index()],
            Some(west)
        );
    }
}
