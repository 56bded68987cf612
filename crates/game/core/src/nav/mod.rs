//! Navigation graph over walkable cells plus bounded-cost pathfinding.

mod graph;
mod pathfinder;

pub use graph::{NavGraph, NavNode, NodeId, SearchStatus};
pub use pathfinder::{PathFinder, PathResult};
