//! Deterministic turn-based dungeon simulation core.
//!
//! `crawl-core` defines the canonical rules of the simulation: procedural
//! level assembly, the navigation graph and pathfinder, budgeted spawn
//! allocation, the round state machine, and the enemy turn planner. All
//! state mutation flows through [`round::RoundStateMachine`], and supporting
//! crates depend on the types re-exported here.
//!
//! The crate is single-threaded: the embedding runtime calls
//! discrete update methods once per simulation tick, and multi-tick
//! operations are modeled as explicit phases with a progress counter.
pub mod ai;
pub mod combat;
pub mod config;
pub mod events;
pub mod level;
pub mod nav;
pub mod round;
pub mod spawn;
pub mod state;

pub use ai::{
    DirectMovement, EnemyTurnPlanner, MoveCandidate, MovementPolicy, PatternTargeting,
    SpreadMovement, TargetingPolicy, TurnPlan,
};
pub use combat::{AttackResolution, Weapon, WeaponSpec};
pub use config::{DifficultyCurve, SimConfig, TaperTier};
pub use events::SimEvent;
pub use level::{
    ExitFlags, GenerationReport, LevelGraph, LevelGraphBuilder, PlacedSegment, SegmentId,
    SegmentTemplate,
};
pub use nav::{NavGraph, NavNode, NodeId, PathFinder, PathResult, SearchStatus};
pub use round::{Notifications, RoundError, RoundPhase, RoundStateMachine, Stage, StageContent};
pub use spawn::{EnemyArchetype, LootArchetype, LootKind, Pickup, SpawnAllocator, SpawnReport};
pub use state::{
    ActionPhase, Agent, AgentId, ApproachKind, AttackStage, Direction, Faction, GridPos,
    PlayerIntent, ResourceMeter,
};
