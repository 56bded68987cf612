//! Shared value types: identifiers, grid math, agents, and intents.

mod agent;
mod common;

pub use agent::{ActionPhase, Agent, ApproachKind, AttackStage, Faction};
pub use common::{AgentId, Direction, GridPos, PlayerIntent, ResourceMeter};
