//! Authored content for the dungeon simulation.
//!
//! Ships a built-in catalog (segment templates, enemy archetypes, weapons,
//! loot) and RON loaders for external data files. Content is pure data:
//! it is consumed by the runtime and never holds simulation state.

pub mod builtin;
pub mod loaders;

pub use loaders::{ArchetypeLoader, ConfigLoader, SegmentLoader};
