//! Loaders for reading content catalogs from RON files.

pub mod archetypes;
pub mod config;
pub mod segments;

pub use archetypes::ArchetypeLoader;
pub use config::ConfigLoader;
pub use segments::SegmentLoader;

use std::path::Path;

/// Common result type for loaders.
pub type LoadResult<T> = anyhow::Result<T>;

pub(crate) fn read_file(path: &Path) -> LoadResult<String> {
    std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read file {}: {}", path.display(), e))
}
