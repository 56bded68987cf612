//! Simulation configuration loader.

use std::path::Path;

use anyhow::bail;
use crawl_core::SimConfig;

use crate::loaders::{read_file, LoadResult};

/// Loader for simulation configuration from RON files.
pub struct ConfigLoader;

impl ConfigLoader {
    pub fn load(path: &Path) -> LoadResult<SimConfig> {
        let content = read_file(path)?;
        let config: SimConfig = ron::from_str(&content)
            .map_err(|e| anyhow::anyhow!("failed to parse config RON: {}", e))?;

        if config.segment_dim <= 0 {
            bail!("segment_dim must be positive, got {}", config.segment_dim);
        }
        if config.generation_iteration_cap == 0 || config.spawn_iteration_cap == 0 {
            bail!("iteration caps must be non-zero");
        }
        Ok(config)
    }
}
