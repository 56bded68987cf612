//! Enemy and loot archetype loaders.

use std::path::Path;

use anyhow::bail;
use crawl_core::{EnemyArchetype, LootArchetype};
use serde::{Deserialize, Serialize};

use crate::loaders::{read_file, LoadResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EnemyCatalog {
    enemies: Vec<EnemyArchetype>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LootCatalog {
    loot: Vec<LootArchetype>,
}

/// Loader for archetype catalogs from RON files.
pub struct ArchetypeLoader;

impl ArchetypeLoader {
    pub fn load_enemies(path: &Path) -> LoadResult<Vec<EnemyArchetype>> {
        let content = read_file(path)?;
        let catalog: EnemyCatalog = ron::from_str(&content)
            .map_err(|e| anyhow::anyhow!("failed to parse enemy catalog RON: {}", e))?;
        for archetype in &catalog.enemies {
            // A non-positive cost would make the spawn budget loop endless.
            if archetype.cost <= 0.0 {
                bail!(
                    "enemy archetype '{}' has non-positive cost {}",
                    archetype.name,
                    archetype.cost
                );
            }
        }
        Ok(catalog.enemies)
    }

    pub fn load_loot(path: &Path) -> LoadResult<Vec<LootArchetype>> {
        let content = read_file(path)?;
        let catalog: LootCatalog = ron::from_str(&content)
            .map_err(|e| anyhow::anyhow!("failed to parse loot catalog RON: {}", e))?;
        for archetype in &catalog.loot {
            if archetype.cost <= 0.0 {
                bail!(
                    "loot archetype '{}' has non-positive cost {}",
                    archetype.name,
                    archetype.cost
                );
            }
        }
        Ok(catalog.loot)
    }
}
