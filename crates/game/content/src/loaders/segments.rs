//! Segment catalog loader.
//!
//! Catalogs use the same ASCII mask convention as the built-in content:
//! rows top-down, `.` for floor.

use std::path::Path;

use anyhow::bail;
use crawl_core::{ExitFlags, SegmentTemplate};
use serde::{Deserialize, Serialize};

use crate::loaders::{read_file, LoadResult};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
enum ExitSpec {
    Up,
    Right,
    Down,
    Left,
}

impl From<ExitSpec> for ExitFlags {
    fn from(spec: ExitSpec) -> Self {
        match spec {
            ExitSpec::Up => ExitFlags::UP,
            ExitSpec::Right => ExitFlags::RIGHT,
            ExitSpec::Down => ExitFlags::DOWN,
            ExitSpec::Left => ExitFlags::LEFT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SegmentSpec {
    name: String,
    exits: Vec<ExitSpec>,
    rows: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SegmentCatalog {
    dim: i32,
    /// Name of the universal end-cap template.
    end_cap: String,
    segments: Vec<SegmentSpec>,
}

/// Loader for segment catalogs from RON files.
pub struct SegmentLoader;

impl SegmentLoader {
    /// Loads a segment catalog. Returns the templates and the index of the
    /// end cap named by the catalog.
    pub fn load(path: &Path) -> LoadResult<(Vec<SegmentTemplate>, usize)> {
        let content = read_file(path)?;
        let catalog: SegmentCatalog = ron::from_str(&content)
            .map_err(|e| anyhow::anyhow!("failed to parse segment catalog RON: {}", e))?;
        Self::from_catalog(catalog)
    }

    fn from_catalog(catalog: SegmentCatalog) -> LoadResult<(Vec<SegmentTemplate>, usize)> {
        let dim = catalog.dim;
        if dim <= 0 {
            bail!("segment dimension must be positive, got {dim}");
        }

        let mut templates = Vec::with_capacity(catalog.segments.len());
        for spec in &catalog.segments {
            if spec.rows.len() != dim as usize {
                bail!(
                    "segment '{}' has {} rows, expected {dim}",
                    spec.name,
                    spec.rows.len()
                );
            }
            let mut floor = vec![false; (dim * dim) as usize];
            for (r, row) in spec.rows.iter().enumerate() {
                if row.chars().count() != dim as usize {
                    bail!("segment '{}' row {r} has the wrong width", spec.name);
                }
                let y = dim as usize - 1 - r;
                for (x, cell) in row.chars().enumerate() {
                    floor[y * dim as usize + x] = cell == '.';
                }
            }
            let exits = spec
                .exits
                .iter()
                .fold(ExitFlags::empty(), |acc, &e| acc | ExitFlags::from(e));
            templates.push(SegmentTemplate::new(spec.name.clone(), dim, exits, floor));
        }

        let Some(end_cap) = templates.iter().position(|t| t.name == catalog.end_cap) else {
            bail!("end cap template '{}' is not in the catalog", catalog.end_cap);
        };
        if templates[end_cap].exit_count() != 0 {
            bail!("end cap '{}' must have no exits", catalog.end_cap);
        }
        Ok((templates, end_cap))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_catalog(text: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        file
    }

    const VALID: &str = r#####"(
        dim: 4,
        end_cap: "cap",
        segments: [
            (name: "hall", exits: [Up, Down], rows: [
                "#..#",
                "#..#",
                "#..#",
                "#..#",
            ]),
            (name: "cap", exits: [], rows: [
                "####",
                "#..#",
                "#..#",
                "####",
            ]),
        ],
    )"#####;

    #[test]
    fn loads_a_valid_catalog() {
        let file = write_catalog(VALID);
        let (templates, end_cap) = SegmentLoader::load(file.path()).unwrap();
        assert_eq!(templates.len(), 2);
        assert_eq!(end_cap, 1);
        assert_eq!(templates[0].exit_count(), 2);
        assert!(templates[0].is_floor(1, 0));
        assert!(!templates[0].is_floor(0, 0));
        assert!(templates[1].is_floor(1, 1));
    }

    #[test]
    fn rejects_a_missing_end_cap() {
        let file = write_catalog(&VALID.replace("end_cap: \"cap\"", "end_cap: \"nonesuch\""));
        assert!(SegmentLoader::load(file.path()).is_err());
    }

    #[test]
    fn rejects_malformed_rows() {
        let short = r#####"(
            dim: 4,
            end_cap: "cap",
            segments: [
                (name: "cap", exits: [], rows: ["####", "#..#"]),
            ],
        )"#####;
        let file = write_catalog(short);
        assert!(SegmentLoader::load(file.path()).is_err());

        let narrow = r#####"(
            dim: 4,
            end_cap: "cap",
            segments: [
                (name: "cap", exits: [], rows: ["####", "#.#", "#..#", "####"]),
            ],
        )"#####;
        let file = write_catalog(narrow);
        assert!(SegmentLoader::load(file.path()).is_err());
    }

    #[test]
    fn rejects_an_end_cap_with_exits() {
        let file =
            write_catalog(&VALID.replace("(name: \"cap\", exits: []", "(name: \"cap\", exits: [Up]"));
        assert!(SegmentLoader::load(file.path()).is_err());
    }
}
