use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::discovery::{SeedBatch, SourceLoader};
use crate::error::{GraphError, Result};

const SEED_EXTENSIONS: &[&str] = &["json", "yaml", "yml"];

/// Loads every `.json` / `.yaml` / `.yml` seed file under a directory.
///
/// Files are read in path order, so a relationship may reference an entity
/// declared in an earlier file. A file that fails to parse fails the whole
/// load.
#[derive(Debug, Clone)]
pub struct DirectoryLoader {
    root: PathBuf,
}

impl DirectoryLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn seed_files(&self) -> Result<Vec<PathBuf>> {
        if !self.root.is_dir() {
            return Err(GraphError::Config(format!(
                "seed directory does not exist: {}",
                self.root.display()
            )));
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&self.root)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let extension = path
                .extension()
                .and_then(|s| s.to_str())
                .unwrap_or("")
                .to_lowercase();
            if SEED_EXTENSIONS.contains(&extension.as_str()) {
                files.push(path.to_path_buf());
            }
        }
        Ok(files)
    }
}

fn parse_seed(content: &str, path: &Path) -> Result<SeedBatch> {
    let is_json = path
        .extension()
        .and_then(|s| s.to_str())
        .map_or(false, |ext| ext.eq_ignore_ascii_case("json"));

    if is_json {
        serde_json::from_str(content).map_err(|e| {
            GraphError::Parse(format!("JSON parse error in {}: {}", path.display(), e))
        })
    } else {
        serde_yaml_ng::from_str(content).map_err(|e| {
            GraphError::Parse(format!("YAML parse error in {}: {}", path.display(), e))
        })
    }
}

impl SourceLoader for DirectoryLoader {
    fn load(&self) -> Result<SeedBatch> {
        let mut batch = SeedBatch::default();
        let files = self.seed_files()?;

        for path in &files {
            let content = std::fs::read_to_string(path)?;
            if content.trim().is_empty() {
                continue;
            }
            batch.extend(parse_seed(&content, path)?);
        }

        log::debug!(
            "loaded {} entities and {} relationships from {} seed files in {}",
            batch.entities.len(),
            batch.relationships.len(),
            files.len(),
            self.root.display()
        );
        Ok(batch)
    }
}
