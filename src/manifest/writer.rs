//! Manifest file output.

use super::TableManifest;
use crate::error::{Result, TransformationError};
use std::path::{Path, PathBuf};
use tracing::info;

/// Destination for generated manifests.
pub trait ManifestWriter: Send + Sync {
    /// Stores the manifest of the table `name`.
    fn write(&self, name: &str, manifest: &TableManifest) -> Result<()>;
}

/// Writes `<name>.manifest` files into the output tables directory.
#[derive(Debug, Clone)]
pub struct FileManifestWriter {
    out_tables_dir: PathBuf,
}

impl FileManifestWriter {
    pub fn new(out_tables_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_tables_dir: out_tables_dir.into(),
        }
    }

    /// Writer for `<data_dir>/out/tables`.
    pub fn for_data_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join("out").join("tables"))
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.out_tables_dir.join(format!("{name}.manifest"))
    }
}

impl ManifestWriter for FileManifestWriter {
    fn write(&self, name: &str, manifest: &TableManifest) -> Result<()> {
        std::fs::create_dir_all(&self.out_tables_dir).map_err(|e| {
            TransformationError::manifest(format!(
                "Failed to create {}: {e}",
                self.out_tables_dir.display()
            ))
        })?;

        let path = self.path_for(name);
        let content = serde_json::to_string_pretty(manifest).map_err(|e| {
            TransformationError::manifest(format!("Failed to serialize manifest of \"{name}\": {e}"))
        })?;
        std::fs::write(&path, content).map_err(|e| {
            TransformationError::manifest(format!("Failed to write {}: {e}", path.display()))
        })?;

        info!("Manifest of table \"{}\" written to {}", name, path.display());
        Ok(())
    }
}
