//! Persistent plugin catalogue (`plugins.yml`).

use std::path::{Path, PathBuf};

use {
    serde::{Deserialize, Serialize},
    tokio::fs,
    tracing::debug,
};

use crate::{
    Error, Result,
    error::Context,
    manifest::PluginDescriptor,
};

#[derive(Debug, Default, Serialize, Deserialize)]
struct CatalogueFile {
    #[serde(default)]
    plugins: Vec<PluginDescriptor>,
}

/// YAML file holding every known plugin descriptor.
pub struct CatalogueStore {
    path: PathBuf,
}

impl CatalogueStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load all descriptors. A missing or empty file is an empty catalogue.
    ///
    /// Blocking; only used while the manager is constructed.
    pub fn load(&self) -> Result<Vec<PluginDescriptor>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let data = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        if data.trim().is_empty() {
            return Ok(Vec::new());
        }
        let file: CatalogueFile = serde_yaml::from_str(&data)
            .map_err(|e| Error::external(format!("failed to parse {}", self.path.display()), e))?;
        debug!(count = file.plugins.len(), path = %self.path.display(), "loaded plugin catalogue");
        Ok(file.plugins)
    }

    /// Replace the catalogue with `plugins`, via a temp file and rename.
    pub async fn save(&self, plugins: Vec<PluginDescriptor>) -> Result<()> {
        let yaml = serde_yaml::to_string(&CatalogueFile { plugins })?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("yml.tmp");
        fs::write(&tmp, yaml).await?;
        fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("failed to replace {}", self.path.display()))?;
        Ok(())
    }
}
