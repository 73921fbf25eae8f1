//! Loading configuration from TOML files

use super::{BlockerFile, RepoConfig};
use crate::error::{Error, Result};
use crate::store::ConfigStore;
use async_trait::async_trait;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Load and validate a configuration file.
pub fn load_config_file(path: &Path) -> Result<BlockerFile> {
    let content = fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;

    let file: BlockerFile = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("failed to parse {}: {e}", path.display())))?;

    validate(&file)?;
    Ok(file)
}

fn validate(file: &BlockerFile) -> Result<()> {
    if file.blocker.max_batch_size == 0 {
        return Err(Error::Config("max_batch_size must be at least 1".to_string()));
    }

    let mut seen = HashSet::new();
    for repo in &file.repositories {
        if repo.git.owner_and_repo().is_none() {
            return Err(Error::Config(format!(
                "{}/{}: repository must be owner/repo, got {:?}",
                repo.namespace, repo.name, repo.git.repository
            )));
        }
        if !seen.insert((repo.namespace.as_str(), repo.name.as_str())) {
            return Err(Error::Config(format!(
                "duplicate repository configuration {}/{}",
                repo.namespace, repo.name
            )));
        }
    }
    Ok(())
}

/// Config store backed by the repository list of a TOML file.
///
/// The file is re-read on every call.
#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    /// Create a store reading `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ConfigStore for FileConfigStore {
    async fn list(&self) -> Result<Vec<RepoConfig>> {
        let file = load_config_file(&self.path)?;
        debug!(count = file.repositories.len(), "listed repository configs");
        Ok(file.repositories)
    }

    async fn get(&self, namespace: &str, name: &str) -> Result<RepoConfig> {
        self.list()
            .await?
            .into_iter()
            .find(|r| r.namespace == namespace && r.name == name)
            .ok_or_else(|| Error::ConfigNotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
    }
}
