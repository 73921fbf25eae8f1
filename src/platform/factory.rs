//! Provider construction

use crate::config::{ProviderKind, RepoConfig};
use crate::error::{Error, Result};
use crate::platform::{GitHubService, GitLabService, GitProvider};
use std::sync::Arc;

/// Builds a provider client for a repository configuration
pub trait ProviderFactory: Send + Sync {
    /// Create a provider bound to `config`'s repository using `token`
    fn create(&self, config: &RepoConfig, token: &str) -> Result<Arc<dyn GitProvider>>;
}

/// Create the provider matching the configured git type
pub fn create_provider(config: &RepoConfig, token: &str) -> Result<Arc<dyn GitProvider>> {
    let git = &config.git;
    let (owner, repo) = git.owner_and_repo().ok_or_else(|| {
        Error::Config(format!(
            "{}/{}: invalid repository {:?}",
            config.namespace, config.name, git.repository
        ))
    })?;

    match git.kind {
        ProviderKind::Github => Ok(Arc::new(GitHubService::new(
            token,
            owner.to_string(),
            repo.to_string(),
            git.api_url(),
        )?)),
        ProviderKind::Gitlab => Ok(Arc::new(GitLabService::new(
            token.to_string(),
            git.repository.clone(),
            git.api_url(),
        )?)),
    }
}

/// Factory dispatching on [`ProviderKind`]
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultProviderFactory;

impl ProviderFactory for DefaultProviderFactory {
    fn create(&self, config: &RepoConfig, token: &str) -> Result<Arc<dyn GitProvider>> {
        create_provider(config, token)
    }
}
