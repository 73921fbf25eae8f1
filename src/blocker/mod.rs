//! Merge-queue engine
//!
//! The [`Blocker`] keeps one [`PrPool`] per configured repository and runs
//! three passes over them, always in this order:
//!
//! 1. pool sync: list open PRs, apply the simple conditions
//! 2. status sync: apply the full conditions to merge pool members and
//!    publish the aggregate commit status
//! 3. merge: merge or retest the oldest successful PR of every pool
//!
//! The [`Scheduler`] drives the passes; [`status_router`] exposes the pools.

mod checks;
mod jobs;
mod merge;
mod pool;
mod scheduler;
mod status_server;
mod sync_pool;
mod sync_status;

pub use checks::{
    FullVerdict, LiveCheck, Verdict, check_checks, check_full, check_simple, evaluate_full,
};
pub use jobs::{
    batch_job_request, commit_message, filter_jobs, merge_method, parse_base_sha,
    render_commit_message,
};
pub use pool::{
    Batch, DEFAULT_BLOCKER_MESSAGE, IN_MERGE_POOL_MESSAGE, MergePool, PoolState, PrPool,
    TrackedPullRequest,
};
pub use scheduler::{CycleProgress, Scheduler, Stage, jittered};
pub use status_server::{PoolDetail, PoolSummary, serve_status, status_router};

use crate::config::{BlockerSettings, MergeConfig, MergeQuery, RepoConfig};
use crate::error::{Error, Result};
use crate::platform::{GitProvider, ProviderFactory};
use crate::store::{ConfigStore, JobStore};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Identity of a repository queue: `<api host>/<owner>/<repo>`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct PoolKey(String);

impl PoolKey {
    /// Key for the repository configured in `config`
    pub fn for_config(config: &RepoConfig) -> Self {
        let api_url = config.git.api_url();
        let host = api_url
            .strip_prefix("https://")
            .or_else(|| api_url.strip_prefix("http://"))
            .unwrap_or(api_url);
        Self(format!("{host}/{}", config.git.repository))
    }

    /// Key as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PoolKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

/// The merge-queue engine
pub struct Blocker {
    settings: BlockerSettings,
    configs: Arc<dyn ConfigStore>,
    jobs: Arc<dyn JobStore>,
    providers: Arc<dyn ProviderFactory>,
    /// Only the pool sync adds or removes entries
    pools: RwLock<BTreeMap<PoolKey, Arc<PrPool>>>,
}

impl Blocker {
    /// Create an engine with no pools
    pub fn new(
        settings: BlockerSettings,
        configs: Arc<dyn ConfigStore>,
        jobs: Arc<dyn JobStore>,
        providers: Arc<dyn ProviderFactory>,
    ) -> Self {
        Self {
            settings,
            configs,
            jobs,
            providers,
            pools: RwLock::new(BTreeMap::new()),
        }
    }

    /// Engine settings
    pub const fn settings(&self) -> &BlockerSettings {
        &self.settings
    }

    /// Pool for `key`
    pub async fn pool(&self, key: &PoolKey) -> Option<Arc<PrPool>> {
        self.pools.read().await.get(key).cloned()
    }

    /// Every pool, ordered by key
    pub async fn pools(&self) -> Vec<(PoolKey, Arc<PrPool>)> {
        self.pools
            .read()
            .await
            .iter()
            .map(|(key, pool)| (key.clone(), Arc::clone(pool)))
            .collect()
    }

    /// Provider client for `config`
    fn provider_for(&self, config: &RepoConfig) -> Result<Arc<dyn GitProvider>> {
        let token = config
            .git
            .token
            .as_ref()
            .and_then(crate::config::GitToken::resolve)
            .ok_or_else(|| {
                Error::Config(format!(
                    "{}/{}: no access token",
                    config.namespace, config.name
                ))
            })?;
        self.providers.create(config, &token)
    }

    /// Current configuration of the repository behind `pool`
    async fn pool_config(&self, pool: &PrPool) -> Result<RepoConfig> {
        self.configs.get(pool.namespace(), pool.name()).await
    }

    /// Query with the global block label folded in
    fn effective_query(&self, merge: &MergeConfig) -> MergeQuery {
        let mut query = merge.query.clone();
        let label = &self.settings.block_label;
        if !label.is_empty() && !query.block_labels.contains(label) {
            query.block_labels.push(label.clone());
        }
        query
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GitConfig, ProviderKind};

    fn config(kind: ProviderKind, api_url: Option<&str>) -> RepoConfig {
        RepoConfig {
            namespace: "default".to_string(),
            name: "cicd".to_string(),
            git: GitConfig {
                kind,
                api_url: api_url.map(ToString::to_string),
                repository: "tmax-cloud/cicd-test".to_string(),
                token: None,
            },
            ..RepoConfig::default()
        }
    }

    #[test]
    fn test_pool_key() {
        assert_eq!(
            PoolKey::for_config(&config(ProviderKind::Github, None)).as_str(),
            "api.github.com/tmax-cloud/cicd-test"
        );
        assert_eq!(
            PoolKey::for_config(&config(ProviderKind::Gitlab, None)).as_str(),
            "gitlab.com/tmax-cloud/cicd-test"
        );
        assert_eq!(
            PoolKey::for_config(&config(
                ProviderKind::Gitlab,
                Some("http://gitlab.internal:8080")
            ))
            .as_str(),
            "gitlab.internal:8080/tmax-cloud/cicd-test"
        );
    }
}
