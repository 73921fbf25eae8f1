//! Shared fixtures for pr-blocker tests

#![allow(dead_code)]

mod mock_provider;
mod stores;

pub use mock_provider::{
    IssueCall, MergeCall, MockGitProvider, MockProviderFactory, SetStatusCall,
};
pub use stores::{MemoryConfigStore, MemoryJobStore};

use pr_blocker::Blocker;
use pr_blocker::blocker::PoolKey;
use pr_blocker::config::{
    BlockerSettings, GitConfig, GitToken, JobSpec, JobsConfig, MergeConfig, MergeQuery,
    ProviderKind, RepoConfig,
};
use pr_blocker::types::{CommitStatus, CommitStatusState, GitRef, PrState, PullRequest, User};
use std::sync::Arc;

pub const REPOSITORY: &str = "tmax-cloud/cicd-test";
pub const POOL_KEY: &str = "api.github.com/tmax-cloud/cicd-test";
pub const HEAD_SHA: &str = "1896d4e0deaed7cda867f42935934ee13e370012";
pub const BASE_SHA: &str = "22ccae53032027186ba739dfaa473ee61a82b298";
pub const NEW_BASE_SHA: &str = "32cd89e8d07e37ab26d8c735090ae763884283db";
pub const CHECK: &str = "test-1";

/// Repository configuration requiring `approved` + `lgtm` and check `test-1`
pub fn repo_config() -> RepoConfig {
    RepoConfig {
        namespace: "default".to_string(),
        name: "cicd-test".to_string(),
        git: GitConfig {
            kind: ProviderKind::Github,
            api_url: None,
            repository: REPOSITORY.to_string(),
            token: Some(GitToken {
                value: Some("dummy".to_string()),
                env: None,
            }),
        },
        merge: Some(MergeConfig {
            method: None,
            commit_template: None,
            query: MergeQuery {
                labels: vec!["lgtm".to_string()],
                checks: vec![CHECK.to_string()],
                approve_required: true,
                ..MergeQuery::default()
            },
        }),
        jobs: JobsConfig {
            pre_submit: vec![JobSpec {
                name: CHECK.to_string(),
                when: None,
            }],
        },
    }
}

/// Settings with no merge delay
pub fn test_settings() -> BlockerSettings {
    BlockerSettings {
        merge_delay_ms: 0,
        jitter_secs: 0,
        ..BlockerSettings::default()
    }
}

pub fn pool_key() -> PoolKey {
    PoolKey::from(POOL_KEY)
}

/// Open PR `id` into master with the given labels
pub fn make_pr(id: u64, labels: &[&str]) -> PullRequest {
    PullRequest {
        id,
        title: format!("Change #{id}"),
        state: PrState::Open,
        author: User {
            id: 1,
            name: "cqbqdd11519".to_string(),
            email: "cqbqdd11519@example.com".to_string(),
        },
        url: format!("https://github.com/{REPOSITORY}/pull/{id}"),
        base: GitRef {
            reference: "master".to_string(),
            sha: BASE_SHA.to_string(),
        },
        head: GitRef {
            reference: format!("feat-{id}"),
            sha: head_sha(id),
        },
        labels: labels.iter().map(ToString::to_string).collect(),
        mergeable: true,
    }
}

/// Distinct head sha per PR; PR 25 uses [`HEAD_SHA`]
pub fn head_sha(id: u64) -> String {
    if id == 25 {
        HEAD_SHA.to_string()
    } else {
        format!("{id:0>40}")
    }
}

/// Successful `test-1` status run against `base`
pub fn job_status(base: &str) -> CommitStatus {
    CommitStatus {
        context: CHECK.to_string(),
        state: CommitStatusState::Success,
        description: format!("Job is successful    BaseSHA:{base}"),
        target_url: String::new(),
    }
}

/// Engine wired to in-memory collaborators
pub struct Harness {
    pub blocker: Arc<Blocker>,
    pub provider: Arc<MockGitProvider>,
    pub factory: Arc<MockProviderFactory>,
    pub configs: Arc<MemoryConfigStore>,
    pub jobs: Arc<MemoryJobStore>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(test_settings())
    }

    pub fn with_settings(settings: BlockerSettings) -> Self {
        Self::with_config(settings, repo_config())
    }

    pub fn with_config(settings: BlockerSettings, config: RepoConfig) -> Self {
        let provider = Arc::new(MockGitProvider::new());
        provider.set_branch("master", BASE_SHA);
        let factory = Arc::new(MockProviderFactory::new(Arc::clone(&provider)));
        let configs = Arc::new(MemoryConfigStore::new(vec![config]));
        let jobs = Arc::new(MemoryJobStore::new());
        let blocker = Arc::new(Blocker::new(
            settings,
            Arc::clone(&configs) as _,
            Arc::clone(&jobs) as _,
            Arc::clone(&factory) as _,
        ));
        Self {
            blocker,
            provider,
            factory,
            configs,
            jobs,
        }
    }

    /// Open PR `id` that satisfies every condition, tested against `base`
    pub fn add_ready_pr(&self, id: u64, base: &str) {
        let pr = make_pr(id, &["approved", "lgtm"]);
        self.provider.set_status(&pr.head.sha, job_status(base));
        self.provider.upsert_pr(pr);
    }

    /// Pool sync followed by status sync
    pub async fn sync(&self) {
        self.blocker.sync_pools().await.unwrap();
        self.blocker.sync_statuses().await;
    }

    /// Merge pool buckets of the default pool: (success, pending)
    pub async fn buckets(&self) -> (Vec<u64>, Vec<u64>) {
        use pr_blocker::types::CheckStatus;
        let pool = self.blocker.pool(&pool_key()).await.expect("pool exists");
        let state = pool.lock().await;
        (
            state.merge_pool().bucket(CheckStatus::Success),
            state.merge_pool().bucket(CheckStatus::Pending),
        )
    }

    /// Ids in the current batch, if any
    pub async fn batch(&self) -> Option<Vec<u64>> {
        let pool = self.blocker.pool(&pool_key()).await.expect("pool exists");
        let state = pool.lock().await;
        state.current_batch().map(pr_blocker::blocker::Batch::ids)
    }

    /// Whether the current batch has a job reference
    pub async fn batch_has_job(&self) -> bool {
        let pool = self.blocker.pool(&pool_key()).await.expect("pool exists");
        let state = pool.lock().await;
        state.current_batch().is_some_and(|b| b.job.is_some())
    }
}
