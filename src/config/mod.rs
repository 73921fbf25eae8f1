//! Repository configuration and engine settings
//!
//! A configuration file carries one `[blocker]` settings table, an optional
//! `[job_store]` table and any number of `[[repositories]]` objects. The
//! repository list is re-read by the config store on every pass, so
//! adding or removing a repository takes effect at the next cycle.

mod storage;

pub use storage::{FileConfigStore, load_config_file};

use crate::types::MergeMethod;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default GitHub API endpoint
pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";
/// Default GitLab endpoint
pub const DEFAULT_GITLAB_API_URL: &str = "https://gitlab.com";

/// Git hosting provider
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// GitHub or GitHub Enterprise
    #[default]
    Github,
    /// GitLab
    Gitlab,
}

/// Access token, given inline or through an environment variable
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GitToken {
    /// Inline token value
    #[serde(default)]
    pub value: Option<String>,
    /// Name of an environment variable holding the token
    #[serde(default)]
    pub env: Option<String>,
}

impl GitToken {
    /// Resolve the token; `None` when neither source yields a non-empty value
    pub fn resolve(&self) -> Option<String> {
        if let Some(value) = self.value.as_deref().filter(|v| !v.is_empty()) {
            return Some(value.to_string());
        }
        self.env
            .as_deref()
            .and_then(|name| std::env::var(name).ok())
            .filter(|v| !v.is_empty())
    }
}

/// Git repository identity and credentials
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GitConfig {
    /// Provider type
    #[serde(rename = "type", default)]
    pub kind: ProviderKind,
    /// API URL; provider default when omitted
    #[serde(default)]
    pub api_url: Option<String>,
    /// `owner/repo`
    pub repository: String,
    /// Access token; a missing token disables automation
    #[serde(default)]
    pub token: Option<GitToken>,
}

impl GitConfig {
    /// Effective API URL
    pub fn api_url(&self) -> &str {
        match (&self.api_url, self.kind) {
            (Some(url), _) if !url.is_empty() => url.trim_end_matches('/'),
            (_, ProviderKind::Github) => DEFAULT_GITHUB_API_URL,
            (_, ProviderKind::Gitlab) => DEFAULT_GITLAB_API_URL,
        }
    }

    /// Split `owner/repo`; the owner may itself contain `/` (GitLab groups)
    pub fn owner_and_repo(&self) -> Option<(&str, &str)> {
        self.repository
            .rsplit_once('/')
            .filter(|(owner, repo)| !owner.is_empty() && !repo.is_empty())
    }
}

/// Merge eligibility policy
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MergeQuery {
    /// Labels that must be present
    pub labels: Vec<String>,
    /// Labels that must be absent
    pub block_labels: Vec<String>,
    /// Allowed authors (empty = anyone)
    pub authors: Vec<String>,
    /// Authors never merged
    pub skip_authors: Vec<String>,
    /// Allowed target branches (empty = any)
    pub branches: Vec<String>,
    /// Target branches never merged
    pub skip_branches: Vec<String>,
    /// Check contexts that must succeed (empty = every reported check)
    pub checks: Vec<String>,
    /// Check contexts ignored when `checks` is empty
    pub optional_checks: Vec<String>,
    /// Adds an implicit `approved` label requirement
    pub approve_required: bool,
}

/// Merge automation settings; absent means automation is off
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MergeConfig {
    /// Default merge method
    #[serde(default)]
    pub method: Option<MergeMethod>,
    /// Commit message template (`{{.Title}}`, `{{.ID}}`, ...)
    #[serde(default)]
    pub commit_template: Option<String>,
    /// Eligibility policy
    #[serde(default)]
    pub query: MergeQuery,
}

/// Branch/tag applicability rules for a job (unanchored regexes)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct JobWhen {
    /// Branch must match one of these
    pub branch: Vec<String>,
    /// Branch must match none of these
    pub skip_branch: Vec<String>,
    /// Tag rules (push-tag jobs)
    pub tag: Vec<String>,
    /// Tag exclusion rules
    pub skip_tag: Vec<String>,
}

/// A pre-submit job definition
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobSpec {
    /// Job name; doubles as the commit status context it reports
    pub name: String,
    /// Applicability rules
    #[serde(default)]
    pub when: Option<JobWhen>,
}

/// Job definitions of a repository
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct JobsConfig {
    /// Jobs run against pull requests
    pub pre_submit: Vec<JobSpec>,
}

/// One repository configuration object
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RepoConfig {
    /// Object namespace
    pub namespace: String,
    /// Object name
    pub name: String,
    /// Git identity
    pub git: GitConfig,
    /// Merge automation
    #[serde(default)]
    pub merge: Option<MergeConfig>,
    /// Job definitions
    #[serde(default)]
    pub jobs: JobsConfig,
}

impl RepoConfig {
    /// Token and merge settings are both present
    pub fn automation_enabled(&self) -> bool {
        self.merge.is_some() && self.git.token.as_ref().is_some_and(|t| t.resolve().is_some())
    }
}

/// Engine settings (`[blocker]`)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BlockerSettings {
    /// Base pipeline period
    pub sync_period_secs: u64,
    /// Upper bound of the random delay added to each period
    pub jitter_secs: u64,
    /// Label that blocks merging on every repository
    pub block_label: String,
    /// Label forcing a squash merge
    pub squash_label: String,
    /// Label forcing a merge commit
    pub merge_label: String,
    /// Maximum number of pull requests retested together
    pub max_batch_size: usize,
    /// Pause between consecutive merges of one batch
    pub merge_delay_ms: u64,
    /// Introspection server bind address
    pub status_addr: String,
    /// Context of the commit status published by the engine
    pub status_context: String,
    /// Target URL of the published commit status
    pub status_target_url: String,
    /// Sender name recorded on retest jobs
    pub bot_name: String,
    /// Sender email recorded on retest jobs
    pub bot_email: String,
}

impl Default for BlockerSettings {
    fn default() -> Self {
        Self {
            sync_period_secs: 60,
            jitter_secs: 5,
            block_label: "ci/hold".to_string(),
            squash_label: "ci/merge-squash".to_string(),
            merge_label: "ci/merge-merge".to_string(),
            max_batch_size: 1,
            merge_delay_ms: 5000,
            status_addr: "0.0.0.0:8808".to_string(),
            status_context: "blocker".to_string(),
            status_target_url: String::new(),
            bot_name: "blocker".to_string(),
            bot_email: String::new(),
        }
    }
}

impl BlockerSettings {
    /// Base pipeline period
    pub const fn sync_period(&self) -> Duration {
        Duration::from_secs(self.sync_period_secs)
    }

    /// Jitter upper bound
    pub const fn jitter(&self) -> Duration {
        Duration::from_secs(self.jitter_secs)
    }

    /// Pause between batch merges
    pub const fn merge_delay(&self) -> Duration {
        Duration::from_millis(self.merge_delay_ms)
    }
}

/// External job system endpoint (`[job_store]`)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobStoreSettings {
    /// Base URL
    pub url: String,
}

/// Whole configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BlockerFile {
    /// Engine settings
    pub blocker: BlockerSettings,
    /// Job system endpoint
    pub job_store: Option<JobStoreSettings>,
    /// Repository configuration objects
    pub repositories: Vec<RepoConfig>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn github(api_url: Option<&str>) -> GitConfig {
        GitConfig {
            kind: ProviderKind::Github,
            api_url: api_url.map(ToString::to_string),
            repository: "tmax-cloud/cicd-test".to_string(),
            token: None,
        }
    }

    #[test]
    fn test_api_url_defaults() {
        assert_eq!(github(None).api_url(), DEFAULT_GITHUB_API_URL);
        assert_eq!(
            github(Some("https://ghe.example.com/api/v3/")).api_url(),
            "https://ghe.example.com/api/v3"
        );

        let gitlab = GitConfig {
            kind: ProviderKind::Gitlab,
            ..github(None)
        };
        assert_eq!(gitlab.api_url(), DEFAULT_GITLAB_API_URL);
    }

    #[test]
    fn test_owner_and_repo() {
        assert_eq!(
            github(None).owner_and_repo(),
            Some(("tmax-cloud", "cicd-test"))
        );

        let nested = GitConfig {
            repository: "group/sub/project".to_string(),
            ..github(None)
        };
        assert_eq!(nested.owner_and_repo(), Some(("group/sub", "project")));

        let bad = GitConfig {
            repository: "no-slash".to_string(),
            ..github(None)
        };
        assert_eq!(bad.owner_and_repo(), None);
    }

    #[test]
    fn test_token_resolve() {
        let inline = GitToken {
            value: Some("abc".to_string()),
            env: None,
        };
        assert_eq!(inline.resolve().as_deref(), Some("abc"));

        let empty = GitToken {
            value: Some(String::new()),
            env: Some("PR_BLOCKER_TEST_TOKEN_THAT_IS_NOT_SET".to_string()),
        };
        assert_eq!(empty.resolve(), None);
    }

    #[test]
    fn test_automation_enabled() {
        let mut cfg = RepoConfig {
            namespace: "default".to_string(),
            name: "cicd".to_string(),
            git: github(None),
            merge: Some(MergeConfig::default()),
            jobs: JobsConfig::default(),
        };
        assert!(!cfg.automation_enabled());

        cfg.git.token = Some(GitToken {
            value: Some("t".to_string()),
            env: None,
        });
        assert!(cfg.automation_enabled());

        cfg.merge = None;
        assert!(!cfg.automation_enabled());
    }

    #[test]
    fn test_settings_defaults() {
        let settings = BlockerSettings::default();
        assert_eq!(settings.max_batch_size, 1);
        assert_eq!(settings.status_context, "blocker");
        assert_eq!(settings.sync_period(), Duration::from_secs(60));
    }
}
