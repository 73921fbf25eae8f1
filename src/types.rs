//! Core types for pr-blocker
//!
//! Provider-neutral view of pull requests, branches and commit statuses.
//! GitHub and GitLab services convert their API payloads into these.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix carried by fully-qualified branch refs
pub const BRANCH_REF_PREFIX: &str = "refs/heads/";

/// Strip `refs/heads/` from a ref, leaving plain branch names untouched
pub fn branch_name(reference: &str) -> &str {
    reference
        .strip_prefix(BRANCH_REF_PREFIX)
        .unwrap_or(reference)
}

/// A git host account
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    /// Provider account id
    pub id: u64,
    /// Login name
    pub name: String,
    /// Email, when the provider exposes it
    #[serde(default)]
    pub email: String,
}

/// A ref/sha pair (base or head of a pull request)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GitRef {
    /// Branch name or ref
    #[serde(rename = "ref")]
    pub reference: String,
    /// Commit sha
    pub sha: String,
}

/// Open/closed state of a pull request
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PrState {
    /// Still open
    #[default]
    Open,
    /// Closed or merged
    Closed,
}

/// A pull request (GitHub) or merge request (GitLab)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PullRequest {
    /// PR number (GitHub) or IID (GitLab)
    pub id: u64,
    /// Title
    pub title: String,
    /// Open/closed
    pub state: PrState,
    /// Author (the "sender" for author rules)
    pub author: User,
    /// Web URL
    pub url: String,
    /// Target branch
    pub base: GitRef,
    /// Source branch
    pub head: GitRef,
    /// Label names, in provider order
    pub labels: Vec<String>,
    /// Whether the host reports the PR as mergeable
    pub mergeable: bool,
}

impl PullRequest {
    /// Check whether the PR carries `label`
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }
}

/// Whether an issue-level operation targets a PR or a plain issue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueType {
    /// Plain issue
    Issue,
    /// Pull/merge request
    PullRequest,
}

/// A branch and its tip commit
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Branch {
    /// Branch name
    pub name: String,
    /// Tip commit sha
    pub commit_id: String,
}

/// State of a single commit status context
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CommitStatusState {
    /// Not finished
    #[default]
    Pending,
    /// Passed
    Success,
    /// Failed
    Failure,
    /// Errored
    Error,
}

impl fmt::Display for CommitStatusState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Success => write!(f, "success"),
            Self::Failure => write!(f, "failure"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A commit status as reported by (or published to) the git host
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommitStatus {
    /// Status context name
    pub context: String,
    /// State
    pub state: CommitStatusState,
    /// Free-form description (may embed `BaseSHA:<sha>`)
    #[serde(default)]
    pub description: String,
    /// Link shown next to the status
    #[serde(default)]
    pub target_url: String,
}

/// Merge method
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MergeMethod {
    /// Create a merge commit
    #[default]
    Merge,
    /// Squash all commits into one
    Squash,
}

impl fmt::Display for MergeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Merge => write!(f, "merge"),
            Self::Squash => write!(f, "squash"),
        }
    }
}

/// Coarse merge-pool bucket
///
/// Ordering is the bucket scan order used by lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    /// Not evaluated yet
    Unknown,
    /// Waiting on checks, mergeability or freshness
    Pending,
    /// Every condition holds
    Success,
    /// Failed
    Failure,
}

impl CheckStatus {
    /// All buckets in scan order
    pub const ALL: [Self; 4] = [Self::Unknown, Self::Pending, Self::Success, Self::Failure];
}
