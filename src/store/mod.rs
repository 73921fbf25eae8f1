//! Contracts with the configuration store and the external job system

mod http;

pub use http::HttpJobStore;

use crate::config::RepoConfig;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Read access to repository configuration objects
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// List every repository configuration
    async fn list(&self) -> Result<Vec<RepoConfig>>;

    /// Fetch one configuration; `Error::ConfigNotFound` when it is gone
    async fn get(&self, namespace: &str, name: &str) -> Result<RepoConfig>;
}

/// External job system that runs retest jobs
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Create a job and return its reference
    async fn create(&self, request: &JobRequest) -> Result<JobRef>;

    /// Poll the job's state; `Error::JobNotFound` when it is gone
    async fn state(&self, job: &JobRef) -> Result<JobState>;
}

/// Reference to a created job
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobRef {
    /// Job namespace
    pub namespace: String,
    /// Job name
    pub name: String,
}

impl fmt::Display for JobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Job lifecycle state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    /// Queued
    Pending,
    /// Executing
    Running,
    /// Every job passed
    Completed,
    /// At least one job failed
    Failed,
    /// Any state this engine does not act on
    Other(String),
}

impl JobState {
    /// Parse the job system's state string (case-insensitive)
    pub fn parse(state: &str) -> Self {
        match state.to_ascii_lowercase().as_str() {
            "pending" => Self::Pending,
            "running" => Self::Running,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            _ => Self::Other(state.to_string()),
        }
    }
}

/// Sender recorded on a job
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobSender {
    /// Name
    pub name: String,
    /// Email
    pub email: String,
}

/// Base ref a job tests against
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobBase {
    /// Branch ref
    #[serde(rename = "ref")]
    pub reference: String,
    /// Branch tip at job creation
    pub sha: String,
}

/// A pull request merged into the job's checkout
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobPull {
    /// PR id
    pub id: u64,
    /// Head ref
    #[serde(rename = "ref")]
    pub reference: String,
    /// Head sha
    pub sha: String,
    /// Web link
    pub link: String,
    /// Author login
    pub author: String,
}

/// Request to create a retest job
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobRequest {
    /// Job name
    pub name: String,
    /// Job namespace (the configuration's namespace)
    pub namespace: String,
    /// Owning configuration name
    pub config_name: String,
    /// Pre-submit job names to run
    pub jobs: Vec<String>,
    /// `owner/repo`
    pub repository: String,
    /// Sender
    pub sender: JobSender,
    /// Base branch and tip
    pub base: JobBase,
    /// Pull requests under test, in priority order
    pub pulls: Vec<JobPull>,
}
