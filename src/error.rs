//! Error types for pr-blocker

use thiserror::Error;

/// Errors raised by the blocker engine and its collaborators
#[derive(Error, Debug)]
pub enum Error {
    /// GitHub API failure
    #[error("GitHub API error: {0}")]
    GitHubApi(String),

    /// GitLab API failure
    #[error("GitLab API error: {0}")]
    GitLabApi(String),

    /// Provider-neutral failure (unsupported provider, test doubles)
    #[error("platform error: {0}")]
    Platform(String),

    /// Invalid or unreadable configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Repository configuration object no longer exists
    #[error("configuration {namespace}/{name} not found")]
    ConfigNotFound {
        /// Namespace of the missing object
        namespace: String,
        /// Name of the missing object
        name: String,
    },

    /// External job store failure
    #[error("job store error: {0}")]
    JobStore(String),

    /// Job object no longer exists
    #[error("job {0} not found")]
    JobNotFound(String),

    /// No pre-submit job applies to the batch's base branch
    #[error("no pre-submit jobs apply to branch {0}")]
    NoApplicableJobs(String),

    /// Commit message template could not be rendered
    #[error("template error: {0}")]
    Template(String),

    /// Internal invariant violated
    #[error("internal error: {0}")]
    Internal(String),

    /// IO failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<octocrab::Error> for Error {
    fn from(e: octocrab::Error) -> Self {
        Self::GitHubApi(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Self::Platform(e.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Self::Config(e.to_string())
    }
}

/// Result alias using the crate error
pub type Result<T> = std::result::Result<T, Error>;
