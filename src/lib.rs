//! pr-blocker - merge queue for GitHub and GitLab pull requests
//!
//! Keeps an in-memory pool of open pull requests per configured repository,
//! evaluates merge policy against them, retests stale candidates through an
//! external job system and merges them oldest first.

pub mod blocker;
pub mod config;
pub mod error;
pub mod platform;
pub mod store;
pub mod types;

pub use blocker::{Blocker, PoolKey, Scheduler};
pub use error::{Error, Result};
