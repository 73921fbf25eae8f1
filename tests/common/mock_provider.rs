//! Mock git provider for testing
//!
//! A small in-memory git host: pull requests, branch tips and commit
//! statuses live in `Mutex`-guarded maps that tests edit between passes.
//! Every instance is independent, so each test builds its own.

#![allow(dead_code)]

use async_trait::async_trait;
use pr_blocker::config::RepoConfig;
use pr_blocker::error::{Error, Result};
use pr_blocker::platform::{GitProvider, ProviderFactory};
use pr_blocker::types::{
    Branch, CommitStatus, IssueType, MergeMethod, PrState, PullRequest, User,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Call record for `merge_pull_request`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeCall {
    pub id: u64,
    pub sha: String,
    pub method: MergeMethod,
    pub message: String,
}

/// Call record for `set_commit_status`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetStatusCall {
    pub sha: String,
    pub status: CommitStatus,
}

/// Call record for comment/label operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueCall {
    pub id: u64,
    pub value: String,
}

/// In-memory git host
#[derive(Default)]
pub struct MockGitProvider {
    pulls: Mutex<BTreeMap<u64, PullRequest>>,
    branches: Mutex<HashMap<String, String>>,
    statuses: Mutex<HashMap<String, Vec<CommitStatus>>>,
    writers: Mutex<Vec<String>>,
    // Call tracking
    list_calls: AtomicUsize,
    get_pr_calls: Mutex<Vec<u64>>,
    merge_calls: Mutex<Vec<MergeCall>>,
    set_status_calls: Mutex<Vec<SetStatusCall>>,
    comment_calls: Mutex<Vec<IssueCall>>,
    label_calls: Mutex<Vec<IssueCall>>,
    // Error injection
    error_on_list: Mutex<Option<String>>,
    error_on_get_pr: Mutex<Option<String>>,
    error_on_set_status: Mutex<Option<String>>,
    error_on_merge: Mutex<Option<String>>,
}

impl MockGitProvider {
    pub fn new() -> Self {
        Self::default()
    }

    // === Backend state ===

    /// Add or replace a pull request
    pub fn upsert_pr(&self, pr: PullRequest) {
        self.pulls.lock().unwrap().insert(pr.id, pr);
    }

    /// Edit a stored pull request in place
    pub fn update_pr(&self, id: u64, f: impl FnOnce(&mut PullRequest)) {
        let mut pulls = self.pulls.lock().unwrap();
        f(pulls.get_mut(&id).expect("unknown PR"));
    }

    /// Mark a pull request closed
    pub fn close_pr(&self, id: u64) {
        self.update_pr(id, |pr| pr.state = PrState::Closed);
    }

    /// Point `branch` at `sha`
    pub fn set_branch(&self, branch: &str, sha: &str) {
        self.branches
            .lock()
            .unwrap()
            .insert(branch.to_string(), sha.to_string());
    }

    /// Report `status` on commit `sha`, replacing the same context
    pub fn set_status(&self, sha: &str, status: CommitStatus) {
        let mut statuses = self.statuses.lock().unwrap();
        let list = statuses.entry(sha.to_string()).or_default();
        list.retain(|s| s.context != status.context);
        list.push(status);
    }

    /// Grant write access to `login`
    pub fn add_writer(&self, login: &str) {
        self.writers.lock().unwrap().push(login.to_string());
    }

    pub fn status_of(&self, sha: &str, context: &str) -> Option<CommitStatus> {
        self.statuses
            .lock()
            .unwrap()
            .get(sha)
            .and_then(|list| list.iter().find(|s| s.context == context).cloned())
    }

    // === Error injection methods ===

    pub fn fail_list(&self, msg: &str) {
        *self.error_on_list.lock().unwrap() = Some(msg.to_string());
    }

    pub fn fail_get_pr(&self, msg: &str) {
        *self.error_on_get_pr.lock().unwrap() = Some(msg.to_string());
    }

    pub fn fail_set_status(&self, msg: &str) {
        *self.error_on_set_status.lock().unwrap() = Some(msg.to_string());
    }

    pub fn fail_merge(&self, msg: &str) {
        *self.error_on_merge.lock().unwrap() = Some(msg.to_string());
    }

    /// Clear every injected error
    pub fn heal(&self) {
        *self.error_on_list.lock().unwrap() = None;
        *self.error_on_get_pr.lock().unwrap() = None;
        *self.error_on_set_status.lock().unwrap() = None;
        *self.error_on_merge.lock().unwrap() = None;
    }

    // === Call inspection ===

    pub fn list_call_count(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn get_pr_calls(&self) -> Vec<u64> {
        self.get_pr_calls.lock().unwrap().clone()
    }

    pub fn merge_calls(&self) -> Vec<MergeCall> {
        self.merge_calls.lock().unwrap().clone()
    }

    pub fn merged_ids(&self) -> Vec<u64> {
        self.merge_calls().into_iter().map(|c| c.id).collect()
    }

    pub fn set_status_calls(&self) -> Vec<SetStatusCall> {
        self.set_status_calls.lock().unwrap().clone()
    }

    pub fn comment_calls(&self) -> Vec<IssueCall> {
        self.comment_calls.lock().unwrap().clone()
    }

    pub fn label_calls(&self) -> Vec<IssueCall> {
        self.label_calls.lock().unwrap().clone()
    }

    /// Assert that `merge_pull_request` was called for `id`
    pub fn assert_merged(&self, id: u64) {
        assert!(
            self.merged_ids().contains(&id),
            "expected PR #{id} to be merged, merged: {:?}",
            self.merged_ids()
        );
    }

    fn injected(slot: &Mutex<Option<String>>) -> Result<()> {
        match slot.lock().unwrap().as_ref() {
            Some(msg) => Err(Error::Platform(msg.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl GitProvider for MockGitProvider {
    async fn list_pull_requests(&self, open_only: bool) -> Result<Vec<PullRequest>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Self::injected(&self.error_on_list)?;
        Ok(self
            .pulls
            .lock()
            .unwrap()
            .values()
            .filter(|pr| !open_only || pr.state == PrState::Open)
            .cloned()
            .collect())
    }

    async fn get_pull_request(&self, id: u64) -> Result<PullRequest> {
        self.get_pr_calls.lock().unwrap().push(id);
        Self::injected(&self.error_on_get_pr)?;
        self.pulls
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::Platform(format!("PR #{id} not found")))
    }

    async fn get_branch(&self, name: &str) -> Result<Branch> {
        self.branches
            .lock()
            .unwrap()
            .get(name)
            .map(|sha| Branch {
                name: name.to_string(),
                commit_id: sha.clone(),
            })
            .ok_or_else(|| Error::Platform(format!("branch {name} not found")))
    }

    async fn list_commit_statuses(&self, reference: &str) -> Result<Vec<CommitStatus>> {
        Ok(self
            .statuses
            .lock()
            .unwrap()
            .get(reference)
            .cloned()
            .unwrap_or_default())
    }

    async fn set_commit_status(&self, sha: &str, status: &CommitStatus) -> Result<()> {
        self.set_status_calls.lock().unwrap().push(SetStatusCall {
            sha: sha.to_string(),
            status: status.clone(),
        });
        Self::injected(&self.error_on_set_status)?;
        self.set_status(sha, status.clone());
        Ok(())
    }

    async fn merge_pull_request(
        &self,
        id: u64,
        sha: &str,
        method: MergeMethod,
        message: &str,
    ) -> Result<()> {
        self.merge_calls.lock().unwrap().push(MergeCall {
            id,
            sha: sha.to_string(),
            method,
            message: message.to_string(),
        });
        Self::injected(&self.error_on_merge)?;
        let mut pulls = self.pulls.lock().unwrap();
        let pr = pulls
            .get_mut(&id)
            .ok_or_else(|| Error::Platform(format!("PR #{id} not found")))?;
        if pr.head.sha != sha {
            return Err(Error::Platform(format!(
                "409 Head branch was modified. Review and try the merge again. ({sha})"
            )));
        }
        pr.state = PrState::Closed;
        Ok(())
    }

    async fn can_user_write_to_repo(&self, user: &User) -> Result<bool> {
        Ok(self.writers.lock().unwrap().contains(&user.name))
    }

    async fn register_comment(&self, _kind: IssueType, id: u64, body: &str) -> Result<()> {
        self.comment_calls.lock().unwrap().push(IssueCall {
            id,
            value: body.to_string(),
        });
        Ok(())
    }

    async fn set_label(&self, _kind: IssueType, id: u64, label: &str) -> Result<()> {
        self.update_pr(id, |pr| pr.labels.push(label.to_string()));
        self.label_calls.lock().unwrap().push(IssueCall {
            id,
            value: format!("+{label}"),
        });
        Ok(())
    }

    async fn delete_label(&self, _kind: IssueType, id: u64, label: &str) -> Result<()> {
        self.update_pr(id, |pr| pr.labels.retain(|l| l != label));
        self.label_calls.lock().unwrap().push(IssueCall {
            id,
            value: format!("-{label}"),
        });
        Ok(())
    }
}

/// Factory handing out one shared mock for every repository
pub struct MockProviderFactory {
    provider: Arc<MockGitProvider>,
    created: AtomicUsize,
}

impl MockProviderFactory {
    pub fn new(provider: Arc<MockGitProvider>) -> Self {
        Self {
            provider,
            created: AtomicUsize::new(0),
        }
    }

    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl ProviderFactory for MockProviderFactory {
    fn create(&self, _config: &RepoConfig, _token: &str) -> Result<Arc<dyn GitProvider>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::clone(&self.provider) as Arc<dyn GitProvider>)
    }
}
