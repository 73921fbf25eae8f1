//! Per-repository pull request pool and merge pool index

use crate::store::JobRef;
use crate::types::{CheckStatus, CommitStatus, CommitStatusState, PullRequest};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tokio::sync::{Mutex, MutexGuard};

/// Description of a PR that is not (yet) in the success bucket
pub const DEFAULT_BLOCKER_MESSAGE: &str = "Not mergeable.";

/// Description of a PR in the success bucket
pub const IN_MERGE_POOL_MESSAGE: &str = "In merge pool.";

/// Description published for a PR failing `message`
pub fn not_mergeable(message: &str) -> String {
    if message.is_empty() {
        DEFAULT_BLOCKER_MESSAGE.to_string()
    } else {
        format!("{DEFAULT_BLOCKER_MESSAGE} {message}")
    }
}

/// A pull request plus the queue's view of it
#[derive(Debug, Clone)]
pub struct TrackedPullRequest {
    /// Provider-sourced fields, refreshed by every sync
    pub pull_request: PullRequest,
    /// Last computed coarse status
    pub blocker_status: CommitStatusState,
    /// Last computed human-readable reason
    pub blocker_description: String,
    /// Merge pool bucket, `Unknown` when outside the merge pool
    pub check_status: CheckStatus,
    /// Latest commit status per context
    pub statuses: HashMap<String, CommitStatus>,
    dirty: bool,
}

impl TrackedPullRequest {
    /// Start tracking `pull_request` as pending
    pub fn new(pull_request: PullRequest) -> Self {
        Self {
            pull_request,
            blocker_status: CommitStatusState::Pending,
            blocker_description: DEFAULT_BLOCKER_MESSAGE.to_string(),
            check_status: CheckStatus::Unknown,
            statuses: HashMap::new(),
            dirty: false,
        }
    }

    /// PR id
    pub const fn id(&self) -> u64 {
        self.pull_request.id
    }

    /// Whether the published commit status is stale
    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Update the computed status; marks the PR dirty when anything changed
    pub fn set_blocker(&mut self, status: CommitStatusState, description: String) -> bool {
        let changed = self.blocker_status != status || self.blocker_description != description;
        if changed {
            self.blocker_status = status;
            self.blocker_description = description;
            self.dirty = true;
        }
        changed
    }

    /// The host acknowledged the current status
    pub(crate) const fn mark_published(&mut self) {
        self.dirty = false;
    }
}

/// Secondary index from bucket to PR ids
///
/// Every id lives in at most one bucket; `add` always removes the id from
/// wherever it was before inserting it.
#[derive(Debug, Clone)]
pub struct MergePool {
    buckets: BTreeMap<CheckStatus, BTreeSet<u64>>,
}

impl Default for MergePool {
    fn default() -> Self {
        Self::new()
    }
}

impl MergePool {
    /// Empty pool with every bucket present
    pub fn new() -> Self {
        Self {
            buckets: CheckStatus::ALL
                .into_iter()
                .map(|status| (status, BTreeSet::new()))
                .collect(),
        }
    }

    /// Put `id` in the `status` bucket
    pub fn add(&mut self, id: u64, status: CheckStatus) {
        self.delete(id);
        self.buckets.entry(status).or_default().insert(id);
    }

    /// Bucket currently holding `id`, scanning in bucket order
    pub fn search(&self, id: u64) -> Option<CheckStatus> {
        self.buckets
            .iter()
            .find(|(_, ids)| ids.contains(&id))
            .map(|(status, _)| *status)
    }

    /// Remove `id` from whichever bucket holds it
    pub fn delete(&mut self, id: u64) -> Option<CheckStatus> {
        let status = self.search(id)?;
        if let Some(ids) = self.buckets.get_mut(&status) {
            ids.remove(&id);
        }
        Some(status)
    }

    /// Ids in `status`, ascending
    pub fn bucket(&self, status: CheckStatus) -> Vec<u64> {
        self.buckets
            .get(&status)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Every id in the pool, ascending
    pub fn ids(&self) -> Vec<u64> {
        let all: BTreeSet<u64> = self.buckets.values().flatten().copied().collect();
        all.into_iter().collect()
    }

    /// Whether `id` is in any bucket
    pub fn contains(&self, id: u64) -> bool {
        self.search(id).is_some()
    }

    /// Number of ids across buckets
    pub fn len(&self) -> usize {
        self.buckets.values().map(BTreeSet::len).sum()
    }

    /// No ids in any bucket
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-flight retest of same-branch pull requests
#[derive(Debug, Clone)]
pub struct Batch {
    /// Target branch shared by every PR
    pub branch: String,
    /// Snapshots of the batched PRs, highest priority first
    pub pull_requests: Vec<PullRequest>,
    /// Retest job; `None` until (re)created
    pub job: Option<JobRef>,
}

impl Batch {
    /// New batch without a job yet
    pub const fn new(branch: String, pull_requests: Vec<PullRequest>) -> Self {
        Self {
            branch,
            pull_requests,
            job: None,
        }
    }

    /// Whether `id` is part of the batch
    pub fn contains(&self, id: u64) -> bool {
        self.pull_requests.iter().any(|pr| pr.id == id)
    }

    /// Batched ids in order
    pub fn ids(&self) -> Vec<u64> {
        self.pull_requests.iter().map(|pr| pr.id).collect()
    }

    /// Number of batched PRs
    pub fn len(&self) -> usize {
        self.pull_requests.len()
    }

    /// Batch has no PRs left
    pub fn is_empty(&self) -> bool {
        self.pull_requests.is_empty()
    }
}

/// Contents of a pool, guarded by [`PrPool::lock`]
#[derive(Debug, Default)]
pub struct PoolState {
    pull_requests: BTreeMap<u64, TrackedPullRequest>,
    merge_pool: MergePool,
    current_batch: Option<Batch>,
}

impl PoolState {
    /// Tracked PR by id
    pub fn pull_request(&self, id: u64) -> Option<&TrackedPullRequest> {
        self.pull_requests.get(&id)
    }

    /// Mutable tracked PR by id
    pub fn pull_request_mut(&mut self, id: u64) -> Option<&mut TrackedPullRequest> {
        self.pull_requests.get_mut(&id)
    }

    /// Every tracked PR, ascending id
    pub fn pull_requests(&self) -> impl Iterator<Item = &TrackedPullRequest> {
        self.pull_requests.values()
    }

    /// Tracked ids, ascending
    pub fn pull_request_ids(&self) -> Vec<u64> {
        self.pull_requests.keys().copied().collect()
    }

    /// Merge pool index
    pub const fn merge_pool(&self) -> &MergePool {
        &self.merge_pool
    }

    /// In-flight batch
    pub const fn current_batch(&self) -> Option<&Batch> {
        self.current_batch.as_ref()
    }

    pub(crate) const fn current_batch_mut(&mut self) -> Option<&mut Batch> {
        self.current_batch.as_mut()
    }

    /// Start a batch
    pub fn set_batch(&mut self, batch: Batch) {
        self.current_batch = Some(batch);
    }

    /// Drop the in-flight batch
    pub fn clear_batch(&mut self) {
        self.current_batch = None;
    }

    /// Whether `id` belongs to the in-flight batch
    pub fn in_batch(&self, id: u64) -> bool {
        self.current_batch.as_ref().is_some_and(|b| b.contains(id))
    }

    /// Create or refresh the record for `pull_request`; true when newly tracked
    pub fn track(&mut self, pull_request: PullRequest) -> bool {
        match self.pull_requests.get_mut(&pull_request.id) {
            Some(tracked) => {
                tracked.pull_request = pull_request;
                false
            }
            None => {
                self.pull_requests
                    .insert(pull_request.id, TrackedPullRequest::new(pull_request));
                true
            }
        }
    }

    /// Move a tracked PR into `status`; no-op for untracked ids
    pub fn enqueue(&mut self, id: u64, status: CheckStatus) {
        if let Some(tracked) = self.pull_requests.get_mut(&id) {
            tracked.check_status = status;
            self.merge_pool.add(id, status);
        }
    }

    /// Take a PR out of the merge pool, keeping it tracked
    pub fn dequeue(&mut self, id: u64) -> Option<CheckStatus> {
        if let Some(tracked) = self.pull_requests.get_mut(&id) {
            tracked.check_status = CheckStatus::Unknown;
        }
        self.merge_pool.delete(id)
    }

    /// Stop tracking a PR
    pub fn untrack(&mut self, id: u64) -> Option<TrackedPullRequest> {
        self.merge_pool.delete(id);
        self.pull_requests.remove(&id)
    }
}

/// One repository's queue
#[derive(Debug)]
pub struct PrPool {
    namespace: String,
    name: String,
    state: Mutex<PoolState>,
}

impl PrPool {
    /// Empty pool for the configuration `namespace/name`
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            state: Mutex::new(PoolState::default()),
        }
    }

    /// Owning configuration namespace
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Owning configuration name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Acquire the pool
    pub async fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().await
    }
}
