//! Merge pool status synchronization and commit status publication

use super::checks::{LiveCheck, check_full};
use super::pool::{IN_MERGE_POOL_MESSAGE, PoolState, PrPool, not_mergeable};
use super::{Blocker, PoolKey};
use crate::error::Result;
use crate::platform::GitProvider;
use crate::types::{CheckStatus, CommitStatus, CommitStatusState};
use tracing::{debug, info, warn};

impl Blocker {
    /// Re-evaluate merge pool members of every pool and publish stale statuses
    pub async fn sync_statuses(&self) {
        info!("synchronizing merge pool status");
        for (key, pool) in self.pools().await {
            if let Err(e) = self.sync_one_status(&key, &pool).await {
                warn!(repo = %key, error = %e, "status sync failed");
            }
        }
    }

    async fn sync_one_status(&self, key: &PoolKey, pool: &PrPool) -> Result<()> {
        let config = self.pool_config(pool).await?;
        let Some(merge) = config.merge.as_ref() else {
            return Ok(());
        };
        let provider = self.provider_for(&config)?;
        let query = self.effective_query(merge);
        let context = self.settings.status_context.as_str();

        let members = pool.lock().await.merge_pool().ids();

        // fetch outside the lock
        let mut checked = Vec::with_capacity(members.len());
        let mut failure = None;
        for id in members {
            match check_full(&query, id, provider.as_ref(), context).await {
                Ok(live) => checked.push((id, live)),
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }

        let mut state = pool.lock().await;
        for (id, live) in checked {
            apply_live_check(&mut state, key, id, live);
        }
        if let Some(e) = failure {
            return Err(e);
        }

        self.report_statuses(&mut state, key, provider.as_ref())
            .await
    }

    /// Publish the status of every dirty PR; the flag clears only on success
    async fn report_statuses(
        &self,
        state: &mut PoolState,
        key: &PoolKey,
        provider: &dyn GitProvider,
    ) -> Result<()> {
        for id in state.pull_request_ids() {
            let Some(tracked) = state.pull_request_mut(id) else {
                continue;
            };
            if !tracked.is_dirty() {
                continue;
            }

            let status = CommitStatus {
                context: self.settings.status_context.clone(),
                state: tracked.blocker_status,
                description: tracked.blocker_description.clone(),
                target_url: self.settings.status_target_url.clone(),
            };
            info!(
                repo = %key,
                pr = id,
                state = %status.state,
                description = %status.description,
                "setting commit status"
            );
            provider
                .set_commit_status(&tracked.pull_request.head.sha, &status)
                .await?;
            tracked.mark_published();
        }
        Ok(())
    }
}

fn apply_live_check(state: &mut PoolState, key: &PoolKey, id: u64, live: LiveCheck) {
    if !state.merge_pool().contains(id) {
        return;
    }
    let in_batch = state.in_batch(id);
    let verdict = live.verdict;

    let (bucket, status, description) = if verdict.remove_from_merge_pool && !in_batch {
        (None, CommitStatusState::Pending, not_mergeable(&verdict.message))
    } else if verdict.passed {
        (
            Some(CheckStatus::Success),
            CommitStatusState::Success,
            IN_MERGE_POOL_MESSAGE.to_string(),
        )
    } else {
        (
            Some(CheckStatus::Pending),
            CommitStatusState::Pending,
            verdict.message,
        )
    };

    match bucket {
        Some(bucket) => state.enqueue(id, bucket),
        None => {
            debug!(repo = %key, pr = id, "leaving merge pool");
            state.dequeue(id);
        }
    }

    if let Some(tracked) = state.pull_request_mut(id) {
        tracked.pull_request = live.pull_request;
        tracked.statuses = live.statuses;
        tracked.set_blocker(status, description);
        info!(
            repo = %key,
            pr = id,
            status = %tracked.blocker_status,
            description = %tracked.blocker_description,
            "evaluated merge pool member"
        );
    }
}
