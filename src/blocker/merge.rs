//! Merge execution and batch retesting

use super::jobs::{batch_job_request, commit_message, filter_jobs, merge_method, parse_base_sha};
use super::pool::{Batch, PoolState, PrPool, TrackedPullRequest};
use super::{Blocker, PoolKey};
use crate::config::{MergeConfig, RepoConfig};
use crate::error::{Error, Result};
use crate::platform::GitProvider;
use crate::store::JobState;
use crate::types::{CheckStatus, PullRequest, branch_name};
use futures_util::future::join_all;
use tokio::sync::MutexGuard;
use tracing::{debug, info, warn};

impl Blocker {
    /// Run the merge pass on every pool concurrently
    pub async fn merge_all(&self) {
        let pools = self.pools().await;
        let results = join_all(
            pools
                .iter()
                .map(|(key, pool)| self.merge_one_pool(key, pool)),
        )
        .await;

        for ((key, _), result) in pools.iter().zip(results) {
            if let Err(e) = result {
                warn!(repo = %key, error = %e, "merge pass failed");
            }
        }
    }

    /// Merge or retest the highest-priority successful PR of one pool
    pub async fn merge_one_pool(&self, key: &PoolKey, pool: &PrPool) -> Result<()> {
        let mut state = pool.lock().await;

        let config = self.pool_config(pool).await?;
        let Some(merge) = config.merge.as_ref() else {
            return Ok(());
        };
        let provider = self.provider_for(&config)?;

        if state.current_batch().is_some() {
            let completed = self
                .handle_batch(&mut state, key, &config, provider.as_ref())
                .await?;
            if completed {
                return self
                    .merge_batch(pool, state, key, merge, provider.as_ref())
                    .await;
            }
            return Ok(());
        }

        // ascending id: the oldest PR goes first
        let candidates = state.merge_pool().bucket(CheckStatus::Success);
        let Some(&first) = candidates.first() else {
            return Ok(());
        };
        let tracked = state
            .pull_request(first)
            .ok_or_else(|| Error::Internal(format!("PR #{first} in merge pool but not tracked")))?;
        let branch = branch_name(&tracked.pull_request.base.reference).to_string();

        let tip = provider.get_branch(&branch).await?.commit_id;
        if is_fresh(&config, tracked, &tip) {
            let pr = tracked.pull_request.clone();
            self.merge_pull_request(provider.as_ref(), key, merge, &pr, &pr.head.sha)
                .await?;
            state.dequeue(first);
            return Ok(());
        }

        info!(
            repo = %key,
            pr = first,
            %branch,
            "PR was not tested against the latest commit, retesting"
        );
        let batched: Vec<PullRequest> = candidates
            .iter()
            .filter_map(|id| state.pull_request(*id))
            .filter(|t| branch_name(&t.pull_request.base.reference) == branch)
            .take(self.settings.max_batch_size.max(1))
            .map(|t| t.pull_request.clone())
            .collect();
        info!(repo = %key, batch = ?batched.iter().map(|p| p.id).collect::<Vec<_>>(), "batched retest");

        state.set_batch(Batch::new(branch, batched));
        self.create_batch_job(&mut state, key, &config, &tip).await
    }

    async fn create_batch_job(
        &self,
        state: &mut PoolState,
        key: &PoolKey,
        config: &RepoConfig,
        base_sha: &str,
    ) -> Result<()> {
        let batch = state
            .current_batch_mut()
            .ok_or_else(|| Error::Internal("no batch to create a job for".to_string()))?;

        let request = batch_job_request(
            config,
            &self.settings,
            &batch.branch,
            base_sha,
            &batch.pull_requests,
        )?;
        let job = self.jobs.create(&request).await?;
        info!(repo = %key, %job, prs = ?batch.ids(), "created retest job");
        batch.job = Some(job);
        Ok(())
    }

    /// Advance the batch's job; true once it completed and the batch can merge
    async fn handle_batch(
        &self,
        state: &mut PoolState,
        key: &PoolKey,
        config: &RepoConfig,
        provider: &dyn GitProvider,
    ) -> Result<bool> {
        let Some(batch) = state.current_batch() else {
            return Ok(false);
        };

        let Some(job) = batch.job.clone() else {
            let tip = provider.get_branch(&batch.branch).await?.commit_id;
            self.create_batch_job(state, key, config, &tip).await?;
            return Ok(false);
        };

        let job_state = match self.jobs.state(&job).await {
            Ok(job_state) => job_state,
            Err(Error::JobNotFound(name)) => {
                warn!(repo = %key, job = %name, "retest job vanished, recreating next pass");
                if let Some(batch) = state.current_batch_mut() {
                    batch.job = None;
                }
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        match job_state {
            JobState::Completed => Ok(true),
            JobState::Failed => {
                let Some(batch) = state.current_batch_mut() else {
                    return Ok(false);
                };
                if batch.len() > 1 {
                    let dropped = batch.pull_requests.pop().map(|pr| pr.id);
                    batch.job = None;
                    info!(repo = %key, ?dropped, remaining = ?batch.ids(), "retest failed, shrinking batch");
                } else {
                    info!(repo = %key, prs = ?batch.ids(), "retest failed, abandoning batch");
                    state.clear_batch();
                }
                Ok(false)
            }
            other => {
                debug!(repo = %key, %job, state = ?other, "waiting for retest job");
                Ok(false)
            }
        }
    }

    /// Merge every batched PR in order, popping each one once merged
    ///
    /// A PR whose head moved since the retest is dropped unmerged. A merge
    /// the host rejects abandons the rest of the batch.
    async fn merge_batch<'a>(
        &self,
        pool: &'a PrPool,
        mut state: MutexGuard<'a, PoolState>,
        key: &PoolKey,
        merge: &MergeConfig,
        provider: &dyn GitProvider,
    ) -> Result<()> {
        loop {
            let Some(next) = state
                .current_batch()
                .and_then(|b| b.pull_requests.first().cloned())
            else {
                break;
            };

            match state.pull_request(next.id) {
                Some(tracked) if tracked.pull_request.head.sha != next.head.sha => {
                    info!(
                        repo = %key,
                        pr = next.id,
                        tested = %next.head.sha,
                        head = %tracked.pull_request.head.sha,
                        "head moved since retest, dropping from batch"
                    );
                }
                Some(tracked) => {
                    let current = tracked.pull_request.clone();
                    if let Err(e) = self
                        .merge_pull_request(provider, key, merge, &current, &next.head.sha)
                        .await
                    {
                        warn!(repo = %key, pr = next.id, error = %e, "merge rejected, abandoning batch");
                        state.clear_batch();
                        return Err(e);
                    }
                    state.dequeue(next.id);
                }
                None => debug!(repo = %key, pr = next.id, "batched PR closed, skipping"),
            }

            let remaining = state.current_batch_mut().map_or(0, |batch| {
                batch.pull_requests.remove(0);
                batch.len()
            });
            if remaining > 0 {
                // let the host recompute mergeability
                drop(state);
                tokio::time::sleep(self.settings.merge_delay()).await;
                state = pool.lock().await;
            }
        }

        state.clear_batch();
        Ok(())
    }

    async fn merge_pull_request(
        &self,
        provider: &dyn GitProvider,
        key: &PoolKey,
        merge: &MergeConfig,
        pr: &PullRequest,
        sha: &str,
    ) -> Result<()> {
        let method = merge_method(pr, merge, &self.settings);
        let message = commit_message(merge, pr)?;
        info!(
            repo = %key,
            pr = pr.id,
            branch = %branch_name(&pr.base.reference),
            %method,
            "merging PR"
        );
        provider
            .merge_pull_request(pr.id, sha, method, &message)
            .await
    }
}

/// Every applicable pre-submit status ran against `tip`
fn is_fresh(config: &RepoConfig, tracked: &TrackedPullRequest, tip: &str) -> bool {
    filter_jobs(&config.jobs.pre_submit, &tracked.pull_request.base.reference)
        .into_iter()
        .filter_map(|job| tracked.statuses.get(&job.name))
        .all(|status| parse_base_sha(&status.description) == Some(tip))
}
