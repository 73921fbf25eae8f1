//! Pool synchronization
//!
//! One PR listing per repository per cycle. PRs passing the simple
//! conditions join the merge pool; the status sync takes it from there.

use super::checks::check_simple;
use super::pool::{PrPool, not_mergeable};
use super::{Blocker, PoolKey};
use crate::config::RepoConfig;
use crate::error::{Error, Result};
use crate::types::{CheckStatus, CommitStatusState, PrState};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

impl Blocker {
    /// Refresh every pool from its repository's open PR listing.
    ///
    /// Pools whose configuration disappeared are dropped.
    pub async fn sync_pools(&self) -> Result<()> {
        info!("synchronizing PR pools");
        let configs = self.configs.list().await?;

        let mut done = BTreeSet::new();
        for config in &configs {
            if !config.automation_enabled() {
                debug!(
                    namespace = %config.namespace,
                    name = %config.name,
                    "merge automation disabled"
                );
                continue;
            }
            let key = PoolKey::for_config(config);
            if !done.insert(key.clone()) {
                continue;
            }

            if let Err(e) = self.sync_one_pool(&key, config).await {
                warn!(repo = %key, error = %e, "pool sync failed");
            }
        }

        let mut pools = self.pools.write().await;
        pools.retain(|key, _| {
            let keep = done.contains(key);
            if !keep {
                info!(repo = %key, "dropping pool without configuration");
            }
            keep
        });
        Ok(())
    }

    async fn pool_for(&self, key: &PoolKey, config: &RepoConfig) -> Arc<PrPool> {
        let mut pools = self.pools.write().await;
        Arc::clone(
            pools
                .entry(key.clone())
                .or_insert_with(|| Arc::new(PrPool::new(&config.namespace, &config.name))),
        )
    }

    async fn sync_one_pool(&self, key: &PoolKey, config: &RepoConfig) -> Result<()> {
        let merge = config
            .merge
            .as_ref()
            .ok_or_else(|| Error::Internal(format!("{key}: merge automation disabled")))?;
        let provider = self.provider_for(config)?;
        let pool = self.pool_for(key, config).await;

        let listed = provider.list_pull_requests(true).await?;
        let query = self.effective_query(merge);

        let mut state = pool.lock().await;
        let mut seen = HashSet::new();
        for pr in listed.into_iter().filter(|pr| pr.state == PrState::Open) {
            let id = pr.id;
            let verdict = check_simple(&query, &pr);
            seen.insert(id);
            state.track(pr);

            // batch members stay queued until the merge pass settles them
            let candidate = verdict.passed || state.in_batch(id);
            if candidate {
                if !state.merge_pool().contains(id) {
                    state.enqueue(id, CheckStatus::Pending);
                }
            } else {
                state.dequeue(id);
                if let Some(tracked) = state.pull_request_mut(id) {
                    tracked.set_blocker(CommitStatusState::Pending, not_mergeable(&verdict.message));
                }
            }

            if let Some(tracked) = state.pull_request(id) {
                info!(
                    repo = %key,
                    pr = id,
                    candidate,
                    description = %tracked.blocker_description,
                    "synced PR"
                );
            }
        }

        for id in state.pull_request_ids() {
            if !seen.contains(&id) {
                debug!(repo = %key, pr = id, "PR closed, untracking");
                state.untrack(id);
            }
        }
        Ok(())
    }
}
