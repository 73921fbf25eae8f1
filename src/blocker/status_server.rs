//! Read-only HTTP view of the pools

use super::pool::Batch;
use super::scheduler::CycleProgress;
use super::{Blocker, PoolKey};
use crate::types::CheckStatus;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

/// One row of `GET /status`
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PoolSummary {
    /// Pool key
    pub key: PoolKey,
    /// Tracked PR count
    pub pull_request_length: usize,
    /// A batch retest is in flight
    pub retesting: bool,
}

/// Body of `GET /status/{key}`
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PoolDetail {
    /// Tracked PR ids
    pub pull_requests: Vec<u64>,
    /// Success bucket
    pub merge_pool_success: Vec<u64>,
    /// Pending bucket
    pub merge_pool_pending: Vec<u64>,
    /// A batch retest is in flight
    pub retesting: bool,
    /// Batched PR ids
    pub retesting_batch: Vec<u64>,
}

#[derive(Clone)]
struct AppState {
    blocker: Arc<Blocker>,
    progress: watch::Receiver<CycleProgress>,
}

async fn list_pools(State(app): State<AppState>) -> Json<Vec<PoolSummary>> {
    let mut summaries = Vec::new();
    for (key, pool) in app.blocker.pools().await {
        let state = pool.lock().await;
        summaries.push(PoolSummary {
            key,
            pull_request_length: state.pull_request_ids().len(),
            retesting: state.current_batch().is_some(),
        });
    }
    Json(summaries)
}

async fn get_pool(State(app): State<AppState>, Path(key): Path<String>) -> Response {
    let Some(pool) = app.blocker.pool(&PoolKey::from(key.as_str())).await else {
        return (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "message": format!("there is no pr pool for {key}") })),
        )
            .into_response();
    };

    let state = pool.lock().await;
    let detail = PoolDetail {
        pull_requests: state.pull_request_ids(),
        merge_pool_success: state.merge_pool().bucket(CheckStatus::Success),
        merge_pool_pending: state.merge_pool().bucket(CheckStatus::Pending),
        retesting: state.current_batch().is_some(),
        retesting_batch: state
            .current_batch()
            .map(Batch::ids)
            .unwrap_or_default(),
    };
    Json(detail).into_response()
}

async fn cycle(State(app): State<AppState>) -> Json<CycleProgress> {
    Json(app.progress.borrow().clone())
}

async fn health_check() -> &'static str {
    "ok"
}

/// Router serving `/status`, `/status/{key}`, `/cycle` and `/healthz`
pub fn status_router(blocker: Arc<Blocker>, progress: watch::Receiver<CycleProgress>) -> Router {
    Router::new()
        .route("/status", get(list_pools))
        .route("/status/{*key}", get(get_pool))
        .route("/cycle", get(cycle))
        .route("/healthz", get(health_check))
        .with_state(AppState { blocker, progress })
}

/// Serve `router` on an already bound listener
pub async fn serve_status(listener: TcpListener, router: Router) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "status server listening");
    }
    axum::serve(listener, router).await
}
