use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use gpuwatch_common::{HostResult, Snapshot};

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/gpustat/all", get(all_hosts))
        .route("/api/gpustat/snapshot", get(snapshot))
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// GET /api/gpustat/all: host results of the latest cycle, registry order.
pub async fn all_hosts(State(st): State<AppState>) -> Json<Vec<HostResult>> {
    Json(st.cache.read().await.hosts.clone())
}

/// GET /api/gpustat/snapshot: same data plus cycle number and timestamp.
pub async fn snapshot(State(st): State<AppState>) -> Json<Snapshot> {
    Json(st.cache.read().await.as_ref().clone())
}

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// GET /metrics: Prometheus text exposition format.
pub async fn metrics(State(st): State<AppState>) -> impl IntoResponse {
    let pool_size = match &st.pool {
        Some(pool) => pool.len().await,
        None => 0,
    };
    let cycle = st.cache.cycle().await;
    (StatusCode::OK, st.metrics.render(pool_size, cycle))
}
