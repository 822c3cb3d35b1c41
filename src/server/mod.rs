//! Local HTTP query server
//!
//! Read-only JSON API over the snapshot. The store is loaded fresh on every
//! request, so a concurrent `infrakit sync` shows up without a restart.
//!
//! - `GET /api/search?q=` projects and EC2 instances matching `q`
//! - `GET /api/resources?parent=` children of a project grouped by service
//! - `GET /api/lb-flows?project=` reconstructed load balancer flows
//! - `GET /api/snapshot` every record

use crate::flow::trace_flows;
use crate::model::Resource;
use crate::search::quick_search;
use crate::store::{children_by_service, SnapshotStore, StoreError};
use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;

struct AppState {
    store: SnapshotStore,
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(&'static str),
    Store(StoreError),
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.to_string()),
            ApiError::Store(e @ StoreError::NotFound { .. }) => (StatusCode::NOT_FOUND, e.to_string()),
            ApiError::Store(e) => {
                tracing::error!("Failed to load snapshot: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    #[serde(default)]
    q: String,
}

#[derive(Debug, Deserialize)]
struct ResourcesParams {
    #[serde(default)]
    parent: String,
}

#[derive(Debug, Deserialize)]
struct FlowsParams {
    #[serde(default)]
    project: String,
}

/// Router over `store`
pub fn router(store: SnapshotStore) -> Router {
    let state = Arc::new(AppState { store });

    Router::new()
        .route("/api/search", get(search_handler))
        .route("/api/resources", get(resources_handler))
        .route("/api/lb-flows", get(flows_handler))
        .route("/api/snapshot", get(snapshot_handler))
        .with_state(state)
}

/// Bind `addr` and serve until the process is stopped
pub async fn serve(addr: &str, store: SnapshotStore) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Serving snapshot {:?} on http://{}", store.path(), addr);
    eprintln!("Listening on http://{}", addr);

    axum::serve(listener, router(store))
        .await
        .context("Server stopped unexpectedly")
}

async fn search_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<Resource>>, ApiError> {
    if params.q.is_empty() {
        return Ok(Json(Vec::new()));
    }
    let records = state.store.load()?;
    Ok(Json(quick_search(&records, &params.q)))
}

async fn resources_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ResourcesParams>,
) -> Result<impl IntoResponse, ApiError> {
    if params.parent.is_empty() {
        return Err(ApiError::BadRequest("query parameter 'parent' is required"));
    }
    let records = state.store.load()?;
    Ok(Json(children_by_service(&records, &params.parent)))
}

async fn flows_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<FlowsParams>,
) -> Result<impl IntoResponse, ApiError> {
    if params.project.is_empty() {
        return Err(ApiError::BadRequest("query parameter 'project' is required"));
    }
    let records = state.store.load()?;
    Ok(Json(trace_flows(&records, &params.project)))
}

async fn snapshot_handler(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Resource>>, ApiError> {
    Ok(Json(state.store.load()?))
}
