//! HTTP surface for a worker process.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use golmesh_core::{ErrorBody, HEALTH_ROUTE, SLICE_ROUTE, Slice, SliceRequest, TERMINATE_ROUTE};
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tracing::{error, info, warn};

use crate::{WorkerError, WorkerService};

/// Listening configuration for a worker process.
#[derive(Debug, Clone)]
pub struct WorkerServerConfig {
    pub address: SocketAddr,
}

impl Default for WorkerServerConfig {
    fn default() -> Self {
        Self {
            address: SocketAddr::from(([0, 0, 0, 0], 12346)),
        }
    }
}

/// Worlds travel as JSON arrays of grey levels; large grids exceed axum's 2 MiB default.
pub const MAX_BODY_BYTES: usize = 256 * 1024 * 1024;

#[derive(Clone)]
struct WorkerState {
    service: Arc<WorkerService>,
    shutdown: Arc<Notify>,
}

type ApiError = (StatusCode, Json<ErrorBody>);

/// Build the worker router. `shutdown` is notified once a terminate request has drained.
pub fn router(service: Arc<WorkerService>, shutdown: Arc<Notify>) -> Router {
    Router::new()
        .route(HEALTH_ROUTE, get(health))
        .route(SLICE_ROUTE, post(slice_handler))
        .route(TERMINATE_ROUTE, post(terminate_handler))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(WorkerState { service, shutdown })
}

/// Serve until a terminate request completes or the process receives Ctrl-C.
pub async fn serve(listener: TcpListener, service: Arc<WorkerService>) -> anyhow::Result<()> {
    let shutdown = Arc::new(Notify::new());
    let app = router(service, Arc::clone(&shutdown));
    let addr = listener.local_addr()?;
    info!(%addr, "worker listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                () = shutdown.notified() => info!("terminate requested; shutting down worker"),
                result = tokio::signal::ctrl_c() => {
                    if let Err(err) = result {
                        warn!(%err, "failed to listen for ctrl-c");
                    }
                    info!("interrupt received; shutting down worker");
                }
            }
        })
        .await?;
    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn slice_handler(
    State(state): State<WorkerState>,
    Json(request): Json<SliceRequest>,
) -> Result<Json<Slice>, ApiError> {
    let service = Arc::clone(&state.service);
    let turn = request.turn;
    let rows = request.rows;
    let result = tokio::task::spawn_blocking(move || service.compute_slice(&request))
        .await
        .map_err(|err| {
            error!(%err, "slice task failed");
            internal_error("slice task failed")
        })?;
    result.map(Json).map_err(|err| {
        warn!(turn = turn.0, %rows, %err, "rejected slice request");
        worker_error(&err)
    })
}

async fn terminate_handler(State(state): State<WorkerState>) -> Result<StatusCode, ApiError> {
    let service = Arc::clone(&state.service);
    tokio::task::spawn_blocking(move || service.terminate())
        .await
        .map_err(|err| {
            error!(%err, "terminate task failed");
            internal_error("terminate task failed")
        })?
        .map_err(|err| worker_error(&err))?;
    state.shutdown.notify_one();
    Ok(StatusCode::NO_CONTENT)
}

fn worker_error(err: &WorkerError) -> ApiError {
    let status = match err {
        WorkerError::Terminating => StatusCode::SERVICE_UNAVAILABLE,
        WorkerError::Slice(_) => StatusCode::BAD_REQUEST,
        WorkerError::Lock => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ErrorBody::new(err.to_string())))
}

fn internal_error(message: &str) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody::new(message)),
    )
}
