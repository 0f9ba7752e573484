//! REST control surface for the broker.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use golmesh_core::{ErrorBody, HEALTH_ROUTE};
use golmesh_worker::server::MAX_BODY_BYTES;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tracing::{info, warn};

use crate::control::{ControlError, ControlHandle};
use crate::coordinator::{
    AliveReport, CoordinatorError, PauseOutcome, RunOutcome, RunSnapshot, StartRequest,
    StatusReport, WorldReport,
};

pub const START_ROUTE: &str = "/api/run/start";
pub const ALIVE_ROUTE: &str = "/api/run/alive";
pub const WORLD_ROUTE: &str = "/api/run/world";
pub const END_ROUTE: &str = "/api/run/end";
pub const PAUSE_ROUTE: &str = "/api/run/pause";
pub const QUIT_ROUTE: &str = "/api/run/quit";
pub const STATUS_ROUTE: &str = "/api/run/status";

/// Configuration for the broker's control server.
#[derive(Debug, Clone)]
pub struct ControlServerConfig {
    pub rest_address: SocketAddr,
}

impl Default for ControlServerConfig {
    fn default() -> Self {
        Self {
            rest_address: SocketAddr::from(([0, 0, 0, 0], 12345)),
        }
    }
}

#[derive(Clone)]
struct ApiState {
    handle: ControlHandle,
    shutdown: Arc<Notify>,
}

impl IntoResponse for ControlError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Coordinator(err) => match err {
                CoordinatorError::Partition(_) => StatusCode::BAD_REQUEST,
                CoordinatorError::Busy { .. } | CoordinatorError::InvalidTransition { .. } => {
                    StatusCode::CONFLICT
                }
                CoordinatorError::NotStarted => StatusCode::NOT_FOUND,
                CoordinatorError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
                CoordinatorError::Connect(_)
                | CoordinatorError::Unreachable { .. }
                | CoordinatorError::Worker { .. }
                | CoordinatorError::WrongRows { .. }
                | CoordinatorError::Assemble { .. } => StatusCode::BAD_GATEWAY,
                CoordinatorError::Dispatch(_) | CoordinatorError::Lock => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(ErrorBody::new(self.to_string()))).into_response()
    }
}

/// Build the control router. `shutdown` is notified once a quit request has completed.
pub fn router(handle: ControlHandle, shutdown: Arc<Notify>) -> Router {
    Router::new()
        .route(HEALTH_ROUTE, get(health))
        .route(START_ROUTE, post(start_run))
        .route(ALIVE_ROUTE, get(alive))
        .route(WORLD_ROUTE, get(world))
        .route(END_ROUTE, post(end_run))
        .route(PAUSE_ROUTE, post(pause_or_resume))
        .route(QUIT_ROUTE, post(quit))
        .route(STATUS_ROUTE, get(status))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(ApiState { handle, shutdown })
}

/// Serve the control API until a quit request completes or the process receives Ctrl-C.
///
/// Ctrl-C is treated as a quit so the turn loop drains and workers are terminated.
pub async fn serve(listener: TcpListener, handle: ControlHandle) -> anyhow::Result<()> {
    let shutdown = Arc::new(Notify::new());
    let app = router(handle.clone(), Arc::clone(&shutdown));
    let addr = listener.local_addr()?;
    info!(%addr, "broker control API listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                () = shutdown.notified() => info!("quit completed; stopping control API"),
                result = tokio::signal::ctrl_c() => {
                    if let Err(err) = result {
                        warn!(%err, "failed to listen for ctrl-c");
                    }
                    info!("interrupt received; quitting");
                    if let Err(err) = handle.quit().await {
                        warn!(%err, "quit after interrupt failed");
                    }
                }
            }
        })
        .await?;
    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn start_run(
    State(state): State<ApiState>,
    request: Result<Json<StartRequest>, JsonRejection>,
) -> Result<Json<RunOutcome>, ControlError> {
    let Json(request) = request.map_err(|err| ControlError::InvalidRequest(err.body_text()))?;
    state.handle.start(request).await.map(Json)
}

async fn alive(State(state): State<ApiState>) -> Result<Json<AliveReport>, ControlError> {
    state.handle.alive().map(Json)
}

async fn world(State(state): State<ApiState>) -> Result<Json<WorldReport>, ControlError> {
    state.handle.world().map(Json)
}

async fn end_run(State(state): State<ApiState>) -> Result<Json<RunSnapshot>, ControlError> {
    state.handle.end().map(Json)
}

async fn pause_or_resume(
    State(state): State<ApiState>,
) -> Result<Json<PauseOutcome>, ControlError> {
    state.handle.pause_or_resume().map(Json)
}

async fn quit(State(state): State<ApiState>) -> Result<Json<RunSnapshot>, ControlError> {
    let snapshot = state.handle.quit().await?;
    state.shutdown.notify_one();
    Ok(Json(snapshot))
}

async fn status(State(state): State<ApiState>) -> Result<Json<StatusReport>, ControlError> {
    state.handle.status().map(Json)
}
