//! Async-facing handle over the blocking coordinator.

use std::sync::Arc;

use thiserror::Error;

use crate::coordinator::{
    AliveReport, Coordinator, CoordinatorError, PauseOutcome, RunOutcome, RunSnapshot,
    StartRequest, StatusReport, WorldReport,
};

/// Errors surfaced through the control handle.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("coordinator task failed: {0}")]
    Task(String),
}

/// Cloneable handle shared by the REST handlers.
///
/// Quick operations run inline; they only hold the coordinator lock briefly.
/// `start` and `quit` block for the length of a run or a drain, so they move
/// onto tokio's blocking pool.
#[derive(Debug, Clone)]
pub struct ControlHandle {
    coordinator: Arc<Coordinator>,
}

impl ControlHandle {
    #[must_use]
    pub fn new(coordinator: Arc<Coordinator>) -> Self {
        Self { coordinator }
    }

    pub async fn start(&self, request: StartRequest) -> Result<RunOutcome, ControlError> {
        let coordinator = Arc::clone(&self.coordinator);
        tokio::task::spawn_blocking(move || coordinator.start(request))
            .await
            .map_err(|err| ControlError::Task(err.to_string()))?
            .map_err(ControlError::from)
    }

    pub async fn quit(&self) -> Result<RunSnapshot, ControlError> {
        let coordinator = Arc::clone(&self.coordinator);
        tokio::task::spawn_blocking(move || coordinator.quit())
            .await
            .map_err(|err| ControlError::Task(err.to_string()))?
            .map_err(ControlError::from)
    }

    pub fn alive(&self) -> Result<AliveReport, ControlError> {
        Ok(self.coordinator.alive()?)
    }

    pub fn world(&self) -> Result<WorldReport, ControlError> {
        Ok(self.coordinator.world()?)
    }

    pub fn end(&self) -> Result<RunSnapshot, ControlError> {
        Ok(self.coordinator.end()?)
    }

    pub fn pause_or_resume(&self) -> Result<PauseOutcome, ControlError> {
        Ok(self.coordinator.pause_or_resume()?)
    }

    pub fn status(&self) -> Result<StatusReport, ControlError> {
        Ok(self.coordinator.status()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::{CoordinatorConfig, RunState, StopReason};
    use crate::workers::InProcessWorkerPool;
    use golmesh_core::{Turn, World};

    fn handle() -> ControlHandle {
        ControlHandle::new(Arc::new(Coordinator::new(
            Arc::new(InProcessWorkerPool::new()),
            CoordinatorConfig {
                default_workers: 2,
                ..CoordinatorConfig::default()
            },
        )))
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn start_runs_off_the_async_executor() {
        let handle = handle();
        let world = World::with_alive(4, 4, &[(1, 0), (1, 1), (1, 2)]).expect("blinker");
        let outcome = handle
            .start(StartRequest {
                world,
                turns: 2,
                workers: 2,
            })
            .await
            .expect("run");
        assert_eq!(outcome.reason, StopReason::Completed);
        assert_eq!(handle.alive().expect("alive").turn, Turn(2));

        let snapshot = handle.quit().await.expect("quit");
        assert_eq!(snapshot.turn, Turn(2));
        assert_eq!(
            handle.status().expect("status").state,
            RunState::Quitting
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn coordinator_errors_pass_through() {
        let handle = handle();
        let err = handle.pause_or_resume().expect_err("idle");
        assert!(matches!(
            err,
            ControlError::Coordinator(CoordinatorError::InvalidTransition { .. })
        ));
        let report = handle.world().expect("world before any run");
        assert_eq!(report.world, None);
        assert_eq!(report.turn, Turn(0));
    }
}
