//! Broker plumbing: the run coordinator, worker handles and the control surfaces around them.

pub mod control;
pub mod coordinator;
pub mod servers;
pub mod workers;

pub use control::{ControlError, ControlHandle};
pub use coordinator::{
    AliveReport, Coordinator, CoordinatorConfig, CoordinatorError, PauseOutcome, RunOutcome,
    RunSnapshot, RunState, StartRequest, StatusReport, StopReason, WorldReport,
};
pub use servers::{ControlServerConfig, router, serve};
pub use workers::{
    HttpPoolConfig, HttpWorkerPool, InProcessWorkerPool, SliceWorker, WorkerAddresses,
    WorkerCallError, WorkerPool,
};
