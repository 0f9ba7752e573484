//! Stateless slice worker: computes the next generation for a row range on request.

use std::sync::{Condvar, Mutex, PoisonError};

use golmesh_core::{Slice, SliceError, SliceRequest, compute_slice};
use thiserror::Error;
use tracing::{debug, info};

pub mod server;

pub use server::{WorkerServerConfig, router, serve};

/// Errors produced by the worker service.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("worker is terminating; no new slices are accepted")]
    Terminating,
    #[error(transparent)]
    Slice(#[from] SliceError),
    #[error("failed to lock worker gate")]
    Lock,
}

#[derive(Debug, Default)]
struct Gate {
    in_flight: usize,
    terminating: bool,
}

/// Compute service shared by every connection of a worker process.
///
/// Slices carry no state between calls. The only shared state is the in-flight
/// gate, which lets [`WorkerService::terminate`] wait for running slices
/// instead of cutting them off.
#[derive(Debug, Default)]
pub struct WorkerService {
    gate: Mutex<Gate>,
    drained: Condvar,
}

/// Marks one slice as in flight until dropped.
struct InFlight<'a> {
    service: &'a WorkerService,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut gate = self
            .service
            .gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        gate.in_flight -= 1;
        if gate.in_flight == 0 {
            self.service.drained.notify_all();
        }
    }
}

impl WorkerService {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn admit(&self) -> Result<InFlight<'_>, WorkerError> {
        let mut gate = self.gate.lock().map_err(|_| WorkerError::Lock)?;
        if gate.terminating {
            return Err(WorkerError::Terminating);
        }
        gate.in_flight += 1;
        Ok(InFlight { service: self })
    }

    /// Compute the requested rows against the supplied world.
    pub fn compute_slice(&self, request: &SliceRequest) -> Result<Slice, WorkerError> {
        let _in_flight = self.admit()?;
        let slice = compute_slice(&request.world, request.rows)?;
        debug!(
            turn = request.turn.0,
            rows = %request.rows,
            alive = slice.alive,
            "computed slice"
        );
        Ok(slice)
    }

    /// Stop admitting slices and block until the in-flight ones have finished.
    pub fn terminate(&self) -> Result<(), WorkerError> {
        let mut gate = self.gate.lock().map_err(|_| WorkerError::Lock)?;
        gate.terminating = true;
        while gate.in_flight > 0 {
            debug!(in_flight = gate.in_flight, "waiting for slices before terminating");
            gate = self.drained.wait(gate).map_err(|_| WorkerError::Lock)?;
        }
        info!("worker drained; terminating");
        Ok(())
    }

    pub fn is_terminating(&self) -> bool {
        self.gate
            .lock()
            .map(|gate| gate.terminating)
            .unwrap_or(true)
    }

    pub fn in_flight(&self) -> usize {
        self.gate.lock().map(|gate| gate.in_flight).unwrap_or(0)
    }
}
