//! Core types shared across the golmesh workspace.

use serde::{Deserialize, Serialize};

pub mod kernel;
pub mod partition;
pub mod protocol;
pub mod world;

pub use kernel::{Slice, SliceError, alive_neighbors, compute_slice, next_cell, next_state, step};
pub use partition::{PartitionError, RowRange, assemble, plan_partitions};
pub use protocol::{ErrorBody, HEALTH_ROUTE, SLICE_ROUTE, SliceRequest, TERMINATE_ROUTE};
pub use world::{Cell, World, WorldError};

/// Simulation clock: generations committed since the run started.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
pub struct Turn(pub u64);

impl Turn {
    /// Returns the next sequential turn.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Resets the turn counter back to zero.
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }
}

impl std::fmt::Display for Turn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
