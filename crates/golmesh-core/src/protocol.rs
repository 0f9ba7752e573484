//! Wire records exchanged between the broker and its workers.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::Turn;
use crate::partition::RowRange;
use crate::world::World;

pub const HEALTH_ROUTE: &str = "/health";
/// `POST` a [`SliceRequest`], receive a [`crate::Slice`].
pub const SLICE_ROUTE: &str = "/api/slice";
/// `POST` with an empty body; answered once in-flight slices have drained.
pub const TERMINATE_ROUTE: &str = "/api/terminate";

/// Body returned alongside any non-2xx status by golmesh HTTP surfaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}

/// One partition's share of a turn: the full current world plus the rows to compute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliceRequest {
    /// Turn being produced; carried for log context only.
    pub turn: Turn,
    pub rows: RowRange,
    pub world: Arc<World>,
}

impl SliceRequest {
    #[must_use]
    pub fn new(turn: Turn, rows: RowRange, world: Arc<World>) -> Self {
        Self { turn, rows, world }
    }
}
