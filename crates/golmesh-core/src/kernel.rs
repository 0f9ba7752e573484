//! Cell-update kernel and row-slice computation.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::partition::RowRange;
use crate::world::{Cell, World};

const NEIGHBOR_OFFSETS: [(isize, isize); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

/// Errors raised while computing or merging row slices.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SliceError {
    #[error("rows {start}..{end} fall outside a world of height {height}")]
    RowsOutOfBounds {
        start: usize,
        end: usize,
        height: usize,
    },
    #[error("slice for rows {start}..{end} has width {actual}, world width is {expected}")]
    WidthMismatch {
        start: usize,
        end: usize,
        expected: usize,
        actual: usize,
    },
    #[error("slice for rows {start}..{end} carries {actual} cells, expected {expected}")]
    CellCountMismatch {
        start: usize,
        end: usize,
        expected: usize,
        actual: usize,
    },
    #[error("slices leave rows {start}..{end} uncovered")]
    Gap { start: usize, end: usize },
    #[error("slices overlap at row {row}")]
    Overlap { row: usize },
    #[error("cannot assemble a world with zero width or height")]
    EmptyWorld,
}

/// Next-generation rows computed for one partition, re-indexed from zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slice {
    pub rows: RowRange,
    pub width: usize,
    pub cells: Vec<Cell>,
    pub alive: usize,
}

impl Slice {
    /// Row `offset` of the slice (0 is `rows.start`).
    #[must_use]
    pub fn row(&self, offset: usize) -> Option<&[Cell]> {
        let start = offset.checked_mul(self.width)?;
        self.cells.get(start..start + self.width)
    }
}

/// Live cells among the 8 toroidal neighbours of `(row, col)`.
#[must_use]
pub fn alive_neighbors(world: &World, row: usize, col: usize) -> u8 {
    let (row, col) = (row as isize, col as isize);
    NEIGHBOR_OFFSETS
        .iter()
        .filter(|(dy, dx)| world.wrapped(row + dy, col + dx).is_alive())
        .count() as u8
}

/// Conway's rule: survive on 2 or 3, birth on exactly 3.
#[must_use]
pub const fn next_state(current: Cell, neighbors: u8) -> Cell {
    match (current, neighbors) {
        (Cell::Alive, 2) | (Cell::Alive, 3) => Cell::Alive,
        (Cell::Dead, 3) => Cell::Alive,
        _ => Cell::Dead,
    }
}

#[must_use]
pub fn next_cell(world: &World, row: usize, col: usize) -> Cell {
    let current = world.get(row, col).unwrap_or_default();
    next_state(current, alive_neighbors(world, row, col))
}

/// Compute the next generation of `rows` using the whole of `world` for
/// neighbour lookups, so partition edges and wraparound see the true neighbours.
pub fn compute_slice(world: &World, rows: RowRange) -> Result<Slice, SliceError> {
    if rows.start > rows.end || rows.end > world.height() {
        return Err(SliceError::RowsOutOfBounds {
            start: rows.start,
            end: rows.end,
            height: world.height(),
        });
    }
    let (cells, alive) = compute_rows(world, rows);
    Ok(Slice {
        rows,
        width: world.width(),
        cells,
        alive,
    })
}

/// Advance the whole world one generation in a single pass.
#[must_use]
pub fn step(world: &World) -> (World, usize) {
    let (cells, alive) = compute_rows(world, RowRange::new(0, world.height()));
    (
        World::from_raw(world.width(), world.height(), cells),
        alive,
    )
}

fn compute_rows(world: &World, rows: RowRange) -> (Vec<Cell>, usize) {
    let width = world.width();
    let mut cells = vec![Cell::Dead; rows.len() * width];
    let alive = cells
        .par_chunks_mut(width)
        .enumerate()
        .map(|(offset, out)| {
            let row = rows.start + offset;
            let mut alive = 0usize;
            for (col, slot) in out.iter_mut().enumerate() {
                *slot = next_cell(world, row, col);
                if slot.is_alive() {
                    alive += 1;
                }
            }
            alive
        })
        .sum::<usize>();
    (cells, alive)
}
