//! Row partitioning of a world across workers, and re-assembly of their slices.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::kernel::{Slice, SliceError};
use crate::world::{Cell, World};

/// Half-open row interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RowRange {
    pub start: usize,
    pub end: usize,
}

impl RowRange {
    #[must_use]
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Display for RowRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Invalid partition parameters.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PartitionError {
    #[error("cannot partition a world with zero rows")]
    ZeroHeight,
    #[error("at least one worker is required")]
    ZeroWorkers,
    #[error("{workers} workers exceed the {height} available rows")]
    TooManyWorkers { workers: usize, height: usize },
}

/// Split `height` rows into `workers` contiguous ranges in ascending order.
/// Every range gets `height / workers` rows and the last one also takes the remainder.
pub fn plan_partitions(height: usize, workers: usize) -> Result<Vec<RowRange>, PartitionError> {
    if height == 0 {
        return Err(PartitionError::ZeroHeight);
    }
    if workers == 0 {
        return Err(PartitionError::ZeroWorkers);
    }
    if workers > height {
        return Err(PartitionError::TooManyWorkers { workers, height });
    }

    let share = height / workers;
    let plan = (0..workers)
        .map(|index| {
            let start = index * share;
            let end = if index + 1 == workers {
                height
            } else {
                start + share
            };
            RowRange::new(start, end)
        })
        .collect();
    Ok(plan)
}

/// Merge worker slices into one `width x height` world and sum their alive counts.
/// Slices may arrive in any order but must tile `[0, height)` exactly.
pub fn assemble(
    width: usize,
    height: usize,
    mut slices: Vec<Slice>,
) -> Result<(World, usize), SliceError> {
    if width == 0 || height == 0 {
        return Err(SliceError::EmptyWorld);
    }
    slices.sort_by_key(|slice| slice.rows.start);

    let mut cells: Vec<Cell> = Vec::with_capacity(width * height);
    let mut next_row = 0;
    let mut alive = 0;
    for slice in slices {
        let RowRange { start, end } = slice.rows;
        if start > end || end > height {
            return Err(SliceError::RowsOutOfBounds { start, end, height });
        }
        if start < next_row {
            return Err(SliceError::Overlap { row: start });
        }
        if start > next_row {
            return Err(SliceError::Gap {
                start: next_row,
                end: start,
            });
        }
        if slice.width != width {
            return Err(SliceError::WidthMismatch {
                start,
                end,
                expected: width,
                actual: slice.width,
            });
        }
        let expected = slice.rows.len() * width;
        if slice.cells.len() != expected {
            return Err(SliceError::CellCountMismatch {
                start,
                end,
                expected,
                actual: slice.cells.len(),
            });
        }
        cells.extend_from_slice(&slice.cells);
        alive += slice.alive;
        next_row = end;
    }
    if next_row != height {
        return Err(SliceError::Gap {
            start: next_row,
            end: height,
        });
    }

    Ok((World::from_raw(width, height, cells), alive))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::compute_slice;

    #[test]
    fn plans_tile_every_height() {
        for height in 1..=64 {
            for workers in 1..=height {
                let plan = plan_partitions(height, workers).expect("plan");
                assert_eq!(plan.len(), workers);
                assert_eq!(plan[0].start, 0);
                assert_eq!(plan[workers - 1].end, height);
                for pair in plan.windows(2) {
                    assert_eq!(pair[0].end, pair[1].start, "contiguous for {height}/{workers}");
                }
                assert!(plan.iter().all(|range| !range.is_empty()));
                let covered: usize = plan.iter().map(RowRange::len).sum();
                assert_eq!(covered, height);
            }
        }
    }

    #[test]
    fn last_range_absorbs_remainder() {
        let plan = plan_partitions(10, 4).expect("plan");
        assert_eq!(
            plan,
            vec![
                RowRange::new(0, 2),
                RowRange::new(2, 4),
                RowRange::new(4, 6),
                RowRange::new(6, 10),
            ]
        );
    }

    #[test]
    fn degenerate_parameters_are_errors() {
        assert_eq!(plan_partitions(0, 2), Err(PartitionError::ZeroHeight));
        assert_eq!(plan_partitions(8, 0), Err(PartitionError::ZeroWorkers));
        assert_eq!(
            plan_partitions(3, 4),
            Err(PartitionError::TooManyWorkers {
                workers: 4,
                height: 3
            })
        );
    }

    fn slices_for(world: &World, workers: usize) -> Vec<Slice> {
        plan_partitions(world.height(), workers)
            .expect("plan")
            .into_iter()
            .map(|range| compute_slice(world, range).expect("slice"))
            .collect()
    }

    #[test]
    fn assemble_accepts_out_of_order_slices() {
        let world = World::with_alive(6, 6, &[(0, 1), (1, 2), (2, 0), (2, 1), (2, 2)])
            .expect("glider");
        let mut slices = slices_for(&world, 3);
        slices.reverse();
        let (merged, alive) = assemble(6, 6, slices).expect("assemble");
        let (expected, expected_alive) = crate::kernel::step(&world);
        assert_eq!(merged, expected);
        assert_eq!(alive, expected_alive);
    }

    #[test]
    fn assemble_reports_gaps_and_overlaps() {
        let world = World::new(4, 4).expect("world");
        let mut slices = slices_for(&world, 2);
        let missing = slices.pop().expect("second slice");
        assert_eq!(
            assemble(4, 4, slices.clone()),
            Err(SliceError::Gap { start: 2, end: 4 })
        );

        slices.push(missing);
        slices.push(compute_slice(&world, RowRange::new(1, 2)).expect("slice"));
        assert_eq!(assemble(4, 4, slices), Err(SliceError::Overlap { row: 1 }));
    }

    #[test]
    fn assemble_checks_slice_shape() {
        let world = World::new(4, 2).expect("world");
        let mut slice = compute_slice(&world, RowRange::new(0, 2)).expect("slice");
        slice.cells.pop();
        assert!(matches!(
            assemble(4, 2, vec![slice.clone()]),
            Err(SliceError::CellCountMismatch { expected: 8, actual: 7, .. })
        ));
        slice.width = 3;
        assert!(matches!(
            assemble(4, 2, vec![slice]),
            Err(SliceError::WidthMismatch { expected: 4, actual: 3, .. })
        ));
    }
}
