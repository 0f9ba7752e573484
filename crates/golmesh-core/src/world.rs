//! Toroidal world grid and its plaintext pattern format.

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while constructing or decoding a world.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorldError {
    #[error("world dimensions must be non-zero (got {width}x{height})")]
    ZeroDimension { width: usize, height: usize },
    #[error("world of {width}x{height} cells does not fit in memory")]
    TooLarge { width: usize, height: usize },
    #[error("world expects {expected} cells but {actual} were supplied")]
    CellCountMismatch { expected: usize, actual: usize },
    #[error("invalid cell value {0}; expected 0 (dead) or 255 (alive)")]
    InvalidCell(u8),
    #[error("pattern contains no rows")]
    EmptyPattern,
    #[error("unexpected glyph {glyph:?} on pattern line {line}")]
    UnknownGlyph { line: usize, glyph: char },
}

/// State of a single cell. Serialized as the PGM grey level used by image inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum Cell {
    #[default]
    Dead = 0,
    Alive = 255,
}

impl Cell {
    #[must_use]
    pub const fn is_alive(self) -> bool {
        matches!(self, Self::Alive)
    }
}

impl From<Cell> for u8 {
    fn from(cell: Cell) -> Self {
        cell as u8
    }
}

impl TryFrom<u8> for Cell {
    type Error = WorldError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Dead),
            255 => Ok(Self::Alive),
            other => Err(WorldError::InvalidCell(other)),
        }
    }
}

/// A `width x height` generation stored row-major. Lookups through
/// [`World::wrapped`] treat the grid as a torus.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "WorldRepr")]
pub struct World {
    width: usize,
    height: usize,
    cells: Vec<Cell>,
}

#[derive(Deserialize)]
struct WorldRepr {
    width: usize,
    height: usize,
    cells: Vec<Cell>,
}

impl TryFrom<WorldRepr> for World {
    type Error = WorldError;

    fn try_from(repr: WorldRepr) -> Result<Self, Self::Error> {
        World::from_cells(repr.width, repr.height, repr.cells)
    }
}

/// Cell count of a `width x height` grid, rejecting empty and overflowing sizes.
fn cell_count(width: usize, height: usize) -> Result<usize, WorldError> {
    if width == 0 || height == 0 {
        return Err(WorldError::ZeroDimension { width, height });
    }
    width
        .checked_mul(height)
        .ok_or(WorldError::TooLarge { width, height })
}

impl World {
    /// All-dead world of the given size.
    pub fn new(width: usize, height: usize) -> Result<Self, WorldError> {
        let count = cell_count(width, height)?;
        Self::from_cells(width, height, vec![Cell::Dead; count])
    }

    /// Wrap an existing row-major cell buffer.
    pub fn from_cells(width: usize, height: usize, cells: Vec<Cell>) -> Result<Self, WorldError> {
        let expected = cell_count(width, height)?;
        if cells.len() != expected {
            return Err(WorldError::CellCountMismatch {
                expected,
                actual: cells.len(),
            });
        }
        Ok(Self {
            width,
            height,
            cells,
        })
    }

    pub(crate) fn from_raw(width: usize, height: usize, cells: Vec<Cell>) -> Self {
        debug_assert_eq!(cells.len(), width * height);
        Self {
            width,
            height,
            cells,
        }
    }

    /// Build a world with the listed `(row, col)` cells alive. Coordinates wrap.
    pub fn with_alive(
        width: usize,
        height: usize,
        alive: &[(usize, usize)],
    ) -> Result<Self, WorldError> {
        let mut world = Self::new(width, height)?;
        for &(row, col) in alive {
            world.set(row % height, col % width, Cell::Alive);
        }
        Ok(world)
    }

    /// Fill a world at random; `density` is the probability of each cell being alive.
    pub fn random<R: Rng>(
        width: usize,
        height: usize,
        density: f64,
        rng: &mut R,
    ) -> Result<Self, WorldError> {
        let density = if density.is_nan() {
            0.0
        } else {
            density.clamp(0.0, 1.0)
        };
        let mut world = Self::new(width, height)?;
        for cell in &mut world.cells {
            if rng.random_bool(density) {
                *cell = Cell::Alive;
            }
        }
        Ok(world)
    }

    /// Parse the Life plaintext format. `O`, `*` and `#` are alive, `.` is dead and
    /// lines starting with `!` are comments. Short rows are padded with dead cells.
    pub fn from_plaintext(text: &str) -> Result<Self, WorldError> {
        let mut rows: Vec<Vec<Cell>> = Vec::new();
        for (index, line) in text.lines().enumerate() {
            let line = line.trim_end();
            if line.starts_with('!') {
                continue;
            }
            let mut row = Vec::with_capacity(line.len());
            for glyph in line.chars() {
                let cell = match glyph {
                    'O' | 'o' | '*' | '#' => Cell::Alive,
                    '.' => Cell::Dead,
                    other => {
                        return Err(WorldError::UnknownGlyph {
                            line: index + 1,
                            glyph: other,
                        });
                    }
                };
                row.push(cell);
            }
            rows.push(row);
        }
        while rows.last().is_some_and(Vec::is_empty) {
            rows.pop();
        }
        if rows.is_empty() {
            return Err(WorldError::EmptyPattern);
        }

        let height = rows.len();
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        let mut cells = Vec::with_capacity(cell_count(width, height)?);
        for mut row in rows {
            row.resize(width, Cell::Dead);
            cells.extend(row);
        }
        Self::from_cells(width, height, cells)
    }

    /// Render as plaintext rows of `O` and `.`.
    #[must_use]
    pub fn to_plaintext(&self) -> String {
        let mut out = String::with_capacity(self.cells.len() + self.height);
        for (index, row) in self.rows().enumerate() {
            if index > 0 {
                out.push('\n');
            }
            out.extend(row.iter().map(|cell| if cell.is_alive() { 'O' } else { '.' }));
        }
        out
    }

    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    #[must_use]
    pub const fn height(&self) -> usize {
        self.height
    }

    #[must_use]
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Cell at `(row, col)`, or `None` outside the grid.
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> Option<Cell> {
        if row < self.height && col < self.width {
            Some(self.cells[row * self.width + col])
        } else {
            None
        }
    }

    /// Cell at a signed offset, wrapped onto the torus.
    #[must_use]
    pub fn wrapped(&self, row: isize, col: isize) -> Cell {
        let row = row.rem_euclid(self.height as isize) as usize;
        let col = col.rem_euclid(self.width as isize) as usize;
        self.cells[row * self.width + col]
    }

    /// Overwrite one cell. Out-of-range coordinates are ignored.
    pub fn set(&mut self, row: usize, col: usize, cell: Cell) {
        if row < self.height && col < self.width {
            self.cells[row * self.width + col] = cell;
        }
    }

    /// Stamp the live cells of `pattern` with its top-left corner at `(top, left)`,
    /// wrapping past the edges.
    pub fn place(&mut self, pattern: &World, top: usize, left: usize) {
        for (row, col) in pattern.alive_cells() {
            let y = (top + row) % self.height;
            let x = (left + col) % self.width;
            self.cells[y * self.width + x] = Cell::Alive;
        }
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Cell]> {
        self.cells.chunks(self.width)
    }

    #[must_use]
    pub fn alive_count(&self) -> usize {
        self.cells.iter().filter(|cell| cell.is_alive()).count()
    }

    /// Coordinates of every live cell as `(row, col)`, in row-major order.
    #[must_use]
    pub fn alive_cells(&self) -> Vec<(usize, usize)> {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, cell)| cell.is_alive())
            .map(|(idx, _)| (idx / self.width, idx % self.width))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{SeedableRng, rngs::SmallRng};

    #[test]
    fn zero_dimensions_are_rejected() {
        assert_eq!(
            World::new(0, 4),
            Err(WorldError::ZeroDimension {
                width: 0,
                height: 4
            })
        );
        assert!(World::new(4, 0).is_err());
    }

    #[test]
    fn cell_buffer_must_match_dimensions() {
        let err = World::from_cells(3, 3, vec![Cell::Dead; 8]).expect_err("short buffer");
        assert_eq!(
            err,
            WorldError::CellCountMismatch {
                expected: 9,
                actual: 8
            }
        );
    }

    #[test]
    fn overflowing_dimensions_are_rejected() {
        assert_eq!(
            World::new(usize::MAX, 2),
            Err(WorldError::TooLarge {
                width: usize::MAX,
                height: 2
            })
        );

        let huge = r#"{"width":4294967296,"height":4294967296,"cells":[]}"#;
        let err = serde_json::from_str::<World>(huge).expect_err("impossible world");
        assert!(err.to_string().contains("does not fit"), "{err}");
    }

    #[test]
    fn wrapped_lookup_crosses_every_edge() {
        let world = World::with_alive(4, 3, &[(0, 0), (2, 3)]).expect("world");
        assert_eq!(world.wrapped(-1, -1), Cell::Alive);
        assert_eq!(world.wrapped(3, 4), Cell::Alive);
        assert_eq!(world.wrapped(-3, 0), Cell::Alive);
        assert_eq!(world.wrapped(1, 1), Cell::Dead);
    }

    #[test]
    fn plaintext_parses_comments_and_pads_short_rows() {
        let world = World::from_plaintext("!Name: Glider\n.O\n..O\nOOO\n\n").expect("glider");
        assert_eq!(world.width(), 3);
        assert_eq!(world.height(), 3);
        assert_eq!(world.alive_count(), 5);
        assert_eq!(world.get(0, 2), Some(Cell::Dead));
        assert_eq!(world.to_plaintext(), ".O.\n..O\nOOO");
    }

    #[test]
    fn plaintext_rejects_unknown_glyphs() {
        let err = World::from_plaintext("..\n.x").expect_err("bad glyph");
        assert_eq!(err, WorldError::UnknownGlyph { line: 2, glyph: 'x' });
        assert_eq!(
            World::from_plaintext("!only a comment\n"),
            Err(WorldError::EmptyPattern)
        );
    }

    #[test]
    fn place_wraps_around_the_torus() {
        let glider = World::from_plaintext(".O\n..O\nOOO").expect("glider");
        let mut world = World::new(8, 8).expect("world");
        world.place(&glider, 6, 7);
        assert_eq!(world.alive_count(), 5);
        assert_eq!(world.get(6, 0), Some(Cell::Alive));
        assert_eq!(world.get(7, 1), Some(Cell::Alive));
        assert_eq!(world.get(0, 7), Some(Cell::Alive));
        assert_eq!(world.get(0, 0), Some(Cell::Alive));
        assert_eq!(world.get(0, 1), Some(Cell::Alive));
    }

    #[test]
    fn random_density_extremes() {
        let mut rng = SmallRng::seed_from_u64(7);
        let full = World::random(5, 5, 1.0, &mut rng).expect("full");
        assert_eq!(full.alive_count(), 25);
        let empty = World::random(5, 5, f64::NAN, &mut rng).expect("empty");
        assert_eq!(empty.alive_count(), 0);
    }

    #[test]
    fn serde_uses_grey_levels_and_revalidates() {
        let world = World::with_alive(2, 1, &[(0, 1)]).expect("world");
        let json = serde_json::to_string(&world).expect("serialize");
        assert_eq!(json, r#"{"width":2,"height":1,"cells":[0,255]}"#);

        let back: World = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, world);

        let bad = serde_json::from_str::<World>(r#"{"width":2,"height":2,"cells":[0,255]}"#);
        assert!(bad.is_err(), "cell count mismatch must fail to decode");
        let grey = serde_json::from_str::<World>(r#"{"width":1,"height":1,"cells":[128]}"#);
        assert!(grey.is_err(), "grey levels other than 0/255 must fail to decode");
    }
}
