//! # Beat Grid
//!
//! The shared artifact: rows of fixed-width boolean cells.

use serde::{Deserialize, Serialize};

/// Shape of a freshly initialised grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridDimensions {
    pub rows: usize,
    pub columns: usize,
}

impl GridDimensions {
    /// Eight instrument rows of sixteen steps.
    pub const DEFAULT: Self = Self {
        rows: 8,
        columns: 16,
    };

    pub const fn new(rows: usize, columns: usize) -> Self {
        Self { rows, columns }
    }

    pub const fn is_empty(&self) -> bool {
        self.rows == 0 || self.columns == 0
    }
}

impl Default for GridDimensions {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// The collaboratively edited grid.
///
/// Serialised as a bare nested array (`[[bool]]`). Cell semantics are the
/// client's concern.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BeatGrid(Vec<Vec<bool>>);

impl BeatGrid {
    /// An all-`false` grid of the given shape.
    #[must_use]
    pub fn zeroed(dimensions: GridDimensions) -> Self {
        Self(vec![vec![false; dimensions.columns]; dimensions.rows])
    }

    pub fn from_rows(rows: Vec<Vec<bool>>) -> Self {
        Self(rows)
    }

    pub fn rows(&self) -> &[Vec<bool>] {
        &self.0
    }

    pub fn into_rows(self) -> Vec<Vec<bool>> {
        self.0
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<bool> {
        self.0.get(row).and_then(|r| r.get(column)).copied()
    }

    /// Number of cells set to `true`.
    pub fn active_cells(&self) -> usize {
        self.0.iter().flatten().filter(|c| **c).count()
    }

    /// Shape of the grid, if every row has the same width.
    pub fn dimensions(&self) -> Option<GridDimensions> {
        let columns = self.0.first().map_or(0, Vec::len);
        self.0
            .iter()
            .all(|row| row.len() == columns)
            .then_some(GridDimensions::new(self.0.len(), columns))
    }
}
