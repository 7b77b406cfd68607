//! Regular grid layout shared by every raster.

use crate::{RasterError, C, MAX_CELLS};
use geo::geometry::{Coord, Rect};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Relative tolerance used when comparing grid origins.
const ALIGNMENT_EPSILON: C = 1e-9;

/// Placement and dimensions of a north-up raster grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridGeometry {
    /// Upper-left (north-west) corner of the upper-left cell.
    pub origin: Coord<C>,

    /// Width and height of one square cell, in map units.
    pub cell_size: C,

    /// Number of columns (west to east).
    pub cols: usize,

    /// Number of rows (north to south).
    pub rows: usize,
}

impl GridGeometry {
    pub fn new(
        origin: Coord<C>,
        cell_size: C,
        cols: usize,
        rows: usize,
    ) -> Result<Self, RasterError> {
        if !(cell_size.is_finite() && cell_size > 0.0) {
            return Err(RasterError::InvalidCellSize(cell_size));
        }
        match cols.checked_mul(rows) {
            Some(len) if len > 0 && len <= MAX_CELLS => Ok(Self {
                origin,
                cell_size,
                cols,
                rows,
            }),
            #[allow(clippy::cast_precision_loss)]
            _ => Err(RasterError::Shape {
                cols: cols as C,
                rows: rows as C,
            }),
        }
    }

    /// Returns the smallest grid of `cell_size` cells covering `extent`.
    ///
    /// The grid snaps to the extent's north-west corner and always has
    /// at least one row and one column, even for degenerate extents.
    /// Extents needing more than [`MAX_CELLS`] cells, or with a
    /// non-finite corner, are rejected.
    pub fn covering(extent: Rect<C>, cell_size: C) -> Result<Self, RasterError> {
        if !(cell_size.is_finite() && cell_size > 0.0) {
            return Err(RasterError::InvalidCellSize(cell_size));
        }
        let origin = Coord {
            x: extent.min().x,
            y: extent.max().y,
        };
        let cols = (extent.width() / cell_size).ceil().max(1.0);
        let rows = (extent.height() / cell_size).ceil().max(1.0);
        let finite = origin.x.is_finite() && origin.y.is_finite();
        #[allow(clippy::cast_precision_loss)]
        if !(finite && cols.is_finite() && rows.is_finite()) || cols * rows > MAX_CELLS as C {
            return Err(RasterError::Shape { cols, rows });
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Self::new(origin, cell_size, cols as usize, rows as usize)
    }

    /// Returns the number of cells in this grid.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.cols * self.rows
    }

    /// Returns the map area covered by this grid.
    pub fn extent(&self) -> Rect<C> {
        #[allow(clippy::cast_precision_loss)]
        let se = Coord {
            x: self.origin.x + self.cols as C * self.cell_size,
            y: self.origin.y - self.rows as C * self.cell_size,
        };
        Rect::new(self.origin, se)
    }

    /// Returns the `(col, row)` of the cell containing `coord`, if any.
    ///
    /// Coordinates exactly on the east or south edge of the grid belong
    /// to the last column or row.
    pub fn cell_of(&self, coord: Coord<C>) -> Option<(usize, usize)> {
        let col = (coord.x - self.origin.x) / self.cell_size;
        let row = (self.origin.y - coord.y) / self.cell_size;
        #[allow(clippy::cast_precision_loss)]
        if !(0.0..=self.cols as C).contains(&col) || !(0.0..=self.rows as C).contains(&row) {
            return None;
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let (col, row) = (col.floor() as usize, row.floor() as usize);
        Some((col.min(self.cols - 1), row.min(self.rows - 1)))
    }

    /// Returns the center of cell `(col, row)`.
    pub fn cell_center(&self, (col, row): (usize, usize)) -> Coord<C> {
        #[allow(clippy::cast_precision_loss)]
        Coord {
            x: self.origin.x + (col as C + 0.5) * self.cell_size,
            y: self.origin.y - (row as C + 0.5) * self.cell_size,
        }
    }

    /// Returns true when both grids share cell size, origin, and shape.
    pub fn is_aligned_with(&self, other: &Self) -> bool {
        let tolerance = self.cell_size.max(other.cell_size) * ALIGNMENT_EPSILON;
        self.cols == other.cols
            && self.rows == other.rows
            && (self.cell_size - other.cell_size).abs() <= tolerance
            && (self.origin.x - other.origin.x).abs() <= tolerance
            && (self.origin.y - other.origin.y).abs() <= tolerance
    }

    pub(crate) fn linear_index(&self, (col, row): (usize, usize)) -> usize {
        row * self.cols + col
    }

    pub(crate) fn xy(&self, index: usize) -> (usize, usize) {
        (index % self.cols, index / self.cols)
    }
}

impl fmt::Display for GridGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{} @ {} from ({}, {})",
            self.cols, self.rows, self.cell_size, self.origin.x, self.origin.y
        )
    }
}
