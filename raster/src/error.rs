use crate::{GridGeometry, MAX_CELLS};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RasterError {
    #[error("rasters are not aligned, {left} vs {right}")]
    Alignment {
        left: GridGeometry,
        right: GridGeometry,
    },

    #[error("expected {expected} cells, got {actual}")]
    CellCount { expected: usize, actual: usize },

    #[error("invalid cell size {0}")]
    InvalidCellSize(f64),

    /// The grid is empty, or holds more than [`MAX_CELLS`] cells.
    #[error("unsupported grid of {cols} by {rows} cells, limit is {MAX_CELLS}")]
    Shape { cols: f64, rows: f64 },
}
