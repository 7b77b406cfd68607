//! North-up raster surfaces with an explicit nodata sentinel.
//!
//! A [`RasterSurface`] is immutable once built. Every algebraic
//! operation in [`algebra`] yields a new surface and refuses to combine
//! grids which do not share cell size, origin, and shape.

pub mod algebra;
mod error;
mod geometry;

pub use crate::{error::RasterError, geometry::GridGeometry};
use geo::geometry::Coord;
use serde::{Deserialize, Serialize};

/// Base floating point type used for coordinates and cell values.
pub type C = f64;

/// Nodata sentinel used when a producer doesn't pick its own.
pub const DEFAULT_NODATA: C = -9999.0;

/// Largest number of cells a grid may hold, 2 GiB of `f64` cells.
pub const MAX_CELLS: usize = 1 << 28;

#[derive(Debug, Clone, PartialEq)]
pub struct RasterSurface {
    geometry: GridGeometry,

    /// Value marking a cell without data. A NaN sentinel matches any
    /// NaN cell.
    nodata: C,

    /// Row-major cell values, north row first.
    cells: Box<[C]>,
}

impl RasterSurface {
    /// Returns a surface over `geometry` holding `cells`.
    pub fn new(geometry: GridGeometry, nodata: C, cells: Vec<C>) -> Result<Self, RasterError> {
        if cells.len() != geometry.len() {
            return Err(RasterError::CellCount {
                expected: geometry.len(),
                actual: cells.len(),
            });
        }
        Ok(Self {
            geometry,
            nodata,
            cells: cells.into_boxed_slice(),
        })
    }

    /// Returns a surface with every cell set to `value`.
    pub fn filled(geometry: GridGeometry, nodata: C, value: C) -> Self {
        Self {
            geometry,
            nodata,
            cells: vec![value; geometry.len()].into_boxed_slice(),
        }
    }

    pub fn geometry(&self) -> &GridGeometry {
        &self.geometry
    }

    pub fn nodata(&self) -> C {
        self.nodata
    }

    /// Raw cell values, nodata sentinels included.
    pub fn cells(&self) -> &[C] {
        &self.cells
    }

    /// Returns true if `value` is this surface's nodata sentinel.
    pub fn is_nodata(&self, value: C) -> bool {
        if self.nodata.is_nan() {
            value.is_nan()
        } else {
            value == self.nodata
        }
    }

    /// Returns the value of cell `(col, row)`, or `None` for nodata and
    /// out of range cells.
    pub fn get(&self, (col, row): (usize, usize)) -> Option<C> {
        if col >= self.geometry.cols || row >= self.geometry.rows {
            return None;
        }
        let value = self.cells[self.geometry.linear_index((col, row))];
        (!self.is_nodata(value)).then_some(value)
    }

    /// Returns the value of the cell containing `coord`.
    pub fn value_at(&self, coord: Coord<C>) -> Option<C> {
        self.geometry.cell_of(coord).and_then(|xy| self.get(xy))
    }

    /// Returns an iterator over every cell as `((col, row), value)`.
    pub fn iter(&self) -> impl Iterator<Item = ((usize, usize), Option<C>)> + '_ {
        self.cells.iter().enumerate().map(|(index, &value)| {
            let value = (!self.is_nodata(value)).then_some(value);
            (self.geometry.xy(index), value)
        })
    }

    /// Returns the number of cells holding data.
    pub fn valid_count(&self) -> usize {
        self.cells.iter().filter(|&&v| !self.is_nodata(v)).count()
    }

    /// Summary statistics over cells holding data.
    pub fn stats(&self) -> Option<RasterStats> {
        let mut min = C::INFINITY;
        let mut max = C::NEG_INFINITY;
        let mut sum = 0.0;
        let mut valid = 0_usize;
        for &value in self.cells.iter().filter(|&&v| !self.is_nodata(v)) {
            min = min.min(value);
            max = max.max(value);
            sum += value;
            valid += 1;
        }
        #[allow(clippy::cast_precision_loss)]
        (valid > 0).then(|| RasterStats {
            min,
            max,
            mean: sum / valid as C,
            valid,
        })
    }
}

/// Summary of the cells holding data in a surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RasterStats {
    pub min: C,
    pub max: C,
    pub mean: C,
    pub valid: usize,
}


#[cfg(test)]
mod tests {
    use super::{test_util, RasterError, RasterSurface, DEFAULT_NODATA};
    use approx::assert_relative_eq;
    use geo::geometry::Coord;

    #[test]
    fn test_cell_count_checked() {
        let err = RasterSurface::new(test_util::grid(2, 2), DEFAULT_NODATA, vec![1.0; 3]);
        assert_eq!(
            err,
            Err(RasterError::CellCount {
                expected: 4,
                actual: 3
            })
        );
    }

    #[test]
    fn test_get_distinguishes_nodata() {
        let surface = test_util::surface(2, 2, &[0.0, DEFAULT_NODATA, 3.0, 4.0]);
        assert_eq!(surface.get((0, 0)), Some(0.0));
        assert_eq!(surface.get((1, 0)), None);
        assert_eq!(surface.get((0, 1)), Some(3.0));
        assert_eq!(surface.get((2, 0)), None);
        assert_eq!(surface.valid_count(), 3);
    }

    #[test]
    fn test_nan_sentinel() {
        let surface =
            RasterSurface::new(test_util::grid(2, 1), f64::NAN, vec![f64::NAN, 1.0]).unwrap();
        assert_eq!(surface.get((0, 0)), None);
        assert_eq!(surface.get((1, 0)), Some(1.0));
    }

    #[test]
    fn test_value_at() {
        // Origin (0, 0) is the north-west corner, so rows extend south.
        let surface = test_util::surface(2, 2, &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(surface.value_at(Coord { x: 1.5, y: -0.5 }), Some(2.0));
        assert_eq!(surface.value_at(Coord { x: 0.5, y: -1.5 }), Some(3.0));
        assert_eq!(surface.value_at(Coord { x: 0.5, y: 0.5 }), None);
    }

    #[test]
    fn test_iter_order() {
        let surface = test_util::surface(2, 2, &[1.0, DEFAULT_NODATA, 3.0, 4.0]);
        let cells: Vec<_> = surface.iter().collect();
        assert_eq!(
            cells,
            vec![
                ((0, 0), Some(1.0)),
                ((1, 0), None),
                ((0, 1), Some(3.0)),
                ((1, 1), Some(4.0)),
            ]
        );
    }

    #[test]
    fn test_stats() {
        let surface = test_util::surface(2, 2, &[1.0, DEFAULT_NODATA, 3.0, 8.0]);
        let stats = surface.stats().unwrap();
        assert_relative_eq!(stats.min, 1.0);
        assert_relative_eq!(stats.max, 8.0);
        assert_relative_eq!(stats.mean, 4.0);
        assert_eq!(stats.valid, 3);

        let empty = RasterSurface::filled(test_util::grid(2, 2), DEFAULT_NODATA, DEFAULT_NODATA);
        assert_eq!(empty.stats(), None);
    }
}
