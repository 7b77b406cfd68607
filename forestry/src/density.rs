//! Per-cell point counts with empty cells normalized to zero.

use crate::{ClassSet, ForestryError, GeoEngine};
use log::debug;
use raster::{algebra, RasterSurface, C};

/// A point count raster in which every cell holds data.
#[derive(Debug, Clone, PartialEq)]
pub struct CountRaster {
    pub raster: RasterSurface,

    /// Total number of counted points.
    pub points: u64,
}

/// Returns the number of points in `classes` per `cell_size` cell.
///
/// Cells the engine reports as nodata hold no points and are set to
/// zero, so the result is safe to use in arithmetic.
pub fn rasterize_count<E: GeoEngine>(
    engine: &E,
    cloud: &E::Dataset,
    classes: ClassSet,
    cell_size: C,
) -> Result<CountRaster, ForestryError> {
    let raw = engine.point_count(cloud, classes, cell_size)?;
    let counts = normalize_counts(&raw);
    debug!(
        "point count {classes}; grid: {}, points: {}",
        counts.raster.geometry(),
        counts.points
    );
    Ok(counts)
}

/// Replaces nodata in a raw count raster with zero.
pub fn normalize_counts(raw: &RasterSurface) -> CountRaster {
    let raster = algebra::con_null(raw, 0.0);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let points = raster.cells().iter().sum::<C>() as u64;
    CountRaster { raster, points }
}
