//! Elevation surfaces from a subset of classification codes.

use crate::{ClassSet, ForestryError, GeoEngine};
use log::debug;
use raster::{RasterSurface, C};

/// Returns the elevation surface interpolated from points in `classes`.
///
/// Fails with [`ForestryError::EmptyClass`] instead of returning an
/// all-nodata surface when no point matches `classes`.
pub fn extract_surface<E: GeoEngine>(
    engine: &E,
    cloud: &E::Dataset,
    classes: ClassSet,
    cell_size: C,
) -> Result<RasterSurface, ForestryError> {
    let surface = engine.surface(cloud, classes, cell_size)?;
    if surface.valid_count() == 0 {
        return Err(ForestryError::EmptyClass { classes });
    }
    debug!(
        "surface {classes}; grid: {}, valid cells: {}",
        surface.geometry(),
        surface.valid_count()
    );
    Ok(surface)
}
