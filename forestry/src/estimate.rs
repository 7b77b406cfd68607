//! Canopy height and biomass density raster algebra.

use crate::ForestryError;
use raster::{algebra, RasterSurface};

/// Returns `high_veg - ground` per cell.
///
/// Negative heights, where interpolated ground lies above the
/// vegetation top, are kept as they are.
pub fn estimate_height(
    high_veg: &RasterSurface,
    ground: &RasterSurface,
) -> Result<RasterSurface, ForestryError> {
    Ok(algebra::minus(high_veg, ground)?)
}

/// Returns `veg / total` per cell for zero-normalized count rasters.
///
/// A cell with a zero total is nodata, never zero and never NaN. The
/// vegetation classes must be a subset of the total classes, so every
/// defined value lies in `[0, 1]`; a cell breaking that is an error.
pub fn estimate_density(
    veg: &RasterSurface,
    total: &RasterSurface,
) -> Result<RasterSurface, ForestryError> {
    algebra::ensure_aligned(veg, total)?;
    for (((col, row), v), (_, t)) in veg.iter().zip(total.iter()) {
        if let (Some(veg), Some(total)) = (v, t) {
            if veg > total || veg < 0.0 {
                return Err(ForestryError::Containment {
                    col,
                    row,
                    veg,
                    total,
                });
            }
        }
    }
    Ok(algebra::divide(veg, total)?)
}
