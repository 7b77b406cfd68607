//! Pointwise raster algebra.
//!
//! Binary operations require aligned operands and propagate nodata:
//! a cell which is nodata on either side is nodata in the result.

use crate::{RasterError, RasterSurface, C};

/// Returns `a - b`.
pub fn minus(a: &RasterSurface, b: &RasterSurface) -> Result<RasterSurface, RasterError> {
    zip_with(a, b, |x, y| Some(x - y))
}

/// Returns `a / b`, with nodata wherever `b` is zero.
///
/// Both operands are read as floating point, so integral counts never
/// truncate.
pub fn divide(a: &RasterSurface, b: &RasterSurface) -> Result<RasterSurface, RasterError> {
    zip_with(a, b, |x, y| (y != 0.0).then(|| x / y))
}

/// Returns a copy of `surface` with nodata cells set to `replacement`.
///
/// Applying this twice yields the same surface as applying it once.
pub fn con_null(surface: &RasterSurface, replacement: C) -> RasterSurface {
    let cells = surface
        .cells()
        .iter()
        .map(|&v| if surface.is_nodata(v) { replacement } else { v })
        .collect::<Vec<_>>();
    RasterSurface {
        geometry: *surface.geometry(),
        nodata: surface.nodata(),
        cells: cells.into_boxed_slice(),
    }
}

/// Returns `f` applied to every cell holding data.
///
/// `f` may return `None` to turn a cell into nodata.
pub fn map<F>(surface: &RasterSurface, f: F) -> RasterSurface
where
    F: Fn(C) -> Option<C>,
{
    let nodata = surface.nodata();
    let cells = surface
        .cells()
        .iter()
        .map(|&v| {
            if surface.is_nodata(v) {
                nodata
            } else {
                f(v).unwrap_or(nodata)
            }
        })
        .collect::<Vec<_>>();
    RasterSurface {
        geometry: *surface.geometry(),
        nodata,
        cells: cells.into_boxed_slice(),
    }
}

/// Fails unless `a` and `b` share grid geometry.
pub fn ensure_aligned(a: &RasterSurface, b: &RasterSurface) -> Result<(), RasterError> {
    if a.geometry().is_aligned_with(b.geometry()) {
        Ok(())
    } else {
        Err(RasterError::Alignment {
            left: *a.geometry(),
            right: *b.geometry(),
        })
    }
}

/// Combines aligned surfaces cell by cell. The result uses `a`'s
/// geometry and nodata sentinel.
fn zip_with<F>(a: &RasterSurface, b: &RasterSurface, f: F) -> Result<RasterSurface, RasterError>
where
    F: Fn(C, C) -> Option<C>,
{
    ensure_aligned(a, b)?;
    let nodata = a.nodata();
    let cells = a
        .cells()
        .iter()
        .zip(b.cells())
        .map(|(&x, &y)| {
            if a.is_nodata(x) || b.is_nodata(y) {
                return nodata;
            }
            match f(x, y) {
                Some(v) if v.is_finite() => v,
                _ => nodata,
            }
        })
        .collect::<Vec<_>>();
    Ok(RasterSurface {
        geometry: *a.geometry(),
        nodata,
        cells: cells.into_boxed_slice(),
    })
}

#[cfg(test)]
mod tests {
    use super::{con_null, divide, map, minus};
    use crate::{test_util, GridGeometry, RasterError, RasterSurface, DEFAULT_NODATA};
    use approx::assert_relative_eq;
    use geo::geometry::Coord;

    const ND: f64 = DEFAULT_NODATA;

    #[test]
    fn test_minus_keeps_negatives() {
        let a = test_util::surface(2, 2, &[5.0, 4.0, 0.5, 2.0]);
        let b = test_util::surface(2, 2, &[1.0, 1.0, 1.0, 1.0]);
        let diff = minus(&a, &b).unwrap();
        assert_eq!(diff.cells(), &[4.0, 3.0, -0.5, 1.0]);
    }

    #[test]
    fn test_minus_propagates_nodata() {
        let a = test_util::surface(2, 1, &[ND, 4.0]);
        let b = test_util::surface(2, 1, &[1.0, ND]);
        let diff = minus(&a, &b).unwrap();
        assert_eq!(diff.valid_count(), 0);
    }

    #[test]
    fn test_divide_by_zero_is_nodata() {
        let a = test_util::surface(2, 2, &[0.0, 2.0, 0.0, 5.0]);
        let b = test_util::surface(2, 2, &[0.0, 4.0, 0.0, 5.0]);
        let q = divide(&a, &b).unwrap();
        assert_eq!(q.get((0, 0)), None);
        assert_relative_eq!(q.get((1, 0)).unwrap(), 0.5);
        assert_eq!(q.get((0, 1)), None);
        assert_relative_eq!(q.get((1, 1)).unwrap(), 1.0);
        assert!(q.cells().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_divide_zero_numerator_is_zero() {
        let a = test_util::surface(1, 1, &[0.0]);
        let b = test_util::surface(1, 1, &[3.0]);
        assert_eq!(divide(&a, &b).unwrap().get((0, 0)), Some(0.0));
    }

    #[test]
    fn test_misaligned_operands_rejected() {
        let a = test_util::surface(2, 2, &[1.0; 4]);
        let shifted = GridGeometry::new(Coord { x: 0.5, y: 0.0 }, 1.0, 2, 2).unwrap();
        let b = RasterSurface::filled(shifted, ND, 1.0);
        assert!(matches!(
            minus(&a, &b),
            Err(RasterError::Alignment { .. })
        ));

        let c = test_util::surface(4, 1, &[1.0; 4]);
        assert!(matches!(divide(&a, &c), Err(RasterError::Alignment { .. })));
    }

    #[test]
    fn test_con_null_idempotent() {
        let raw = test_util::surface(2, 2, &[ND, 3.0, ND, 1.0]);
        let once = con_null(&raw, 0.0);
        let twice = con_null(&once, 0.0);
        assert_eq!(once.cells(), &[0.0, 3.0, 0.0, 1.0]);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_map_skips_nodata() {
        let raw = test_util::surface(3, 1, &[ND, -1.0, 4.0]);
        let mapped = map(&raw, |v| (v >= 0.0).then(|| v * 2.0));
        assert_eq!(mapped.cells(), &[ND, ND, 8.0]);
    }
}
