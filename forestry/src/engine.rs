//! Geospatial engine seam and a local, in-process engine.

use crate::{ClassSet, ForestryError, PointCloud};
use dashmap::DashMap;
use log::debug;
use raster::{GridGeometry, RasterSurface, C, DEFAULT_NODATA};
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};

/// File extension of point clouds read by [`LocalEngine`].
pub const CLOUD_EXTENSION: &str = "xyzc";

/// Raster primitives the pipeline needs from a point cloud engine.
///
/// Every grid an engine returns for one dataset must cover that
/// dataset's full extent, so that rasters requested with equal cell
/// sizes are aligned.
pub trait GeoEngine: Send + Sync {
    /// Opaque, read-only handle to an opened point cloud.
    type Dataset: Send + Sync;

    fn open(&self, identifier: &str) -> Result<Self::Dataset, ForestryError>;

    /// Returns an elevation surface interpolated from points in
    /// `classes`. Cells the engine can't estimate are nodata.
    fn surface(
        &self,
        dataset: &Self::Dataset,
        classes: ClassSet,
        cell_size: C,
    ) -> Result<RasterSurface, ForestryError>;

    /// Returns the number of points in `classes` per cell. Cells
    /// without any point are nodata.
    fn point_count(
        &self,
        dataset: &Self::Dataset,
        classes: ClassSet,
        cell_size: C,
    ) -> Result<RasterSurface, ForestryError>;
}

/// How a cell's elevation is derived from the points binned into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CellAssignment {
    #[default]
    Average,
    Minimum,
    Maximum,
}

/// How cells without points are filled after binning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VoidFill {
    /// Leave empty cells as nodata.
    None,

    /// Inverse distance weighting of binned cells within `radius`
    /// cells.
    Idw { radius: usize, power: C },
}

impl Default for VoidFill {
    fn default() -> Self {
        Self::Idw {
            radius: 2,
            power: 2.0,
        }
    }
}

/// Surface interpolation settings.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Binning {
    pub assignment: CellAssignment,
    pub void_fill: VoidFill,
}

/// Engine over `.xyzc` clouds in a directory.
pub struct LocalEngine {
    /// Directory containing `<identifier>.xyzc` files.
    cloud_dir: PathBuf,

    binning: Binning,

    /// Clouds which have been loaded on demand or inserted.
    clouds: DashMap<String, Arc<PointCloud>>,
}

impl LocalEngine {
    pub fn new(cloud_dir: PathBuf) -> Self {
        Self {
            cloud_dir,
            binning: Binning::default(),
            clouds: DashMap::new(),
        }
    }

    #[must_use]
    pub fn with_binning(mut self, binning: Binning) -> Self {
        self.binning = binning;
        self
    }

    /// Registers an already loaded cloud under `identifier`.
    pub fn insert(&self, identifier: &str, cloud: PointCloud) {
        self.clouds.insert(identifier.to_owned(), Arc::new(cloud));
    }

    pub fn cloud_dir(&self) -> &Path {
        &self.cloud_dir
    }
}

impl GeoEngine for LocalEngine {
    type Dataset = Arc<PointCloud>;

    fn open(&self, identifier: &str) -> Result<Arc<PointCloud>, ForestryError> {
        if identifier.is_empty()
            || identifier.contains(['/', '\\'])
            || identifier.split('.').any(str::is_empty)
        {
            return Err(ForestryError::InvalidIdentifier(identifier.to_owned()));
        }
        self.clouds
            .entry(identifier.to_owned())
            .or_try_insert_with(|| {
                let path = self
                    .cloud_dir
                    .join(format!("{identifier}.{CLOUD_EXTENSION}"));
                debug!("loading {path:?}");
                match PointCloud::load(&path) {
                    Ok(cloud) => Ok(Arc::new(cloud)),
                    Err(ForestryError::Io(e)) if e.kind() == ErrorKind::NotFound => {
                        Err(ForestryError::CloudNotFound(identifier.to_owned()))
                    }
                    Err(e) => Err(e),
                }
            })
            .map(|r| r.clone())
    }

    fn surface(
        &self,
        cloud: &Arc<PointCloud>,
        classes: ClassSet,
        cell_size: C,
    ) -> Result<RasterSurface, ForestryError> {
        let grid = GridGeometry::covering(cloud.extent(), cell_size)?;
        let bins = bin(cloud, classes, &grid);
        let binned: Vec<Option<C>> = bins
            .iter()
            .map(|bin| bin.value(self.binning.assignment))
            .collect();
        let cells = match self.binning.void_fill {
            VoidFill::None => binned
                .iter()
                .map(|v| v.unwrap_or(DEFAULT_NODATA))
                .collect(),
            VoidFill::Idw { radius, power } => idw_fill(&binned, &grid, radius, power),
        };
        Ok(RasterSurface::new(grid, DEFAULT_NODATA, cells)?)
    }

    fn point_count(
        &self,
        cloud: &Arc<PointCloud>,
        classes: ClassSet,
        cell_size: C,
    ) -> Result<RasterSurface, ForestryError> {
        let grid = GridGeometry::covering(cloud.extent(), cell_size)?;
        #[allow(clippy::cast_precision_loss)]
        let cells = bin(cloud, classes, &grid)
            .iter()
            .map(|bin| match bin.n {
                0 => DEFAULT_NODATA,
                n => n as C,
            })
            .collect();
        Ok(RasterSurface::new(grid, DEFAULT_NODATA, cells)?)
    }
}

/// Running aggregate of the points falling into one cell.
#[derive(Debug, Clone, Copy)]
struct Bin {
    n: usize,
    sum: C,
    min: C,
    max: C,
}

impl Default for Bin {
    fn default() -> Self {
        Self {
            n: 0,
            sum: 0.0,
            min: C::INFINITY,
            max: C::NEG_INFINITY,
        }
    }
}

impl Bin {
    fn push(&mut self, z: C) {
        self.n += 1;
        self.sum += z;
        self.min = self.min.min(z);
        self.max = self.max.max(z);
    }

    fn value(&self, assignment: CellAssignment) -> Option<C> {
        #[allow(clippy::cast_precision_loss)]
        (self.n > 0).then(|| match assignment {
            CellAssignment::Average => self.sum / self.n as C,
            CellAssignment::Minimum => self.min,
            CellAssignment::Maximum => self.max,
        })
    }
}

fn bin(cloud: &PointCloud, classes: ClassSet, grid: &GridGeometry) -> Vec<Bin> {
    let mut bins = vec![Bin::default(); grid.len()];
    for point in cloud.points().iter().filter(|p| classes.contains(p.class)) {
        if let Some((col, row)) = grid.cell_of(point.coord()) {
            bins[row * grid.cols + col].push(point.z);
        }
    }
    bins
}

/// Fills cells without a binned value from binned cells within
/// `radius`. Only binned values feed the weights, so the result doesn't
/// depend on traversal order.
fn idw_fill(binned: &[Option<C>], grid: &GridGeometry, radius: usize, power: C) -> Vec<C> {
    let mut cells = Vec::with_capacity(binned.len());
    for row in 0..grid.rows {
        for col in 0..grid.cols {
            if let Some(value) = binned[row * grid.cols + col] {
                cells.push(value);
                continue;
            }
            let (mut weighted, mut weights) = (0.0, 0.0);
            for r in row.saturating_sub(radius)..=(row + radius).min(grid.rows - 1) {
                for c in col.saturating_sub(radius)..=(col + radius).min(grid.cols - 1) {
                    if let Some(value) = binned[r * grid.cols + c] {
                        #[allow(clippy::cast_precision_loss)]
                        let distance = ((r.abs_diff(row).pow(2) + c.abs_diff(col).pow(2)) as C).sqrt();
                        let weight = distance.powf(-power);
                        weighted += weight * value;
                        weights += weight;
                    }
                }
            }
            cells.push(if weights > 0.0 {
                weighted / weights
            } else {
                DEFAULT_NODATA
            });
        }
    }
    cells
}

#[cfg(test)]
mod tests {
    use super::{Binning, CellAssignment, GeoEngine, LocalEngine, VoidFill};
    use crate::{ClassSet, ClassifiedPoint, ForestryError, PointCloud};
    use approx::assert_relative_eq;
    use std::{fs::File, path::PathBuf};

    fn point(x: f64, y: f64, z: f64, class: u8) -> ClassifiedPoint {
        ClassifiedPoint { x, y, z, class }
    }

    /// A 20x20 plot, 2x2 cells at 10 map units. The south-east cell has
    /// no ground points.
    fn plot() -> PointCloud {
        PointCloud::new(vec![
            point(0.0, 20.0, 100.0, 2),
            point(2.0, 18.0, 102.0, 2),
            point(15.0, 15.0, 101.0, 2),
            point(5.0, 5.0, 99.0, 2),
            point(4.0, 16.0, 120.0, 5),
            point(16.0, 4.0, 118.0, 5),
            point(16.0, 5.0, 110.0, 4),
            point(20.0, 0.0, 105.0, 3),
        ])
    }

    fn engine(binning: Binning) -> LocalEngine {
        let engine = LocalEngine::new(PathBuf::from("/nonexistent")).with_binning(binning);
        engine.insert("plot", plot());
        engine
    }

    #[test]
    fn test_grids_cover_full_extent() {
        let engine = engine(Binning::default());
        let cloud = engine.open("plot").unwrap();
        let ground = engine.surface(&cloud, ClassSet::GROUND, 10.0).unwrap();
        let veg = engine
            .point_count(&cloud, ClassSet::ALL_VEGETATION, 10.0)
            .unwrap();
        assert_eq!(ground.geometry(), veg.geometry());
        assert_eq!((ground.geometry().cols, ground.geometry().rows), (2, 2));
    }

    #[test]
    fn test_average_binning_without_fill() {
        let engine = engine(Binning {
            assignment: CellAssignment::Average,
            void_fill: VoidFill::None,
        });
        let cloud = engine.open("plot").unwrap();
        let ground = engine.surface(&cloud, ClassSet::GROUND, 10.0).unwrap();
        assert_relative_eq!(ground.get((0, 0)).unwrap(), 101.0);
        assert_relative_eq!(ground.get((1, 0)).unwrap(), 101.0);
        assert_relative_eq!(ground.get((0, 1)).unwrap(), 99.0);
        assert_eq!(ground.get((1, 1)), None);
    }

    #[test]
    fn test_min_max_assignment() {
        let cloud = plot();
        let max = engine(Binning {
            assignment: CellAssignment::Maximum,
            void_fill: VoidFill::None,
        });
        let surface = max
            .surface(&std::sync::Arc::new(cloud.clone()), ClassSet::GROUND, 10.0)
            .unwrap();
        assert_relative_eq!(surface.get((0, 0)).unwrap(), 102.0);

        let min = engine(Binning {
            assignment: CellAssignment::Minimum,
            void_fill: VoidFill::None,
        });
        let surface = min
            .surface(&std::sync::Arc::new(cloud), ClassSet::GROUND, 10.0)
            .unwrap();
        assert_relative_eq!(surface.get((0, 0)).unwrap(), 100.0);
    }

    #[test]
    fn test_idw_fills_voids() {
        let engine = engine(Binning {
            assignment: CellAssignment::Average,
            void_fill: VoidFill::Idw {
                radius: 1,
                power: 2.0,
            },
        });
        let cloud = engine.open("plot").unwrap();
        let ground = engine.surface(&cloud, ClassSet::GROUND, 10.0).unwrap();
        // Neighbours at distance 1 (101, 99) weigh 1, the diagonal (101)
        // weighs 1/2.
        let expected = (101.0 + 99.0 + 0.5 * 101.0) / 2.5;
        assert_relative_eq!(ground.get((1, 1)).unwrap(), expected);
    }

    #[test]
    fn test_no_matching_points_is_all_nodata() {
        let engine = engine(Binning::default());
        let cloud = engine.open("plot").unwrap();
        let none = ClassSet::of(&[]);
        assert_eq!(engine.surface(&cloud, none, 10.0).unwrap().valid_count(), 0);
        assert_eq!(
            engine.point_count(&cloud, none, 10.0).unwrap().valid_count(),
            0
        );
    }

    #[test]
    fn test_point_count() {
        let engine = engine(Binning::default());
        let cloud = engine.open("plot").unwrap();
        let total = engine
            .point_count(&cloud, ClassSet::ALL_SURFACE, 10.0)
            .unwrap();
        assert_eq!(total.get((0, 0)), Some(3.0));
        assert_eq!(total.get((1, 0)), Some(1.0));
        assert_eq!(total.get((0, 1)), Some(1.0));
        assert_eq!(total.get((1, 1)), Some(3.0));
    }

    #[test]
    fn test_open_from_directory() {
        let dir = std::env::temp_dir().join(format!("forestry-engine-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        plot()
            .write_to(File::create(dir.join("stand_12.xyzc")).unwrap())
            .unwrap();
        let engine = LocalEngine::new(dir);
        let a = engine.open("stand_12").unwrap();
        let b = engine.open("stand_12").unwrap();
        assert!(std::sync::Arc::ptr_eq(&a, &b));
        assert_eq!(a.len(), 8);
    }

    #[test]
    fn test_open_errors() {
        let engine = engine(Binning::default());
        assert!(matches!(
            engine.open("missing"),
            Err(ForestryError::CloudNotFound(_))
        ));
        for bad in ["", "../plot", "a/b", "a..b"] {
            assert!(matches!(
                engine.open(bad),
                Err(ForestryError::InvalidIdentifier(_))
            ));
        }
    }
}
