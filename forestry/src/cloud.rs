//! In-process classified point clouds.
//!
//! Clouds are stored in a compact `.xyzc` layout, optionally gzipped:
//!
//! ```text
//! u64 LE         point count
//! repeated:
//!   f64 LE x
//!   f64 LE y
//!   f64 LE z
//!   u8     classification
//! ```

use crate::{ClassificationCode, ForestryError};
use byteorder::{LittleEndian as LE, ReadBytesExt, WriteBytesExt};
use flate2::bufread::GzDecoder;
use geo::geometry::{Coord, Rect};
use raster::C;
use std::{
    collections::BTreeMap,
    fs::File,
    io::{BufRead, BufReader, ErrorKind, Read, Write},
    path::Path,
};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Bytes per serialized point.
const RECORD_LEN: u64 = 3 * 8 + 1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassifiedPoint {
    pub x: C,
    pub y: C,
    pub z: C,
    pub class: u8,
}

impl ClassifiedPoint {
    pub fn coord(&self) -> Coord<C> {
        Coord {
            x: self.x,
            y: self.y,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PointCloud {
    points: Vec<ClassifiedPoint>,

    /// Horizontal bounds of all points. Zero-sized at the origin for
    /// an empty cloud.
    extent: Rect<C>,
}

impl PointCloud {
    pub fn new(points: Vec<ClassifiedPoint>) -> Self {
        let extent = points
            .iter()
            .map(ClassifiedPoint::coord)
            .fold(None, |bounds: Option<(Coord<C>, Coord<C>)>, c| {
                Some(match bounds {
                    None => (c, c),
                    Some((min, max)) => (
                        Coord {
                            x: min.x.min(c.x),
                            y: min.y.min(c.y),
                        },
                        Coord {
                            x: max.x.max(c.x),
                            y: max.y.max(c.y),
                        },
                    ),
                })
            })
            .map_or_else(
                || {
                    let origin = Coord { x: 0.0, y: 0.0 };
                    Rect::new(origin, origin)
                },
                |(min, max)| Rect::new(min, max),
            );
        Self { points, extent }
    }

    /// Returns a cloud read from the `.xyzc` file at `path`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ForestryError> {
        let path = path.as_ref();
        let mut rdr = BufReader::new(File::open(path)?);
        let gzipped = rdr.fill_buf()?.starts_with(&GZIP_MAGIC);
        let result = if gzipped {
            Self::read_from(GzDecoder::new(rdr))
        } else {
            Self::read_from(rdr)
        };
        result.map_err(|e| match e {
            ForestryError::Io(e) if e.kind() == ErrorKind::UnexpectedEof => {
                ForestryError::CloudFormat {
                    path: path.to_owned(),
                    reason: "truncated point records".to_string(),
                }
            }
            ForestryError::CloudFormat { reason, .. } => ForestryError::CloudFormat {
                path: path.to_owned(),
                reason,
            },
            e => e,
        })
    }

    /// Reads an uncompressed `.xyzc` stream.
    pub fn read_from<R: Read>(mut rdr: R) -> Result<Self, ForestryError> {
        let n_points = rdr.read_u64::<LE>()?;
        // Don't trust the header for the initial allocation.
        let capacity = usize::try_from(n_points.min(1 << 20)).unwrap_or_default();
        let mut points = Vec::with_capacity(capacity);
        for i in 0..n_points {
            let x = rdr.read_f64::<LE>()?;
            let y = rdr.read_f64::<LE>()?;
            let z = rdr.read_f64::<LE>()?;
            let class = rdr.read_u8()?;
            if !(x.is_finite() && y.is_finite() && z.is_finite()) {
                return Err(ForestryError::CloudFormat {
                    path: Default::default(),
                    reason: format!("point {i} has a non-finite coordinate"),
                });
            }
            points.push(ClassifiedPoint { x, y, z, class });
        }
        match rdr.read_u8() {
            Ok(_) => Err(ForestryError::CloudFormat {
                path: Default::default(),
                reason: format!("trailing bytes after {n_points} points"),
            }),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(Self::new(points)),
            Err(e) => Err(e.into()),
        }
    }

    /// Writes this cloud as an uncompressed `.xyzc` stream.
    pub fn write_to<W: Write>(&self, mut out: W) -> Result<(), ForestryError> {
        out.write_u64::<LE>(self.points.len() as u64)?;
        for point in &self.points {
            out.write_f64::<LE>(point.x)?;
            out.write_f64::<LE>(point.y)?;
            out.write_f64::<LE>(point.z)?;
            out.write_u8(point.class)?;
        }
        out.flush()?;
        Ok(())
    }

    pub fn points(&self) -> &[ClassifiedPoint] {
        &self.points
    }

    pub fn extent(&self) -> Rect<C> {
        self.extent
    }

    /// Returns the number of points in this cloud.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns the encoded size of this cloud in bytes.
    pub fn encoded_len(&self) -> u64 {
        8 + self.points.len() as u64 * RECORD_LEN
    }

    /// Counts points per known classification. Other codes are tallied
    /// under `None`.
    pub fn class_histogram(&self) -> BTreeMap<Option<ClassificationCode>, usize> {
        let mut histogram = BTreeMap::new();
        for point in &self.points {
            let class = ClassificationCode::try_from(point.class).ok();
            *histogram.entry(class).or_insert(0) += 1;
        }
        histogram
    }
}
