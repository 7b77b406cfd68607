//! Service definition drafts.
//!
//! A draft is a gzip stream laid out as
//!
//! ```text
//! [u8; 4]        magic, "FSD1"
//! u32 LE         manifest length
//! [u8]           JSON manifest
//! repeated:
//!   f64 LE       cell value, row-major, north row first
//! ```

use crate::{ArtifactMeta, ForestryError, InvocationContext};
use byteorder::{LittleEndian as LE, ReadBytesExt, WriteBytesExt};
use flate2::{bufread::GzDecoder, write::GzEncoder, Compression};
use log::debug;
use raster::{GridGeometry, RasterStats, RasterSurface, C};
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, ErrorKind, Read, Write},
    path::{Path, PathBuf},
};
use uuid::Uuid;

const SD_MAGIC: &[u8; 4] = b"FSD1";

/// Longest manifest [`ServiceDefinition::open`] reads.
const MAX_MANIFEST_LEN: u32 = 1 << 20;

/// File extension of staged drafts.
pub const SD_EXTENSION: &str = "sd";

/// Content type every draft is published as.
pub const MAP_SERVICE: &str = "Map Service";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceManifest {
    pub name: String,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub content_type: String,
    pub cloud_id: String,
    pub invocation: Uuid,
    pub geometry: GridGeometry,
    pub nodata: C,
    pub stats: Option<RasterStats>,
}

/// A draft written to the staging area, ready for upload.
#[derive(Debug, Clone)]
pub struct StagedDraft {
    pub path: PathBuf,
    pub manifest: ServiceManifest,
}

/// Writes drafts under `<root>/<namespace>/`.
#[derive(Debug, Clone)]
pub struct Stager {
    root: PathBuf,
}

impl Stager {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Serializes `raster` into a draft named `name`.
    pub fn stage(
        &self,
        ctx: &InvocationContext,
        raster: &RasterSurface,
        name: &str,
        meta: &ArtifactMeta,
    ) -> Result<StagedDraft, ForestryError> {
        let manifest = ServiceManifest {
            name: name.to_owned(),
            title: meta.title.clone(),
            description: meta.description.clone(),
            tags: meta.tags.clone(),
            content_type: MAP_SERVICE.to_string(),
            cloud_id: ctx.cloud_id().to_owned(),
            invocation: ctx.invocation(),
            geometry: *raster.geometry(),
            nodata: raster.nodata(),
            stats: raster.stats(),
        };
        let dir = self.root.join(ctx.namespace());
        let path = dir.join(format!("{name}.{SD_EXTENSION}"));
        let tmp_path = path.with_extension("tmp");
        let mk_err = |e: ForestryError| ForestryError::Staging {
            name: name.to_owned(),
            reason: e.to_string(),
        };
        fs::create_dir_all(&dir).map_err(|e| mk_err(e.into()))?;
        let file = File::create(&tmp_path).map_err(|e| mk_err(e.into()))?;
        let mut wtr = BufWriter::new(GzEncoder::new(file, Compression::default()));
        write_draft(&mut wtr, &manifest, raster).map_err(mk_err)?;
        wtr.into_inner()
            .map_err(|e| mk_err(e.into_error().into()))?
            .finish()
            .map_err(|e| mk_err(e.into()))?;
        fs::rename(&tmp_path, &path).map_err(|e| mk_err(e.into()))?;
        debug!("staged {path:?}");
        Ok(StagedDraft { path, manifest })
    }
}

fn write_draft<W: Write>(
    mut out: W,
    manifest: &ServiceManifest,
    raster: &RasterSurface,
) -> Result<(), ForestryError> {
    let json = serde_json::to_vec(manifest).map_err(std::io::Error::from)?;
    let json_len = u32::try_from(json.len())
        .map_err(|_| std::io::Error::new(ErrorKind::InvalidData, "manifest too large"))?;
    out.write_all(SD_MAGIC)?;
    out.write_u32::<LE>(json_len)?;
    out.write_all(&json)?;
    for &value in raster.cells() {
        out.write_f64::<LE>(value)?;
    }
    out.flush()?;
    Ok(())
}

/// A draft read back from disk.
#[derive(Debug, Clone)]
pub struct ServiceDefinition {
    pub manifest: ServiceManifest,
    pub raster: RasterSurface,
}

impl ServiceDefinition {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ForestryError> {
        let path = path.as_ref();
        let mk_err = |reason: String| ForestryError::Staging {
            name: path.display().to_string(),
            reason,
        };
        let file = File::open(path).map_err(|e| mk_err(e.to_string()))?;
        let mut rdr = GzDecoder::new(BufReader::new(file));

        let mut magic = [0_u8; 4];
        rdr.read_exact(&mut magic)
            .map_err(|e| mk_err(e.to_string()))?;
        if &magic != SD_MAGIC {
            return Err(mk_err("not a service definition draft".to_string()));
        }
        let json_len = rdr.read_u32::<LE>().map_err(|e| mk_err(e.to_string()))?;
        if json_len > MAX_MANIFEST_LEN {
            return Err(mk_err(format!(
                "manifest of {json_len} bytes, limit is {MAX_MANIFEST_LEN}"
            )));
        }
        let mut json = vec![0_u8; json_len as usize];
        rdr.read_exact(&mut json)
            .map_err(|e| mk_err(e.to_string()))?;
        let manifest: ServiceManifest =
            serde_json::from_slice(&json).map_err(|e| mk_err(e.to_string()))?;

        // Deserializing skips the shape checks of `GridGeometry::new`.
        let g = &manifest.geometry;
        let geometry = GridGeometry::new(g.origin, g.cell_size, g.cols, g.rows)
            .map_err(|e| mk_err(e.to_string()))?;

        let mut cells = Vec::with_capacity(geometry.len());
        for _ in 0..geometry.len() {
            cells.push(rdr.read_f64::<LE>().map_err(|e| mk_err(e.to_string()))?);
        }
        let raster = RasterSurface::new(geometry, manifest.nodata, cells)?;
        Ok(Self { manifest, raster })
    }
}
