use crate::{ClassSet, Stage};
use raster::RasterError;
use std::{path::PathBuf, time::Duration};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ForestryError {
    #[error("no point cloud identifier supplied")]
    MissingInput,

    #[error("invalid point cloud identifier {0:?}")]
    InvalidIdentifier(String),

    #[error("point cloud {0} not found")]
    CloudNotFound(String),

    #[error("invalid point cloud {path}, {reason}")]
    CloudFormat { path: PathBuf, reason: String },

    #[error("unknown classification code {0}")]
    UnknownClass(u8),

    #[error("no points classified {classes}")]
    EmptyClass { classes: ClassSet },

    #[error("{0}")]
    Raster(#[from] RasterError),

    #[error("vegetation count {veg} exceeds total count {total} at cell ({col}, {row})")]
    Containment {
        col: usize,
        row: usize,
        veg: f64,
        total: f64,
    },

    #[error("staging {name} failed, {reason}")]
    Staging { name: String, reason: String },

    #[error("publishing {name} failed, {reason}")]
    Publish { name: String, reason: String },

    #[error("resolving catalog item {id} failed, {reason}")]
    Resolve { id: String, reason: String },

    #[error("{stage} timed out after {elapsed:?}")]
    Timeout { stage: Stage, elapsed: Duration },

    #[error("{0}")]
    Io(#[from] std::io::Error),
}
