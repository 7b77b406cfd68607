//! Canopy height and biomass density from classified lidar.
//!
//! A [`Pipeline`] opens a point cloud through a [`GeoEngine`], derives
//! two rasters on independent branches, and publishes each through an
//! [`ArtifactPublisher`] into a [`Catalog`].
//!
//! ```text
//! height  = surface(high vegetation) - surface(ground)
//! density = count(all vegetation) / count(all surface)
//! ```
//!
//! # References
//!
//! 1. [ASPRS LAS 1.4 point classes](https://www.asprs.org/wp-content/uploads/2019/07/LAS_1_4_r15.pdf)

mod catalog;
mod classes;
mod cloud;
mod context;
mod density;
mod engine;
mod error;
mod estimate;
mod extract;
mod pipeline;
mod publish;
mod stage;

pub use crate::{
    catalog::{Catalog, CatalogId, HttpCatalog, MemCatalog, MemItem},
    classes::{ClassSet, ClassificationCode},
    cloud::{ClassifiedPoint, PointCloud},
    context::{InvocationContext, Stage},
    density::{normalize_counts, rasterize_count, CountRaster},
    engine::{Binning, CellAssignment, GeoEngine, LocalEngine, VoidFill, CLOUD_EXTENSION},
    error::ForestryError,
    estimate::{estimate_density, estimate_height},
    extract::extract_surface,
    pipeline::{
        BranchFailure, BranchOutcome, Pipeline, PipelineConfig, PipelineReport, PipelineResult,
        Product,
    },
    publish::{ArtifactMeta, ArtifactPublisher, PublishFailure, ServiceArtifact, UploadedDraft},
    stage::{ServiceDefinition, ServiceManifest, StagedDraft, Stager, MAP_SERVICE, SD_EXTENSION},
};
