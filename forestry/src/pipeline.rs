//! Canopy height and biomass density for one point cloud.
//!
//! The two products are derived on independent branches. A failure on
//! one branch is reported next to the other branch's outcome and never
//! aborts it.

use crate::{
    estimate_density, estimate_height, extract_surface, rasterize_count, ArtifactMeta,
    ArtifactPublisher, Catalog, ClassSet, ForestryError, GeoEngine, InvocationContext,
    PublishFailure, ServiceArtifact, Stage, UploadedDraft,
};
use log::{info, warn};
use raster::{RasterSurface, C};
use std::{fmt, time::Duration};
use uuid::Uuid;

/// A raster product derived by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Product {
    /// Canopy height model.
    Height,

    /// Biomass density index.
    Density,
}

impl Product {
    /// Suffix appended to the invocation namespace for this product.
    pub fn artifact_suffix(self) -> &'static str {
        match self {
            Self::Height => "th_raster",
            Self::Density => "bm_dens_raster",
        }
    }

    pub fn default_meta(self) -> ArtifactMeta {
        let (subject, tag) = match self {
            Self::Height => ("tree height", "Tree Height"),
            Self::Density => ("biomass density", "Biomass Density"),
        };
        let text = format!(
            "Raster tile displaying {subject}, estimated from lidar data using the ForestryLidarViewer app."
        );
        ArtifactMeta {
            title: text.clone(),
            description: text,
            tags: [tag, "LAS", "Lidar", "Forestry"]
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Height => f.write_str("height"),
            Self::Density => f.write_str("density"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Cell size of the elevation surfaces feeding the height model.
    pub surface_cell_size: C,

    /// Cell size of the point count rasters feeding the density index.
    pub count_cell_size: C,

    /// Budget for a whole invocation.
    pub timeout: Option<Duration>,

    /// Run both branches concurrently.
    pub parallel: bool,

    pub height: ArtifactMeta,

    pub density: ArtifactMeta,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            surface_cell_size: 10.0,
            count_cell_size: 10.0,
            timeout: None,
            parallel: true,
            height: Product::Height.default_meta(),
            density: Product::Density.default_meta(),
        }
    }
}

impl PipelineConfig {
    pub fn meta(&self, product: Product) -> &ArtifactMeta {
        match product {
            Product::Height => &self.height,
            Product::Density => &self.density,
        }
    }
}

/// Why a branch produced no artifact.
#[derive(Debug)]
pub struct BranchFailure {
    pub product: Product,
    pub stage: Stage,
    pub error: ForestryError,

    /// The derived raster, when the failure happened while publishing
    /// it. It can be handed to [`Pipeline::republish`].
    pub raster: Option<RasterSurface>,

    /// The item the catalog already holds, when only resolving it
    /// failed.
    pub uploaded: Option<UploadedDraft>,
}

impl BranchFailure {
    /// Whether [`Pipeline::retry`] can make progress on this failure.
    pub fn is_retryable(&self) -> bool {
        self.uploaded.is_some() || self.raster.is_some()
    }
}

impl fmt::Display for BranchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed during {}, {}", self.product, self.stage, self.error)
    }
}

pub type BranchOutcome = Result<ServiceArtifact, BranchFailure>;

/// Outcome of both branches of one invocation.
#[derive(Debug)]
pub struct PipelineReport {
    pub invocation: Uuid,
    pub namespace: String,
    pub height: BranchOutcome,
    pub density: BranchOutcome,
}

impl PipelineReport {
    /// Returns every published artifact.
    pub fn artifacts(&self) -> impl Iterator<Item = &ServiceArtifact> {
        [&self.height, &self.density]
            .into_iter()
            .filter_map(|outcome| outcome.as_ref().ok())
    }

    pub fn is_complete(&self) -> bool {
        self.height.is_ok() && self.density.is_ok()
    }
}

/// `Err` only for [`ForestryError::MissingInput`]; every other failure
/// is reported per branch.
pub type PipelineResult = Result<PipelineReport, ForestryError>;

pub struct Pipeline<E, C> {
    engine: E,
    publisher: ArtifactPublisher<C>,
    config: PipelineConfig,
}

impl<E: GeoEngine, C: Catalog> Pipeline<E, C> {
    pub fn new(engine: E, publisher: ArtifactPublisher<C>, config: PipelineConfig) -> Self {
        Self {
            engine,
            publisher,
            config,
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn publisher(&self) -> &ArtifactPublisher<C> {
        &self.publisher
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Derives and publishes both products for `cloud_id` under a fresh
    /// invocation id.
    pub fn run(&self, cloud_id: &str) -> PipelineResult {
        if cloud_id.trim().is_empty() {
            warn!("no point cloud identifier supplied");
            return Err(ForestryError::MissingInput);
        }
        let ctx = InvocationContext::generate(cloud_id, self.config.timeout);
        self.run_with(&ctx)
    }

    /// Like [`Pipeline::run`], with a caller supplied context.
    pub fn run_with(&self, ctx: &InvocationContext) -> PipelineResult {
        if ctx.cloud_id().trim().is_empty() {
            warn!("no point cloud identifier supplied");
            return Err(ForestryError::MissingInput);
        }
        info!("{}: processing {}", ctx.namespace(), ctx.cloud_id());
        let (height, density) = if self.config.parallel {
            rayon::join(|| self.height_branch(ctx), || self.density_branch(ctx))
        } else {
            (self.height_branch(ctx), self.density_branch(ctx))
        };
        for outcome in [&height, &density] {
            if let Err(failure) = outcome {
                warn!("{}: {failure}", ctx.namespace());
            }
        }
        Ok(PipelineReport {
            invocation: ctx.invocation(),
            namespace: ctx.namespace().to_owned(),
            height,
            density,
        })
    }

    /// Publishes an already derived `raster` again, typically one taken
    /// from a [`BranchFailure`].
    pub fn republish(
        &self,
        ctx: &InvocationContext,
        product: Product,
        raster: RasterSurface,
    ) -> BranchOutcome {
        self.publish(ctx, product, raster)
    }

    /// Picks a failed publish back up. An item the catalog already
    /// accepted is only resolved, so no second item appears under the
    /// same name. Otherwise a retained raster is published again.
    /// Failures with neither are returned as they are.
    pub fn retry(&self, ctx: &InvocationContext, failure: BranchFailure) -> BranchOutcome {
        let BranchFailure {
            product,
            stage,
            error,
            raster,
            uploaded,
        } = failure;
        match (uploaded, raster) {
            (Some(uploaded), raster) => self
                .publisher
                .resolve_uploaded(ctx, uploaded)
                .map_err(|failure| BranchFailure {
                    product,
                    stage: failure.stage,
                    error: failure.error,
                    raster,
                    uploaded: failure.uploaded,
                }),
            (None, Some(raster)) => self.publish(ctx, product, raster),
            (None, None) => Err(BranchFailure {
                product,
                stage,
                error,
                raster: None,
                uploaded: None,
            }),
        }
    }

    /// Height = high vegetation surface - ground surface.
    pub fn height_branch(&self, ctx: &InvocationContext) -> BranchOutcome {
        let product = Product::Height;
        let fail = move |stage: Stage| move |error: ForestryError| BranchFailure {
            product,
            stage,
            error,
            raster: None,
            uploaded: None,
        };
        let cell_size = self.config.surface_cell_size;

        let cloud = ctx
            .guard(Stage::Open, || self.engine.open(ctx.cloud_id()))
            .map_err(fail(Stage::Open))?;
        let ground = ctx
            .guard(Stage::ExtractSurface, || {
                extract_surface(&self.engine, &cloud, ClassSet::GROUND, cell_size)
            })
            .map_err(fail(Stage::ExtractSurface))?;
        let high_veg = ctx
            .guard(Stage::ExtractSurface, || {
                extract_surface(&self.engine, &cloud, ClassSet::HIGH_VEGETATION, cell_size)
            })
            .map_err(fail(Stage::ExtractSurface))?;
        let height = estimate_height(&high_veg, &ground).map_err(fail(Stage::Estimate))?;

        self.publish(ctx, product, height)
    }

    /// Density = vegetation point count / all surface point count.
    pub fn density_branch(&self, ctx: &InvocationContext) -> BranchOutcome {
        let product = Product::Density;
        let fail = move |stage: Stage| move |error: ForestryError| BranchFailure {
            product,
            stage,
            error,
            raster: None,
            uploaded: None,
        };
        let cell_size = self.config.count_cell_size;

        let cloud = ctx
            .guard(Stage::Open, || self.engine.open(ctx.cloud_id()))
            .map_err(fail(Stage::Open))?;
        let veg = ctx
            .guard(Stage::RasterizeCount, || {
                rasterize_count(&self.engine, &cloud, ClassSet::ALL_VEGETATION, cell_size)
            })
            .map_err(fail(Stage::RasterizeCount))?;
        let total = ctx
            .guard(Stage::RasterizeCount, || {
                rasterize_count(&self.engine, &cloud, ClassSet::ALL_SURFACE, cell_size)
            })
            .map_err(fail(Stage::RasterizeCount))?;
        if total.points == 0 {
            return Err(fail(Stage::RasterizeCount)(ForestryError::EmptyClass {
                classes: ClassSet::ALL_SURFACE,
            }));
        }
        let density =
            estimate_density(&veg.raster, &total.raster).map_err(fail(Stage::Estimate))?;

        self.publish(ctx, product, density)
    }

    fn publish(
        &self,
        ctx: &InvocationContext,
        product: Product,
        raster: RasterSurface,
    ) -> BranchOutcome {
        let name = ctx.artifact_name(product.artifact_suffix());
        match self
            .publisher
            .publish(ctx, &raster, &name, self.config.meta(product))
        {
            Ok(artifact) => Ok(artifact),
            Err(PublishFailure {
                stage,
                error,
                uploaded,
            }) => Err(BranchFailure {
                product,
                stage,
                error,
                raster: Some(raster),
                uploaded,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{PipelineConfig, Product};

    #[test]
    fn test_default_meta() {
        let meta = Product::Height.default_meta();
        assert!(meta.title.contains("tree height"));
        assert_eq!(meta.tags, vec!["Tree Height", "LAS", "Lidar", "Forestry"]);
        let meta = Product::Density.default_meta();
        assert_eq!(meta.tags[0], "Biomass Density");
    }

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.surface_cell_size, 10.0);
        assert_eq!(config.count_cell_size, 10.0);
        assert!(config.parallel);
        assert_eq!(config.meta(Product::Density), &Product::Density.default_meta());
    }

    #[test]
    fn test_artifact_suffixes_differ() {
        assert_ne!(
            Product::Height.artifact_suffix(),
            Product::Density.artifact_suffix()
        );
    }
}
