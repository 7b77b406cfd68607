//! Stage, upload, and resolve a raster as a hosted service artifact.

use crate::{Catalog, CatalogId, ForestryError, InvocationContext, Stage, StagedDraft, Stager};
use log::{debug, info};
use std::time::Instant;
use raster::RasterSurface;
use serde::Serialize;

/// Descriptive fields attached to a published artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactMeta {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
}

/// A raster published to the hosting catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceArtifact {
    pub name: String,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub content_type: String,
    pub id: CatalogId,
    pub url: String,
}

/// A draft the catalog accepted but which isn't resolved yet.
#[derive(Debug, Clone)]
pub struct UploadedDraft {
    pub draft: StagedDraft,
    pub id: CatalogId,
}

/// The sub-step of [`ArtifactPublisher::publish`] which failed.
#[derive(Debug)]
pub struct PublishFailure {
    pub stage: Stage,
    pub error: ForestryError,

    /// Set once the catalog holds the item. Finish with
    /// [`ArtifactPublisher::resolve_uploaded`] instead of uploading
    /// again.
    pub uploaded: Option<UploadedDraft>,
}

pub struct ArtifactPublisher<C> {
    stager: Stager,
    catalog: C,
}

impl<C: Catalog> ArtifactPublisher<C> {
    pub fn new(stager: Stager, catalog: C) -> Self {
        Self { stager, catalog }
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    pub fn stager(&self) -> &Stager {
        &self.stager
    }

    /// Publishes `raster` as `name`.
    ///
    /// The URL is resolved from the identity the upload returned. No
    /// step is retried here; the caller still owns `raster` and may
    /// publish it again.
    ///
    /// An upload which succeeds is never discarded, even when it ends
    /// after the deadline. The deadline then fails the resolve step and
    /// the failure carries the uploaded identity.
    pub fn publish(
        &self,
        ctx: &InvocationContext,
        raster: &RasterSurface,
        name: &str,
        meta: &ArtifactMeta,
    ) -> Result<ServiceArtifact, PublishFailure> {
        let failed = |stage: Stage| {
            move |error: ForestryError| PublishFailure {
                stage,
                error,
                uploaded: None,
            }
        };

        let draft = ctx
            .guard(Stage::Stage, || self.stager.stage(ctx, raster, name, meta))
            .map_err(failed(Stage::Stage))?;
        ctx.check_deadline(Stage::Upload)
            .map_err(failed(Stage::Upload))?;
        let t0 = Instant::now();
        let id = self
            .catalog
            .upload(&draft, name)
            .map_err(failed(Stage::Upload))?;
        debug!("{}: upload took {:?}", ctx.namespace(), t0.elapsed());

        self.resolve_uploaded(ctx, UploadedDraft { draft, id })
    }

    /// Resolves the URL of an already uploaded draft.
    pub fn resolve_uploaded(
        &self,
        ctx: &InvocationContext,
        uploaded: UploadedDraft,
    ) -> Result<ServiceArtifact, PublishFailure> {
        match ctx.guard(Stage::Resolve, || self.catalog.resolve(&uploaded.id)) {
            Ok(url) => {
                let UploadedDraft { draft, id } = uploaded;
                let manifest = draft.manifest;
                info!("published {} at {url}", manifest.name);
                Ok(ServiceArtifact {
                    name: manifest.name,
                    title: manifest.title,
                    description: manifest.description,
                    tags: manifest.tags,
                    content_type: manifest.content_type,
                    id,
                    url,
                })
            }
            Err(error) => Err(PublishFailure {
                stage: Stage::Resolve,
                error,
                uploaded: Some(uploaded),
            }),
        }
    }
}
