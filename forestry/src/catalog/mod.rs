//! Hosting catalogs which accept staged drafts.
//!
//! A catalog hands back an opaque [`CatalogId`] for every upload, and
//! artifacts are resolved through that id only. Titles are not unique,
//! so catalogs expose no title search.

mod http;
mod mem;

pub use self::{
    http::HttpCatalog,
    mem::{MemCatalog, MemItem},
};
use crate::{ForestryError, StagedDraft};
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};

/// Identity of an uploaded item, as assigned by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CatalogId(String);

impl CatalogId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CatalogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub trait Catalog: Send + Sync {
    /// Pushes `draft` to the catalog under `unique_name`.
    ///
    /// Not idempotent: a retried upload may leave a partial entry
    /// behind, so callers own the retry policy.
    fn upload(&self, draft: &StagedDraft, unique_name: &str) -> Result<CatalogId, ForestryError>;

    /// Returns the URL of the item with identity `id`.
    fn resolve(&self, id: &CatalogId) -> Result<String, ForestryError>;
}

impl<T: Catalog + ?Sized> Catalog for Arc<T> {
    fn upload(&self, draft: &StagedDraft, unique_name: &str) -> Result<CatalogId, ForestryError> {
        (**self).upload(draft, unique_name)
    }

    fn resolve(&self, id: &CatalogId) -> Result<String, ForestryError> {
        (**self).resolve(id)
    }
}
