//! In-process catalog.

use super::{Catalog, CatalogId};
use crate::{ForestryError, ServiceManifest, StagedDraft};
use log::debug;
use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{Mutex, MutexGuard},
};
use uuid::Uuid;

/// URL scheme of items held by a [`MemCatalog`].
pub const MEM_URL_PREFIX: &str = "memory://catalog/";

/// An item held by a [`MemCatalog`].
#[derive(Debug, Clone)]
pub struct MemItem {
    pub name: String,
    pub manifest: ServiceManifest,
    pub draft_path: PathBuf,
    pub size: u64,
}

#[derive(Default)]
struct Inner {
    items: HashMap<CatalogId, MemItem>,
    names: HashMap<String, CatalogId>,
}

/// Catalog kept in memory. Names must be unique across all uploads.
#[derive(Default)]
pub struct MemCatalog {
    inner: Mutex<Inner>,
}

impl MemCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of uploaded items.
    pub fn len(&self) -> usize {
        self.lock().map_or(0, |inner| inner.items.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: &CatalogId) -> Option<MemItem> {
        self.lock().ok()?.items.get(id).cloned()
    }

    /// Returns every item name, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .lock()
            .map(|inner| inner.names.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, ForestryError> {
        self.inner.lock().map_err(|_| ForestryError::Publish {
            name: String::new(),
            reason: "catalog lock poisoned".to_string(),
        })
    }
}

impl Catalog for MemCatalog {
    fn upload(&self, draft: &StagedDraft, unique_name: &str) -> Result<CatalogId, ForestryError> {
        let size = std::fs::metadata(&draft.path)
            .map_err(|e| ForestryError::Publish {
                name: unique_name.to_owned(),
                reason: e.to_string(),
            })?
            .len();
        let mut inner = self.lock()?;
        if inner.names.contains_key(unique_name) {
            return Err(ForestryError::Publish {
                name: unique_name.to_owned(),
                reason: "name already exists in catalog".to_string(),
            });
        }
        let id = CatalogId::new(Uuid::new_v4().simple().to_string());
        inner.names.insert(unique_name.to_owned(), id.clone());
        inner.items.insert(
            id.clone(),
            MemItem {
                name: unique_name.to_owned(),
                manifest: draft.manifest.clone(),
                draft_path: draft.path.clone(),
                size,
            },
        );
        debug!("uploaded {unique_name} as {id}");
        Ok(id)
    }

    fn resolve(&self, id: &CatalogId) -> Result<String, ForestryError> {
        let inner = self.lock()?;
        if inner.items.contains_key(id) {
            Ok(format!("{MEM_URL_PREFIX}{id}"))
        } else {
            Err(ForestryError::Resolve {
                id: id.to_string(),
                reason: "no such item".to_string(),
            })
        }
    }
}
