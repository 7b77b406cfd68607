//! Per-invocation naming and deadlines.

use crate::ForestryError;
use log::debug;
use std::{
    fmt,
    time::{Duration, Instant},
};
use uuid::Uuid;

/// Longest cloud identifier fragment carried into a namespace.
const MAX_STEM_LEN: usize = 32;

/// A step which talks to the geospatial engine or the hosting catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Open,
    ExtractSurface,
    RasterizeCount,
    Estimate,
    Stage,
    Upload,
    Resolve,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Open => "open",
            Self::ExtractSurface => "extract surface",
            Self::RasterizeCount => "rasterize count",
            Self::Estimate => "estimate",
            Self::Stage => "stage",
            Self::Upload => "upload",
            Self::Resolve => "resolve",
        };
        f.write_str(name)
    }
}

/// Everything one pipeline invocation derives its output names from.
///
/// Two invocations never share a namespace unless they were handed
/// the same invocation id, so their staged drafts and catalog entries
/// can't collide.
#[derive(Debug, Clone)]
pub struct InvocationContext {
    cloud_id: String,
    invocation: Uuid,
    namespace: String,
    started: Instant,
    timeout: Option<Duration>,
}

impl InvocationContext {
    pub fn new(cloud_id: &str, invocation: Uuid, timeout: Option<Duration>) -> Self {
        let namespace = namespace(cloud_id, invocation);
        Self {
            cloud_id: cloud_id.to_owned(),
            invocation,
            namespace,
            started: Instant::now(),
            timeout,
        }
    }

    /// Returns a context with a freshly generated invocation id.
    pub fn generate(cloud_id: &str, timeout: Option<Duration>) -> Self {
        Self::new(cloud_id, Uuid::new_v4(), timeout)
    }

    /// Returns this context with its deadline restarted from now. The
    /// namespace, and therefore every artifact name, is unchanged.
    #[must_use]
    pub fn renewed(&self) -> Self {
        Self {
            started: Instant::now(),
            ..self.clone()
        }
    }

    pub fn cloud_id(&self) -> &str {
        &self.cloud_id
    }

    pub fn invocation(&self) -> Uuid {
        self.invocation
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns the unique name for an output of this invocation.
    pub fn artifact_name(&self, product: &str) -> String {
        format!("{}_{product}", self.namespace)
    }

    /// Runs `f` for `stage`, failing with a timeout once this
    /// invocation's deadline has passed.
    ///
    /// The deadline is checked before `f` starts and again when it
    /// returns. A late result is discarded.
    pub fn guard<T, F>(&self, stage: Stage, f: F) -> Result<T, ForestryError>
    where
        F: FnOnce() -> Result<T, ForestryError>,
    {
        self.check_deadline(stage)?;
        let t0 = Instant::now();
        let result = f();
        debug!("{}: {stage} took {:?}", self.namespace, t0.elapsed());
        self.check_deadline(stage)?;
        result
    }

    /// Fails with a timeout for `stage` once the deadline has passed.
    pub fn check_deadline(&self, stage: Stage) -> Result<(), ForestryError> {
        match self.timeout {
            Some(timeout) if self.started.elapsed() > timeout => Err(ForestryError::Timeout {
                stage,
                elapsed: self.started.elapsed(),
            }),
            _ => Ok(()),
        }
    }
}

/// Derives `<stem>_<invocation as 32 hex digits>` from a cloud identifier.
fn namespace(cloud_id: &str, invocation: Uuid) -> String {
    let stem: String = cloud_id
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_STEM_LEN)
        .collect();
    let stem = stem.trim_matches('_');
    let stem = if stem.is_empty() { "cloud" } else { stem };
    format!("{stem}_{}", invocation.simple())
}
