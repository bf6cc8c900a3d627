//! Process-wide registry of named sources.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use lazy_static::lazy_static;
use tracing::{debug, info, warn};

use super::Source;
use crate::utils::{PipelineError, PipelineResult};

/// A registered source, shared between the registry and running jobs.
pub type SharedSource = Arc<dyn Source>;

lazy_static! {
    static ref SOURCES: SourceRegistry = SourceRegistry::new();
}

/// The registry used by [`crate::pipeline::parse`] and the `add_*` helpers.
pub fn global() -> &'static SourceRegistry {
    &SOURCES
}

/// Name → source map guarded by a read/write lock.
///
/// Lookups take the read side only for the duration of a hash lookup and an
/// `Arc` clone. Registration replaces any previous entry of the same name.
#[derive(Default)]
pub struct SourceRegistry {
    sources: RwLock<HashMap<String, SharedSource>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `source` under `name`, returning the source it replaced.
    pub fn register(&self, name: impl Into<String>, source: SharedSource) -> Option<SharedSource> {
        let name = name.into();
        let replaced = self
            .sources
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.clone(), source);
        if replaced.is_some() {
            info!("Source '{}' re-registered, previous instance replaced", name);
        } else {
            debug!("Source '{}' registered", name);
        }
        replaced
    }

    pub fn lookup(&self, name: &str) -> PipelineResult<SharedSource> {
        self.sources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| PipelineError::not_found(name))
    }

    pub fn remove(&self, name: &str) -> Option<SharedSource> {
        self.sources
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
    }

    /// Calls `visit` once per entry of a snapshot taken when the call starts.
    ///
    /// The lock is released before visiting, so `visit` may register or
    /// remove sources; such changes are not reflected in this enumeration.
    pub fn enumerate<F>(&self, mut visit: F)
    where
        F: FnMut(&str, &SharedSource),
    {
        for (name, source) in self.snapshot() {
            visit(&name, &source);
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.sources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sources.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Closes every registered source; failures are logged, not returned.
    pub async fn close_all(&self) {
        for (name, source) in self.snapshot() {
            match source.close().await {
                Ok(()) => debug!("Source '{}' closed", name),
                Err(e) => warn!("Closing source '{}' failed: {}", name, e),
            }
        }
    }

    fn snapshot(&self) -> Vec<(String, SharedSource)> {
        self.sources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, source)| (name.clone(), Arc::clone(source)))
            .collect()
    }
}
