//! Definition/publisher cache: activation and memoization.
//!
//! Building a publisher graph is the expensive part of triggering a flow,
//! so the cache keeps one live [`FlowPublisher`] per stream. Repeated
//! lookups return the identical instance — in-flight filter state (held
//! batches, fan-in counters) survives between external triggers. A
//! definition is validated exactly once, on the load-miss path; a failing
//! definition is never cached or executed.
//!
//! The cache is a constructed component handed to its callers, with an
//! explicit [`clear`](FlowCache::clear) for test isolation and hot reload —
//! not a process-wide static.

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;

use miette::Diagnostic;
use thiserror::Error;

use crate::definition::FlowDefinition;
use crate::engine::{EngineDeps, FlowPublisher};
use crate::stores::{DefinitionRepo, StoreError};
use crate::validation::{ValidationError, validate};

/// Errors from the activation path.
#[derive(Debug, Error, Diagnostic)]
pub enum CacheError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Validation(#[from] ValidationError),
}

#[derive(Clone)]
struct CacheEntry {
    definition: Arc<FlowDefinition>,
    publisher: Arc<FlowPublisher>,
}

/// Memoizes activated definitions and their live publisher graphs, keyed by
/// both `stream_id` and `definition_id`.
pub struct FlowCache {
    repo: Arc<dyn DefinitionRepo>,
    deps: EngineDeps,
    by_stream: Mutex<FxHashMap<String, CacheEntry>>,
    stream_of_definition: Mutex<FxHashMap<String, String>>,
}

impl FlowCache {
    #[must_use]
    pub fn new(repo: Arc<dyn DefinitionRepo>, deps: EngineDeps) -> Self {
        Self {
            repo,
            deps,
            by_stream: Mutex::new(FxHashMap::default()),
            stream_of_definition: Mutex::new(FxHashMap::default()),
        }
    }

    /// Activated definition for a stream, loading and validating on miss.
    pub async fn get_definition_by_stream_id(
        &self,
        stream_id: &str,
    ) -> Result<Arc<FlowDefinition>, CacheError> {
        Ok(self.entry_by_stream(stream_id).await?.definition)
    }

    /// Activated definition by definition id, loading and validating on
    /// miss.
    pub async fn get_definition_by_id(
        &self,
        definition_id: &str,
    ) -> Result<Arc<FlowDefinition>, CacheError> {
        if let Some(stream_id) = self
            .stream_of_definition
            .lock()
            .get(definition_id)
            .cloned()
        {
            if let Some(entry) = self.by_stream.lock().get(&stream_id).cloned() {
                return Ok(entry.definition);
            }
        }

        let definition = self
            .repo
            .find(definition_id)
            .await?
            .ok_or_else(|| StoreError::DefinitionNotFound {
                key: definition_id.to_string(),
            })?;
        Ok(self.activate(definition)?.definition)
    }

    /// The live publisher for a stream — the identical in-memory instance
    /// on every call until [`clear`](Self::clear).
    pub async fn get_publisher(&self, stream_id: &str) -> Result<Arc<FlowPublisher>, CacheError> {
        Ok(self.entry_by_stream(stream_id).await?.publisher)
    }

    /// Drop every memoized definition and publisher.
    ///
    /// Held filter state dies with the publishers; the next trigger
    /// rebuilds from the definition repository.
    pub fn clear(&self) {
        self.by_stream.lock().clear();
        self.stream_of_definition.lock().clear();
    }

    /// Number of activated streams currently cached.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_stream.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_stream.lock().is_empty()
    }

    async fn entry_by_stream(&self, stream_id: &str) -> Result<CacheEntry, CacheError> {
        if let Some(entry) = self.by_stream.lock().get(stream_id).cloned() {
            return Ok(entry);
        }

        let definition = self
            .repo
            .find_by_stream_id(stream_id)
            .await?
            .ok_or_else(|| StoreError::DefinitionNotFound {
                key: stream_id.to_string(),
            })?;
        self.activate(definition)
    }

    /// Validate and memoize; the single activation choke point.
    fn activate(&self, definition: FlowDefinition) -> Result<CacheEntry, CacheError> {
        validate(&definition)?;

        let definition = Arc::new(definition);
        let publisher = Arc::new(FlowPublisher::new(
            Arc::clone(&definition),
            self.deps.clone(),
        ));
        let entry = CacheEntry {
            definition: Arc::clone(&definition),
            publisher,
        };

        // Two racing activations of the same stream keep the first one so
        // publisher identity stays stable.
        let stored = {
            let mut by_stream = self.by_stream.lock();
            by_stream
                .entry(definition.stream_id.clone())
                .or_insert_with(|| entry.clone())
                .clone()
        };
        self.stream_of_definition.lock().insert(
            stored.definition.definition_id.clone(),
            stored.definition.stream_id.clone(),
        );
        Ok(stored)
    }
}
