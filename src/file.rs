//! Per-file dispatch context.
//!
//! Opening and closing files belongs to the surrounding system; this
//! handle is the slice of per-file state the dispatch layer owns during
//! transfer calls: the backend handle (present only on I/O ranks), the
//! shared metadata catalog, the per-variable request trackers and the
//! pending-write byte accounting that drives the advisory flush.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::backend::{BackendKind, Dataset, RequestHandle};
use crate::catalog::{Catalog, VarId};
use crate::config::TrackerConfig;
use crate::error::Result;
use crate::request::VarTracker;

/// One open file's dispatch state on one rank.
pub struct FileHandle {
    kind: BackendKind,
    dataset: Option<Box<dyn Dataset>>,
    catalog: Arc<dyn Catalog>,
    trackers: HashMap<VarId, VarTracker>,
    pending_bytes: usize,
    tracker_cfg: TrackerConfig,
}

impl FileHandle {
    /// Wrap an opened file. `dataset` is `Some` on I/O ranks only.
    pub fn new(
        kind: BackendKind,
        dataset: Option<Box<dyn Dataset>>,
        catalog: Arc<dyn Catalog>,
    ) -> Self {
        Self {
            kind,
            dataset,
            catalog,
            trackers: HashMap::new(),
            pending_bytes: 0,
            tracker_cfg: TrackerConfig::default(),
        }
    }

    pub fn with_tracker_config(mut self, cfg: TrackerConfig) -> Self {
        self.tracker_cfg = cfg;
        self
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    pub fn catalog(&self) -> &dyn Catalog {
        self.catalog.as_ref()
    }

    pub fn dataset_mut(&mut self) -> Option<&mut (dyn Dataset + 'static)> {
        self.dataset.as_deref_mut()
    }

    /// Request tracker for a variable, if any requests were issued.
    pub fn tracker(&self, var: VarId) -> Option<&VarTracker> {
        self.trackers.get(&var)
    }

    /// Bytes accepted for deferred writes since the last flush.
    pub fn pending_bytes(&self) -> usize {
        self.pending_bytes
    }

    /// Record one deferred-write handle and trigger the advisory flush
    /// when accumulated bytes cross the watermark. A flush failure is
    /// logged and swallowed; it never invalidates an accepted request.
    pub(crate) fn track_request(
        &mut self,
        var: VarId,
        handle: RequestHandle,
        bytes: usize,
    ) -> Result<()> {
        let chunk = self.tracker_cfg.chunk;
        self.trackers.entry(var).or_default().append(handle, chunk)?;
        self.pending_bytes += bytes;
        if self.pending_bytes >= self.tracker_cfg.flush_watermark {
            debug!(
                pending = self.pending_bytes,
                watermark = self.tracker_cfg.flush_watermark,
                "pending writes crossed watermark, flushing"
            );
            if let Some(ds) = self.dataset.as_deref_mut() {
                if let Err(e) = ds.flush() {
                    warn!(error = %e, "advisory buffer flush failed");
                }
            }
            self.pending_bytes = 0;
        }
        Ok(())
    }

    /// Explicit synchronization point: flush the backend and reset every
    /// variable's outstanding-request list. Unlike the advisory flush, a
    /// failure here is surfaced.
    pub fn sync(&mut self) -> Result<()> {
        if let Some(ds) = self.dataset.as_deref_mut() {
            ds.flush().map_err(crate::error::Error::Backend)?;
        }
        for tracker in self.trackers.values_mut() {
            tracker.reset();
        }
        self.pending_bytes = 0;
        Ok(())
    }
}
