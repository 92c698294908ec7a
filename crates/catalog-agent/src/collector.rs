//! Collector facade: detect the backend once, then hand out redacted
//! batches.

use thiserror::Error;
use tracing::{info, warn};

use catalog_core::{Batch, redact_batch};

use crate::backend::{ActiveBackend, LogBackend};
use crate::detect::{ProbeResult, select_backend};

#[derive(Debug, Error)]
pub enum CollectError {
    #[error("no applicable log backend detected")]
    NoApplicableBackend,
}

pub struct LogCollector {
    /// In priority order.
    backends: Vec<Box<dyn LogBackend>>,
    active: Option<ActiveBackend>,
}

impl LogCollector {
    pub fn new(backends: Vec<Box<dyn LogBackend>>) -> Self {
        Self {
            backends,
            active: None,
        }
    }

    /// Name of the started backend, once detection has succeeded.
    pub fn backend_name(&self) -> Option<&'static str> {
        self.active.as_ref().map(ActiveBackend::name)
    }

    /// Everything recorded since the previous call, with sensitive fields
    /// redacted.
    ///
    /// The first call detects and starts a backend. Until detection succeeds
    /// every call retries it; after that the choice is fixed for the life of
    /// the collector.
    pub async fn collect(&mut self) -> Result<Batch, CollectError> {
        let active = match self.active.take() {
            Some(active) => active,
            None => self.detect_and_start().await?,
        };
        let active = self.active.insert(active);
        Ok(redact_batch(active.drain()))
    }

    async fn detect_and_start(&self) -> Result<ActiveBackend, CollectError> {
        let mut probes = Vec::with_capacity(self.backends.len());
        for backend in &self.backends {
            let result = match backend.detect().await {
                Ok(true) => ProbeResult::Applicable,
                Ok(false) => ProbeResult::NotApplicable,
                Err(e) => {
                    warn!(backend = backend.name(), error = %e, "backend probe failed");
                    ProbeResult::Failed(e.to_string())
                }
            };
            probes.push((backend.name(), result));
        }

        let Some(selection) = select_backend(&probes) else {
            return Err(CollectError::NoApplicableBackend);
        };
        if selection.is_ambiguous() {
            warn!(
                chosen = selection.name,
                candidates = ?selection.applicable,
                "multiple log backends applicable, using the first"
            );
        }

        let active = self.backends[selection.index].start();
        info!(
            backend = active.name(),
            streams = active.stream_count(),
            "log backend started"
        );
        Ok(active)
    }
}
