//! Thread-safe fragment accumulation with atomic drain.
//!
//! Every source stream appends through its own [`StreamRecorder`]; the
//! collector drains the shared [`MultiStreamRecorder`] once per report cycle.

use std::mem;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::types::{Batch, Fragment, SourceKey};

/// Shared batch accumulator for a set of source streams.
///
/// Cheap to clone; all clones refer to the same batch.
#[derive(Debug, Clone, Default)]
pub struct MultiStreamRecorder {
    batch: Arc<Mutex<Batch>>,
}

impl MultiStreamRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append handle bound to `key`.
    pub fn recorder_for(&self, key: impl Into<SourceKey>) -> StreamRecorder {
        StreamRecorder {
            key: key.into(),
            batch: Arc::clone(&self.batch),
        }
    }

    /// Take everything accumulated so far and reset to empty.
    ///
    /// The returned batch is detached: appends made after this call land in
    /// the next drain.
    pub fn drain(&self) -> Batch {
        mem::take(&mut *self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, Batch> {
        lock_batch(&self.batch)
    }
}

/// Append handle for a single source, produced by
/// [`MultiStreamRecorder::recorder_for`].
#[derive(Debug, Clone)]
pub struct StreamRecorder {
    key: SourceKey,
    batch: Arc<Mutex<Batch>>,
}

impl StreamRecorder {
    pub fn key(&self) -> &SourceKey {
        &self.key
    }

    /// Append one fragment. Empty fragments are dropped.
    pub fn record(&self, fragment: Fragment) {
        if fragment.is_empty() {
            return;
        }
        lock_batch(&self.batch).push(self.key.clone(), fragment);
    }
}

// A poisoned lock only means another appender panicked mid-push; the batch
// map itself is still structurally valid.
fn lock_batch(batch: &Mutex<Batch>) -> MutexGuard<'_, Batch> {
    batch.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
