//! catalog-core: shared data model for the log agent.
//! Source identities, fragments, batches, the thread-safe batch recorder,
//! and the sensitive-field redaction pass. No IO.

pub mod recorder;
pub mod redact;
pub mod types;

pub use recorder::{MultiStreamRecorder, StreamRecorder};
pub use redact::{redact_batch, redact_line};
pub use types::{Batch, Fragment, SourceKey};
