//! catalog-sources: log source streams and the multi-stream driver.
//!
//! Each stream owns the open/resume/recover lifecycle of one logical log
//! source and appends what it reads to a shared recorder. The driver polls
//! every stream on its own cycle and logs what each poll reports.

pub mod batching;
pub mod container;
pub mod driver;
pub mod file;
pub mod journal;
pub mod stream;

pub use batching::{BatchLimits, BatchStop, Clock, SystemClock};
pub use container::{ContainerLogStream, ContainerStreamState};
pub use driver::MultiStreamCollector;
pub use file::FileTailStream;
pub use journal::JournalCursorStream;
pub use stream::{LogStream, PollOutcome, StreamError, StreamEvent};
