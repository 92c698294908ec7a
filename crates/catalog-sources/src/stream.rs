//! The source stream contract and the structured result of one poll.

use std::future::Future;
use std::time::Duration;

use catalog_core::SourceKey;
use catalog_host::HostError;
use thiserror::Error;

/// One logical log source, polled repeatedly by the driver.
///
/// Polls of a single stream never overlap: state mutated by poll N is
/// visible to poll N+1.
pub trait LogStream: Send + 'static {
    fn key(&self) -> &SourceKey;

    /// Delay between the end of one poll and the start of the next.
    fn interval(&self) -> Duration;

    /// Pull whatever is new, append it to the recorder, and report what
    /// happened.
    fn poll(&mut self) -> impl Future<Output = Result<PollOutcome, StreamError>> + Send;
}

/// Lifecycle events a poll reports back to the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A stream handle was (re)opened.
    Opened,
    /// The source does not exist right now. Expected while services restart.
    SourceNotFound { detail: String },
    /// Opening failed for any other reason.
    OpenFailed { detail: String },
    /// An open handle failed mid-read and was discarded.
    ReadFailed { detail: String },
    /// The source's stream ended (its process stopped); the handle was
    /// discarded and will be reopened.
    EndOfStream,
    /// A journal read did not end with a cursor marker; the cursor was reset.
    CursorMissing { line: String },
    /// A journal read returned nothing at all (unit absent).
    UnitAbsent,
    /// The file at the watched path was replaced; reading restarted at its
    /// beginning.
    Rotated,
    /// The watched file shrank below the read position; reading restarted
    /// at its beginning.
    Truncated,
}

/// Structured result of one successful poll.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollOutcome {
    /// Lines appended to the recorder by this poll.
    pub recorded_lines: usize,
    pub events: Vec<StreamEvent>,
    /// Extra delay requested before the next poll.
    pub cooldown: Option<Duration>,
}

impl PollOutcome {
    pub fn recorded(lines: usize) -> Self {
        Self {
            recorded_lines: lines,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_event(mut self, event: StreamEvent) -> Self {
        self.events.push(event);
        self
    }

    #[must_use]
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = Some(cooldown);
        self
    }
}

/// Poll failures not absorbed into a [`StreamEvent`].
#[derive(Debug, Error)]
pub enum StreamError {
    #[error(transparent)]
    Host(#[from] HostError),

    #[error("log file io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("blocking worker failed: {0}")]
    Worker(String),
}

impl From<tokio::task::JoinError> for StreamError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Worker(e.to_string())
    }
}
