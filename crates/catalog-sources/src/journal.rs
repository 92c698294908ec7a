//! Journal cursor stream: one systemd unit, resumed by cursor.

use std::sync::Arc;
use std::time::Duration;

use catalog_core::{Fragment, SourceKey, StreamRecorder};
use catalog_host::{CursorMarker, HostCommandRunner, JournalRead, read_journal};

use crate::stream::{LogStream, PollOutcome, StreamError, StreamEvent};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

pub struct JournalCursorStream<R> {
    runner: Arc<R>,
    unit: String,
    /// Position after the last consumed line; `None` until a baseline read
    /// succeeds or after a malformed marker.
    cursor: Option<String>,
    interval: Duration,
    recorder: StreamRecorder,
}

impl<R: HostCommandRunner + 'static> JournalCursorStream<R> {
    /// Stream for the unit named by `recorder`'s key.
    pub fn new(runner: Arc<R>, recorder: StreamRecorder) -> Self {
        Self {
            runner,
            unit: recorder.key().to_string(),
            cursor: None,
            interval: DEFAULT_INTERVAL,
            recorder,
        }
    }

    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }

    /// Fold one read result into the stored cursor and the recorder.
    fn apply_read(&mut self, read: Option<JournalRead>) -> PollOutcome {
        let Some(read) = read else {
            return PollOutcome::default().with_event(StreamEvent::UnitAbsent);
        };
        let mut outcome = PollOutcome::recorded(read.lines.len());
        match read.marker {
            CursorMarker::Found(cursor) => self.cursor = Some(cursor),
            CursorMarker::Missing(line) => {
                self.cursor = None;
                outcome.events.push(StreamEvent::CursorMissing { line });
            }
        }
        self.recorder.record(Fragment::new(read.lines));
        outcome
    }
}

impl<R: HostCommandRunner + 'static> LogStream for JournalCursorStream<R> {
    fn key(&self) -> &SourceKey {
        self.recorder.key()
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn poll(&mut self) -> Result<PollOutcome, StreamError> {
        let runner = Arc::clone(&self.runner);
        let unit = self.unit.clone();
        let cursor = self.cursor.clone();
        let read =
            tokio::task::spawn_blocking(move || read_journal(&*runner, &unit, cursor.as_deref()))
                .await??;
        Ok(self.apply_read(read))
    }
}
