//! Multi-stream driver: one tokio task per stream, polling forever.
//!
//! A failed or panicking poll is logged and the stream is polled again after
//! its normal interval. Nothing a stream does can stop another stream or the
//! driver.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use catalog_core::SourceKey;

use crate::stream::{LogStream, PollOutcome, StreamEvent};

/// Owns the polling tasks of a set of streams. Dropping it stops them.
#[derive(Debug, Default)]
pub struct MultiStreamCollector {
    tasks: Vec<JoinHandle<()>>,
}

impl MultiStreamCollector {
    /// Spawn a polling task per stream on the current tokio runtime. The
    /// first poll of each stream starts immediately.
    pub fn from_streams<S: LogStream>(streams: impl IntoIterator<Item = S>) -> Self {
        let tasks = streams
            .into_iter()
            .map(|stream| tokio::spawn(run_stream(stream)))
            .collect();
        Self { tasks }
    }

    /// A driver with no streams.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Number of polling tasks still alive.
    pub fn running(&self) -> usize {
        self.tasks.iter().filter(|t| !t.is_finished()).count()
    }
}

impl Drop for MultiStreamCollector {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

async fn run_stream<S: LogStream>(mut stream: S) {
    debug!(source = %stream.key(), "log stream started");
    loop {
        let delay = match AssertUnwindSafe(stream.poll()).catch_unwind().await {
            Ok(Ok(outcome)) => {
                report(stream.key(), &outcome);
                stream.interval() + outcome.cooldown.unwrap_or_default()
            }
            Ok(Err(e)) => {
                warn!(source = %stream.key(), error = %e, "log stream poll failed");
                stream.interval()
            }
            Err(panic) => {
                warn!(
                    source = %stream.key(),
                    panic = panic_message(panic.as_ref()),
                    "log stream poll panicked"
                );
                stream.interval()
            }
        };
        tokio::time::sleep(delay).await;
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}

fn report(key: &SourceKey, outcome: &PollOutcome) {
    if outcome.recorded_lines > 0 {
        debug!(source = %key, lines = outcome.recorded_lines, "recorded log lines");
    }
    for event in &outcome.events {
        match event {
            StreamEvent::Opened => info!(source = %key, "log stream opened"),
            StreamEvent::SourceNotFound { detail } => {
                info!(source = %key, %detail, "log source not found, will retry");
            }
            StreamEvent::OpenFailed { detail } => {
                warn!(source = %key, %detail, "failed to open log stream, will retry");
            }
            StreamEvent::ReadFailed { detail } => {
                warn!(source = %key, %detail, "log stream read failed, reopening");
            }
            StreamEvent::EndOfStream => info!(source = %key, "log stream ended, reopening"),
            StreamEvent::CursorMissing { line } => {
                warn!(source = %key, cursor_line = %line, "journal cursor missing, resetting");
            }
            StreamEvent::UnitAbsent => debug!(source = %key, "journal unit produced no output"),
            StreamEvent::Rotated => info!(source = %key, "log file rotated, reading new file"),
            StreamEvent::Truncated => info!(source = %key, "log file truncated, reading from start"),
        }
    }
}
