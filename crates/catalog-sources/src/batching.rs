//! Bounded batching over a container log chunk source.
//!
//! One poll pulls chunks until one of these fires:
//!
//! - no timestamp recognized yet and `max_untimed_chunks` collected
//! - a timestamp was recognized and the poll has run for `max_poll_duration`
//! - no chunk arrived within `max_chunk_gap` (the source has caught up, or
//!   is quiet)
//! - the source ended or failed
//!
//! Waits are bounded, so chunks already read are handed back even when the
//! container goes silent. A chunk that arrives after the poll deadline is
//! not part of this batch; it is parked on the handle and opens the next one.

use std::sync::Arc;
use std::time::{Duration, Instant};

use catalog_host::{ChunkSource, ContainerError, NextChunk};
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Source of wall-clock instants. Injected so batching can be tested
/// without sleeping.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> Instant {
        (**self).now()
    }
}

/// Per-poll batching bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    pub max_untimed_chunks: usize,
    pub max_poll_duration: Duration,
    pub max_chunk_gap: Duration,
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            max_untimed_chunks: 25,
            max_poll_duration: Duration::from_secs(15),
            max_chunk_gap: Duration::from_secs(1),
        }
    }
}

/// An open chunk source plus a chunk read but not yet batched.
#[derive(Debug)]
pub struct StreamHandle<S> {
    source: S,
    pending: Option<Vec<u8>>,
}

impl<S> StreamHandle<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            pending: None,
        }
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }
}

/// Why a batch stopped.
#[derive(Debug)]
pub enum BatchStop {
    UntimedChunkCap,
    PollDeadline,
    CaughtUp,
    /// The iterator ended; the source stopped.
    Exhausted,
    Failed(ContainerError),
}

impl BatchStop {
    /// Whether the handle is still usable after this stop.
    pub fn keeps_handle(&self) -> bool {
        !matches!(self, Self::Exhausted | Self::Failed(_))
    }
}

#[derive(Debug)]
pub struct ChunkBatch {
    pub chunks: Vec<Vec<u8>>,
    /// First timestamp recognized in this batch, if any.
    pub first_timestamp: Option<DateTime<Utc>>,
    pub stop: BatchStop,
}

impl ChunkBatch {
    /// Chunks as text lines, trailing line terminators removed.
    pub fn lines(&self) -> Vec<String> {
        self.chunks.iter().map(|c| chunk_to_line(c)).collect()
    }
}

/// Pull one bounded batch from `handle`. Blocks for at most
/// `max_chunk_gap` per chunk and `max_poll_duration` overall once timed.
pub fn collect_batch<S, C>(handle: &mut StreamHandle<S>, limits: &BatchLimits, clock: &C) -> ChunkBatch
where
    S: ChunkSource,
    C: Clock + ?Sized,
{
    let started = clock.now();
    let mut chunks: Vec<Vec<u8>> = Vec::new();
    let mut first_timestamp = None;

    let finish = |chunks: Vec<Vec<u8>>, first_timestamp: Option<DateTime<Utc>>, stop: BatchStop| ChunkBatch {
        chunks,
        first_timestamp,
        stop,
    };

    loop {
        let mut wait = limits.max_chunk_gap;
        if first_timestamp.is_some() {
            let left = limits
                .max_poll_duration
                .saturating_sub(clock.now().saturating_duration_since(started));
            if left.is_zero() {
                return finish(chunks, first_timestamp, BatchStop::PollDeadline);
            }
            wait = wait.min(left);
        }

        let chunk = match handle.pending.take() {
            Some(chunk) => chunk,
            None => match handle.source.next_chunk(wait) {
                NextChunk::Chunk(chunk) => chunk,
                NextChunk::Idle => {
                    let past_deadline = first_timestamp.is_some()
                        && clock.now().saturating_duration_since(started) >= limits.max_poll_duration;
                    let stop = if past_deadline {
                        BatchStop::PollDeadline
                    } else {
                        BatchStop::CaughtUp
                    };
                    return finish(chunks, first_timestamp, stop);
                }
                NextChunk::Ended => return finish(chunks, first_timestamp, BatchStop::Exhausted),
                NextChunk::Failed(e) => return finish(chunks, first_timestamp, BatchStop::Failed(e)),
            },
        };

        if first_timestamp.is_some()
            && clock.now().saturating_duration_since(started) > limits.max_poll_duration
        {
            handle.pending = Some(chunk);
            return finish(chunks, first_timestamp, BatchStop::PollDeadline);
        }

        if first_timestamp.is_none() {
            first_timestamp = recognize_timestamp(&chunk);
        }
        chunks.push(chunk);

        if first_timestamp.is_none() && chunks.len() >= limits.max_untimed_chunks {
            return finish(chunks, first_timestamp, BatchStop::UntimedChunkCap);
        }
    }
}

/// Best-effort: a JSON record with a `timestamp` field holding either epoch
/// seconds or an RFC 3339 string. Anything else is simply unrecognized.
pub fn recognize_timestamp(chunk: &[u8]) -> Option<DateTime<Utc>> {
    let record: Value = serde_json::from_slice(chunk).ok()?;
    match record.get("timestamp")? {
        Value::Number(n) => {
            let secs = n.as_f64()?;
            #[expect(clippy::cast_possible_truncation)]
            let whole = secs.trunc() as i64;
            #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let nanos = (secs.fract().abs() * 1e9) as u32;
            DateTime::from_timestamp(whole, nanos)
        }
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        _ => None,
    }
}

fn chunk_to_line(chunk: &[u8]) -> String {
    String::from_utf8_lossy(chunk)
        .trim_end_matches(['\n', '\r'])
        .to_string()
}
