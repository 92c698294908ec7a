//! Waiting for container log output with a deadline.
//!
//! The runtime's log iterators block until the container writes something.
//! [`ChannelChunks`] moves such an iterator onto its own reader thread and
//! forwards every chunk over a bounded channel, so a caller can wait for the
//! next chunk for a limited time and hand back what it already has.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use crate::error::ContainerError;

/// Chunks buffered between the reader thread and the consumer.
pub const CHANNEL_DEPTH: usize = 1024;

/// Result of waiting for one chunk.
#[derive(Debug)]
pub enum NextChunk {
    Chunk(Vec<u8>),
    /// Nothing arrived within the wait.
    Idle,
    /// The source stopped; no more chunks will arrive.
    Ended,
    Failed(ContainerError),
}

/// A source of raw log chunks that can be waited on with a timeout.
pub trait ChunkSource: Send + 'static {
    /// Wait at most `wait` for the next chunk.
    fn next_chunk(&mut self, wait: Duration) -> NextChunk;
}

/// Chunks read by a dedicated thread from a blocking iterator.
///
/// Dropping this value stops the reader at its next chunk; the iterator is
/// dropped on the reader thread.
#[derive(Debug)]
pub struct ChannelChunks {
    rx: Receiver<Result<Vec<u8>, ContainerError>>,
}

impl ChannelChunks {
    /// Start a reader thread named after `source`.
    pub fn spawn<I>(source: &str, iter: I) -> Result<Self, ContainerError>
    where
        I: Iterator<Item = Result<Vec<u8>, ContainerError>> + Send + 'static,
    {
        let (tx, rx) = mpsc::sync_channel(CHANNEL_DEPTH);
        thread::Builder::new()
            .name(format!("logs-{source}"))
            .spawn(move || {
                for item in iter {
                    let failed = item.is_err();
                    if tx.send(item).is_err() || failed {
                        break;
                    }
                }
            })?;
        Ok(Self { rx })
    }
}

impl ChunkSource for ChannelChunks {
    fn next_chunk(&mut self, wait: Duration) -> NextChunk {
        match self.rx.recv_timeout(wait) {
            Ok(Ok(chunk)) => NextChunk::Chunk(chunk),
            Ok(Err(e)) => NextChunk::Failed(e),
            Err(RecvTimeoutError::Timeout) => NextChunk::Idle,
            Err(RecvTimeoutError::Disconnected) => NextChunk::Ended,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    /// Yields `lines` chunks, then blocks for `stall` before ending.
    struct Stalling {
        lines: usize,
        sent: usize,
        stall: Duration,
    }

    impl Iterator for Stalling {
        type Item = Result<Vec<u8>, ContainerError>;

        fn next(&mut self) -> Option<Self::Item> {
            if self.sent < self.lines {
                self.sent += 1;
                return Some(Ok(format!("line {}\n", self.sent).into_bytes()));
            }
            thread::sleep(self.stall);
            None
        }
    }

    #[test]
    fn waiting_on_a_quiet_source_returns_idle() {
        let iter = Stalling {
            lines: 3,
            sent: 0,
            stall: Duration::from_secs(2),
        };
        let mut chunks = ChannelChunks::spawn("quiet", iter).expect("test");
        let wait = Duration::from_millis(100);

        for n in 1..=3 {
            match chunks.next_chunk(wait) {
                NextChunk::Chunk(c) => assert_eq!(c, format!("line {n}\n").into_bytes()),
                other => panic!("unexpected {other:?}"),
            }
        }
        let started = Instant::now();
        assert!(matches!(chunks.next_chunk(wait), NextChunk::Idle));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn ended_iterator_disconnects() {
        let iter = vec![Ok(b"only\n".to_vec())].into_iter();
        let mut chunks = ChannelChunks::spawn("short", iter).expect("test");
        let wait = Duration::from_secs(1);

        assert!(matches!(chunks.next_chunk(wait), NextChunk::Chunk(_)));
        assert!(matches!(chunks.next_chunk(wait), NextChunk::Ended));
    }

    #[test]
    fn error_is_delivered_then_ends() {
        let iter = vec![
            Err(ContainerError::Api("connection reset".to_string())),
            Ok(b"never\n".to_vec()),
        ]
        .into_iter();
        let mut chunks = ChannelChunks::spawn("broken", iter).expect("test");
        let wait = Duration::from_secs(1);

        assert!(matches!(chunks.next_chunk(wait), NextChunk::Failed(_)));
        assert!(matches!(chunks.next_chunk(wait), NextChunk::Ended));
    }
}
