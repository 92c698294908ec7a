//! Container log stream: one container's live logs through the runtime API.
//!
//! ```text
//!            open ok                 batch kept handle
//! Closed ──► Opening ──► Streaming ◄──────────────────┐
//!   ▲           │            │ └──────────────────────┘
//!   │  not found / failed    │ end of stream / read error
//!   └───────────┴────────────┘
//! ```
//!
//! The runtime API blocks, so both opening and batching run on the blocking
//! pool. The handle is moved into the worker and handed back with the batch;
//! the stream is its only owner. Batching waits are bounded, so a worker never
//! outlives a poll by more than the batch limits.

use std::mem;
use std::sync::Arc;
use std::time::Duration;

use catalog_core::{Fragment, SourceKey, StreamRecorder};
use catalog_host::ContainerLogApi;

use crate::batching::{BatchLimits, BatchStop, Clock, StreamHandle, SystemClock, collect_batch};
use crate::stream::{LogStream, PollOutcome, StreamError, StreamEvent};

pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(250);

/// Extra delay after a failed open before trying again.
pub const DEFAULT_OPEN_COOLDOWN: Duration = Duration::from_secs(60);

/// Observable lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerStreamState {
    Closed,
    Opening,
    Streaming,
}

enum Slot<S> {
    Closed,
    /// The handle is out on a blocking worker (or being opened).
    Opening,
    Streaming(StreamHandle<S>),
}

pub struct ContainerLogStream<A: ContainerLogApi> {
    api: Arc<A>,
    container: String,
    slot: Slot<A::Stream>,
    limits: BatchLimits,
    clock: Arc<dyn Clock>,
    interval: Duration,
    open_cooldown: Duration,
    recorder: StreamRecorder,
}

impl<A: ContainerLogApi + 'static> ContainerLogStream<A> {
    /// Stream for the container named by `recorder`'s key. Nothing is
    /// opened until the first poll.
    pub fn new(api: Arc<A>, recorder: StreamRecorder) -> Self {
        Self {
            api,
            container: recorder.key().to_string(),
            slot: Slot::Closed,
            limits: BatchLimits::default(),
            clock: Arc::new(SystemClock),
            interval: DEFAULT_INTERVAL,
            open_cooldown: DEFAULT_OPEN_COOLDOWN,
            recorder,
        }
    }

    #[must_use]
    pub fn with_limits(mut self, limits: BatchLimits) -> Self {
        self.limits = limits;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    #[must_use]
    pub fn with_open_cooldown(mut self, cooldown: Duration) -> Self {
        self.open_cooldown = cooldown;
        self
    }

    pub fn state(&self) -> ContainerStreamState {
        match self.slot {
            Slot::Closed => ContainerStreamState::Closed,
            Slot::Opening => ContainerStreamState::Opening,
            Slot::Streaming(_) => ContainerStreamState::Streaming,
        }
    }

    async fn open(&mut self) -> Result<Result<StreamHandle<A::Stream>, StreamEvent>, StreamError> {
        self.slot = Slot::Opening;
        let api = Arc::clone(&self.api);
        let container = self.container.clone();
        let opened = tokio::task::spawn_blocking(move || api.open_logs(&container)).await;
        match opened {
            Ok(Ok(source)) => Ok(Ok(StreamHandle::new(source))),
            Ok(Err(e)) => {
                self.slot = Slot::Closed;
                let detail = e.to_string();
                Ok(Err(if e.is_not_found() {
                    StreamEvent::SourceNotFound { detail }
                } else {
                    StreamEvent::OpenFailed { detail }
                }))
            }
            Err(join) => {
                self.slot = Slot::Closed;
                Err(join.into())
            }
        }
    }
}

impl<A: ContainerLogApi + 'static> LogStream for ContainerLogStream<A> {
    fn key(&self) -> &SourceKey {
        self.recorder.key()
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn poll(&mut self) -> Result<PollOutcome, StreamError> {
        let mut events = Vec::new();
        let mut handle = match mem::replace(&mut self.slot, Slot::Opening) {
            Slot::Streaming(handle) => handle,
            Slot::Closed | Slot::Opening => match self.open().await? {
                Ok(handle) => {
                    events.push(StreamEvent::Opened);
                    handle
                }
                Err(event) => {
                    return Ok(PollOutcome::default()
                        .with_event(event)
                        .with_cooldown(self.open_cooldown));
                }
            },
        };

        let limits = self.limits;
        let clock = Arc::clone(&self.clock);
        let batched = tokio::task::spawn_blocking(move || {
            let batch = collect_batch(&mut handle, &limits, &*clock);
            (handle, batch)
        })
        .await;
        let (handle, batch) = match batched {
            Ok(done) => done,
            Err(join) => {
                // The handle went down with the worker.
                self.slot = Slot::Closed;
                return Err(join.into());
            }
        };

        let lines = batch.lines();
        let mut outcome = PollOutcome::recorded(lines.len());
        self.recorder.record(Fragment::new(lines));

        match batch.stop {
            BatchStop::Exhausted => {
                self.slot = Slot::Closed;
                events.push(StreamEvent::EndOfStream);
            }
            BatchStop::Failed(e) => {
                self.slot = Slot::Closed;
                events.push(StreamEvent::ReadFailed {
                    detail: e.to_string(),
                });
            }
            BatchStop::UntimedChunkCap | BatchStop::PollDeadline | BatchStop::CaughtUp => {
                self.slot = Slot::Streaming(handle);
            }
        }
        outcome.events = events;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batching::test_support::{FakeClock, ScriptedChunks, timed, untimed};
    use catalog_core::MultiStreamRecorder;
    use catalog_host::ContainerError;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Fake runtime: each `open_logs` call takes the next scripted result.
    struct FakeRuntime {
        opens: Mutex<VecDeque<Result<ScriptedChunks, ContainerError>>>,
        open_calls: Mutex<usize>,
    }

    impl FakeRuntime {
        fn new() -> Self {
            Self {
                opens: Mutex::new(VecDeque::new()),
                open_calls: Mutex::new(0),
            }
        }

        fn then(self, result: Result<ScriptedChunks, ContainerError>) -> Self {
            self.opens.lock().expect("test").push_back(result);
            self
        }

        fn open_calls(&self) -> usize {
            *self.open_calls.lock().expect("test")
        }
    }

    impl ContainerLogApi for FakeRuntime {
        type Stream = ScriptedChunks;

        fn open_logs(&self, container: &str) -> Result<ScriptedChunks, ContainerError> {
            *self.open_calls.lock().expect("test") += 1;
            self.opens
                .lock()
                .expect("test")
                .pop_front()
                .unwrap_or_else(|| Err(ContainerError::NotFound(container.to_string())))
        }
    }

    fn stream(
        runtime: FakeRuntime,
        clock: &Arc<FakeClock>,
    ) -> (ContainerLogStream<FakeRuntime>, Arc<FakeRuntime>, MultiStreamRecorder) {
        let runtime = Arc::new(runtime);
        let recorder = MultiStreamRecorder::new();
        let stream = ContainerLogStream::new(
            Arc::clone(&runtime),
            recorder.recorder_for("flocker-dataset-agent"),
        )
        .with_clock(Arc::clone(clock) as Arc<dyn Clock>);
        (stream, runtime, recorder)
    }

    #[tokio::test]
    async fn not_found_stays_closed_with_cooldown() {
        let clock = FakeClock::new();
        let runtime = FakeRuntime::new().then(Err(ContainerError::NotFound(
            "flocker-dataset-agent".to_string(),
        )));
        let (mut stream, _, recorder) = stream(runtime, &clock);

        let outcome = stream.poll().await.expect("test");
        assert_eq!(stream.state(), ContainerStreamState::Closed);
        assert_eq!(outcome.cooldown, Some(DEFAULT_OPEN_COOLDOWN));
        assert!(matches!(
            outcome.events.as_slice(),
            [StreamEvent::SourceNotFound { .. }]
        ));
        assert!(recorder.drain().is_empty());
    }

    #[tokio::test]
    async fn other_open_failure_is_distinct() {
        let clock = FakeClock::new();
        let runtime =
            FakeRuntime::new().then(Err(ContainerError::Api("permission denied".to_string())));
        let (mut stream, _, _) = stream(runtime, &clock);

        let outcome = stream.poll().await.expect("test");
        assert_eq!(stream.state(), ContainerStreamState::Closed);
        assert_eq!(outcome.cooldown, Some(DEFAULT_OPEN_COOLDOWN));
        match outcome.events.as_slice() {
            [StreamEvent::OpenFailed { detail }] => assert!(detail.contains("permission denied")),
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[tokio::test]
    async fn handle_is_kept_across_polls() {
        let clock = FakeClock::new();
        let chunks = ScriptedChunks::new(&clock)
            .chunks(30, 10, untimed)
            .chunk(2_000, "after gap");
        let runtime = FakeRuntime::new().then(Ok(chunks));
        let (mut stream, runtime, recorder) = stream(runtime, &clock);

        let first = stream.poll().await.expect("test");
        assert_eq!(first.recorded_lines, 25);
        assert_eq!(first.events, [StreamEvent::Opened]);
        assert_eq!(stream.state(), ContainerStreamState::Streaming);

        let second = stream.poll().await.expect("test");
        assert_eq!(second.recorded_lines, 5);
        assert!(second.events.is_empty());
        assert_eq!(stream.state(), ContainerStreamState::Streaming);
        assert_eq!(runtime.open_calls(), 1);

        let batch = recorder.drain();
        let fragments = batch
            .fragments(&"flocker-dataset-agent".into())
            .expect("test");
        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0].lines()[0], "plain line 0");
        assert_eq!(fragments[1].lines()[0], "plain line 25");
    }

    #[tokio::test]
    async fn end_of_stream_closes_and_reopens() {
        let clock = FakeClock::new();
        let before_restart = ScriptedChunks::new(&clock).chunks(3, 10, timed);
        let after_restart = ScriptedChunks::new(&clock).chunk(10, "restarted");
        let runtime = FakeRuntime::new()
            .then(Ok(before_restart))
            .then(Ok(after_restart));
        let (mut stream, runtime, recorder) = stream(runtime, &clock);

        let first = stream.poll().await.expect("test");
        assert_eq!(first.recorded_lines, 3);
        assert_eq!(first.events, [StreamEvent::Opened, StreamEvent::EndOfStream]);
        assert_eq!(stream.state(), ContainerStreamState::Closed);
        assert_eq!(first.cooldown, None);

        let second = stream.poll().await.expect("test");
        assert_eq!(runtime.open_calls(), 2);
        assert_eq!(second.recorded_lines, 1);

        let lines = recorder.drain().into_lines();
        let lines = &lines[&SourceKey::from("flocker-dataset-agent")];
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[3], "restarted");
    }

    #[tokio::test]
    async fn read_failure_closes_stream() {
        let clock = FakeClock::new();
        let chunks = ScriptedChunks::new(&clock)
            .chunk(10, "one")
            .error(10, ContainerError::Api("unexpected EOF".to_string()));
        let runtime = FakeRuntime::new().then(Ok(chunks));
        let (mut stream, _, _) = stream(runtime, &clock);

        let outcome = stream.poll().await.expect("test");
        assert_eq!(outcome.recorded_lines, 1);
        assert_eq!(stream.state(), ContainerStreamState::Closed);
        assert!(matches!(
            outcome.events.as_slice(),
            [StreamEvent::Opened, StreamEvent::ReadFailed { .. }]
        ));
    }

    #[tokio::test]
    async fn timed_batch_respects_poll_deadline() {
        let clock = FakeClock::new();
        let chunks = ScriptedChunks::new(&clock).chunks(40, 500, timed);
        let runtime = FakeRuntime::new().then(Ok(chunks));
        let (mut stream, _, _) = stream(runtime, &clock);

        let outcome = stream.poll().await.expect("test");
        assert_eq!(outcome.recorded_lines, 30);
        assert_eq!(stream.state(), ContainerStreamState::Streaming);
    }

    #[tokio::test]
    async fn quiet_container_still_returns_lines_already_read() {
        use catalog_host::ChannelChunks;
        use std::time::Instant;

        /// Logs three lines, then stays silent with the stream open.
        struct GoesQuiet;

        impl ContainerLogApi for GoesQuiet {
            type Stream = ChannelChunks;

            fn open_logs(&self, container: &str) -> Result<ChannelChunks, ContainerError> {
                let lines = (1..=4).map(|n| {
                    if n == 4 {
                        std::thread::sleep(Duration::from_secs(4));
                    }
                    Ok(format!("line {n}\n").into_bytes())
                });
                ChannelChunks::spawn(container, lines)
            }
        }

        let recorder = MultiStreamRecorder::new();
        let mut stream = ContainerLogStream::new(
            Arc::new(GoesQuiet),
            recorder.recorder_for("flocker-control"),
        )
        .with_limits(BatchLimits {
            max_chunk_gap: Duration::from_millis(200),
            ..BatchLimits::default()
        });

        let started = Instant::now();
        let outcome = stream.poll().await.expect("test");
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(outcome.recorded_lines, 3);
        assert_eq!(stream.state(), ContainerStreamState::Streaming);
        assert_eq!(recorder.drain().line_count(), 3);
    }
}
