//! Report loop: collect on a fixed interval, ship non-empty batches.

use std::time::Duration;

use tokio::time::interval;

use crate::collector::LogCollector;
use crate::reporter::{CommonFields, ReportPayload, Reporter};

/// What one tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A batch with this many lines was reported.
    Reported(usize),
    Empty,
}

pub async fn run_report_loop<R: Reporter>(
    mut collector: LogCollector,
    reporter: R,
    common: CommonFields,
    every: Duration,
) {
    let mut ticker = interval(every);

    loop {
        ticker.tick().await;

        match report_tick(&mut collector, &reporter, &common).await {
            Ok(TickOutcome::Reported(lines)) => {
                tracing::debug!(backend = collector.backend_name(), lines, "reported log batch");
            }
            Ok(TickOutcome::Empty) => {}
            Err(e) => tracing::warn!("report tick failed: {e}"),
        }
    }
}

/// Drain once and report the batch unless it is empty. A failed report drops
/// the batch.
pub async fn report_tick<R: Reporter>(
    collector: &mut LogCollector,
    reporter: &R,
    common: &CommonFields,
) -> anyhow::Result<TickOutcome> {
    let batch = collector.collect().await?;
    if batch.is_empty() {
        return Ok(TickOutcome::Empty);
    }
    let lines = batch.line_count();
    reporter.report(&ReportPayload::new(common, &batch)).await?;
    Ok(TickOutcome::Reported(lines))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ActiveBackend, DetectError, LogBackend};
    use crate::reporter::ReportError;
    use catalog_core::{Fragment, MultiStreamRecorder};
    use catalog_sources::MultiStreamCollector;
    use std::sync::Mutex;

    /// Captures every payload as JSON; optionally fails instead.
    #[derive(Default)]
    struct CapturingReporter {
        sent: Mutex<Vec<serde_json::Value>>,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl Reporter for CapturingReporter {
        async fn report(&self, payload: &ReportPayload<'_>) -> Result<(), ReportError> {
            if self.fail {
                return Err(ReportError::Io(std::io::Error::other("connection refused")));
            }
            let value = serde_json::to_value(payload)?;
            self.sent.lock().expect("test").push(value);
            Ok(())
        }
    }

    /// Always applicable; the recorder is shared with the test so lines can
    /// be fed between ticks.
    struct SharedBackend(MultiStreamRecorder);

    #[async_trait::async_trait]
    impl LogBackend for SharedBackend {
        fn name(&self) -> &'static str {
            "shared"
        }

        async fn detect(&self) -> Result<bool, DetectError> {
            Ok(true)
        }

        fn start(&self) -> ActiveBackend {
            ActiveBackend::new("shared", self.0.clone(), MultiStreamCollector::empty())
        }
    }

    struct NothingApplies;

    #[async_trait::async_trait]
    impl LogBackend for NothingApplies {
        fn name(&self) -> &'static str {
            "none"
        }

        async fn detect(&self) -> Result<bool, DetectError> {
            Ok(false)
        }

        fn start(&self) -> ActiveBackend {
            ActiveBackend::new("none", MultiStreamRecorder::new(), MultiStreamCollector::empty())
        }
    }

    fn shared_collector() -> (LogCollector, MultiStreamRecorder) {
        let recorder = MultiStreamRecorder::new();
        let collector = LogCollector::new(vec![Box::new(SharedBackend(recorder.clone()))]);
        (collector, recorder)
    }

    #[tokio::test]
    async fn empty_batches_are_not_reported() {
        let (mut collector, _recorder) = shared_collector();
        let reporter = CapturingReporter::default();
        let common = CommonFields::new(Some("n".into()), None, Some("s".into()));

        let outcome = report_tick(&mut collector, &reporter, &common)
            .await
            .expect("test");
        assert_eq!(outcome, TickOutcome::Empty);
        assert!(reporter.sent.lock().expect("test").is_empty());
    }

    #[tokio::test]
    async fn lines_are_reported_once() {
        let (mut collector, recorder) = shared_collector();
        let reporter = CapturingReporter::default();
        let common = CommonFields::new(Some("n".into()), Some("c".into()), Some("s".into()));

        recorder
            .recorder_for("flocker-control")
            .record(Fragment::new(vec!["one".into(), "two".into()]));
        let outcome = report_tick(&mut collector, &reporter, &common)
            .await
            .expect("test");
        assert_eq!(outcome, TickOutcome::Reported(2));

        let outcome = report_tick(&mut collector, &reporter, &common)
            .await
            .expect("test");
        assert_eq!(outcome, TickOutcome::Empty);

        let sent = reporter.sent.lock().expect("test");
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0]["node-uuid"], "n");
        assert_eq!(sent[0]["result"]["flocker-control"][1], "two");
    }

    #[tokio::test]
    async fn failed_report_drops_the_batch() {
        let (mut collector, recorder) = shared_collector();
        let reporter = CapturingReporter {
            fail: true,
            ..Default::default()
        };
        let common = CommonFields::default();

        recorder.recorder_for("a").record(Fragment::line("lost"));
        assert!(report_tick(&mut collector, &reporter, &common).await.is_err());

        let ok = CapturingReporter::default();
        let outcome = report_tick(&mut collector, &ok, &common).await.expect("test");
        assert_eq!(outcome, TickOutcome::Empty);
    }

    #[tokio::test]
    async fn undetected_host_is_an_error_tick() {
        let mut collector = LogCollector::new(vec![Box::new(NothingApplies)]);
        let reporter = CapturingReporter::default();
        let err = report_tick(&mut collector, &reporter, &CommonFields::default())
            .await
            .expect_err("test");
        assert!(err.to_string().contains("no applicable log backend"));
    }
}
