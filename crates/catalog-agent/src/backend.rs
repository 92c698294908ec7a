//! Log backends: where a host keeps the Flocker service logs, and how to
//! start streaming them.
//!
//! A backend first answers "does this host log this way?" and, once chosen,
//! starts one stream per service. All streams of a backend share one
//! recorder; the returned [`ActiveBackend`] owns both the recorder and the
//! polling tasks.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use catalog_core::{Batch, MultiStreamRecorder};
use catalog_host::{ContainerLogApi, HostCommandRunner, HostError, unit_active};
use catalog_sources::{
    BatchLimits, ContainerLogStream, FileTailStream, JournalCursorStream, MultiStreamCollector,
};

/// Flocker services whose logs are collected, by unit and container name.
pub const FLOCKER_SERVICES: [&str; 3] = [
    "flocker-container-agent",
    "flocker-dataset-agent",
    "flocker-control",
];

/// Units probed to decide whether the host runs Flocker under systemd.
pub const JOURNAL_PROBE_UNITS: [&str; 2] = ["flocker-dataset-agent", "flocker-control"];

const FLOCKER_LOG_DIR: &str = "var/log/flocker";
const COREOS_MARKER: &str = "etc/coreos/update.conf";

#[derive(Debug, Error)]
pub enum DetectError {
    #[error(transparent)]
    Host(#[from] HostError),

    #[error("probe worker failed: {0}")]
    Worker(String),
}

impl From<tokio::task::JoinError> for DetectError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Worker(e.to_string())
    }
}

/// Poll cadence and limits applied to every stream a backend starts.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    pub file_interval: Duration,
    pub file_max_lines: usize,
    pub journal_interval: Duration,
    pub container_interval: Duration,
    pub container_open_cooldown: Duration,
    pub container_limits: BatchLimits,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            file_interval: catalog_sources::file::DEFAULT_INTERVAL,
            file_max_lines: catalog_sources::file::DEFAULT_MAX_LINES,
            journal_interval: catalog_sources::journal::DEFAULT_INTERVAL,
            container_interval: catalog_sources::container::DEFAULT_INTERVAL,
            container_open_cooldown: catalog_sources::container::DEFAULT_OPEN_COOLDOWN,
            container_limits: BatchLimits::default(),
        }
    }
}

/// A started backend. Dropping it stops its streams.
#[derive(Debug)]
pub struct ActiveBackend {
    name: &'static str,
    recorder: MultiStreamRecorder,
    driver: MultiStreamCollector,
}

impl ActiveBackend {
    pub fn new(name: &'static str, recorder: MultiStreamRecorder, driver: MultiStreamCollector) -> Self {
        Self {
            name,
            recorder,
            driver,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn stream_count(&self) -> usize {
        self.driver.len()
    }

    /// Everything recorded since the previous call.
    pub fn drain(&self) -> Batch {
        self.recorder.drain()
    }
}

#[async_trait]
pub trait LogBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this host's Flocker services log through this backend.
    async fn detect(&self) -> Result<bool, DetectError>;

    /// Start streaming. Must be called from within a tokio runtime.
    fn start(&self) -> ActiveBackend;
}

// ─── Plain log files ─────────────────────────────────────────────

/// Services writing to files under `/var/log/flocker` (e.g. upstart hosts).
#[derive(Debug, Clone)]
pub struct SyslogBackend {
    paths: Vec<PathBuf>,
    settings: StreamSettings,
}

impl SyslogBackend {
    pub fn new(paths: Vec<PathBuf>, settings: StreamSettings) -> Self {
        Self { paths, settings }
    }

    /// The Flocker log files under `host_root`.
    pub fn flocker(host_root: &Path, settings: StreamSettings) -> Self {
        let dir = host_root.join(FLOCKER_LOG_DIR);
        let paths = FLOCKER_SERVICES
            .iter()
            .map(|service| dir.join(format!("{service}.log")))
            .collect();
        Self::new(paths, settings)
    }
}

#[async_trait]
impl LogBackend for SyslogBackend {
    fn name(&self) -> &'static str {
        "files"
    }

    async fn detect(&self) -> Result<bool, DetectError> {
        Ok(self.paths.iter().any(|p| p.exists()))
    }

    fn start(&self) -> ActiveBackend {
        let recorder = MultiStreamRecorder::new();
        let mut streams = Vec::new();
        for path in &self.paths {
            let Some(key) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                continue;
            };
            match FileTailStream::open(path, recorder.recorder_for(key)) {
                Ok(stream) => streams.push(
                    stream
                        .with_interval(self.settings.file_interval)
                        .with_max_lines(self.settings.file_max_lines),
                ),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "cannot tail log file, skipping");
                }
            }
        }
        let driver = MultiStreamCollector::from_streams(streams);
        ActiveBackend::new(self.name(), recorder, driver)
    }
}

// ─── systemd journal ─────────────────────────────────────────────

/// Services running as systemd units, read through `journalctl`.
pub struct JournaldBackend<R> {
    runner: Arc<R>,
    units: Vec<String>,
    probe_units: Vec<String>,
    settings: StreamSettings,
}

impl<R: HostCommandRunner + 'static> JournaldBackend<R> {
    pub fn new(runner: Arc<R>, settings: StreamSettings) -> Self {
        Self {
            runner,
            units: FLOCKER_SERVICES.iter().map(|u| u.to_string()).collect(),
            probe_units: JOURNAL_PROBE_UNITS.iter().map(|u| u.to_string()).collect(),
            settings,
        }
    }
}

#[async_trait]
impl<R: HostCommandRunner + 'static> LogBackend for JournaldBackend<R> {
    fn name(&self) -> &'static str {
        "journald"
    }

    async fn detect(&self) -> Result<bool, DetectError> {
        let runner = Arc::clone(&self.runner);
        let units = self.probe_units.clone();
        let detected = tokio::task::spawn_blocking(move || -> Result<bool, HostError> {
            for unit in &units {
                if unit_active(&*runner, unit)? {
                    return Ok(true);
                }
            }
            Ok(false)
        })
        .await??;
        Ok(detected)
    }

    fn start(&self) -> ActiveBackend {
        let recorder = MultiStreamRecorder::new();
        let streams = self.units.iter().map(|unit| {
            JournalCursorStream::new(Arc::clone(&self.runner), recorder.recorder_for(unit.as_str()))
                .with_interval(self.settings.journal_interval)
        });
        let driver = MultiStreamCollector::from_streams(streams);
        ActiveBackend::new(self.name(), recorder, driver)
    }
}

// ─── Container runtime ───────────────────────────────────────────

/// Services running as containers (CoreOS hosts), read through the runtime's
/// log API.
pub struct DockerBackend<A> {
    api: Arc<A>,
    marker: PathBuf,
    containers: Vec<String>,
    settings: StreamSettings,
}

impl<A: ContainerLogApi + 'static> DockerBackend<A> {
    pub fn new(api: Arc<A>, host_root: &Path, settings: StreamSettings) -> Self {
        Self {
            api,
            marker: host_root.join(COREOS_MARKER),
            containers: FLOCKER_SERVICES.iter().map(|c| c.to_string()).collect(),
            settings,
        }
    }
}

#[async_trait]
impl<A: ContainerLogApi + 'static> LogBackend for DockerBackend<A> {
    fn name(&self) -> &'static str {
        "docker"
    }

    async fn detect(&self) -> Result<bool, DetectError> {
        Ok(self.marker.exists())
    }

    fn start(&self) -> ActiveBackend {
        let recorder = MultiStreamRecorder::new();
        let streams = self.containers.iter().map(|name| {
            ContainerLogStream::new(Arc::clone(&self.api), recorder.recorder_for(name.as_str()))
                .with_interval(self.settings.container_interval)
                .with_open_cooldown(self.settings.container_open_cooldown)
                .with_limits(self.settings.container_limits)
        });
        let driver = MultiStreamCollector::from_streams(streams);
        ActiveBackend::new(self.name(), recorder, driver)
    }
}
