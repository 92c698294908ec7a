//! catalog-log-agent: ships Flocker service logs from one host to the
//! catalog firehose.
//!
//! On the first tick the agent detects how the host runs Flocker (log files,
//! systemd journal, or containers), then tails every service's logs and
//! reports what accumulated on each tick.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use catalog_host::{DockerCli, HostExecutor};

mod agent;
mod backend;
mod cli;
mod collector;
mod detect;
mod reporter;

use backend::{DockerBackend, JournaldBackend, LogBackend, StreamSettings, SyslogBackend};
use collector::LogCollector;
use reporter::{CommonFields, HttpReporter, LOG_COLLECTOR_NAME, StdoutReporter};

/// How long shutdown waits for blocking log reads still in flight.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    let filter = std::env::var("CATALOG_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(run(args));
    close_runtime(runtime);
    result
}

/// Container and file reads run on the blocking pool; a read stuck on a
/// silent source is abandoned after [`SHUTDOWN_GRACE`].
fn close_runtime(runtime: tokio::runtime::Runtime) {
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
}

async fn run(args: cli::Cli) -> anyhow::Result<()> {
    tracing::info!(host_root = %args.host_root.display(), "log agent starting");

    let collector = LogCollector::new(default_backends(&args.host_root, &args.docker_host));
    let common = CommonFields::new(
        args.node_uuid.clone(),
        args.cluster_uuid.clone(),
        args.firehose_secret.clone(),
    );
    let every = Duration::from_secs(args.report_interval_secs.max(1));

    let report_loop = async {
        if args.stdout {
            agent::run_report_loop(collector, StdoutReporter, common, every).await;
        } else {
            let reporter = HttpReporter::new(
                &args.firehose_protocol,
                &args.firehose_hostname,
                args.firehose_port,
                LOG_COLLECTOR_NAME,
            )?;
            tracing::info!(location = reporter.location(), "reporting to firehose");
            agent::run_report_loop(collector, reporter, common, every).await;
        }
        anyhow::Ok(())
    };

    tokio::select! {
        () = shutdown_signal() => {}
        result = report_loop => result?,
    }

    Ok(())
}

/// Backends in priority order.
fn default_backends(host_root: &Path, docker_host: &str) -> Vec<Box<dyn LogBackend>> {
    let settings = StreamSettings::default();
    let executor = Arc::new(HostExecutor::new().with_chroot(host_root));
    let docker = Arc::new(DockerCli::new("docker").with_host(docker_host));
    vec![
        Box::new(SyslogBackend::flocker(host_root, settings.clone())),
        Box::new(JournaldBackend::new(executor, settings.clone())),
        Box::new(DockerBackend::new(docker, host_root, settings)),
    ]
}

/// Wait for ctrl-c or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => tracing::info!("received ctrl-c, shutting down"),
                    _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
                }
            }
            Err(e) => {
                tracing::warn!("failed to register SIGTERM handler: {e}");
                ctrl_c.await.ok();
                tracing::info!("received ctrl-c, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        tracing::info!("received ctrl-c, shutting down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn shutdown_does_not_wait_for_stuck_blocking_reads() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .expect("test");
        runtime.block_on(async {
            tokio::task::spawn_blocking(|| std::thread::sleep(Duration::from_secs(30)));
            tokio::task::yield_now().await;
        });

        let started = Instant::now();
        close_runtime(runtime);
        assert!(started.elapsed() < SHUTDOWN_GRACE + Duration::from_secs(3));
    }
}
