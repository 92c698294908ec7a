//! Container runtime log API.
//!
//! [`ContainerLogApi::open_logs`] returns a [`ChunkSource`] over a
//! container's live log output. Each chunk is raw output as delivered by the
//! runtime. The source ends when the container stops.

use std::io::{BufRead, BufReader};
use std::process::{Child, ChildStdout, Command, Stdio};

use crate::chunks::{ChannelChunks, ChunkSource};
use crate::error::ContainerError;

/// Trait for opening container log streams. Enables mock injection for
/// testing.
///
/// Implementations block; call them from a blocking worker thread.
pub trait ContainerLogApi: Send + Sync {
    type Stream: ChunkSource;

    /// Follow `container`'s logs from now on (no backlog).
    fn open_logs(&self, container: &str) -> Result<Self::Stream, ContainerError>;
}

impl<T: ContainerLogApi + ?Sized> ContainerLogApi for std::sync::Arc<T> {
    type Stream = T::Stream;

    fn open_logs(&self, container: &str) -> Result<Self::Stream, ContainerError> {
        (**self).open_logs(container)
    }
}

/// Docker log API through the `docker` CLI.
#[derive(Debug, Clone)]
pub struct DockerCli {
    docker_bin: String,
    host: Option<String>,
}

impl DockerCli {
    pub fn new(docker_bin: impl Into<String>) -> Self {
        Self {
            docker_bin: docker_bin.into(),
            host: None,
        }
    }

    /// Daemon socket, e.g. `unix:///host/var/run/docker.sock`.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.docker_bin);
        if let Some(ref host) = self.host {
            cmd.args(["--host", host]);
        }
        cmd
    }

    fn ensure_running(&self, container: &str) -> Result<(), ContainerError> {
        let output = self
            .command()
            .args([
                "inspect",
                "--type",
                "container",
                "--format",
                "{{.State.Running}}",
                container,
            ])
            .output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("No such") {
                return Err(ContainerError::NotFound(container.to_string()));
            }
            return Err(ContainerError::Api(format!(
                "docker inspect {container}: exit code {}: {}",
                output.status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }
        if String::from_utf8_lossy(&output.stdout).trim() != "true" {
            return Err(ContainerError::NotFound(format!("{container} (not running)")));
        }
        Ok(())
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new("docker")
    }
}

impl ContainerLogApi for DockerCli {
    type Stream = ChannelChunks;

    fn open_logs(&self, container: &str) -> Result<ChannelChunks, ContainerError> {
        self.ensure_running(container)?;
        let mut child = self
            .command()
            .args(["logs", "--follow", "--tail", "0", container])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ContainerError::Api("docker logs: stdout not captured".to_string()))?;
        let lines = DockerLogLines {
            child,
            reader: BufReader::new(stdout),
            done: false,
        };
        ChannelChunks::spawn(container, lines)
    }
}

/// Live `docker logs --follow` output, one line per item.
#[derive(Debug)]
pub struct DockerLogLines {
    child: Child,
    reader: BufReader<ChildStdout>,
    done: bool,
}

impl Iterator for DockerLogLines {
    type Item = Result<Vec<u8>, ContainerError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut buf = Vec::new();
        match self.reader.read_until(b'\n', &mut buf) {
            Ok(0) => {
                self.done = true;
                let _ = self.child.wait();
                None
            }
            Ok(_) => Some(Ok(buf)),
            Err(e) => {
                self.done = true;
                Some(Err(ContainerError::Io(e)))
            }
        }
    }
}

impl Drop for DockerLogLines {
    fn drop(&mut self) {
        if !self.done {
            let _ = self.child.kill();
        }
        let _ = self.child.wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_cli() {
        let cli = DockerCli::default();
        assert_eq!(cli.docker_bin, "docker");
        assert!(cli.host.is_none());
    }

    #[test]
    fn with_host_is_passed_first() {
        let cli = DockerCli::default().with_host("unix:///host/var/run/docker.sock");
        let cmd = cli.command();
        let args: Vec<_> = cmd.get_args().collect();
        assert_eq!(args, ["--host", "unix:///host/var/run/docker.sock"]);
    }

    #[test]
    fn missing_binary_is_io_error() {
        let cli = DockerCli::new("/nonexistent/docker-binary");
        let err = cli.open_logs("flocker-control").expect_err("test");
        assert!(matches!(err, ContainerError::Io(_)));
        assert!(!err.is_not_found());
    }

    #[cfg(unix)]
    #[test]
    fn log_lines_iterate_until_exit() {
        let mut child = Command::new("sh")
            .args(["-c", "printf 'a\\nb\\n'"])
            .stdout(Stdio::piped())
            .spawn()
            .expect("test");
        let stdout = child.stdout.take().expect("test");
        let lines = DockerLogLines {
            child,
            reader: BufReader::new(stdout),
            done: false,
        };
        let chunks: Vec<Vec<u8>> = lines.map(|c| c.expect("test")).collect();
        assert_eq!(chunks, [b"a\n".to_vec(), b"b\n".to_vec()]);
    }
}
