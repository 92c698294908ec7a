//! HostCommandRunner trait and HostExecutor (sync subprocess wrapper).
//!
//! The agent runs in a container with the host's root bind-mounted (by
//! default at `/host`); host tools are invoked through `chroot` so they see
//! the host's own filesystem, journal and service manager.

use std::path::{Path, PathBuf};

use crate::error::HostError;

/// Captured result of one host command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` if terminated by a signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

/// Trait for executing host commands. Enables mock injection for testing.
///
/// A non-zero exit is not an error at this level; callers decide what an
/// exit status means.
pub trait HostCommandRunner: Send + Sync {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, HostError>;
}

impl<T: HostCommandRunner + ?Sized> HostCommandRunner for &T {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, HostError> {
        (**self).run(program, args)
    }
}

impl<T: HostCommandRunner + ?Sized> HostCommandRunner for std::sync::Arc<T> {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, HostError> {
        (**self).run(program, args)
    }
}

/// Real executor using `std::process::Command`.
#[derive(Debug, Clone)]
pub struct HostExecutor {
    chroot_bin: String,
    root: Option<PathBuf>,
}

impl HostExecutor {
    pub fn new() -> Self {
        Self {
            chroot_bin: "/usr/sbin/chroot".to_string(),
            root: None,
        }
    }

    /// Run every command inside `root` via `chroot`.
    #[must_use]
    pub fn with_chroot(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    #[must_use]
    pub fn with_chroot_bin(mut self, bin: impl Into<String>) -> Self {
        self.chroot_bin = bin.into();
        self
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    fn command(&self, program: &str, args: &[&str]) -> std::process::Command {
        match self.root {
            Some(ref root) => {
                let mut cmd = std::process::Command::new(&self.chroot_bin);
                cmd.arg(root).arg(program).args(args);
                cmd
            }
            None => {
                let mut cmd = std::process::Command::new(program);
                cmd.args(args);
                cmd
            }
        }
    }
}

impl Default for HostExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl HostCommandRunner for HostExecutor {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, HostError> {
        let output = self.command(program, args).output()?;
        Ok(CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_executor_runs_directly() {
        let exec = HostExecutor::default();
        assert!(exec.root().is_none());
        let cmd = exec.command("/usr/bin/journalctl", &["--unit", "x"]);
        assert_eq!(cmd.get_program(), "/usr/bin/journalctl");
        let args: Vec<_> = cmd.get_args().collect();
        assert_eq!(args, ["--unit", "x"]);
    }

    #[test]
    fn chroot_executor_prefixes_command() {
        let exec = HostExecutor::default().with_chroot("/host");
        let cmd = exec.command("/usr/bin/systemctl", &["status", "flocker-control"]);
        assert_eq!(cmd.get_program(), "/usr/sbin/chroot");
        let args: Vec<_> = cmd.get_args().collect();
        assert_eq!(args, ["/host", "/usr/bin/systemctl", "status", "flocker-control"]);
    }

    #[test]
    fn command_output_success() {
        let ok = CommandOutput {
            status: Some(0),
            ..Default::default()
        };
        assert!(ok.success());
        let failed = CommandOutput {
            status: Some(3),
            ..Default::default()
        };
        assert!(!failed.success());
        assert!(!CommandOutput::default().success());
    }

    #[cfg(unix)]
    #[test]
    fn executor_captures_stdout_and_status() {
        let exec = HostExecutor::default();
        let output = exec.run("sh", &["-c", "echo hi; exit 3"]).expect("test");
        assert_eq!(output.stdout, "hi\n");
        assert_eq!(output.status, Some(3));
    }

    #[test]
    fn blanket_ref_impl() {
        struct Mock;
        impl HostCommandRunner for Mock {
            fn run(&self, _program: &str, _args: &[&str]) -> Result<CommandOutput, HostError> {
                Ok(CommandOutput {
                    status: Some(0),
                    stdout: "ok".to_string(),
                    stderr: String::new(),
                })
            }
        }
        let mock = Mock;
        let r: &Mock = &mock;
        assert_eq!(r.run("x", &[]).expect("ok").stdout, "ok");
    }
}
