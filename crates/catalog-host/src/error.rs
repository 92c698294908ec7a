//! Error types for the host IO boundary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("host command failed: {0}")]
    CommandFailed(String),

    #[error("host io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures of the container runtime log API.
#[derive(Debug, Error)]
pub enum ContainerError {
    /// The container does not exist or is not running. Expected while a
    /// container is being restarted.
    #[error("container not found: {0}")]
    NotFound(String),

    #[error("container runtime error: {0}")]
    Api(String),

    #[error("container io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ContainerError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
