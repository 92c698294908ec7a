//! catalog-host: host IO boundary for the log agent.
//! Subprocess execution (optionally through a chroot into the host root),
//! service-manager probes, journal reads, and the container log API.
//! No collection policy lives here.

pub mod chunks;
pub mod docker;
pub mod error;
pub mod executor;
pub mod journal;
pub mod systemctl;

pub use chunks::{ChannelChunks, ChunkSource, NextChunk};
pub use docker::{ContainerLogApi, DockerCli, DockerLogLines};
pub use error::{ContainerError, HostError};
pub use executor::{CommandOutput, HostCommandRunner, HostExecutor};
pub use journal::{CursorMarker, JournalRead, parse_journal_output, read_journal};
pub use systemctl::unit_active;
