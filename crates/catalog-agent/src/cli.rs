//! CLI definition using clap derive.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "catalog-log-agent",
    about = "Ship Flocker service logs to the catalog firehose"
)]
pub struct Cli {
    /// Mount point of the host filesystem inside the agent container
    #[arg(long, env = "CATALOG_HOST_ROOT", default_value = "/host")]
    pub host_root: PathBuf,

    #[arg(long, env = "CATALOG_FIREHOSE_PROTOCOL", default_value = "https")]
    pub firehose_protocol: String,

    #[arg(
        long,
        env = "CATALOG_FIREHOSE_HOSTNAME",
        default_value = "firehose-volumehub.clusterhq.com"
    )]
    pub firehose_hostname: String,

    #[arg(long, env = "CATALOG_FIREHOSE_PORT", default_value = "443")]
    pub firehose_port: u16,

    /// Shared secret identifying this installation to the firehose
    #[arg(long, env = "CATALOG_FIREHOSE_SECRET", required_unless_present = "stdout")]
    pub firehose_secret: Option<String>,

    #[arg(long, env = "CATALOG_NODE_UUID")]
    pub node_uuid: Option<String>,

    #[arg(long, env = "CATALOG_CLUSTER_UUID")]
    pub cluster_uuid: Option<String>,

    /// Seconds between collections
    #[arg(long, default_value = "5")]
    pub report_interval_secs: u64,

    /// Print reports as JSON lines instead of posting them
    #[arg(long)]
    pub stdout: bool,

    /// Docker daemon address used by the container backend
    #[arg(
        long,
        env = "CATALOG_DOCKER_HOST",
        default_value = "unix:///host/var/run/docker.sock"
    )]
    pub docker_host: String,
}
