//! Service-manager probe.

use crate::error::HostError;
use crate::executor::HostCommandRunner;

pub const SYSTEMCTL: &str = "/usr/bin/systemctl";

/// Whether `systemctl status <unit>` exits 0 (unit loaded and active).
///
/// Any non-zero exit is reported as `Ok(false)`; only a failure to run the
/// command at all is an error.
pub fn unit_active<R: HostCommandRunner + ?Sized>(runner: &R, unit: &str) -> Result<bool, HostError> {
    let output = runner.run(SYSTEMCTL, &["status", unit])?;
    Ok(output.success())
}
