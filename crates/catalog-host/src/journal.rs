//! Journal reads via `journalctl --show-cursor`.
//!
//! Output is the unit's messages (`--output cat`) followed by one trailing
//! marker line carrying the resumption cursor:
//!
//! ```text
//! first message
//! second message
//! -- cursor: s=91bc...;i=2c4;b=...;m=...;t=...;x=...
//! ```

use crate::error::HostError;
use crate::executor::HostCommandRunner;

pub const JOURNALCTL: &str = "/usr/bin/journalctl";

/// Prefix of the trailing cursor marker line.
pub const CURSOR_MARKER: &str = "-- cursor: ";

/// What the last line of a journal read turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CursorMarker {
    /// A well-formed marker carrying the new cursor.
    Found(String),
    /// The last line was not a marker. Carries that line, which is kept as
    /// ordinary log output.
    Missing(String),
}

/// Parsed result of one non-empty journal read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalRead {
    /// Log lines, excluding a well-formed marker.
    pub lines: Vec<String>,
    pub marker: CursorMarker,
}

impl JournalRead {
    /// The new cursor, if the read ended with a valid marker.
    pub fn cursor(&self) -> Option<&str> {
        match self.marker {
            CursorMarker::Found(ref cursor) => Some(cursor),
            CursorMarker::Missing(_) => None,
        }
    }
}

/// Build the `journalctl` arguments for one read of `unit`.
///
/// Without a cursor, request zero lines: this only establishes a cursor
/// baseline and never imports backlog.
pub fn journalctl_args<'a>(unit: &'a str, cursor: Option<&'a str>) -> Vec<&'a str> {
    let mut args = vec!["--output", "cat", "--unit", unit, "--show-cursor"];
    match cursor {
        None => args.extend(["--lines", "0"]),
        Some(cursor) => args.extend(["--after-cursor", cursor]),
    }
    args
}

/// Split raw `journalctl` output into lines and the trailing cursor marker.
///
/// Returns `None` when the output has no lines at all, which journalctl
/// produces for a unit that does not exist (yet).
pub fn parse_journal_output(output: &str) -> Option<JournalRead> {
    let mut lines: Vec<String> = output.lines().map(str::to_string).collect();
    let last = lines.pop()?;
    let marker = match last.strip_prefix(CURSOR_MARKER) {
        Some(cursor) if !cursor.trim().is_empty() => CursorMarker::Found(cursor.trim().to_string()),
        _ => {
            // Not a marker, so the popped line is journal output and stays in the batch.
            lines.push(last.clone());
            CursorMarker::Missing(last)
        }
    };
    Some(JournalRead { lines, marker })
}

/// Read new journal entries for `unit`, resuming after `cursor`.
///
/// `Ok(None)` means the unit produced no output at all. A non-zero
/// `journalctl` exit is an error.
pub fn read_journal<R: HostCommandRunner + ?Sized>(
    runner: &R,
    unit: &str,
    cursor: Option<&str>,
) -> Result<Option<JournalRead>, HostError> {
    let args = journalctl_args(unit, cursor);
    let output = runner.run(JOURNALCTL, &args)?;
    if !output.success() {
        return Err(HostError::CommandFailed(format!(
            "journalctl --unit {unit}: exit code {}: {}",
            output.status.unwrap_or(-1),
            output.stderr.trim()
        )));
    }
    Ok(parse_journal_output(&output.stdout))
}
