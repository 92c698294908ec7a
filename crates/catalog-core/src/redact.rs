//! Sensitive-field redaction applied to every batch before it leaves the host.
//!
//! Only structured records of the converge action carry cluster state worth
//! hiding. Any other line, structured or not, is returned untouched.

use std::borrow::Cow;

use serde_json::Value;

use crate::types::Batch;

/// `action_type` of the agent converge loop records.
pub const CONVERGE_ACTION_TYPE: &str = "flocker:agent:converge";

/// Field elided from converge records.
pub const CLUSTER_STATE_FIELD: &str = "cluster_state";

/// Replacement value written into elided fields.
pub const ELIDED: &str = "<elided>";

/// Redact one log line.
///
/// Returns the input unchanged unless it is a JSON object whose
/// `action_type` is [`CONVERGE_ACTION_TYPE`] and which has a non-null
/// [`CLUSTER_STATE_FIELD`].
pub fn redact_line(line: &str) -> Cow<'_, str> {
    let Ok(Value::Object(mut record)) = serde_json::from_str::<Value>(line) else {
        return Cow::Borrowed(line);
    };
    if record.get("action_type").and_then(Value::as_str) != Some(CONVERGE_ACTION_TYPE) {
        return Cow::Borrowed(line);
    }
    match record.get_mut(CLUSTER_STATE_FIELD) {
        Some(state) if !state.is_null() => {
            *state = Value::String(ELIDED.to_string());
        }
        _ => return Cow::Borrowed(line),
    }
    match serde_json::to_string(&record) {
        Ok(redacted) => Cow::Owned(redacted),
        // Never emit the unredacted record.
        Err(_) => Cow::Owned(String::new()),
    }
}

/// Apply [`redact_line`] to every line of `batch`.
pub fn redact_batch(batch: Batch) -> Batch {
    batch.map_lines(|line| match redact_line(&line) {
        Cow::Borrowed(_) => line,
        Cow::Owned(redacted) => redacted,
    })
}
