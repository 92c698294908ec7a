//! Backend selection policy.
//!
//! Probes run in priority order; the first applicable backend wins. When
//! more than one applies the choice is still the first, and the other
//! candidates are kept on the [`Selection`] so the caller can report the
//! ambiguity.

use std::fmt;

/// Result of probing one backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    Applicable,
    NotApplicable,
    /// The probe itself failed; treated as not applicable.
    Failed(String),
}

impl ProbeResult {
    pub fn is_applicable(&self) -> bool {
        matches!(self, Self::Applicable)
    }
}

impl fmt::Display for ProbeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Applicable => f.write_str("applicable"),
            Self::NotApplicable => f.write_str("not applicable"),
            Self::Failed(reason) => write!(f, "probe failed: {reason}"),
        }
    }
}

/// The chosen backend plus every backend that claimed the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub index: usize,
    pub name: &'static str,
    pub applicable: Vec<&'static str>,
}

impl Selection {
    pub fn is_ambiguous(&self) -> bool {
        self.applicable.len() > 1
    }
}

/// Pick the first applicable backend, or `None` when no probe succeeded.
pub fn select_backend(probes: &[(&'static str, ProbeResult)]) -> Option<Selection> {
    let applicable: Vec<(usize, &'static str)> = probes
        .iter()
        .enumerate()
        .filter(|(_, (_, result))| result.is_applicable())
        .map(|(i, (name, _))| (i, *name))
        .collect();
    let &(index, name) = applicable.first()?;
    Some(Selection {
        index,
        name,
        applicable: applicable.into_iter().map(|(_, name)| name).collect(),
    })
}
