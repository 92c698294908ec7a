use std::collections::BTreeMap;
use std::fmt;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

// ─── Source identity ──────────────────────────────────────────────

/// Identity of one log source: a journal unit, a container name, or a log
/// file basename. Stable for the lifetime of the agent process.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceKey(String);

impl SourceKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SourceKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ─── Fragment ─────────────────────────────────────────────────────

/// Lines produced atomically by one poll of one source stream.
///
/// Always a list of lines; a scalar fragment cannot be constructed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fragment {
    lines: Vec<String>,
}

impl Fragment {
    pub fn new(lines: Vec<String>) -> Self {
        Self { lines }
    }

    /// Single-line fragment.
    pub fn line(line: impl Into<String>) -> Self {
        Self {
            lines: vec![line.into()],
        }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl From<Vec<String>> for Fragment {
    fn from(lines: Vec<String>) -> Self {
        Self::new(lines)
    }
}

// ─── Batch ────────────────────────────────────────────────────────

/// Everything collected since the last drain, grouped by source.
///
/// Serializes as the report wire shape: `{ "<source>": ["line", ...] }`,
/// with the fragments of each source flattened in append order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    sources: BTreeMap<SourceKey, Vec<Fragment>>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment to the end of `key`'s sequence.
    pub fn push(&mut self, key: SourceKey, fragment: Fragment) {
        self.sources.entry(key).or_default().push(fragment);
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Number of sources with at least one fragment.
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Total number of lines across all sources.
    pub fn line_count(&self) -> usize {
        self.sources
            .values()
            .flat_map(|fragments| fragments.iter())
            .map(Fragment::len)
            .sum()
    }

    pub fn fragments(&self, key: &SourceKey) -> Option<&[Fragment]> {
        self.sources.get(key).map(Vec::as_slice)
    }

    pub fn keys(&self) -> impl Iterator<Item = &SourceKey> {
        self.sources.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SourceKey, &[Fragment])> {
        self.sources.iter().map(|(k, v)| (k, v.as_slice()))
    }

    /// Flatten into `source -> lines`, preserving append order per source.
    pub fn into_lines(self) -> BTreeMap<SourceKey, Vec<String>> {
        self.sources
            .into_iter()
            .map(|(key, fragments)| {
                let lines = fragments.into_iter().flat_map(Fragment::into_lines).collect();
                (key, lines)
            })
            .collect()
    }

    /// Rewrite every line in place, keeping fragment boundaries.
    pub fn map_lines<F>(self, mut f: F) -> Self
    where
        F: FnMut(String) -> String,
    {
        let sources = self
            .sources
            .into_iter()
            .map(|(key, fragments)| {
                let fragments = fragments
                    .into_iter()
                    .map(|fragment| {
                        Fragment::new(fragment.into_lines().into_iter().map(&mut f).collect())
                    })
                    .collect();
                (key, fragments)
            })
            .collect();
        Self { sources }
    }
}

impl Serialize for Batch {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.sources.len()))?;
        for (key, fragments) in &self.sources {
            let lines: Vec<&str> = fragments
                .iter()
                .flat_map(|f| f.lines().iter().map(String::as_str))
                .collect();
            map.serialize_entry(key, &lines)?;
        }
        map.end()
    }
}
