//! Registry key paths.

use std::fmt;

/// A key path below a root hive, stored as its segments.
///
/// Input may use `\` or `/` as separators; empty segments are dropped, so
/// `"Software//App/"` and `r"Software\App"` are the same path. The empty path
/// addresses the root (or prefix) itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct KeyPath {
    segments: Vec<String>,
}

impl KeyPath {
    /// The empty path.
    pub fn root() -> Self {
        Self::default()
    }

    /// Parses a path using either separator.
    pub fn parse(path: &str) -> Self {
        Self {
            segments: path
                .split(['\\', '/'])
                .filter(|segment| !segment.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    /// Returns `self` followed by `other`.
    pub fn join(&self, other: &KeyPath) -> Self {
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        Self { segments }
    }

    /// Path segments in order.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// True for the root path.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Splits into parent path and leaf name. `None` for the root path.
    pub fn split_leaf(&self) -> Option<(KeyPath, &str)> {
        let (leaf, parent) = self.segments.split_last()?;
        Some((
            KeyPath {
                segments: parent.to_vec(),
            },
            leaf.as_str(),
        ))
    }

    /// Backslash-joined form passed to the OS.
    pub fn to_native(&self) -> String {
        self.segments.join("\\")
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_native())
    }
}

impl From<&str> for KeyPath {
    fn from(path: &str) -> Self {
        Self::parse(path)
    }
}

impl From<&String> for KeyPath {
    fn from(path: &String) -> Self {
        Self::parse(path)
    }
}

impl From<String> for KeyPath {
    fn from(path: String) -> Self {
        Self::parse(&path)
    }
}
