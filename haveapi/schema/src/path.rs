//! Typed resource paths.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Path of a resource from the version root, e.g. `["project", "task"]`.
///
/// Associations refer to their target resource by path rather than by
/// pointer, so a path stays valid for as long as the description it was
/// checked against.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourcePath(Vec<String>);

impl ResourcePath {
    /// Creates a path from its segments.
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// Parses a dotted path such as `"project.task"`.
    ///
    /// Empty segments are skipped, so `""` is the root path.
    pub fn parse_dotted(path: &str) -> Self {
        Self::new(path.split('.').filter(|s| !s.is_empty()))
    }

    /// Returns the root (empty) path.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Returns a new path with `segment` appended.
    pub fn join(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Self(segments)
    }

    /// Path segments in order.
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Last segment, i.e. the resource's own name.
    pub fn name(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// Returns `true` for the root path.
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

impl From<Vec<String>> for ResourcePath {
    fn from(segments: Vec<String>) -> Self {
        Self(segments)
    }
}

impl From<&str> for ResourcePath {
    fn from(path: &str) -> Self {
        Self::parse_dotted(path)
    }
}
