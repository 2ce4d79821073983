//! Agent capability set.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Free-form capability tags declared by an agent (e.g. `hevc`, `gpu`).
///
/// Stored as JSONB so new tags need no migration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentCapabilities(BTreeSet<String>);

impl AgentCapabilities {
    /// Creates an empty capability set.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// Adds capability tags, trimming and lowercasing each one.
    #[must_use]
    pub fn with_tags(mut self, tags: impl IntoIterator<Item = impl AsRef<str>>) -> Self {
        self.0.extend(
            tags.into_iter()
                .map(|tag| tag.as_ref().trim().to_ascii_lowercase())
                .filter(|tag| !tag.is_empty()),
        );
        self
    }

    /// Returns whether the set contains `tag`.
    #[must_use]
    pub fn contains(&self, tag: &str) -> bool {
        self.0.contains(&tag.trim().to_ascii_lowercase())
    }

    /// Iterates the tags in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Returns whether no capabilities are declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
