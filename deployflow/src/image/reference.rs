//! Docker image references.

use crate::errors::InvalidImageFormatError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Tag used when an image string names none.
pub const DEFAULT_TAG: &str = "latest";

/// A `<namespace>/<name>[:tag]` image reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DockerImageRef {
    /// `<namespace>/<name>`.
    pub repository: String,
    /// Image tag.
    pub tag: String,
}

impl DockerImageRef {
    /// Parses an image string.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidImageFormatError`] if the string contains whitespace,
    /// more than one `:`, not exactly one `/`, an empty namespace, name or
    /// tag, or a tag containing `/` or `@`.
    pub fn parse(raw: &str) -> Result<Self, InvalidImageFormatError> {
        let invalid = |reason: &str| InvalidImageFormatError::new(raw, reason);

        if raw.chars().any(char::is_whitespace) {
            return Err(invalid("contains whitespace"));
        }

        let (repository, tag) = match raw.split(':').collect::<Vec<_>>().as_slice() {
            [repository] => (*repository, DEFAULT_TAG),
            [repository, tag] => (*repository, *tag),
            _ => return Err(invalid("more than one ':' tag separator")),
        };

        let parts: Vec<&str> = repository.split('/').collect();
        if parts.len() != 2 {
            return Err(invalid("expected exactly one '/' between namespace and name"));
        }
        if parts.iter().any(|p| p.is_empty()) {
            return Err(invalid("namespace and name must be non-empty"));
        }
        if tag.is_empty() {
            return Err(invalid("tag must be non-empty"));
        }
        if tag.contains(['/', '@']) {
            return Err(invalid("tag must not contain '/' or '@'"));
        }

        Ok(Self {
            repository: repository.to_string(),
            tag: tag.to_string(),
        })
    }

    /// The namespace part of the repository.
    #[must_use]
    pub fn namespace(&self) -> &str {
        self.repository.split('/').next().unwrap_or_default()
    }

    /// The name part of the repository.
    #[must_use]
    pub fn name(&self) -> &str {
        self.repository.split('/').nth(1).unwrap_or_default()
    }
}

impl FromStr for DockerImageRef {
    type Err = InvalidImageFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for DockerImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repository, self.tag)
    }
}
