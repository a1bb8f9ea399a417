//! Schema versions attached to documents and transforms.

use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A dotted `major.minor.patch` schema version.
///
/// Ordering is lexicographic over the three components, so `7.10.0` sorts
/// after `7.9.3`. Serialises as its string form.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct SchemaVersion {
    major: u32,
    minor: u32,
    patch: u32,
}

impl SchemaVersion {
    /// The version of a document that has never been migrated.
    pub const ZERO: SchemaVersion = SchemaVersion::new(0, 0, 0);

    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    pub fn major(self) -> u32 {
        self.major
    }

    pub fn minor(self) -> u32 {
        self.minor
    }

    pub fn patch(self) -> u32 {
        self.patch
    }
}

impl Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Failure to parse a [`SchemaVersion`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid schema version '{input}': expected major.minor.patch")]
pub struct VersionParseError {
    input: String,
}

impl FromStr for SchemaVersion {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || VersionParseError {
            input: s.to_string(),
        };

        let mut parts = s.trim().split('.');
        let mut next = || -> Result<u32, VersionParseError> {
            parts
                .next()
                .filter(|p| !p.is_empty())
                .ok_or_else(err)?
                .parse::<u32>()
                .map_err(|_| err())
        };

        let major = next()?;
        let minor = next()?;
        let patch = next()?;

        if parts.next().is_some() {
            return Err(err());
        }

        Ok(Self::new(major, minor, patch))
    }
}

impl TryFrom<String> for SchemaVersion {
    type Error = VersionParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SchemaVersion> for String {
    fn from(version: SchemaVersion) -> Self {
        version.to_string()
    }
}
