//! Build version read from the version marker file.
//!
//! Supports:
//! - Full semver: `1.7.1`, `2.0.0-beta.1`
//! - Bare build numbers: `12345` (read as `12345.0.0`)
//! - Major/minor pairs: `1.7` (read as `1.7.0`)

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// File name of the version marker shipped in every depot set.
pub const VERSION_MARKER: &str = "Build.version";

/// A version string could not be parsed.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid build version '{input}': {reason}")]
pub struct VersionError {
    /// The rejected input, trimmed.
    pub input: String,
    /// Parser message.
    pub reason: String,
}

/// Installed or published build version, ordered by semver precedence.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BuildVersion(semver::Version);

impl BuildVersion {
    /// Wrap a semver version.
    pub fn new(version: semver::Version) -> Self {
        Self(version)
    }

    /// Parse the raw bytes of a version marker file.
    ///
    /// # Errors
    ///
    /// Returns [`VersionError`] if the bytes are not UTF-8 or not a version.
    pub fn from_marker(bytes: &[u8]) -> Result<Self, VersionError> {
        let text = std::str::from_utf8(bytes).map_err(|e| VersionError {
            input: String::from_utf8_lossy(bytes).trim().to_string(),
            reason: e.to_string(),
        })?;
        text.parse()
    }

    /// The underlying semver value.
    pub fn as_semver(&self) -> &semver::Version {
        &self.0
    }
}

impl FromStr for BuildVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_start_matches('v');
        let error = |reason: String| VersionError {
            input: trimmed.to_string(),
            reason,
        };

        if trimmed.is_empty() {
            return Err(error("empty version".to_string()));
        }

        // Pad short numeric forms so semver accepts them.
        let numeric = trimmed.split('.').all(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()));
        let padded = match trimmed.split('.').count() {
            1 if numeric => format!("{trimmed}.0.0"),
            2 if numeric => format!("{trimmed}.0"),
            _ => trimmed.to_string(),
        };

        semver::Version::parse(&padded)
            .map(Self)
            .map_err(|e| error(e.to_string()))
    }
}

impl TryFrom<String> for BuildVersion {
    type Error = VersionError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<BuildVersion> for String {
    fn from(v: BuildVersion) -> Self {
        v.to_string()
    }
}

impl std::fmt::Display for BuildVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
