//! Shared types for depot installs: manifests, diffs, merging and versions.

pub mod arch;
pub mod diff;
pub mod hash;
pub mod manifest;
pub mod merge;
pub mod types;
pub mod version;

// Re-exports
pub use arch::*;
pub use diff::{ChangeSet, ChangedFile};
pub use hash::*;
pub use manifest::{Manifest, ManifestError, ManifestFile, ManifestFileChunk};
pub use merge::ManifestMerger;
pub use types::*;
pub use version::{BuildVersion, VERSION_MARKER, VersionError};

/// Relative location of the persisted local manifest below an installation root.
pub const LOCAL_MANIFEST_PATH: &str = ".depot/manifest.json";
