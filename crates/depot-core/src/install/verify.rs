//! Offline checks of an installation against its local manifest.

use super::store::load_local_manifest;
use crate::error::InstallError;
use crate::io::hashing::hash_file;
use crate::paths::install_path;
use depot_schema::{BuildVersion, Manifest, VERSION_MARKER};
use std::path::Path;

/// Why an installed file does not match the local manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileProblem {
    Missing,
    SizeMismatch { expected: u64, actual: u64 },
    HashMismatch,
}

/// Result of [`verify_installation`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifyReport {
    /// Files checked.
    pub checked: usize,
    /// Files that differ from the manifest, by path.
    pub problems: Vec<(String, FileProblem)>,
}

impl VerifyReport {
    /// `true` when every file matched.
    pub fn is_clean(&self) -> bool {
        self.problems.is_empty()
    }
}

/// Hash every file listed in the local manifest of `root`.
///
/// Returns `None` if nothing is installed.
///
/// # Errors
///
/// An unreadable local manifest or an IO error other than "not found".
pub async fn verify_installation(root: &Path) -> Result<Option<VerifyReport>, InstallError> {
    let Some(manifest) = load_local_manifest(root).await? else {
        return Ok(None);
    };

    let mut report = VerifyReport::default();
    for file in manifest.files() {
        let path = install_path(root, &file.path);
        report.checked += 1;

        let actual_size = match tokio::fs::metadata(&path).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                report.problems.push((file.path.clone(), FileProblem::Missing));
                continue;
            }
            Err(e) => return Err(InstallError::io(path, e)),
        };
        if actual_size != file.size {
            report.problems.push((
                file.path.clone(),
                FileProblem::SizeMismatch {
                    expected: file.size,
                    actual: actual_size,
                },
            ));
            continue;
        }

        let hash = hash_file(&path).await.map_err(|e| InstallError::io(&path, e))?;
        if hash != Some(file.hash) {
            report.problems.push((file.path.clone(), FileProblem::HashMismatch));
        }
    }

    tracing::debug!(checked = report.checked, problems = report.problems.len(), "Verified installation");
    Ok(Some(report))
}

/// Version recorded by the marker file of the installation at `root`.
///
/// Returns `None` if nothing is installed, the manifest has no marker, or the
/// marker file is missing or unreadable.
///
/// # Errors
///
/// An unreadable local manifest.
pub async fn installed_version(root: &Path) -> Result<Option<BuildVersion>, InstallError> {
    match load_local_manifest(root).await? {
        Some(manifest) => Ok(read_marker(root, &manifest).await),
        None => Ok(None),
    }
}

pub(super) async fn read_marker(root: &Path, manifest: &Manifest) -> Option<BuildVersion> {
    let marker = manifest.find_by_file_name(VERSION_MARKER)?;
    let path = install_path(root, &marker.path);
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Cannot read installed version marker");
            return None;
        }
    };
    match BuildVersion::from_marker(&bytes) {
        Ok(version) => Some(version),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Ignoring unparseable installed version");
            None
        }
    }
}
