//! The persisted local manifest.
//!
//! Lives at `<root>/.depot/manifest.json` and describes exactly what the last
//! successful apply put on disk.

use crate::error::InstallError;
use crate::paths::local_manifest_path;
use depot_schema::Manifest;
use std::path::Path;
use tokio::fs;

/// Load the local manifest of `root`.
///
/// Returns `None` if nothing has been installed yet.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub async fn load_local_manifest(root: &Path) -> Result<Option<Manifest>, InstallError> {
    let path = local_manifest_path(root);
    let content = match fs::read(&path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(InstallError::io(path, e)),
    };

    serde_json::from_slice(&content)
        .map(Some)
        .map_err(|e| InstallError::LocalManifest {
            path,
            reason: e.to_string(),
        })
}

/// Atomically persist `manifest` as the local manifest of `root`.
///
/// The file is first written to a temporary location and then renamed so
/// that readers never observe a partially written manifest.
///
/// # Errors
///
/// Returns an error if serialization, file writing, or the rename fails.
pub async fn save_local_manifest(root: &Path, manifest: &Manifest) -> Result<(), InstallError> {
    let path = local_manifest_path(root);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| InstallError::io(parent, e))?;
    }

    let content = serde_json::to_vec_pretty(manifest).map_err(|e| InstallError::LocalManifest {
        path: path.clone(),
        reason: e.to_string(),
    })?;

    let temp_path = path.with_extension("json.tmp");
    fs::write(&temp_path, &content)
        .await
        .map_err(|e| InstallError::io(&temp_path, e))?;
    fs::rename(&temp_path, &path)
        .await
        .map_err(|e| InstallError::io(&path, e))?;

    Ok(())
}
