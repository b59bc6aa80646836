//! Applying a [`ChangeSet`] to an installation root.
//!
//! Order: delete files, delete directories (deepest first), create
//! directories, then create or patch files one at a time. A file whose
//! on-disk SHA-1 already matches its target is skipped without any download,
//! which makes a re-run after an interrupted apply cheap.

use crate::error::{ClientError, InstallError};
use crate::io::chunked::write_chunk;
use crate::io::hashing::hash_file;
use crate::paths::install_path;
use crate::reporter::Reporter;
use async_trait::async_trait;
use bytes::Bytes;
use depot_schema::{ChangeSet, ChangedFile, DepotId, DepotKey, ManifestFile, ManifestFileChunk};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

/// Anything that can hand out verified chunk payloads.
#[async_trait]
pub trait ChunkSource: Send + Sync {
    /// Fetch one chunk of `depot_id`, decoded with `key`.
    async fn fetch_chunk(
        &self,
        depot_id: DepotId,
        key: &DepotKey,
        chunk: &ManifestFileChunk,
        cancel: &CancellationToken,
    ) -> Result<Bytes, ClientError>;
}

/// Counters for one apply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyStats {
    pub files_deleted: usize,
    pub directories_deleted: usize,
    pub directories_created: usize,
    pub files_patched: usize,
    pub files_skipped: usize,
    pub chunks_fetched: usize,
    pub bytes_written: u64,
}

/// Bring `root` in line with `changes.new_manifest`.
///
/// `keys` maps each depot to the key its chunks are decoded with.
///
/// # Errors
///
/// Filesystem failures, chunk fetch failures, a missing depot key, or a file
/// that still mismatches its hash after a full re-download.
pub async fn apply_change_set<S, R>(
    root: &Path,
    changes: &ChangeSet,
    keys: &HashMap<DepotId, DepotKey>,
    source: &S,
    reporter: &R,
    cancel: &CancellationToken,
) -> Result<ApplyStats, InstallError>
where
    S: ChunkSource + ?Sized,
    R: Reporter + ?Sized,
{
    let mut applier = Applier {
        root,
        keys,
        source,
        reporter,
        cancel,
        stats: ApplyStats::default(),
    };

    applier.delete_files(changes).await?;
    applier.delete_directories(changes).await?;
    applier.create_directories(changes).await?;
    for changed in &changes.changed_files {
        applier.check_cancelled()?;
        applier.apply_file(changed).await?;
    }

    Ok(applier.stats)
}

struct Applier<'a, S: ?Sized, R: ?Sized> {
    root: &'a Path,
    keys: &'a HashMap<DepotId, DepotKey>,
    source: &'a S,
    reporter: &'a R,
    cancel: &'a CancellationToken,
    stats: ApplyStats,
}

impl<S, R> Applier<'_, S, R>
where
    S: ChunkSource + ?Sized,
    R: Reporter + ?Sized,
{
    fn check_cancelled(&self) -> Result<(), InstallError> {
        if self.cancel.is_cancelled() {
            return Err(InstallError::Cancelled);
        }
        Ok(())
    }

    async fn delete_files(&mut self, changes: &ChangeSet) -> Result<(), InstallError> {
        for file in &changes.deleted_files {
            self.check_cancelled()?;
            let path = install_path(self.root, &file.path);
            self.reporter.removing(&file.path);
            match fs::remove_file(&path).await {
                Ok(()) => self.stats.files_deleted += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    tracing::debug!(path = %file.path, "File already gone");
                }
                Err(e) => return Err(InstallError::io(path, e)),
            }
        }
        Ok(())
    }

    async fn delete_directories(&mut self, changes: &ChangeSet) -> Result<(), InstallError> {
        for dir in &changes.deleted_directories {
            let path = install_path(self.root, dir);
            match fs::remove_dir(&path).await {
                Ok(()) => {
                    self.reporter.removing(dir);
                    self.stats.directories_deleted += 1;
                }
                // Unmanaged files keep the directory alive.
                Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::DirectoryNotEmpty) => {
                    tracing::debug!(path = %dir, error = %e, "Leaving directory in place");
                }
                Err(e) => return Err(InstallError::io(path, e)),
            }
        }
        Ok(())
    }

    async fn create_directories(&mut self, changes: &ChangeSet) -> Result<(), InstallError> {
        for dir in &changes.added_directories {
            let path = install_path(self.root, dir);
            fs::create_dir_all(&path)
                .await
                .map_err(|e| InstallError::io(&path, e))?;
            self.stats.directories_created += 1;
        }
        Ok(())
    }

    async fn apply_file(&mut self, changed: &ChangedFile) -> Result<(), InstallError> {
        let target = &changed.new;
        let path = install_path(self.root, &target.path);

        let on_disk = hash_file(&path).await.map_err(|e| InstallError::io(&path, e))?;
        if on_disk == Some(target.hash) {
            self.reporter.skipped(&target.path);
            self.stats.files_skipped += 1;
            return set_executable(&path, target.is_executable).await;
        }

        let key = self
            .keys
            .get(&target.depot_id)
            .ok_or(InstallError::MissingKey(target.depot_id))?;

        // Only a file the previous manifest described can be patched in place.
        let patch_base = on_disk.is_some() && !changed.is_new();
        let chunks = if patch_base {
            changed.chunks_to_fetch()
        } else {
            target.chunks().iter().collect()
        };
        self.write_chunks(&path, target, key, &chunks, !patch_base).await?;

        let mut written = hash_file(&path).await.map_err(|e| InstallError::io(&path, e))?;
        if written != Some(target.hash) {
            tracing::warn!(path = %target.path, "Written file does not match its hash, fetching it in full");
            let all: Vec<_> = target.chunks().iter().collect();
            self.write_chunks(&path, target, key, &all, true).await?;
            written = hash_file(&path).await.map_err(|e| InstallError::io(&path, e))?;
        }
        if written != Some(target.hash) {
            return Err(InstallError::HashMismatch {
                path: target.path.clone(),
            });
        }

        set_executable(&path, target.is_executable).await?;
        self.stats.files_patched += 1;
        Ok(())
    }

    async fn write_chunks(
        &mut self,
        path: &Path,
        target: &ManifestFile,
        key: &DepotKey,
        chunks: &[&ManifestFileChunk],
        reset: bool,
    ) -> Result<(), InstallError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| InstallError::io(parent, e))?;
        }

        self.reporter.patching(&target.path, chunks.len());
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .await
            .map_err(|e| InstallError::io(path, e))?;
        // Bytes no chunk covers must read as zeros.
        if reset {
            file.set_len(0).await.map_err(|e| InstallError::io(path, e))?;
        }
        file.set_len(target.size)
            .await
            .map_err(|e| InstallError::io(path, e))?;

        for (i, chunk) in chunks.iter().enumerate() {
            let data = self
                .source
                .fetch_chunk(target.depot_id, key, chunk, self.cancel)
                .await?;
            write_chunk(&mut file, chunk, &data)
                .await
                .map_err(|e| InstallError::io(path, e))?;
            self.stats.chunks_fetched += 1;
            self.stats.bytes_written += data.len() as u64;
            self.reporter.chunk_fetched(&target.path, i + 1, chunks.len());
        }

        file.flush().await.map_err(|e| InstallError::io(path, e))?;
        Ok(())
    }
}

#[cfg(unix)]
async fn set_executable(path: &Path, executable: bool) -> Result<(), InstallError> {
    use std::os::unix::fs::PermissionsExt;

    if !executable {
        return Ok(());
    }
    let mut perms = fs::metadata(path)
        .await
        .map_err(|e| InstallError::io(path, e))?
        .permissions();
    if perms.mode() & 0o777 == 0o755 {
        return Ok(());
    }
    perms.set_mode(0o755);
    fs::set_permissions(path, perms)
        .await
        .map_err(|e| InstallError::io(path, e))
}

#[cfg(not(unix))]
async fn set_executable(_path: &Path, _executable: bool) -> Result<(), InstallError> {
    Ok(())
}
