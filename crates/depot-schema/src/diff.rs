//! Pure diff algorithms over two manifest snapshots.
//!
//! None of these functions touch the filesystem, so the apply step can be
//! tested against any pair of manifests without I/O.

use crate::manifest::{Manifest, ManifestFile, ManifestFileChunk};
use std::collections::HashMap;

/// Directories present in `old` but not in `new`, deepest first.
pub fn deleted_directories(old: &Manifest, new: &Manifest) -> Vec<String> {
    // Reverse lexical order puts every "a/b" before its parent "a".
    let mut deleted: Vec<String> = old
        .directory_set()
        .difference(new.directory_set())
        .cloned()
        .collect();
    deleted.reverse();
    deleted
}

/// Directories present in `new` but not in `old`, parents first.
pub fn added_directories(old: &Manifest, new: &Manifest) -> Vec<String> {
    new.directory_set()
        .difference(old.directory_set())
        .cloned()
        .collect()
}

/// Files of `old` whose path has no counterpart in `new`.
pub fn deleted_files<'a>(old: &'a Manifest, new: &Manifest) -> Vec<&'a ManifestFile> {
    old.files().filter(|f| new.file(&f.path).is_none()).collect()
}

/// Files of `new` that need I/O, paired with their previous entry.
///
/// `(None, file)` is a new file, `(Some(old), file)` a changed one. Files
/// that are equal in every field are omitted.
pub fn changed_files<'a>(
    old: &'a Manifest,
    new: &'a Manifest,
) -> Vec<(Option<&'a ManifestFile>, &'a ManifestFile)> {
    new.files()
        .filter_map(|file| match old.file(&file.path) {
            None => Some((None, file)),
            Some(previous) if previous != file => Some((Some(previous), file)),
            Some(_) => None,
        })
        .collect()
}

/// Chunks of `new` that are absent from `old` by id, or present with a
/// different offset, checksum or length.
pub fn changed_chunks<'a>(old: &ManifestFile, new: &'a ManifestFile) -> Vec<&'a ManifestFileChunk> {
    let previous: HashMap<_, _> = old.chunks().iter().map(|c| (c.chunk_id, c)).collect();
    new.chunks()
        .iter()
        .filter(|chunk| previous.get(&chunk.chunk_id) != Some(chunk))
        .collect()
}

/// A file to create or patch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangedFile {
    /// Previously installed entry, `None` for a new file.
    pub old: Option<ManifestFile>,
    /// Target entry.
    pub new: ManifestFile,
}

impl ChangedFile {
    /// `true` when there was no previous entry.
    pub fn is_new(&self) -> bool {
        self.old.is_none()
    }

    /// Chunks to download: all of them for a new file, otherwise
    /// [`changed_chunks`].
    pub fn chunks_to_fetch(&self) -> Vec<&ManifestFileChunk> {
        match &self.old {
            Some(old) => changed_chunks(old, &self.new),
            None => self.new.chunks().iter().collect(),
        }
    }
}

/// Everything one run must do to converge the local tree onto a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSet {
    /// The target snapshot, persisted after a successful apply.
    pub new_manifest: Manifest,
    /// Directories to remove, deepest first.
    pub deleted_directories: Vec<String>,
    /// Directories to create, parents first.
    pub added_directories: Vec<String>,
    /// Files to remove.
    pub deleted_files: Vec<ManifestFile>,
    /// Files to create or patch.
    pub changed_files: Vec<ChangedFile>,
}

impl ChangeSet {
    /// Diff `new` against `old`. `None` means nothing is installed yet.
    pub fn compute(old: Option<&Manifest>, new: Manifest) -> Self {
        let empty = Manifest::new();
        let old = old.unwrap_or(&empty);

        let deleted_directories = deleted_directories(old, &new);
        let added_directories = added_directories(old, &new);
        let deleted_files = deleted_files(old, &new).into_iter().cloned().collect();
        let changed_files = changed_files(old, &new)
            .into_iter()
            .map(|(old, new)| ChangedFile {
                old: old.cloned(),
                new: new.clone(),
            })
            .collect();

        Self {
            new_manifest: new,
            deleted_directories,
            added_directories,
            deleted_files,
            changed_files,
        }
    }

    /// `true` when applying would not touch the disk.
    pub fn is_empty(&self) -> bool {
        self.deleted_directories.is_empty()
            && self.added_directories.is_empty()
            && self.deleted_files.is_empty()
            && self.changed_files.is_empty()
    }

    /// Upper bound of bytes to download, assuming no file on disk already
    /// matches its target.
    pub fn download_size(&self) -> u64 {
        self.changed_files
            .iter()
            .flat_map(ChangedFile::chunks_to_fetch)
            .map(|c| u64::from(c.compressed_length))
            .sum()
    }
}
