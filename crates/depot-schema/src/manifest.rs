//! Manifest model: the directories, files and chunks of one installable tree.
//!
//! A [`Manifest`] is a value snapshot. One is loaded from the installation
//! root (what is on disk), another is merged from the remote depots (what
//! should be on disk), and [`crate::diff`] reconciles the two.
//!
//! Files are keyed by relative path, so a manifest can never hold two files
//! with the same path. A file's chunks are unique by id and kept sorted by
//! offset, which makes full-field equality of two files a plain `==`.

use crate::hash::{Checksum, ChunkId, Sha1Hash};
use crate::types::DepotId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Errors raised while building or decoding a manifest.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ManifestError {
    /// Two files share one path.
    #[error("Duplicate file path in manifest: {0}")]
    DuplicatePath(String),

    /// Two chunks of one file share an id.
    #[error("Duplicate chunk {chunk_id} in {path}")]
    DuplicateChunk {
        /// File holding the duplicate.
        path: String,
        /// The repeated chunk id.
        chunk_id: ChunkId,
    },

    /// A chunk extends past the declared file size.
    #[error("Chunk {chunk_id} at offset {offset} overruns {path} ({size} bytes)")]
    ChunkOutOfBounds {
        /// File holding the chunk.
        path: String,
        /// The offending chunk id.
        chunk_id: ChunkId,
        /// Chunk start offset.
        offset: u64,
        /// Declared file size.
        size: u64,
    },

    /// A path is absolute, empty or escapes the installation root.
    #[error("Invalid manifest path '{path}': {reason}")]
    InvalidPath {
        /// The rejected path.
        path: String,
        /// Why it was rejected.
        reason: &'static str,
    },
}

/// Normalise a manifest path to `/` separators and reject anything that
/// would resolve outside the installation root.
///
/// # Errors
///
/// Returns [`ManifestError::InvalidPath`] for empty or absolute paths, drive
/// prefixes, and `..` components.
pub fn normalize_path(raw: &str) -> Result<String, ManifestError> {
    let invalid = |reason| ManifestError::InvalidPath {
        path: raw.to_string(),
        reason,
    };

    let unified = raw.replace('\\', "/");
    if unified.starts_with('/') {
        return Err(invalid("absolute path"));
    }
    if let [drive, b':', ..] = unified.as_bytes()
        && drive.is_ascii_alphabetic()
    {
        return Err(invalid("drive prefix"));
    }

    let mut parts = Vec::new();
    for part in unified.split('/') {
        match part {
            "" | "." => {}
            ".." => return Err(invalid("parent directory component")),
            other => parts.push(other),
        }
    }
    if parts.is_empty() {
        return Err(invalid("empty path"));
    }
    Ok(parts.join("/"))
}

/// One content-addressed byte range of a file.
///
/// Identity is [`chunk_id`](Self::chunk_id); equality is full-field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestFileChunk {
    /// SHA-1 of the chunk payload.
    pub chunk_id: ChunkId,
    /// CRC-32 of the uncompressed payload.
    pub checksum: Checksum,
    /// Byte offset of the chunk inside the file.
    pub offset: u64,
    /// Payload size as served by the CDN.
    pub compressed_length: u32,
    /// Payload size once written to disk.
    pub uncompressed_length: u32,
}

impl ManifestFileChunk {
    /// First byte past the end of this chunk, `None` if that overflows.
    pub fn end(&self) -> Option<u64> {
        self.offset.checked_add(u64::from(self.uncompressed_length))
    }
}

/// One file of the installable tree.
///
/// Identity for diffing is [`path`](Self::path); "changed" detection is
/// full-field equality including the chunk set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawManifestFile")]
pub struct ManifestFile {
    /// Depot that ships this file.
    pub depot_id: DepotId,
    /// Relative, `/`-separated path below the installation root.
    pub path: String,
    /// Size of the file on disk.
    pub size: u64,
    /// SHA-1 of the complete file.
    pub hash: Sha1Hash,
    /// Whether the file gets the executable permission bit.
    pub is_executable: bool,
    chunks: Vec<ManifestFileChunk>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawManifestFile {
    depot_id: DepotId,
    path: String,
    size: u64,
    hash: Sha1Hash,
    #[serde(default)]
    is_executable: bool,
    #[serde(default)]
    chunks: Vec<ManifestFileChunk>,
}

impl TryFrom<RawManifestFile> for ManifestFile {
    type Error = ManifestError;

    fn try_from(raw: RawManifestFile) -> Result<Self, Self::Error> {
        Self::new(
            raw.depot_id,
            &raw.path,
            raw.size,
            raw.hash,
            raw.chunks,
            raw.is_executable,
        )
    }
}

impl ManifestFile {
    /// Build a validated file entry.
    ///
    /// The path is normalised with [`normalize_path`] and the chunks are
    /// sorted by offset (then id).
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError`] for an invalid path, a repeated chunk id, or
    /// a chunk reaching past `size`.
    pub fn new(
        depot_id: DepotId,
        path: &str,
        size: u64,
        hash: Sha1Hash,
        mut chunks: Vec<ManifestFileChunk>,
        is_executable: bool,
    ) -> Result<Self, ManifestError> {
        let path = normalize_path(path)?;

        let mut seen = HashSet::with_capacity(chunks.len());
        for chunk in &chunks {
            if !seen.insert(chunk.chunk_id) {
                return Err(ManifestError::DuplicateChunk {
                    path,
                    chunk_id: chunk.chunk_id,
                });
            }
            if chunk.end().is_none_or(|end| end > size) {
                return Err(ManifestError::ChunkOutOfBounds {
                    path,
                    chunk_id: chunk.chunk_id,
                    offset: chunk.offset,
                    size,
                });
            }
        }
        chunks.sort_by(|a, b| a.offset.cmp(&b.offset).then(a.chunk_id.cmp(&b.chunk_id)));

        Ok(Self {
            depot_id,
            path,
            size,
            hash,
            is_executable,
            chunks,
        })
    }

    /// Chunks ordered by offset.
    pub fn chunks(&self) -> &[ManifestFileChunk] {
        &self.chunks
    }

    /// Look up a chunk by id.
    pub fn chunk(&self, chunk_id: &ChunkId) -> Option<&ManifestFileChunk> {
        self.chunks.iter().find(|c| &c.chunk_id == chunk_id)
    }

    /// Final path component.
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// One snapshot of an installable tree.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(into = "ManifestDocument", try_from = "ManifestDocument")]
pub struct Manifest {
    directories: BTreeSet<String>,
    files: BTreeMap<String, ManifestFile>,
}

/// Wire/disk layout of a manifest: plain lists.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManifestDocument {
    #[serde(default)]
    directories: Vec<String>,
    #[serde(default)]
    files: Vec<ManifestFile>,
}

impl From<Manifest> for ManifestDocument {
    fn from(manifest: Manifest) -> Self {
        Self {
            directories: manifest.directories.into_iter().collect(),
            files: manifest.files.into_values().collect(),
        }
    }
}

impl TryFrom<ManifestDocument> for Manifest {
    type Error = ManifestError;

    fn try_from(doc: ManifestDocument) -> Result<Self, Self::Error> {
        Self::from_parts(doc.directories, doc.files)
    }
}

impl Manifest {
    /// An empty manifest.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a manifest from directory and file lists.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::DuplicatePath`] if two files share a path and
    /// [`ManifestError::InvalidPath`] for an unsafe directory path.
    pub fn from_parts(
        directories: impl IntoIterator<Item = String>,
        files: impl IntoIterator<Item = ManifestFile>,
    ) -> Result<Self, ManifestError> {
        let mut manifest = Self::new();
        for dir in directories {
            manifest.insert_directory(&dir)?;
        }
        for file in files {
            manifest.insert_file(file)?;
        }
        Ok(manifest)
    }

    /// Add a directory. Re-adding an existing directory is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::InvalidPath`] for an unsafe path.
    pub fn insert_directory(&mut self, path: &str) -> Result<(), ManifestError> {
        self.directories.insert(normalize_path(path)?);
        Ok(())
    }

    /// Add a file.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::DuplicatePath`] if a file with the same path
    /// is already present.
    pub fn insert_file(&mut self, file: ManifestFile) -> Result<(), ManifestError> {
        if self.files.contains_key(&file.path) {
            return Err(ManifestError::DuplicatePath(file.path));
        }
        self.files.insert(file.path.clone(), file);
        Ok(())
    }

    /// Directory paths in lexical order.
    pub fn directories(&self) -> impl Iterator<Item = &str> {
        self.directories.iter().map(String::as_str)
    }

    /// `true` if `path` is a listed directory.
    pub fn contains_directory(&self, path: &str) -> bool {
        self.directories.contains(path)
    }

    /// Files in path order.
    pub fn files(&self) -> impl Iterator<Item = &ManifestFile> {
        self.files.values()
    }

    /// Look up a file by its relative path.
    pub fn file(&self, path: &str) -> Option<&ManifestFile> {
        self.files.get(path)
    }

    /// First file (in path order) whose final component is `name`.
    pub fn find_by_file_name(&self, name: &str) -> Option<&ManifestFile> {
        self.files.values().find(|f| f.file_name() == name)
    }

    /// Number of files.
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Total bytes of all files.
    pub fn total_size(&self) -> u64 {
        self.files.values().map(|f| f.size).sum()
    }

    /// `true` when there are neither files nor directories.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.directories.is_empty()
    }

    /// Assemble from collections taken out of other manifests, whose
    /// entries are already normalised and keyed by their own path.
    pub(crate) fn from_validated(
        directories: BTreeSet<String>,
        files: BTreeMap<String, ManifestFile>,
    ) -> Self {
        Self { directories, files }
    }

    pub(crate) fn directory_set(&self) -> &BTreeSet<String> {
        &self.directories
    }

    pub(crate) fn file_map(&self) -> &BTreeMap<String, ManifestFile> {
        &self.files
    }
}
