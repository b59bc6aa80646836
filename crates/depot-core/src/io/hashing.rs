//! File hashing off the async runtime.

use depot_schema::Sha1Hash;
use sha1::{Digest, Sha1};
use std::io::Read;
use std::path::{Path, PathBuf};

/// SHA-1 of the file at `path`, or `None` if it does not exist.
///
/// Runs on the blocking pool so large files don't stall other tasks.
///
/// # Errors
///
/// Any IO error other than "not found".
pub async fn hash_file(path: &Path) -> std::io::Result<Option<Sha1Hash>> {
    let path: PathBuf = path.to_path_buf();
    tokio::task::spawn_blocking(move || hash_file_sync(&path))
        .await
        .map_err(std::io::Error::other)?
}

fn hash_file_sync(path: &Path) -> std::io::Result<Option<Sha1Hash>> {
    let mut file = match std::fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };

    let mut hasher = Sha1::new();
    let mut buffer = vec![0u8; 64 * 1024];
    loop {
        let count = file.read(&mut buffer)?;
        if count == 0 {
            break;
        }
        hasher.update(&buffer[..count]);
    }
    let digest: [u8; 20] = hasher.finalize().into();
    Ok(Some(Sha1Hash::from_bytes(digest)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hashes_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, b"abc").unwrap();

        let hash = hash_file(&path).await.unwrap().unwrap();
        assert_eq!(hash, Sha1Hash::compute(b"abc"));
    }

    #[tokio::test]
    async fn missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(hash_file(&dir.path().join("nope")).await.unwrap().is_none());
    }
}
