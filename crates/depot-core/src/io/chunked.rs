//! Placing chunk payloads at their offsets.

use depot_schema::ManifestFileChunk;
use std::io::SeekFrom;
use tokio::fs::File;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};

/// Write `data` at the chunk's offset in an open file.
///
/// # Errors
///
/// Any seek or write error.
pub async fn write_chunk(file: &mut File, chunk: &ManifestFileChunk, data: &[u8]) -> std::io::Result<()> {
    file.seek(SeekFrom::Start(chunk.offset)).await?;
    file.write_all(data).await
}

/// Copy `data` into its place inside an in-memory file image.
///
/// Returns `false` if the chunk does not fit inside `buffer`.
pub fn place_chunk(buffer: &mut [u8], chunk: &ManifestFileChunk, data: &[u8]) -> bool {
    let Ok(start) = usize::try_from(chunk.offset) else {
        return false;
    };
    let Some(end) = start.checked_add(data.len()) else {
        return false;
    };
    match buffer.get_mut(start..end) {
        Some(slot) => {
            slot.copy_from_slice(data);
            true
        }
        None => false,
    }
}
