//! Fixed-width digests: SHA-1 content hashes and CRC32 chunk checksums.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha1::{Digest, Sha1};

/// Errors produced when parsing a fixed-width digest from hex.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum HashError {
    /// The hex string decodes to the wrong number of bytes.
    #[error("Invalid digest length: expected {expected} bytes, got {actual}")]
    InvalidLength {
        /// Number of bytes the digest type holds.
        expected: usize,
        /// Number of bytes actually decoded.
        actual: usize,
    },

    /// The input is not valid hexadecimal.
    #[error("Invalid hex digest '{input}': {reason}")]
    InvalidHex {
        /// The offending input string.
        input: String,
        /// Decoder error message.
        reason: String,
    },
}

fn decode_fixed<const N: usize>(s: &str) -> Result<[u8; N], HashError> {
    let bytes = hex::decode(s).map_err(|e| HashError::InvalidHex {
        input: s.to_string(),
        reason: e.to_string(),
    })?;
    <[u8; N]>::try_from(bytes.as_slice()).map_err(|_| HashError::InvalidLength {
        expected: N,
        actual: bytes.len(),
    })
}

/// A 20-byte SHA-1 digest.
///
/// Used both as a whole-file content hash and as the content-addressed
/// identity of a chunk (see [`ChunkId`]). Serialized as 40 lowercase hex
/// characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Sha1Hash([u8; 20]);

/// Content-addressed chunk identity.
pub type ChunkId = Sha1Hash;

impl Sha1Hash {
    /// Digest width in bytes.
    pub const LEN: usize = 20;

    /// Wrap raw digest bytes.
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Compute the SHA-1 digest of `data`.
    pub fn compute(data: &[u8]) -> Self {
        Self(Sha1::digest(data).into())
    }

    /// Parse 40 hex characters.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] if `s` is not valid hex or does not decode to
    /// exactly 20 bytes.
    pub fn from_hex(s: &str) -> Result<Self, HashError> {
        decode_fixed(s).map(Self)
    }

    /// Lowercase hex representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Borrow the raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl From<[u8; 20]> for Sha1Hash {
    fn from(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }
}

impl std::fmt::Display for Sha1Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl std::fmt::Debug for Sha1Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Sha1Hash({})", self.to_hex())
    }
}

impl Serialize for Sha1Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Sha1Hash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// A 4-byte chunk checksum (CRC-32 of the uncompressed chunk payload).
///
/// Stored big-endian so the hex form reads like the CRC value itself.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Checksum([u8; 4]);

impl Checksum {
    /// Wrap raw checksum bytes.
    pub const fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// Build from a CRC-32 value.
    pub const fn from_u32(value: u32) -> Self {
        Self(value.to_be_bytes())
    }

    /// CRC-32 checksum of `data`.
    pub fn compute(data: &[u8]) -> Self {
        Self::from_u32(crc32fast::hash(data))
    }

    /// Parse 8 hex characters.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] if `s` is not valid hex or does not decode to
    /// exactly 4 bytes.
    pub fn from_hex(s: &str) -> Result<Self, HashError> {
        decode_fixed(s).map(Self)
    }

    /// Lowercase hex representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// The checksum as a CRC-32 value.
    pub const fn as_u32(&self) -> u32 {
        u32::from_be_bytes(self.0)
    }
}

impl std::fmt::Display for Checksum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl std::fmt::Debug for Checksum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Checksum({})", self.to_hex())
    }
}

impl Serialize for Checksum {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Checksum {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
