//! Identifiers and per-depot credentials.

use serde::{Deserialize, Serialize};

/// Identifier of the hosted application whose depots are installed.
pub type AppId = u32;

/// Identifier of a depot.
pub type DepotId = u32;

/// Identifier of one published manifest revision of a depot.
pub type ManifestId = u64;

/// Per-depot secret needed to decode chunk payloads.
///
/// Serialized as hex. The `Debug` output never shows the key material.
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DepotKey(#[serde(with = "hex")] Vec<u8>);

impl DepotKey {
    /// Wrap raw key bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Borrow the raw key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// `true` when no key material is present.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for DepotKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DepotKey(<{} bytes>)", self.0.len())
    }
}

/// Everything needed to fetch one depot's manifest and chunks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepotDescriptor {
    /// Depot identifier.
    pub id: DepotId,
    /// Manifest revision to install.
    pub manifest_id: ManifestId,
    /// Key for decoding chunk payloads.
    pub decryption_key: DepotKey,
}

impl DepotDescriptor {
    /// Describe a depot revision.
    pub fn new(id: DepotId, manifest_id: ManifestId, decryption_key: DepotKey) -> Self {
        Self {
            id,
            manifest_id,
            decryption_key,
        }
    }
}
