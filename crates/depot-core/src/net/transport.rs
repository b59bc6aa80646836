//! Seams between the content client and the wire.
//!
//! The client never talks HTTP directly. It drives three traits: the control
//! plane (session, depot listing, request codes), endpoint discovery, and the
//! CDN transport that serves manifests and chunks. [`super::http`] provides
//! the reqwest implementations; tests provide in-memory ones.

use super::endpoint::{Endpoint, ServerRecord};
use async_trait::async_trait;
use bytes::Bytes;
use depot_schema::{AppId, DepotDescriptor, DepotId, DepotKey, Manifest, ManifestFileChunk, ManifestId, Platform};
use thiserror::Error;

/// Failure of a single remote call, classified for the retry policy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The request did not complete in time. Retried on the same connection.
    #[error("Request timed out")]
    Timeout,

    /// Access denied (HTTP 401/403). Never retried.
    #[error("Access denied (HTTP {0})")]
    Unauthorized(u16),

    /// The resource does not exist (HTTP 404). Never retried.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The server answered with something that cannot be decoded. Never retried.
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// Anything else. The connection is considered broken.
    #[error("{0}")]
    Other(String),
}

/// Login material for the control plane.
#[derive(Clone, Default, PartialEq, Eq)]
pub enum Credentials {
    /// Anonymous session, sufficient for freely distributed depots.
    #[default]
    Anonymous,
    /// Named account.
    Account {
        /// Account name.
        name: String,
        /// Password or access token.
        secret: String,
    },
}

impl Credentials {
    /// Read `DEPOT_ACCOUNT` / `DEPOT_SECRET`, falling back to anonymous.
    pub fn from_env() -> Self {
        match (std::env::var("DEPOT_ACCOUNT"), std::env::var("DEPOT_SECRET")) {
            (Ok(name), Ok(secret)) if !name.is_empty() => Self::Account { name, secret },
            _ => Self::Anonymous,
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Anonymous => f.write_str("Anonymous"),
            Self::Account { name, .. } => f
                .debug_struct("Account")
                .field("name", name)
                .field("secret", &"<redacted>")
                .finish(),
        }
    }
}

/// Session and metadata service of the content provider.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Open the session.
    async fn connect(&self) -> Result<(), TransportError>;

    /// Log in on an open session.
    async fn authenticate(&self, credentials: &Credentials) -> Result<(), TransportError>;

    /// Depots of `app_id` that apply to `platform`.
    async fn list_depots(
        &self,
        app_id: AppId,
        platform: Platform,
    ) -> Result<Vec<DepotDescriptor>, TransportError>;

    /// Short-lived code authorising one manifest download.
    async fn manifest_request_code(
        &self,
        app_id: AppId,
        depot_id: DepotId,
        manifest_id: ManifestId,
    ) -> Result<u64, TransportError>;
}

/// Source of candidate content servers.
#[async_trait]
pub trait EndpointDiscovery: Send + Sync {
    /// Current server list, unfiltered.
    async fn discover(&self) -> Result<Vec<ServerRecord>, TransportError>;
}

/// Fetches manifests and chunks from one content server.
///
/// Implementations hand back decoded payloads: the depot key is passed in so
/// a transport for an encrypted CDN can decrypt before returning.
#[async_trait]
pub trait CdnTransport: Send + Sync {
    /// Download and decode a depot manifest.
    async fn fetch_manifest(
        &self,
        endpoint: &Endpoint,
        depot: &DepotDescriptor,
        request_code: u64,
    ) -> Result<Manifest, TransportError>;

    /// Download one chunk payload.
    async fn fetch_chunk(
        &self,
        endpoint: &Endpoint,
        depot_id: DepotId,
        key: &DepotKey,
        chunk: &ManifestFileChunk,
    ) -> Result<Bytes, TransportError>;
}
