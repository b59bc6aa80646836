//! Error types for the content client and the installer.

use crate::net::pool::PoolError;
use crate::net::transport::TransportError;
use depot_schema::{DepotId, Platform, VersionError};
use std::path::PathBuf;
use thiserror::Error;

/// Errors from [`crate::ContentClient`].
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Not connected to the content provider")]
    NotConnected,

    #[error("Not authenticated with the content provider")]
    NotAuthenticated,

    #[error("Access denied while fetching {what} (HTTP {status})")]
    Unauthorized { what: String, status: u16 },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Malformed response for {what}: {reason}")]
    Format { what: String, reason: String },

    #[error("Giving up on {what} after {attempts} attempt(s): {source}")]
    Transport {
        what: String,
        attempts: u32,
        #[source]
        source: TransportError,
    },

    #[error("{what} failed verification: {reason}")]
    Corrupt { what: String, reason: String },

    #[error(transparent)]
    Pool(PoolError),

    #[error("Operation cancelled")]
    Cancelled,
}

impl From<PoolError> for ClientError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::Cancelled => Self::Cancelled,
            other => Self::Pool(other),
        }
    }
}

impl ClientError {
    /// Map a terminal transport failure for `what`. Retryable kinds become
    /// [`ClientError::Transport`] with a single attempt.
    pub(crate) fn from_transport(what: impl Into<String>, err: TransportError) -> Self {
        let what = what.into();
        match err {
            TransportError::Unauthorized(status) => Self::Unauthorized { what, status },
            TransportError::NotFound(detail) => Self::NotFound(format!("{what} ({detail})")),
            TransportError::Malformed(reason) => Self::Format { what, reason },
            source => Self::Transport {
                what,
                attempts: 1,
                source,
            },
        }
    }
}

/// Errors from [`crate::Installer`] and the apply step.
#[derive(Error, Debug)]
pub enum InstallError {
    #[error(transparent)]
    Client(ClientError),

    #[error("IO error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Local manifest {} is unreadable: {reason}", .path.display())]
    LocalManifest { path: PathBuf, reason: String },

    #[error(transparent)]
    Version(#[from] VersionError),

    #[error("Version marker {0} not found in the target manifest")]
    MarkerNotFound(String),

    #[error("No depots available for {0} or the reference platform")]
    NoDepots(Platform),

    #[error("No decryption key for depot {0}")]
    MissingKey(DepotId),

    #[error("{path} does not match its manifest hash after patching")]
    HashMismatch { path: String },

    #[error("Operation cancelled")]
    Cancelled,
}

impl From<ClientError> for InstallError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Cancelled => Self::Cancelled,
            other => Self::Client(other),
        }
    }
}

impl InstallError {
    /// Attach a path to an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
