//! Content server records and pooled endpoint identity.

use depot_schema::AppId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Role of a content server as advertised by discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerKind {
    /// Public CDN node.
    Cdn,
    /// Site-local cache.
    Cache,
    /// Anything this client does not know how to use.
    #[serde(other)]
    Other,
}

/// One server as returned by discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerRecord {
    /// `host` or `host:port`.
    pub host: String,
    /// Whether to speak HTTPS.
    #[serde(default)]
    pub https: bool,
    /// Advertised role.
    pub kind: ServerKind,
    /// Apps this server may serve. Empty means all.
    #[serde(default)]
    pub allowed_app_ids: Vec<AppId>,
}

impl ServerRecord {
    /// A server that serves every app.
    pub fn new(host: impl Into<String>, kind: ServerKind) -> Self {
        Self {
            host: host.into(),
            https: false,
            kind,
            allowed_app_ids: Vec::new(),
        }
    }

    /// Whether this server may be pooled for `app_id`.
    pub fn is_eligible(&self, app_id: AppId, accepted: &[ServerKind]) -> bool {
        accepted.contains(&self.kind)
            && (self.allowed_app_ids.is_empty() || self.allowed_app_ids.contains(&app_id))
    }

    /// Scheme and authority, without a trailing slash.
    pub fn base_url(&self) -> String {
        let scheme = if self.https { "https" } else { "http" };
        format!("{scheme}://{}", self.host.trim_end_matches('/'))
    }
}

/// Identity assigned to an endpoint when it enters a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointId(pub(crate) u64);

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A server admitted to a [`super::pool::ConnectionPool`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    id: EndpointId,
    record: ServerRecord,
}

impl Endpoint {
    pub(crate) fn new(id: EndpointId, record: ServerRecord) -> Self {
        Self { id, record }
    }

    /// Pool-assigned identity.
    pub fn id(&self) -> EndpointId {
        self.id
    }

    /// Discovery record.
    pub fn record(&self) -> &ServerRecord {
        &self.record
    }

    /// `host` or `host:port`.
    pub fn host(&self) -> &str {
        &self.record.host
    }

    /// See [`ServerRecord::base_url`].
    pub fn base_url(&self) -> String {
        self.record.base_url()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.record.host, self.id)
    }
}
