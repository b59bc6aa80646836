//! Session-scoped client for the content provider.
//!
//! The client owns the session lifecycle (connect, then authenticate), the
//! connection pool created on login, and the retry policy applied to every
//! CDN fetch. Calls made before the session is ready fail fast with
//! [`ClientError::NotConnected`] or [`ClientError::NotAuthenticated`].
//!
//! Retry classification:
//! - timeout: retry on the same connection
//! - 401/403, 404, malformed payload: fail immediately
//! - anything else: mark the connection broken, borrow another, retry

use crate::config::{DepotConfig, PoolConfig};
use crate::error::ClientError;
use crate::install::ChunkSource;
use crate::io::chunked::place_chunk;
use crate::net::endpoint::Endpoint;
use crate::net::pool::{ConnectionPool, PooledConnection};
use crate::net::retry::{RetryPolicy, sleep_or_cancel};
use crate::net::transport::{CdnTransport, ControlPlane, Credentials, EndpointDiscovery, TransportError};
use async_trait::async_trait;
use bytes::Bytes;
use depot_schema::{
    AppId, Checksum, DepotDescriptor, DepotId, DepotKey, Manifest, ManifestFile, ManifestFileChunk, ManifestId,
    Platform, Sha1Hash,
};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// The three wire-facing collaborators of a [`ContentClient`].
#[derive(Clone)]
pub struct Transports {
    /// Session and metadata service.
    pub control: Arc<dyn ControlPlane>,
    /// Content server discovery.
    pub discovery: Arc<dyn EndpointDiscovery>,
    /// Manifest and chunk downloads.
    pub cdn: Arc<dyn CdnTransport>,
}

#[cfg(feature = "network")]
impl Transports {
    /// HTTP transports rooted at `config.control_url`.
    ///
    /// # Errors
    ///
    /// Returns the reqwest error if the HTTP client cannot be built.
    pub fn http(config: &DepotConfig) -> reqwest::Result<Self> {
        use crate::net::http::{HttpCdn, HttpControlPlane, build_client};

        let client = build_client(config.request_timeout())?;
        let control = Arc::new(HttpControlPlane::new(client.clone(), &config.control_url));
        Ok(Self {
            control: control.clone(),
            discovery: control,
            cdn: Arc::new(HttpCdn::new(client)),
        })
    }
}

/// Largest file [`ContentClient::fetch_file_bytes`] will buffer.
pub const MAX_IN_MEMORY_FILE: u64 = 16 * 1024 * 1024;

struct CachedCode {
    code: u64,
    fetched: Instant,
}

/// Client for one application's depots.
pub struct ContentClient {
    app_id: AppId,
    credentials: Credentials,
    transports: Transports,
    pool_config: PoolConfig,
    retry: RetryPolicy,
    code_ttl: Duration,
    session: tokio::sync::Mutex<()>,
    connected: AtomicBool,
    pool: OnceLock<ConnectionPool>,
    request_codes: Mutex<HashMap<(DepotId, ManifestId), CachedCode>>,
}

impl std::fmt::Debug for ContentClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentClient")
            .field("app_id", &self.app_id)
            .field("credentials", &self.credentials)
            .field("connected", &self.is_connected())
            .field("pool", &self.pool.get())
            .finish_non_exhaustive()
    }
}

impl ContentClient {
    /// Build a disconnected client.
    pub fn new(config: &DepotConfig, credentials: Credentials, transports: Transports) -> Self {
        Self {
            app_id: config.app_id,
            credentials,
            transports,
            pool_config: config.pool.clone(),
            retry: config.retry,
            code_ttl: config.manifest_code_ttl(),
            session: tokio::sync::Mutex::new(()),
            connected: AtomicBool::new(false),
            pool: OnceLock::new(),
            request_codes: Mutex::new(HashMap::new()),
        }
    }

    /// Application this client installs.
    pub fn app_id(&self) -> AppId {
        self.app_id
    }

    /// Whether [`connect`](Self::connect) has succeeded.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Whether [`authenticate`](Self::authenticate) has succeeded.
    pub fn is_authenticated(&self) -> bool {
        self.pool.get().is_some()
    }

    /// Connection pool, once authenticated.
    pub fn pool(&self) -> Option<&ConnectionPool> {
        self.pool.get()
    }

    /// Open the session. Idempotent.
    ///
    /// # Errors
    ///
    /// Propagates the control plane failure.
    pub async fn connect(&self) -> Result<(), ClientError> {
        let _session = self.session.lock().await;
        if self.is_connected() {
            return Ok(());
        }

        self.transports
            .control
            .connect()
            .await
            .map_err(|e| ClientError::from_transport("session", e))?;
        self.connected.store(true, Ordering::Release);
        tracing::debug!(app_id = self.app_id, "Connected to content provider");
        Ok(())
    }

    /// Log in and build the connection pool. Idempotent.
    ///
    /// # Errors
    ///
    /// [`ClientError::NotConnected`] before [`connect`](Self::connect), the
    /// control plane failure, or a pool initialisation failure.
    pub async fn authenticate(&self) -> Result<(), ClientError> {
        let _session = self.session.lock().await;
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }
        if self.is_authenticated() {
            return Ok(());
        }

        self.transports
            .control
            .authenticate(&self.credentials)
            .await
            .map_err(|e| ClientError::from_transport("login", e))?;

        let pool = ConnectionPool::initialize(
            self.app_id,
            &self.pool_config,
            Arc::clone(&self.transports.discovery),
        )
        .await?;

        if self.pool.set(pool).is_err() {
            tracing::debug!("Connection pool already initialised");
        }
        tracing::info!(app_id = self.app_id, "Authenticated");
        Ok(())
    }

    fn ready(&self) -> Result<&ConnectionPool, ClientError> {
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }
        self.pool.get().ok_or(ClientError::NotAuthenticated)
    }

    /// Depots published for `platform`, falling back to
    /// [`Platform::REFERENCE`] when none are.
    ///
    /// # Errors
    ///
    /// Session state or control plane failures.
    pub async fn enumerate_eligible_depots(&self, platform: Platform) -> Result<Vec<DepotDescriptor>, ClientError> {
        self.ready()?;

        let depots = self.list_depots(platform).await?;
        if !depots.is_empty() || platform == Platform::REFERENCE {
            return Ok(depots);
        }

        tracing::warn!(
            %platform,
            fallback = %Platform::REFERENCE,
            "No depots for platform, falling back"
        );
        self.list_depots(Platform::REFERENCE).await
    }

    async fn list_depots(&self, platform: Platform) -> Result<Vec<DepotDescriptor>, ClientError> {
        self.transports
            .control
            .list_depots(self.app_id, platform)
            .await
            .map_err(|e| ClientError::from_transport(format!("depot list for {platform}"), e))
    }

    async fn request_code(&self, depot: &DepotDescriptor) -> Result<u64, ClientError> {
        let key = (depot.id, depot.manifest_id);
        {
            let codes = self.request_codes.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(cached) = codes.get(&key).filter(|c| c.fetched.elapsed() < self.code_ttl) {
                return Ok(cached.code);
            }
        }

        let code = self
            .transports
            .control
            .manifest_request_code(self.app_id, depot.id, depot.manifest_id)
            .await
            .map_err(|e| ClientError::from_transport(format!("request code for depot {}", depot.id), e))?;

        self.request_codes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, CachedCode {
                code,
                fetched: Instant::now(),
            });
        Ok(code)
    }

    /// Download one depot's manifest.
    ///
    /// # Errors
    ///
    /// Session state, request code, or fetch failures after retries.
    pub async fn fetch_manifest(
        &self,
        depot: &DepotDescriptor,
        cancel: &CancellationToken,
    ) -> Result<Manifest, ClientError> {
        let pool = self.ready()?;
        let code = self.request_code(depot).await?;
        let what = format!("manifest {} of depot {}", depot.manifest_id, depot.id);
        let cdn = &self.transports.cdn;

        let manifest = self
            .with_retry(pool, &what, cancel, |endpoint| async move {
                cdn.fetch_manifest(&endpoint, depot, code).await
            })
            .await?;
        tracing::debug!(depot = depot.id, files = manifest.file_count(), "Fetched manifest");
        Ok(manifest)
    }

    /// Download every depot's manifest concurrently, preserving order.
    ///
    /// The first failure is returned and the remaining downloads are dropped.
    ///
    /// # Errors
    ///
    /// The first [`fetch_manifest`](Self::fetch_manifest) failure.
    pub async fn fetch_manifests(
        &self,
        depots: &[DepotDescriptor],
        cancel: &CancellationToken,
    ) -> Result<Vec<Manifest>, ClientError> {
        futures::future::try_join_all(depots.iter().map(|depot| self.fetch_manifest(depot, cancel))).await
    }

    /// Download one chunk and check its length and checksum.
    ///
    /// A payload that fails either check is treated like a network failure
    /// of the serving endpoint.
    ///
    /// # Errors
    ///
    /// Session state or fetch failures after retries.
    pub async fn fetch_chunk(
        &self,
        depot_id: DepotId,
        key: &DepotKey,
        chunk: &ManifestFileChunk,
        cancel: &CancellationToken,
    ) -> Result<Bytes, ClientError> {
        let pool = self.ready()?;
        let what = format!("chunk {} of depot {depot_id}", chunk.chunk_id);
        let cdn = &self.transports.cdn;

        self.with_retry(pool, &what, cancel, |endpoint| async move {
            let data = cdn.fetch_chunk(&endpoint, depot_id, key, chunk).await?;
            verify_chunk(chunk, &data)?;
            Ok::<_, TransportError>(data)
        })
        .await
    }

    /// Download a whole file into memory and check its SHA-1.
    ///
    /// # Errors
    ///
    /// Chunk fetch failures, or [`ClientError::Corrupt`] if the file is larger
    /// than [`MAX_IN_MEMORY_FILE`] or the assembled bytes do not match the
    /// manifest.
    pub async fn fetch_file_bytes(
        &self,
        file: &ManifestFile,
        key: &DepotKey,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, ClientError> {
        let corrupt = |reason: String| ClientError::Corrupt {
            what: file.path.clone(),
            reason,
        };
        if file.size > MAX_IN_MEMORY_FILE {
            return Err(corrupt(format!(
                "{} bytes exceeds the {MAX_IN_MEMORY_FILE} byte in-memory limit",
                file.size
            )));
        }
        let size = usize::try_from(file.size)
            .map_err(|_| corrupt(format!("{} bytes do not fit in memory", file.size)))?;

        let mut buffer = vec![0u8; size];
        for chunk in file.chunks() {
            let data = self.fetch_chunk(file.depot_id, key, chunk, cancel).await?;
            if !place_chunk(&mut buffer, chunk, &data) {
                return Err(corrupt(format!("chunk {} lies outside the file", chunk.chunk_id)));
            }
        }

        let actual = Sha1Hash::compute(&buffer);
        if actual != file.hash {
            return Err(corrupt(format!("hash {actual}, expected {}", file.hash)));
        }
        Ok(buffer)
    }

    async fn with_retry<T, F, Fut>(
        &self,
        pool: &ConnectionPool,
        what: &str,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T, ClientError>
    where
        F: FnMut(Endpoint) -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let mut held: Option<PooledConnection> = None;
        let mut attempt = 1u32;

        loop {
            let mut conn = match held.take() {
                Some(conn) => conn,
                None => pool.borrow(cancel).await?,
            };

            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(ClientError::Cancelled),
                result = op(conn.endpoint().clone()) => result,
            };
            let err = match result {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            match err {
                TransportError::Unauthorized(_) | TransportError::NotFound(_) | TransportError::Malformed(_) => {
                    return Err(ClientError::from_transport(what, err));
                }
                TransportError::Timeout => {
                    tracing::debug!(endpoint = %conn.endpoint(), attempt, "{what} timed out");
                    held = Some(conn);
                }
                TransportError::Other(ref reason) => {
                    tracing::warn!(endpoint = %conn.endpoint(), attempt, error = %reason, "{what} failed, replacing connection");
                    conn.mark_broken();
                    drop(conn);
                }
            }

            if !self.retry.allows_retry(attempt) {
                return Err(ClientError::Transport {
                    what: what.to_string(),
                    attempts: attempt,
                    source: err,
                });
            }
            if !sleep_or_cancel(self.retry.backoff(attempt), cancel).await {
                return Err(ClientError::Cancelled);
            }
            attempt += 1;
        }
    }
}

fn verify_chunk(chunk: &ManifestFileChunk, data: &[u8]) -> Result<(), TransportError> {
    if data.len() != chunk.uncompressed_length as usize {
        return Err(TransportError::Other(format!(
            "chunk {} is {} bytes, expected {}",
            chunk.chunk_id,
            data.len(),
            chunk.uncompressed_length
        )));
    }
    let actual = Checksum::compute(data);
    if actual != chunk.checksum {
        return Err(TransportError::Other(format!(
            "chunk {} checksum {actual}, expected {}",
            chunk.chunk_id, chunk.checksum
        )));
    }
    Ok(())
}

#[async_trait]
impl ChunkSource for ContentClient {
    async fn fetch_chunk(
        &self,
        depot_id: DepotId,
        key: &DepotKey,
        chunk: &ManifestFileChunk,
        cancel: &CancellationToken,
    ) -> Result<Bytes, ClientError> {
        ContentClient::fetch_chunk(self, depot_id, key, chunk, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk_for(data: &[u8]) -> ManifestFileChunk {
        ManifestFileChunk {
            chunk_id: Sha1Hash::compute(data),
            checksum: Checksum::compute(data),
            offset: 0,
            compressed_length: data.len() as u32,
            uncompressed_length: data.len() as u32,
        }
    }

    #[test]
    fn verify_chunk_accepts_matching_payload() {
        let chunk = chunk_for(b"payload");
        assert!(verify_chunk(&chunk, b"payload").is_ok());
    }

    #[test]
    fn verify_chunk_rejects_length_and_checksum_mismatch() {
        let chunk = chunk_for(b"payload");
        assert!(matches!(verify_chunk(&chunk, b"short"), Err(TransportError::Other(_))));
        assert!(matches!(verify_chunk(&chunk, b"PAYLOAD"), Err(TransportError::Other(_))));
    }
}
