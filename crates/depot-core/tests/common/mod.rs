//! In-memory content provider shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use depot_core::net::endpoint::{Endpoint, ServerKind, ServerRecord};
use depot_core::{
    CdnTransport, ContentClient, ControlPlane, Credentials, DepotConfig, EndpointDiscovery, PoolConfig,
    RetryPolicy, TransportError, Transports,
};
use depot_schema::{
    AppId, Checksum, ChunkId, DepotDescriptor, DepotId, DepotKey, Manifest, ManifestFile, ManifestFileChunk,
    ManifestId, Platform, Sha1Hash,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const APP: AppId = 480;

/// Scripted misbehaviour for the next chunk request.
#[derive(Debug, Clone)]
pub enum Fault {
    Fail(TransportError),
    Corrupt,
}

#[derive(Default)]
pub struct FakeControl {
    depots: Mutex<HashMap<Platform, Vec<DepotDescriptor>>>,
    pub connects: AtomicUsize,
    pub logins: AtomicUsize,
    pub code_requests: AtomicUsize,
    pub listed: Mutex<Vec<Platform>>,
}

#[async_trait]
impl ControlPlane for FakeControl {
    async fn connect(&self) -> Result<(), TransportError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn authenticate(&self, _credentials: &Credentials) -> Result<(), TransportError> {
        self.logins.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list_depots(&self, _app_id: AppId, platform: Platform) -> Result<Vec<DepotDescriptor>, TransportError> {
        self.listed.lock().unwrap().push(platform);
        Ok(self.depots.lock().unwrap().get(&platform).cloned().unwrap_or_default())
    }

    async fn manifest_request_code(
        &self,
        _app_id: AppId,
        depot_id: DepotId,
        manifest_id: ManifestId,
    ) -> Result<u64, TransportError> {
        self.code_requests.fetch_add(1, Ordering::SeqCst);
        Ok(u64::from(depot_id) * 1_000 + manifest_id)
    }
}

pub struct FakeDiscovery {
    pub records: Mutex<Vec<ServerRecord>>,
}

#[async_trait]
impl EndpointDiscovery for FakeDiscovery {
    async fn discover(&self) -> Result<Vec<ServerRecord>, TransportError> {
        Ok(self.records.lock().unwrap().clone())
    }
}

#[derive(Default)]
pub struct FakeCdn {
    manifests: Mutex<HashMap<(DepotId, ManifestId), Manifest>>,
    chunks: Mutex<HashMap<ChunkId, Bytes>>,
    faults: Mutex<VecDeque<Fault>>,
    /// Chunk ids requested, in order.
    pub requested: Mutex<Vec<ChunkId>>,
    /// Host that served each chunk request, in order.
    pub hosts: Mutex<Vec<String>>,
    pub manifest_requests: AtomicUsize,
}

impl FakeCdn {
    pub fn inject(&self, fault: Fault) {
        self.faults.lock().unwrap().push_back(fault);
    }

    pub fn chunk_requests(&self) -> usize {
        self.requested.lock().unwrap().len()
    }

    pub fn reset_counters(&self) {
        self.requested.lock().unwrap().clear();
        self.hosts.lock().unwrap().clear();
    }
}

#[async_trait]
impl CdnTransport for FakeCdn {
    async fn fetch_manifest(
        &self,
        _endpoint: &Endpoint,
        depot: &DepotDescriptor,
        request_code: u64,
    ) -> Result<Manifest, TransportError> {
        self.manifest_requests.fetch_add(1, Ordering::SeqCst);
        assert_eq!(request_code, u64::from(depot.id) * 1_000 + depot.manifest_id);
        self.manifests
            .lock()
            .unwrap()
            .get(&(depot.id, depot.manifest_id))
            .cloned()
            .ok_or_else(|| TransportError::NotFound(format!("manifest {}", depot.manifest_id)))
    }

    async fn fetch_chunk(
        &self,
        endpoint: &Endpoint,
        _depot_id: DepotId,
        _key: &DepotKey,
        chunk: &ManifestFileChunk,
    ) -> Result<Bytes, TransportError> {
        self.requested.lock().unwrap().push(chunk.chunk_id);
        self.hosts.lock().unwrap().push(endpoint.host().to_string());

        let fault = self.faults.lock().unwrap().pop_front();
        let data = self
            .chunks
            .lock()
            .unwrap()
            .get(&chunk.chunk_id)
            .cloned()
            .ok_or_else(|| TransportError::NotFound(chunk.chunk_id.to_hex()))?;

        match fault {
            Some(Fault::Fail(err)) => Err(err),
            Some(Fault::Corrupt) => {
                let mut mangled = data.to_vec();
                if let Some(first) = mangled.first_mut() {
                    *first ^= 0xff;
                }
                Ok(Bytes::from(mangled))
            }
            None => Ok(data),
        }
    }
}

/// Control plane, discovery and CDN wired together.
pub struct FakeProvider {
    pub control: Arc<FakeControl>,
    pub discovery: Arc<FakeDiscovery>,
    pub cdn: Arc<FakeCdn>,
}

impl FakeProvider {
    pub fn new(hosts: &[&str]) -> Self {
        let records = hosts.iter().map(|h| ServerRecord::new(*h, ServerKind::Cdn)).collect();
        Self {
            control: Arc::new(FakeControl::default()),
            discovery: Arc::new(FakeDiscovery {
                records: Mutex::new(records),
            }),
            cdn: Arc::new(FakeCdn::default()),
        }
    }

    /// Build a file from its chunk payloads and serve those chunks.
    pub fn file(&self, depot_id: DepotId, path: &str, parts: &[&[u8]]) -> ManifestFile {
        self.file_with_mode(depot_id, path, parts, false)
    }

    pub fn file_with_mode(&self, depot_id: DepotId, path: &str, parts: &[&[u8]], executable: bool) -> ManifestFile {
        let mut offset = 0u64;
        let mut content = Vec::new();
        let mut chunks = Vec::new();
        for part in parts {
            let chunk_id = Sha1Hash::compute(part);
            chunks.push(ManifestFileChunk {
                chunk_id,
                checksum: Checksum::compute(part),
                offset,
                compressed_length: part.len() as u32,
                uncompressed_length: part.len() as u32,
            });
            self.cdn
                .chunks
                .lock()
                .unwrap()
                .insert(chunk_id, Bytes::copy_from_slice(part));
            offset += part.len() as u64;
            content.extend_from_slice(part);
        }
        ManifestFile::new(depot_id, path, offset, Sha1Hash::compute(&content), chunks, executable).unwrap()
    }

    /// Publish `manifest` as revision `manifest_id` of `depot_id` for `platform`,
    /// replacing any earlier revision of that depot.
    pub fn publish(&self, platform: Platform, depot_id: DepotId, manifest_id: ManifestId, manifest: Manifest) {
        self.cdn
            .manifests
            .lock()
            .unwrap()
            .insert((depot_id, manifest_id), manifest);

        let mut depots = self.control.depots.lock().unwrap();
        let list = depots.entry(platform).or_default();
        list.retain(|d| d.id != depot_id);
        list.push(DepotDescriptor::new(depot_id, manifest_id, key_for(depot_id)));
    }

    pub fn transports(&self) -> Transports {
        Transports {
            control: self.control.clone(),
            discovery: self.discovery.clone(),
            cdn: self.cdn.clone(),
        }
    }

    pub fn client(&self, retry: RetryPolicy) -> Arc<ContentClient> {
        let config = DepotConfig {
            app_id: APP,
            retry,
            pool: PoolConfig {
                capacity: 2,
                ..PoolConfig::default()
            },
            ..DepotConfig::default()
        };
        Arc::new(ContentClient::new(&config, Credentials::Anonymous, self.transports()))
    }
}

pub fn key_for(depot_id: DepotId) -> DepotKey {
    DepotKey::new(depot_id.to_be_bytes().to_vec())
}

pub fn manifest(dirs: &[&str], files: Vec<ManifestFile>) -> Manifest {
    Manifest::from_parts(dirs.iter().map(|d| d.to_string()), files).unwrap()
}
