//! Bounded FIFO pool of content server endpoints.
//!
//! A semaphore counts idle endpoints; a permit is consumed on borrow and
//! re-added once the endpoint is back in the idle queue. A connection that is
//! dropped after [`PooledConnection::mark_broken`] does not return its
//! endpoint. Instead a background task asks discovery for a fresh eligible
//! server and queues that in its place, so the pool never shrinks.

use super::endpoint::{Endpoint, EndpointId, ServerKind, ServerRecord};
use super::transport::{EndpointDiscovery, TransportError};
use crate::config::PoolConfig;
use depot_schema::AppId;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// Errors from [`ConnectionPool`].
#[derive(Error, Debug)]
pub enum PoolError {
    #[error("Endpoint discovery failed: {0}")]
    Discovery(#[source] TransportError),

    #[error("No eligible content servers for app {0}")]
    NoEligibleEndpoints(AppId),

    #[error("Connection pool is exhausted")]
    Exhausted,

    #[error("Cancelled while waiting for a connection")]
    Cancelled,
}

/// Snapshot of pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Endpoints waiting in the queue.
    pub idle: usize,
    /// Endpoints currently lent out.
    pub borrowed: usize,
    /// Broken endpoints whose replacement is still in flight.
    pub replacing: usize,
}

impl PoolStats {
    /// Endpoints owned by the pool in any state.
    pub fn size(&self) -> usize {
        self.idle + self.borrowed + self.replacing
    }
}

struct PoolState {
    idle: VecDeque<Endpoint>,
    borrowed: HashSet<EndpointId>,
    replacing: usize,
    /// Hosts owned by the pool, so discovery never admits one twice.
    hosts: HashSet<String>,
}

struct PoolShared {
    app_id: AppId,
    accepted: Vec<ServerKind>,
    discovery: Arc<dyn EndpointDiscovery>,
    state: Mutex<PoolState>,
    available: Semaphore,
    next_id: AtomicU64,
}

/// Shared handle to a pool of endpoints. Cloning is cheap.
#[derive(Clone)]
pub struct ConnectionPool {
    shared: Arc<PoolShared>,
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("app_id", &self.shared.app_id)
            .field("stats", &self.stats())
            .finish()
    }
}

impl ConnectionPool {
    /// Run discovery and fill the pool with up to `config.capacity` eligible
    /// endpoints, in discovery order.
    ///
    /// # Errors
    ///
    /// Fails if discovery fails or yields no eligible server.
    pub async fn initialize(
        app_id: AppId,
        config: &PoolConfig,
        discovery: Arc<dyn EndpointDiscovery>,
    ) -> Result<Self, PoolError> {
        let records = discovery.discover().await.map_err(PoolError::Discovery)?;
        let capacity = config.capacity.max(1);
        let next_id = AtomicU64::new(0);

        let mut hosts = HashSet::new();
        let mut idle = VecDeque::new();
        for record in records {
            if idle.len() >= capacity {
                break;
            }
            if !record.is_eligible(app_id, &config.accepted_kinds) {
                tracing::debug!(host = %record.host, kind = ?record.kind, "Skipping ineligible server");
                continue;
            }
            if !hosts.insert(record.host.clone()) {
                continue;
            }
            let id = EndpointId(next_id.fetch_add(1, Ordering::Relaxed));
            idle.push_back(Endpoint::new(id, record));
        }

        if idle.is_empty() {
            return Err(PoolError::NoEligibleEndpoints(app_id));
        }
        tracing::info!(app_id, endpoints = idle.len(), "Connection pool ready");

        let available = Semaphore::new(idle.len());
        Ok(Self {
            shared: Arc::new(PoolShared {
                app_id,
                accepted: config.accepted_kinds.clone(),
                discovery,
                state: Mutex::new(PoolState {
                    idle,
                    borrowed: HashSet::new(),
                    replacing: 0,
                    hosts,
                }),
                available,
                next_id,
            }),
        })
    }

    /// Take the oldest idle endpoint, waiting until one is available.
    ///
    /// # Errors
    ///
    /// [`PoolError::Cancelled`] if `cancel` fires while waiting,
    /// [`PoolError::Exhausted`] if the pool owns no endpoints at all.
    ///
    /// # Panics
    ///
    /// If an endpoint would be lent out twice.
    pub async fn borrow(&self, cancel: &CancellationToken) -> Result<PooledConnection, PoolError> {
        if self.stats().size() == 0 {
            return Err(PoolError::Exhausted);
        }

        let permit = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(PoolError::Cancelled),
            permit = self.shared.available.acquire() => permit.map_err(|_| PoolError::Exhausted)?,
        };
        permit.forget();

        let endpoint = {
            let mut state = self.shared.lock();
            let Some(endpoint) = state.idle.pop_front() else {
                return Err(PoolError::Exhausted);
            };
            assert!(
                state.borrowed.insert(endpoint.id()),
                "endpoint {endpoint} borrowed twice"
            );
            endpoint
        };

        tracing::trace!(endpoint = %endpoint, "Borrowed connection");
        Ok(PooledConnection {
            shared: Arc::clone(&self.shared),
            endpoint,
            broken: false,
        })
    }

    /// Current occupancy.
    pub fn stats(&self) -> PoolStats {
        let state = self.shared.lock();
        PoolStats {
            idle: state.idle.len(),
            borrowed: state.borrowed.len(),
            replacing: state.replacing,
        }
    }
}

impl PoolShared {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self, endpoint: Endpoint) {
        {
            let mut state = self.lock();
            state.borrowed.remove(&endpoint.id());
            state.idle.push_back(endpoint);
        }
        self.available.add_permits(1);
    }

    fn retire(self: &Arc<Self>, endpoint: Endpoint) {
        {
            let mut state = self.lock();
            state.borrowed.remove(&endpoint.id());
            state.replacing += 1;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let shared = Arc::clone(self);
                handle.spawn(async move { shared.replace(endpoint).await });
            }
            Err(_) => {
                tracing::warn!(endpoint = %endpoint, "No runtime to replace broken endpoint, reusing it");
                self.requeue(endpoint, None);
            }
        }
    }

    async fn replace(&self, broken: Endpoint) {
        let fresh = match self.discovery.discover().await {
            Ok(records) => {
                let state = self.lock();
                records
                    .into_iter()
                    .find(|r| r.is_eligible(self.app_id, &self.accepted) && !state.hosts.contains(&r.host))
            }
            Err(e) => {
                tracing::warn!(endpoint = %broken, error = %e, "Discovery failed while replacing endpoint");
                None
            }
        };

        match fresh {
            Some(record) => {
                tracing::debug!(broken = %broken, replacement = %record.host, "Replaced broken endpoint");
                self.requeue(broken, Some(record));
            }
            None => {
                tracing::warn!(endpoint = %broken, "No replacement available, reusing broken endpoint");
                self.requeue(broken, None);
            }
        }
    }

    fn requeue(&self, broken: Endpoint, replacement: Option<ServerRecord>) {
        {
            let mut state = self.lock();
            state.replacing -= 1;
            let endpoint = match replacement {
                Some(record) => {
                    state.hosts.remove(broken.host());
                    state.hosts.insert(record.host.clone());
                    let id = EndpointId(self.next_id.fetch_add(1, Ordering::Relaxed));
                    Endpoint::new(id, record)
                }
                None => broken,
            };
            state.idle.push_back(endpoint);
        }
        self.available.add_permits(1);
    }
}

/// Exclusive use of one pooled endpoint.
///
/// Returned to the back of the queue on drop, or replaced if
/// [`mark_broken`](Self::mark_broken) was called.
pub struct PooledConnection {
    shared: Arc<PoolShared>,
    endpoint: Endpoint,
    broken: bool,
}

impl PooledConnection {
    /// The borrowed endpoint.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Do not return this endpoint to the pool; replace it instead.
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }

    /// Whether [`mark_broken`](Self::mark_broken) was called.
    pub fn is_broken(&self) -> bool {
        self.broken
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("endpoint", &self.endpoint)
            .field("broken", &self.broken)
            .finish()
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let endpoint = self.endpoint.clone();
        if self.broken {
            self.shared.retire(endpoint);
        } else {
            self.shared.release(endpoint);
        }
    }
}
