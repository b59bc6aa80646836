//! Depot installer core: content client, connection pool and installer.

pub mod client;
pub mod config;
pub mod error;
pub mod install;
pub mod io;
pub mod net;
pub mod paths;
pub mod reporter;

pub use client::{ContentClient, Transports};
pub use config::{ConfigError, DepotConfig, PoolConfig};
pub use error::{ClientError, InstallError};
pub use install::{InstallOptions, InstallPhase, Installer, UpdateOutcome};
pub use net::pool::{ConnectionPool, PoolError, PooledConnection};
pub use net::retry::RetryPolicy;
pub use net::transport::{CdnTransport, ControlPlane, Credentials, EndpointDiscovery, TransportError};
pub use paths::*;
pub use reporter::{NullReporter, Reporter, TracingReporter};

/// User Agent string for content requests
pub const USER_AGENT: &str = concat!("depot-core/", env!("CARGO_PKG_VERSION"));
