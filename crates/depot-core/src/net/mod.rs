//! Content provider networking: transports, endpoints, pooling and retry.

pub mod endpoint;
#[cfg(feature = "network")]
pub mod http;
pub mod pool;
pub mod retry;
pub mod transport;
