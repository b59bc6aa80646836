//! reqwest implementations of the transport traits.
//!
//! Control plane routes (relative to `control_url`):
//!
//! | Call | Route |
//! |------|-------|
//! | connect | `GET /status` |
//! | authenticate | `POST /auth` → `{"token": "..."}` |
//! | list depots | `GET /apps/{app}/depots?os=&arch=` |
//! | request code | `GET /apps/{app}/depots/{depot}/manifests/{manifest}/code` → `{"code": N}` |
//! | discovery | `GET /servers` |
//!
//! CDN routes (relative to the endpoint base URL):
//! `GET /depot/{depot}/manifest/{manifest}/{code}` and
//! `GET /depot/{depot}/chunk/{chunk_id}`.

use super::endpoint::{Endpoint, ServerRecord};
use super::transport::{CdnTransport, ControlPlane, Credentials, EndpointDiscovery, TransportError};
use async_trait::async_trait;
use bytes::Bytes;
use depot_schema::{AppId, DepotDescriptor, DepotId, DepotKey, Manifest, ManifestFileChunk, ManifestId, Platform};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Build the shared HTTP client.
///
/// # Errors
///
/// Returns the reqwest error if the TLS backend cannot be initialised.
pub fn build_client(timeout: Duration) -> reqwest::Result<Client> {
    Client::builder()
        .user_agent(crate::USER_AGENT)
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .build()
}

fn classify(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_decode() {
        TransportError::Malformed(err.to_string())
    } else {
        TransportError::Other(err.to_string())
    }
}

fn check_status(resp: Response) -> Result<Response, TransportError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => TransportError::Unauthorized(status.as_u16()),
        StatusCode::NOT_FOUND => TransportError::NotFound(resp.url().path().to_string()),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => TransportError::Timeout,
        _ => TransportError::Other(format!("HTTP {status} from {}", resp.url())),
    })
}

async fn send(req: RequestBuilder) -> Result<Response, TransportError> {
    let resp = req.send().await.map_err(classify)?;
    check_status(resp)
}

async fn send_json<T: DeserializeOwned>(req: RequestBuilder) -> Result<T, TransportError> {
    let body = send(req).await?.bytes().await.map_err(classify)?;
    serde_json::from_slice(&body).map_err(|e| TransportError::Malformed(e.to_string()))
}

#[derive(Deserialize)]
struct AuthResponse {
    token: String,
}

#[derive(Deserialize)]
struct RequestCodeResponse {
    code: u64,
}

/// Control plane and discovery over HTTP.
pub struct HttpControlPlane {
    client: Client,
    base_url: String,
    token: Mutex<Option<String>>,
}

impl HttpControlPlane {
    /// Talk to the control plane at `base_url`.
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: Mutex::new(None),
        }
    }

    fn get(&self, path: &str) -> RequestBuilder {
        let req = self.client.get(format!("{}{path}", self.base_url));
        match self.token.lock().unwrap_or_else(PoisonError::into_inner).as_deref() {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }
}

#[async_trait]
impl ControlPlane for HttpControlPlane {
    async fn connect(&self) -> Result<(), TransportError> {
        send(self.get("/status")).await.map(|_| ())
    }

    async fn authenticate(&self, credentials: &Credentials) -> Result<(), TransportError> {
        let body = match credentials {
            Credentials::Anonymous => serde_json::json!({ "anonymous": true }),
            Credentials::Account { name, secret } => serde_json::json!({
                "account": name,
                "secret": secret,
            }),
        };
        let req = self.client.post(format!("{}/auth", self.base_url)).json(&body);
        let auth: AuthResponse = send_json(req).await?;
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = Some(auth.token);
        Ok(())
    }

    async fn list_depots(
        &self,
        app_id: AppId,
        platform: Platform,
    ) -> Result<Vec<DepotDescriptor>, TransportError> {
        let req = self
            .get(&format!("/apps/{app_id}/depots"))
            .query(&[("os", platform.os.as_str()), ("arch", platform.arch.as_str())]);
        send_json(req).await
    }

    async fn manifest_request_code(
        &self,
        app_id: AppId,
        depot_id: DepotId,
        manifest_id: ManifestId,
    ) -> Result<u64, TransportError> {
        let path = format!("/apps/{app_id}/depots/{depot_id}/manifests/{manifest_id}/code");
        let resp: RequestCodeResponse = send_json(self.get(&path)).await?;
        Ok(resp.code)
    }
}

#[async_trait]
impl EndpointDiscovery for HttpControlPlane {
    async fn discover(&self) -> Result<Vec<ServerRecord>, TransportError> {
        send_json(self.get("/servers")).await
    }
}

/// CDN transport over HTTP.
///
/// Chunks are served decoded, so the depot key is not used on the wire.
pub struct HttpCdn {
    client: Client,
}

impl HttpCdn {
    /// Use `client` for all CDN requests.
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CdnTransport for HttpCdn {
    async fn fetch_manifest(
        &self,
        endpoint: &Endpoint,
        depot: &DepotDescriptor,
        request_code: u64,
    ) -> Result<Manifest, TransportError> {
        let url = format!(
            "{}/depot/{}/manifest/{}/{request_code}",
            endpoint.base_url(),
            depot.id,
            depot.manifest_id
        );
        send_json(self.client.get(url)).await
    }

    async fn fetch_chunk(
        &self,
        endpoint: &Endpoint,
        depot_id: DepotId,
        _key: &DepotKey,
        chunk: &ManifestFileChunk,
    ) -> Result<Bytes, TransportError> {
        let url = format!("{}/depot/{depot_id}/chunk/{}", endpoint.base_url(), chunk.chunk_id);
        send(self.client.get(url)).await?.bytes().await.map_err(classify)
    }
}
