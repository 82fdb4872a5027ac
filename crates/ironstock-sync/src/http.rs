//! # HTTP Remote
//!
//! [`RemoteStore`] over the sheets REST API.
//!
//! ## Request Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  GET  {base}/api/sheets/import   ─┐                                     │
//! │  GET  {base}/api/sheets/meta     ─┼─ x-sync-token: <token>              │
//! │  POST {base}/api/sheets/export   ─┘  cache-control: no-store            │
//! │                                                                         │
//! │  no response        → Network("Network error: …")                      │
//! │  non-2xx            → from_status(status, url, body.error, retry-after)│
//! │  2xx, ok != true    → Rejected                                         │
//! │  2xx, ok == true    → body                                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The body is only parsed as JSON when the response says it is JSON.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, CACHE_CONTROL, CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::config::RemoteSettings;
use crate::error::{SyncError, SyncResult};
use crate::remote::{RemoteMarker, RemoteSnapshot, RemoteStore};

/// Header carrying the shared-secret credential.
pub const SYNC_TOKEN_HEADER: &str = "x-sync-token";

const IMPORT_PATH: &str = "api/sheets/import";
const META_PATH: &str = "api/sheets/meta";
const EXPORT_PATH: &str = "api/sheets/export";

/// HTTP client for the remote document store.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: Client,
    base_url: Url,
}

impl HttpRemote {
    /// Builds a client from the `[remote]` config section.
    pub fn new(settings: &RemoteSettings) -> SyncResult<Self> {
        let client = Client::builder()
            .timeout(settings.request_timeout())
            .build()
            .map_err(|e| SyncError::InvalidConfig(format!("HTTP client: {}", e)))?;
        Self::with_client(client, &settings.base_url)
    }

    pub fn with_client(client: Client, base_url: &str) -> SyncResult<Self> {
        // Routes are joined relative to the base, so keep any path prefix
        let mut base = base_url.to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        Ok(HttpRemote {
            client,
            base_url: Url::parse(&base)?,
        })
    }

    fn endpoint(&self, path: &str) -> SyncResult<Url> {
        Ok(self.base_url.join(path)?)
    }

    /// Sends with auth headers and classifies the outcome.
    async fn send(&self, request: RequestBuilder, url: &Url, token: &str) -> SyncResult<Value> {
        let response = request
            .header(SYNC_TOKEN_HEADER, token)
            .header(CACHE_CONTROL, "no-store")
            .send()
            .await
            .map_err(|e| {
                warn!(url = %url, error = %e, "Remote request failed");
                SyncError::Network(e.to_string())
            })?;

        let status = response.status();
        let retry_after = if status == StatusCode::TOO_MANY_REQUESTS {
            parse_retry_after(response.headers())
        } else {
            None
        };
        let body = read_json_safely(response).await;

        if !status.is_success() {
            let detail = body
                .as_ref()
                .and_then(|b| b.get("error"))
                .and_then(Value::as_str)
                .map(str::to_string);
            debug!(url = %url, status = status.as_u16(), ?retry_after, "Remote returned error status");
            return Err(SyncError::from_status(
                status.as_u16(),
                url.as_str(),
                detail,
                retry_after,
            ));
        }

        match body {
            Some(body) if body.get("ok") == Some(&Value::Bool(true)) => Ok(body),
            _ => Err(SyncError::Rejected(format!(
                "{} did not answer with \"ok\": true",
                url
            ))),
        }
    }
}

#[async_trait]
impl RemoteStore for HttpRemote {
    async fn import(&self, token: &str) -> SyncResult<RemoteSnapshot> {
        let url = self.endpoint(IMPORT_PATH)?;
        let body = self.send(self.client.get(url.clone()), &url, token).await?;
        Ok(RemoteSnapshot {
            marker: marker_of(&body),
            data: body.get("data").cloned(),
        })
    }

    async fn meta(&self, token: &str) -> SyncResult<Option<RemoteMarker>> {
        let url = self.endpoint(META_PATH)?;
        let body = self.send(self.client.get(url.clone()), &url, token).await?;
        Ok(marker_of(&body))
    }

    async fn export(&self, token: &str, payload: &str) -> SyncResult<Option<RemoteMarker>> {
        let url = self.endpoint(EXPORT_PATH)?;
        let request = self
            .client
            .post(url.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(payload.to_string());
        let body = self.send(request, &url, token).await?;
        Ok(marker_of(&body))
    }
}

/// `meta.updatedAt`, when it is a string.
fn marker_of(body: &Value) -> Option<RemoteMarker> {
    body.get("meta")?
        .get("updatedAt")?
        .as_str()
        .map(str::to_string)
}

/// `retry-after` as seconds; anything unparseable is ignored.
fn parse_retry_after(headers: &HeaderMap) -> Option<f64> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|s| s.is_finite())
}

async fn read_json_safely(response: reqwest::Response) -> Option<Value> {
    let is_json = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("application/json"))
        .unwrap_or(false);
    if !is_json {
        return None;
    }
    response.json::<Value>().await.ok()
}
