//! JSON-RPC transport seam
//!
//! `ChainClient` owns endpoint rotation and caching; a transport only moves one
//! JSON payload to one URL. Production uses `HttpTransport`, tests a scripted one.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_ENCODING, CONTENT_TYPE, USER_AGENT};
use std::time::Duration;
use tracing::warn;

use crate::models::errors::{AppError, AppResult, ErrorCode};
use crate::utils::constants::USER_AGENT as USER_AGENT_CONST;

#[async_trait]
pub trait RpcTransport: Send + Sync {
    /// POST `payload` to `url` and return the decoded JSON-RPC envelope.
    /// Network failures, timeouts and non-2xx statuses are transport errors.
    async fn send(&self, url: &str, payload: &serde_json::Value) -> AppResult<serde_json::Value>;
}

/// reqwest-backed transport with gzip and a fixed user agent
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> AppResult<Self> {
        Ok(Self {
            client: build_client(timeout)?,
        })
    }
}

/// HTTP client shared by the RPC transport, the webhook sink and the sentiment client
pub fn build_client(timeout: Duration) -> AppResult<reqwest::Client> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_CONST));
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip"));

    reqwest::Client::builder()
        .default_headers(headers)
        .timeout(timeout)
        .gzip(true)
        .build()
        .map_err(|e| AppError::with_source(ErrorCode::ConfigInvalidValue, "Failed to build HTTP client", e))
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn send(&self, url: &str, payload: &serde_json::Value) -> AppResult<serde_json::Value> {
        let response = self.client.post(url).json(payload).send().await?;

        let status = response.status();
        if status.as_u16() == 429 {
            warn!("⏳ Rate limited (HTTP 429) by {}", mask_url(url));
            return Err(AppError::transport("Rate limited (HTTP 429)"));
        }
        if !status.is_success() {
            return Err(AppError::transport(format!("HTTP error: {}", status)));
        }

        Ok(response.json::<serde_json::Value>().await?)
    }
}

/// Hide API keys embedded in provider URLs
pub fn mask_url(url: &str) -> String {
    for marker in ["/v2/", "/v3/"] {
        if let Some((base, key)) = url.split_once(marker) {
            if !key.is_empty() {
                return format!("{}{}***HIDDEN***", base, marker);
            }
        }
    }
    url.to_string()
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    type Handler =
        Box<dyn Fn(&str, &serde_json::Value) -> AppResult<serde_json::Value> + Send + Sync>;

    /// In-memory transport: a handler answers by method, URLs can be taken down.
    ///
    /// A handler error with a transport code is returned as a transport failure,
    /// any other error becomes a JSON-RPC error object.
    pub(crate) struct ScriptedTransport {
        handler: Handler,
        down: Mutex<HashSet<String>>,
        calls: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedTransport {
        pub(crate) fn new(
            handler: impl Fn(&str, &serde_json::Value) -> AppResult<serde_json::Value>
                + Send
                + Sync
                + 'static,
        ) -> Self {
            Self {
                handler: Box::new(handler),
                down: Mutex::new(HashSet::new()),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn set_down(&self, url: &str, down: bool) {
            let mut set = self.down.lock().unwrap();
            if down {
                set.insert(url.to_string());
            } else {
                set.remove(url);
            }
        }

        /// `(url, method)` pairs in call order
        pub(crate) fn calls(&self) -> Vec<(String, String)> {
            self.calls.lock().unwrap().clone()
        }

        pub(crate) fn method_calls(&self, method: &str) -> usize {
            self.calls().iter().filter(|(_, m)| m == method).count()
        }
    }

    #[async_trait]
    impl RpcTransport for ScriptedTransport {
        async fn send(&self, url: &str, payload: &serde_json::Value) -> AppResult<serde_json::Value> {
            let method = payload["method"].as_str().unwrap_or_default().to_string();
            self.calls.lock().unwrap().push((url.to_string(), method.clone()));

            if self.down.lock().unwrap().contains(url) {
                return Err(AppError::transport(format!("connection refused: {}", url)));
            }

            match (self.handler)(&method, &payload["params"]) {
                Ok(result) => Ok(serde_json::json!({
                    "jsonrpc": "2.0",
                    "id": payload["id"],
                    "result": result,
                })),
                Err(e) if e.is_transport() => Err(e),
                Err(e) => Ok(serde_json::json!({
                    "jsonrpc": "2.0",
                    "id": payload["id"],
                    "error": { "code": -32000, "message": e.message },
                })),
            }
        }
    }
}
