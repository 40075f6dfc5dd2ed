//! HTTP transport implementation.
//!
//! Sends requests with `reqwest` and decodes JSON bodies. An empty body
//! decodes as `null`.

use crate::config::SyncConfig;
use crate::error::TransportError;
use crate::request::{Method, RemoteRequest, RemoteResponse};
use crate::transport::Transport;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

/// HTTP-based transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    /// Base URL of the REST service, without trailing slash.
    base_url: String,
    client: reqwest::Client,
}

impl HttpTransport {
    /// Creates a transport from configuration.
    pub fn new(config: &SyncConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| TransportError::Connection(e.to_string()))?;
        Ok(Self::with_client(config.base_url.clone(), client))
    }

    /// Creates a transport around an existing client.
    pub fn with_client(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Joins a relative request path onto the base URL.
    pub fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

fn to_reqwest(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Delete => reqwest::Method::DELETE,
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: RemoteRequest) -> Result<RemoteResponse, TransportError> {
        let url = self.url_for(&request.path);
        debug!(method = %request.method, url = %url, "sending request");

        let mut builder = self
            .client
            .request(to_reqwest(request.method), &url)
            .header(reqwest::header::ACCEPT, "application/json");
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        let status = response.status().as_u16();
        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_ascii_lowercase(), value.to_string()))
            })
            .collect();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        let body = if !(200..300).contains(&status) {
            // Error bodies are often not JSON; keep them as text.
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        } else if bytes.iter().all(u8::is_ascii_whitespace) {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).map_err(|e| TransportError::Decode(e.to_string()))?
        };

        RemoteResponse {
            status,
            headers,
            body,
        }
        .check_status()
    }
}
