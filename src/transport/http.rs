//! HTTP transport backed by `reqwest`

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use super::{RawResponse, Transport, TransportError};
use crate::error::{ApiError, Result};
use crate::types::{Method, RequestConfig};

/// Status reported for requests that time out before a response arrives
const TIMEOUT_STATUS: u16 = 408;

/// Production transport: one `reqwest` call per send
///
/// Every completed exchange is returned as-is, whatever its status; only
/// failures to complete the exchange become [`TransportError`]s.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport with an optional per-request timeout
    ///
    /// # Errors
    /// Returns a `Configuration` error if the HTTP client cannot be built
    pub fn new(timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| ApiError::configuration(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Wrap an existing `reqwest` client
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn to_reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
    }
}

fn map_error(err: &reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::with_status(TIMEOUT_STATUS, format!("Request timed out: {err}"))
    } else if let Some(status) = err.status() {
        TransportError::with_status(status.as_u16(), err.to_string())
    } else {
        TransportError::new(format!("Network error: {err}"))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &RequestConfig) -> std::result::Result<RawResponse, TransportError> {
        let mut builder = self
            .client
            .request(to_reqwest_method(request.method), &request.url);

        for (name, value) in request.headers() {
            builder = builder.header(name, value);
        }
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.to_bytes());
        }

        let response = builder.send().await.map_err(|e| map_error(&e))?;

        let status = response.status().as_u16();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await.map_err(|e| map_error(&e))?.to_vec();

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}
