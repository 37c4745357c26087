//! Transport layer for sending requests to the Tradeboard API
//!
//! This module provides the transport abstraction the client sends every
//! request through, and the `reqwest`-backed implementation used in
//! production. Tests substitute their own [`Transport`] to script responses.

pub mod http;

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::RequestConfig;

/// A transport-level failure: the exchange did not complete
///
/// Completed exchanges are never errors at this layer, whatever their status.
/// `status` is set when the failure still maps to an HTTP status, such as a
/// timeout (408) or a gateway rejection surfaced by the transport itself.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct TransportError {
    /// Failure description
    pub message: String,
    /// Associated HTTP status, if any
    pub status: Option<u16>,
}

impl TransportError {
    /// Create a failure without a status (connection refused, DNS, reset...)
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
        }
    }

    /// Create a failure carrying an HTTP status
    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: Some(status),
        }
    }
}

/// A completed HTTP exchange, before normalization
#[derive(Debug, Clone, Default)]
pub struct RawResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers, names lowercased
    pub headers: HashMap<String, String>,
    /// Raw body bytes
    pub body: Vec<u8>,
}

impl RawResponse {
    /// Create an empty response with the given status
    #[must_use]
    pub fn new(status: u16) -> Self {
        Self {
            status,
            ..Default::default()
        }
    }

    /// Set a JSON body and the matching content type
    #[must_use]
    pub fn with_json(mut self, body: &serde_json::Value) -> Self {
        self.body = body.to_string().into_bytes();
        self.with_header("content-type", "application/json")
    }

    /// Set a plain text body and the matching content type
    #[must_use]
    pub fn with_text(mut self, body: impl Into<String>) -> Self {
        self.body = body.into().into_bytes();
        self.with_header("content-type", "text/plain; charset=utf-8")
    }

    /// Set a header (name is lowercased)
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Look up a header case-insensitively
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Whether the status is 2xx
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Transport trait for sending one HTTP request
///
/// Implementations perform exactly one physical send per call; retries,
/// token refresh and normalization are handled by the client on top.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send the request and return the completed exchange
    ///
    /// # Errors
    /// Returns `TransportError` if the exchange could not be completed
    async fn send(&self, request: &RequestConfig) -> Result<RawResponse, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    async fn send(&self, request: &RequestConfig) -> Result<RawResponse, TransportError> {
        (**self).send(request).await
    }
}

pub use http::HttpTransport;
