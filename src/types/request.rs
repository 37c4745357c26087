//! Request-side types: methods, bodies, per-call options and configs

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use typed_builder::TypedBuilder;

// ============================================================================
// Method
// ============================================================================

/// HTTP verbs used by the Tradeboard API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    /// GET
    #[default]
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// PATCH
    Patch,
    /// DELETE
    Delete,
}

impl Method {
    /// Uppercase wire name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Body
// ============================================================================

/// Request payload
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// JSON document, serialized on send
    Json(serde_json::Value),
    /// Plain text
    Text(String),
    /// Raw bytes
    Bytes(Vec<u8>),
}

impl RequestBody {
    /// Encode the body for the wire
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::Json(value) => value.to_string().into_bytes(),
            Self::Text(text) => text.clone().into_bytes(),
            Self::Bytes(bytes) => bytes.clone(),
        }
    }
}

impl From<serde_json::Value> for RequestBody {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(value)
    }
}

impl From<String> for RequestBody {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for RequestBody {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

// ============================================================================
// Retry State
// ============================================================================

/// Per-call retry bookkeeping
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryState {
    /// Zero-based index of the current transient-failure attempt
    pub attempt: u32,
    /// Set once the call has been resent after a token refresh
    pub auth_retried: bool,
}

// ============================================================================
// Request Config
// ============================================================================

/// A fully resolved request, owned by a single call
///
/// Interceptors receive and return this value. Header names are
/// case-insensitive and stored lowercased.
#[derive(Debug, Clone)]
pub struct RequestConfig {
    /// HTTP method
    pub method: Method,
    /// Absolute request URL
    pub url: String,
    headers: BTreeMap<String, String>,
    /// Query string parameters, appended by the transport
    pub query: Vec<(String, String)>,
    /// Optional payload
    pub body: Option<RequestBody>,
    /// Retry bookkeeping for this call
    pub retry_state: RetryState,
    /// Send without credentials and never refresh on 401
    pub skip_auth: bool,
}

impl RequestConfig {
    /// Create a config with no headers, query or body
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: BTreeMap::new(),
            query: Vec::new(),
            body: None,
            retry_state: RetryState::default(),
            skip_auth: false,
        }
    }

    /// Get a header value
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Add or replace a header
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
    }

    /// Remove a header, returning its previous value
    pub fn remove_header(&mut self, name: &str) -> Option<String> {
        self.headers.remove(&name.to_ascii_lowercase())
    }

    /// Iterate over headers (lowercased names)
    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Set `Authorization: Bearer <token>`
    pub fn set_bearer(&mut self, token: &str) {
        self.set_header("authorization", format!("Bearer {token}"));
    }

    /// The bearer token currently attached, if any
    #[must_use]
    pub fn bearer_token(&self) -> Option<&str> {
        self.header("authorization")
            .and_then(|value| value.strip_prefix("Bearer "))
    }
}

// ============================================================================
// Request Options
// ============================================================================

/// Caller-supplied options for [`ApiClient::request`](crate::ApiClient::request)
///
/// # Example
///
/// ```
/// use tradeboard_client::types::{Method, RequestOptions};
///
/// let options = RequestOptions::builder()
///     .method(Method::Post)
///     .body(serde_json::json!({ "symbol": "BTC-USD", "side": "buy" }))
///     .build();
/// assert_eq!(options.method, Method::Post);
/// ```
#[derive(Debug, Clone, Default, TypedBuilder)]
#[builder(
    builder_method(doc = "Create a new builder for RequestOptions"),
    builder_type(doc = "Builder for RequestOptions", vis = "pub"),
    build_method(doc = "Build the RequestOptions")
)]
pub struct RequestOptions {
    /// HTTP method (default GET)
    #[builder(default)]
    pub method: Method,

    /// Extra headers, applied over the client's default headers
    #[builder(default, setter(into))]
    pub headers: Vec<(String, String)>,

    /// Query string parameters
    #[builder(default, setter(into))]
    pub query: Vec<(String, String)>,

    /// Request payload
    #[builder(default, setter(strip_option, into))]
    pub body: Option<RequestBody>,

    /// Send without credentials (login, public market data)
    #[builder(default)]
    pub skip_auth: bool,

    /// Aborts the send, a backoff sleep, or a refresh wait
    #[builder(default, setter(strip_option))]
    pub cancellation: Option<CancellationToken>,
}

impl RequestOptions {
    /// Options for a bare request with the given method
    #[must_use]
    pub fn with_method(method: Method) -> Self {
        Self {
            method,
            ..Default::default()
        }
    }
}
