//! Error types for the Tradeboard API client

use serde::Serialize;
use thiserror::Error;

use crate::auth::StorageError;
use crate::transport::TransportError;

/// Category of a failed API call
///
/// HTTP failures are classified by status code (see [`ErrorKind::from_status`]).
/// `Cancelled` and `Configuration` never come from the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// 400 - the request was rejected, usually with field-level errors
    Validation,
    /// 401 - no valid session, even after a refresh attempt
    Authentication,
    /// 403 - the session is valid but lacks permission
    Authorization,
    /// 404
    NotFound,
    /// 409
    Conflict,
    /// 5xx
    Server,
    /// Anything else, including transport failures without a status
    Unknown,
    /// The caller cancelled the request
    Cancelled,
    /// The client was configured with invalid values
    Configuration,
}

impl ErrorKind {
    /// Map an HTTP status code to an error kind
    #[must_use]
    pub fn from_status(status: u16) -> Self {
        match status {
            400 => Self::Validation,
            401 => Self::Authentication,
            403 => Self::Authorization,
            404 => Self::NotFound,
            409 => Self::Conflict,
            500..=599 => Self::Server,
            _ => Self::Unknown,
        }
    }

    /// Stable lowercase name, as used in logs
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Authentication => "authentication",
            Self::Authorization => "authorization",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Server => "server",
            Self::Unknown => "unknown",
            Self::Cancelled => "cancelled",
            Self::Configuration => "configuration",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed error returned by every client operation
///
/// Non-2xx responses always surface as an `ApiError`; callers never receive
/// a successful result carrying a failed status.
#[derive(Debug, Clone, Error)]
#[error("{kind} error: {message}")]
pub struct ApiError {
    /// Error category
    pub kind: ErrorKind,
    /// Human-readable message
    pub message: String,
    /// HTTP status, when the failure came from a response or a status-aware transport
    pub status: Option<u16>,
    /// Parsed response body or other structured context
    pub details: Option<serde_json::Value>,
}

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ApiError>;

impl ApiError {
    /// Create an error of the given kind
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            details: None,
        }
    }

    /// Create an error from an HTTP status, classifying it by [`ErrorKind::from_status`]
    pub fn from_status(
        status: u16,
        message: impl Into<String>,
        details: Option<serde_json::Value>,
    ) -> Self {
        Self {
            kind: ErrorKind::from_status(status),
            message: message.into(),
            status: Some(status),
            details,
        }
    }

    /// Create an authentication error (session could not be established or refreshed)
    pub fn authentication(msg: impl Into<String>) -> Self {
        Self {
            status: Some(401),
            ..Self::new(ErrorKind::Authentication, msg)
        }
    }

    /// Create an error for a transport failure that carried no status
    pub fn network(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unknown, msg)
    }

    /// Create a cancellation error
    #[must_use]
    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "Request cancelled")
    }

    /// Create an invalid configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, msg)
    }

    /// Attach structured details
    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Field-level errors carried by a validation response (`{"errors": {...}}`)
    #[must_use]
    pub fn field_errors(&self) -> Option<&serde_json::Map<String, serde_json::Value>> {
        self.details
            .as_ref()
            .and_then(|details| details.get("errors"))
            .and_then(serde_json::Value::as_object)
    }

    /// Whether this error means the session is gone and the user must log in again
    #[must_use]
    pub fn is_authentication(&self) -> bool {
        self.kind == ErrorKind::Authentication
    }
}

impl From<TransportError> for ApiError {
    fn from(err: TransportError) -> Self {
        let kind = err.status.map_or(ErrorKind::Unknown, ErrorKind::from_status);
        Self {
            kind,
            message: err.message,
            status: err.status,
            details: None,
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        Self::new(ErrorKind::Unknown, format!("Session storage error: {err}"))
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(ErrorKind::Unknown, format!("JSON error: {err}"))
    }
}
