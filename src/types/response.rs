//! Normalized response type

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A successful (2xx) response after normalization
///
/// `data` holds the parsed JSON body, the raw text for non-JSON content, or
/// `null` for empty or unparsable bodies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    /// HTTP status code
    pub status: u16,
    /// Whether the status is 2xx
    pub ok: bool,
    /// Response payload
    pub data: serde_json::Value,
    /// Response headers, names lowercased
    pub headers: HashMap<String, String>,
}

impl ApiResponse {
    /// Deserialize `data` into a typed value
    ///
    /// # Errors
    /// Returns an error if `data` does not match `T`
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.data.clone())?)
    }

    /// Consume the response, keeping only its payload
    #[must_use]
    pub fn into_data(self) -> serde_json::Value {
        self.data
    }
}
