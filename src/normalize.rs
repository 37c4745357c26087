//! Response and error normalization
//!
//! Converts a completed exchange into either an [`ApiResponse`] (2xx) or a
//! typed [`ApiError`]. Body parsing never fails the call: an unparsable JSON
//! body normalizes to `null`.

use crate::error::{ApiError, Result};
use crate::transport::RawResponse;
use crate::types::ApiResponse;

/// Body fields checked, in order, for a server-provided error message
const MESSAGE_FIELDS: [&str; 3] = ["message", "detail", "error"];

/// Normalize a completed exchange
///
/// # Errors
/// Returns an [`ApiError`] classified by status for every non-2xx response
pub fn normalize(raw: RawResponse) -> Result<ApiResponse> {
    let ok = raw.is_success();
    let data = parse_body(&raw);

    if !ok {
        return Err(error_from_response(raw.status, data));
    }

    Ok(ApiResponse {
        status: raw.status,
        ok,
        data,
        headers: raw.headers,
    })
}

/// Parse the body according to its content type
#[must_use]
pub fn parse_body(raw: &RawResponse) -> serde_json::Value {
    if raw.body.is_empty() {
        return serde_json::Value::Null;
    }

    if raw.header("content-type").is_some_and(is_json_content_type) {
        match serde_json::from_slice(&raw.body) {
            Ok(value) => value,
            Err(e) => {
                tracing::trace!(error = %e, status = raw.status, "Unparsable JSON body, using null");
                serde_json::Value::Null
            }
        }
    } else {
        serde_json::Value::String(String::from_utf8_lossy(&raw.body).into_owned())
    }
}

fn is_json_content_type(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    mime == "application/json" || mime.ends_with("+json")
}

fn error_from_response(status: u16, data: serde_json::Value) -> ApiError {
    let message = MESSAGE_FIELDS
        .iter()
        .find_map(|field| data.get(*field).and_then(serde_json::Value::as_str))
        .map_or_else(
            || format!("Request failed with status {status}"),
            str::to_string,
        );

    let details = (!data.is_null()).then_some(data);
    ApiError::from_status(status, message, details)
}
