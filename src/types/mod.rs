//! Type definitions for the Tradeboard API client
//!
//! Request configs and options travel into the pipeline; normalized
//! responses come out of it.

pub mod request;
pub mod response;

pub use request::{Method, RequestBody, RequestConfig, RequestOptions, RetryState};
pub use response::ApiResponse;
