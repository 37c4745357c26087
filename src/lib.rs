//! # Tradeboard API Client
//!
//! Authenticated REST client core for the Tradeboard trading dashboard.
//! Async/await, typed errors, tokio-based.
//!
//! ## Quick Start
//!
//! ```no_run
//! use tradeboard_client::{ApiClient, ClientConfig, TokenPair};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::builder()
//!         .base_url("https://api.tradeboard.example/v1")
//!         .build();
//!     let client = ApiClient::builder(config).build()?;
//!
//!     client.login(&TokenPair::new("access.jwt.token", "refresh-token"))?;
//!
//!     let portfolio = client.get("/portfolio").await?;
//!     println!("{portfolio:#}");
//!     Ok(())
//! }
//! ```
//!
//! ## Core Features
//!
//! ### 1. Automatic Token Refresh
//!
//! A 401 response, or an access token that expires within the configured
//! leeway, triggers a refresh. Concurrent calls that need a refresh share a
//! single refresh request through the [`RefreshCoordinator`]; each resumes
//! with the new token once it lands. A failed refresh clears the session and
//! invokes the auth-failure callback once:
//!
//! ```no_run
//! # use tradeboard_client::{ApiClient, ClientConfig};
//! # fn example(config: ClientConfig) -> tradeboard_client::Result<()> {
//! let client = ApiClient::builder(config)
//!     .on_auth_failure(|err| eprintln!("Session ended: {err}"))
//!     .build()?;
//! # Ok(())
//! # }
//! ```
//!
//! ### 2. Retry with Backoff
//!
//! Transient transport failures (timeouts, 429, 5xx gateways, dropped
//! connections) are retried up to `max_retries` times, waiting
//! `base_delay * 2^attempt` between tries. See [`RetryPolicy`].
//!
//! ### 3. Interceptors
//!
//! Request, response and error hooks run in registration order. See the
//! [`interceptors`] module.
//!
//! ### 4. Cancellation
//!
//! Pass a [`CancellationToken`](tokio_util::sync::CancellationToken) in
//! [`RequestOptions`] to abort a call during its send, its backoff sleep or
//! while it waits on a refresh:
//!
//! ```no_run
//! # use tradeboard_client::{ApiClient, RequestOptions};
//! # use tokio_util::sync::CancellationToken;
//! # async fn example(client: &ApiClient) {
//! let cancel = CancellationToken::new();
//! let options = RequestOptions::builder().cancellation(cancel.clone()).build();
//!
//! // e.g. the chart panel was closed
//! cancel.cancel();
//! let result = client.request("/candles?symbol=BTC-USD", options).await;
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`client`]: The request executor ([`ApiClient`])
//! - [`auth`]: Token storage, JWT expiry checks and the refresh coordinator
//! - [`interceptors`]: Request/response/error hook pipeline
//! - [`retry`]: Retry classification and backoff schedule
//! - [`normalize`]: Raw response to [`ApiResponse`] or [`ApiError`]
//! - [`transport`]: The [`Transport`] seam and its `reqwest` implementation
//! - [`config`]: Client configuration and environment loading
//! - [`types`]: Request and response types
//! - [`error`]: Error types and handling
//!
//! ## Logging
//!
//! This crate uses [`tracing`](https://crates.io/crates/tracing) for structured logging.
//! Tracing events are always emitted but are zero-cost when no subscriber is attached.
//! To see logs, attach a tracing subscriber in your application:
//!
//! ```rust,ignore
//! tracing_subscriber::fmt::init();
//! ```
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result<T, ApiError>`](Result). Errors
//! carry an [`ErrorKind`] derived from the HTTP status:
//!
//! ```no_run
//! # use tradeboard_client::{ApiClient, ErrorKind};
//! # async fn example(client: &ApiClient) {
//! match client.post("/orders", &serde_json::json!({ "qty": -1 })).await {
//!     Ok(order) => println!("Placed {order}"),
//!     Err(e) if e.kind == ErrorKind::Validation => {
//!         if let Some(fields) = e.field_errors() {
//!             for (field, problem) in fields {
//!                 eprintln!("{field}: {problem}");
//!             }
//!         }
//!     }
//!     Err(e) => eprintln!("Error: {e}"),
//! }
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod interceptors;
pub mod normalize;
pub mod retry;
pub mod transport;
pub mod types;

// Re-export commonly used types
pub use auth::{
    AuthFailureCallback, FileStore, KeyValueStore, MemoryStore, RefreshCoordinator, RefreshState,
    TokenPair, TokenStore,
};
pub use client::{ApiClient, ApiClientBuilder};
pub use config::ClientConfig;
pub use error::{ApiError, ErrorKind, Result};
pub use interceptors::{
    ErrorAction, ErrorInterceptor, InterceptorId, RequestInterceptor, ResponseInterceptor,
};
pub use retry::RetryPolicy;
pub use transport::{HttpTransport, RawResponse, Transport, TransportError};
pub use types::{ApiResponse, Method, RequestBody, RequestConfig, RequestOptions, RetryState};

/// Version of the client
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
