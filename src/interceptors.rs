//! Interceptor pipeline for requests, responses and errors.
//!
//! Interceptors are registered on the [`ApiClient`](crate::ApiClient) and run
//! in registration order. Implement the traits on your own types, or wrap
//! closures with [`on_request`], [`on_response`] and [`on_error`].
//!
//! - **Request** interceptors receive the [`RequestConfig`] before it is sent
//!   and return it, possibly modified. Returning an error aborts the call
//!   before it reaches the network.
//! - **Response** interceptors receive each successful [`ApiResponse`] and may
//!   transform it.
//! - **Error** interceptors observe the terminal [`ApiError`]. They cannot
//!   swallow it, but may substitute a recovery result with
//!   [`ErrorAction::Recover`].
//!
//! # Example
//!
//! ```no_run
//! use tradeboard_client::interceptors::{on_error, on_request, ErrorAction};
//! use tradeboard_client::{ApiClient, ClientConfig};
//!
//! # fn example() -> tradeboard_client::Result<()> {
//! let client = ApiClient::builder(ClientConfig::builder().base_url("https://api.example.com").build())
//!     .build()?;
//!
//! client.add_request_interceptor(on_request(|mut config| async move {
//!     config.set_header("X-Client", "dashboard");
//!     Ok(config)
//! }));
//!
//! client.add_error_interceptor(on_error(|err, config| async move {
//!     eprintln!("{} {} failed: {err}", config.method, config.url);
//!     ErrorAction::Propagate
//! }));
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{ApiError, Result};
use crate::types::{ApiResponse, RequestConfig};

// ============================================================================
// Interceptor Traits
// ============================================================================

/// Hook run on every outgoing request
#[async_trait]
pub trait RequestInterceptor: Send + Sync {
    /// Inspect or modify the request
    ///
    /// # Errors
    /// Returning an error fails the call without sending it
    async fn intercept(&self, config: RequestConfig) -> Result<RequestConfig>;
}

/// Hook run on every successful response
#[async_trait]
pub trait ResponseInterceptor: Send + Sync {
    /// Inspect or transform the response
    ///
    /// # Errors
    /// Returning an error turns the call into a failure
    async fn intercept(&self, response: ApiResponse) -> Result<ApiResponse>;
}

/// What happens to an error after an error interceptor has seen it
#[derive(Debug, Clone, Default)]
pub enum ErrorAction {
    /// Keep propagating the error to the next interceptor and the caller
    #[default]
    Propagate,
    /// Stop the error chain and return this response to the caller instead
    Recover(ApiResponse),
}

/// Hook run when a call ends in an error
#[async_trait]
pub trait ErrorInterceptor: Send + Sync {
    /// Observe the error (logging, forced logout, metrics...)
    async fn on_error(&self, error: &ApiError, config: &RequestConfig) -> ErrorAction;
}

// ============================================================================
// Arc wrapper implementations for shared interceptors
// ============================================================================

#[async_trait]
impl<T: RequestInterceptor + ?Sized> RequestInterceptor for Arc<T> {
    async fn intercept(&self, config: RequestConfig) -> Result<RequestConfig> {
        (**self).intercept(config).await
    }
}

#[async_trait]
impl<T: ResponseInterceptor + ?Sized> ResponseInterceptor for Arc<T> {
    async fn intercept(&self, response: ApiResponse) -> Result<ApiResponse> {
        (**self).intercept(response).await
    }
}

#[async_trait]
impl<T: ErrorInterceptor + ?Sized> ErrorInterceptor for Arc<T> {
    async fn on_error(&self, error: &ApiError, config: &RequestConfig) -> ErrorAction {
        (**self).on_error(error, config).await
    }
}

/// Type alias for a shared request interceptor
pub type SharedRequestInterceptor = Arc<dyn RequestInterceptor>;

/// Type alias for a shared response interceptor
pub type SharedResponseInterceptor = Arc<dyn ResponseInterceptor>;

/// Type alias for a shared error interceptor
pub type SharedErrorInterceptor = Arc<dyn ErrorInterceptor>;

// ============================================================================
// Closure-based interceptor wrappers
// ============================================================================

/// Wrapper to use a closure as a [`RequestInterceptor`]
pub struct FnRequestInterceptor<F> {
    func: F,
}

#[async_trait]
impl<F, Fut> RequestInterceptor for FnRequestInterceptor<F>
where
    F: Fn(RequestConfig) -> Fut + Send + Sync,
    Fut: Future<Output = Result<RequestConfig>> + Send + 'static,
{
    async fn intercept(&self, config: RequestConfig) -> Result<RequestConfig> {
        (self.func)(config).await
    }
}

/// Wrapper to use a closure as a [`ResponseInterceptor`]
pub struct FnResponseInterceptor<F> {
    func: F,
}

#[async_trait]
impl<F, Fut> ResponseInterceptor for FnResponseInterceptor<F>
where
    F: Fn(ApiResponse) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ApiResponse>> + Send + 'static,
{
    async fn intercept(&self, response: ApiResponse) -> Result<ApiResponse> {
        (self.func)(response).await
    }
}

/// Wrapper to use a closure as an [`ErrorInterceptor`]
///
/// The closure receives owned copies of the error and request config.
pub struct FnErrorInterceptor<F> {
    func: F,
}

#[async_trait]
impl<F, Fut> ErrorInterceptor for FnErrorInterceptor<F>
where
    F: Fn(ApiError, RequestConfig) -> Fut + Send + Sync,
    Fut: Future<Output = ErrorAction> + Send + 'static,
{
    async fn on_error(&self, error: &ApiError, config: &RequestConfig) -> ErrorAction {
        (self.func)(error.clone(), config.clone()).await
    }
}

/// Build a request interceptor from an async closure
pub fn on_request<F, Fut>(func: F) -> FnRequestInterceptor<F>
where
    F: Fn(RequestConfig) -> Fut + Send + Sync,
    Fut: Future<Output = Result<RequestConfig>> + Send + 'static,
{
    FnRequestInterceptor { func }
}

/// Build a response interceptor from an async closure
pub fn on_response<F, Fut>(func: F) -> FnResponseInterceptor<F>
where
    F: Fn(ApiResponse) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ApiResponse>> + Send + 'static,
{
    FnResponseInterceptor { func }
}

/// Build an error interceptor from an async closure
pub fn on_error<F, Fut>(func: F) -> FnErrorInterceptor<F>
where
    F: Fn(ApiError, RequestConfig) -> Fut + Send + Sync,
    Fut: Future<Output = ErrorAction> + Send + 'static,
{
    FnErrorInterceptor { func }
}

// ============================================================================
// Interceptor Chain
// ============================================================================

/// Handle returned on registration, used to remove an interceptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InterceptorId(u64);

/// Ordered request, response and error interceptors
///
/// Cloning is cheap; the client runs each call against a snapshot.
#[derive(Clone, Default)]
pub struct InterceptorChain {
    next_id: u64,
    request: Vec<(InterceptorId, SharedRequestInterceptor)>,
    response: Vec<(InterceptorId, SharedResponseInterceptor)>,
    error: Vec<(InterceptorId, SharedErrorInterceptor)>,
}

impl std::fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptorChain")
            .field("request", &format!("[{} interceptors]", self.request.len()))
            .field("response", &format!("[{} interceptors]", self.response.len()))
            .field("error", &format!("[{} interceptors]", self.error.len()))
            .finish()
    }
}

impl InterceptorChain {
    /// Create an empty chain
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&mut self) -> InterceptorId {
        let id = InterceptorId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Append a request interceptor
    pub fn add_request(&mut self, interceptor: SharedRequestInterceptor) -> InterceptorId {
        let id = self.allocate_id();
        self.request.push((id, interceptor));
        id
    }

    /// Append a response interceptor
    pub fn add_response(&mut self, interceptor: SharedResponseInterceptor) -> InterceptorId {
        let id = self.allocate_id();
        self.response.push((id, interceptor));
        id
    }

    /// Append an error interceptor
    pub fn add_error(&mut self, interceptor: SharedErrorInterceptor) -> InterceptorId {
        let id = self.allocate_id();
        self.error.push((id, interceptor));
        id
    }

    /// Remove an interceptor of any kind; returns whether it was registered
    pub fn remove(&mut self, id: InterceptorId) -> bool {
        let before = self.len();
        self.request.retain(|(i, _)| *i != id);
        self.response.retain(|(i, _)| *i != id);
        self.error.retain(|(i, _)| *i != id);
        self.len() != before
    }

    /// Total number of registered interceptors
    #[must_use]
    pub fn len(&self) -> usize {
        self.request.len() + self.response.len() + self.error.len()
    }

    /// Whether no interceptors are registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run request interceptors in order, stopping at the first error
    ///
    /// # Errors
    /// Returns the first interceptor error
    pub async fn run_request(&self, mut config: RequestConfig) -> Result<RequestConfig> {
        for (_, interceptor) in &self.request {
            config = interceptor.intercept(config).await?;
        }
        Ok(config)
    }

    /// Run response interceptors in order, stopping at the first error
    ///
    /// # Errors
    /// Returns the first interceptor error
    pub async fn run_response(&self, mut response: ApiResponse) -> Result<ApiResponse> {
        for (_, interceptor) in &self.response {
            response = interceptor.intercept(response).await?;
        }
        Ok(response)
    }

    /// Run error interceptors in order
    ///
    /// Returns `Ok` only if an interceptor recovered; otherwise the original
    /// error after every interceptor has seen it.
    ///
    /// # Errors
    /// Returns `error` unless an interceptor recovers
    pub async fn run_error(&self, error: ApiError, config: &RequestConfig) -> Result<ApiResponse> {
        for (_, interceptor) in &self.error {
            if let ErrorAction::Recover(response) = interceptor.on_error(&error, config).await {
                tracing::debug!(kind = %error.kind, "Error recovered by interceptor");
                return Ok(response);
            }
        }
        Err(error)
    }
}
