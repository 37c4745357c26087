//! `ApiClient`: the authenticated request executor
//!
//! Every call made by the dashboard goes through [`ApiClient::request`] or
//! one of the verb helpers. A call:
//!
//! 1. Builds its own [`RequestConfig`] from the default headers, the caller's
//!    options and the resolved URL
//! 2. Attaches `Authorization: Bearer <token>`, refreshing first when the
//!    token expires within the configured leeway
//! 3. Runs the request interceptors
//! 4. Sends, retrying transient failures and retryable statuses (429, 5xx
//!    gateways) with exponential backoff, and resending once after a 401
//!    triggers a token refresh
//! 5. Normalizes the response; non-2xx statuses become typed errors that
//!    pass through the error interceptors
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                        ApiClient                         │
//! │                                                          │
//! │  request ─▶ authorize ─▶ interceptors ─▶ attempt loop    │
//! │                │                           │    │        │
//! │                ▼                           │    ▼        │
//! │        RefreshCoordinator ◀──── 401 ───────┘  Transport  │
//! │                │                                │        │
//! │                ▼                                ▼        │
//! │           TokenStore                        normalize    │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! The client is an explicit instance: build it once at startup and share
//! it (e.g. in an `Arc`) with every consumer. Tests build isolated instances
//! with their own transport and storage.
//!
//! # Example
//!
//! ```no_run
//! use tradeboard_client::{ApiClient, ClientConfig, ErrorKind, TokenPair};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = ApiClient::builder(ClientConfig::from_env()?)
//!     .on_auth_failure(|_err| eprintln!("Session expired, please log in again"))
//!     .build()?;
//!
//! client.login(&TokenPair::new("access.jwt.token", "refresh-token"))?;
//!
//! match client.get("/accounts/balances").await {
//!     Ok(balances) => println!("{balances}"),
//!     Err(e) if e.kind == ErrorKind::Authorization => eprintln!("Not allowed"),
//!     Err(e) => eprintln!("Error: {e}"),
//! }
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::auth::{
    AuthFailureCallback, FileStore, KeyValueStore, RefreshCoordinator, TokenPair, TokenStore,
};
use crate::config::ClientConfig;
use crate::error::{ApiError, Result};
use crate::interceptors::{
    ErrorInterceptor, InterceptorChain, InterceptorId, RequestInterceptor, ResponseInterceptor,
};
use crate::normalize::normalize;
use crate::retry::RetryPolicy;
use crate::transport::{HttpTransport, Transport};
use crate::types::{ApiResponse, Method, RequestBody, RequestConfig, RequestOptions};

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`ApiClient`]
pub struct ApiClientBuilder {
    config: ClientConfig,
    transport: Option<Arc<dyn Transport>>,
    storage: Option<Arc<dyn KeyValueStore>>,
    on_auth_failure: Option<AuthFailureCallback>,
}

impl ApiClientBuilder {
    /// Create a builder from a configuration
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            transport: None,
            storage: None,
            on_auth_failure: None,
        }
    }

    /// Use a custom transport (default: [`HttpTransport`])
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Use a custom session storage backend (default: [`FileStore`])
    #[must_use]
    pub fn storage(mut self, storage: Arc<dyn KeyValueStore>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Called once per failed token refresh, after the session is cleared
    ///
    /// This is where the application navigates to its login screen.
    #[must_use]
    pub fn on_auth_failure<F>(mut self, callback: F) -> Self
    where
        F: Fn(&ApiError) + Send + Sync + 'static,
    {
        self.on_auth_failure = Some(Arc::new(callback));
        self
    }

    /// Build the client
    ///
    /// # Errors
    /// Returns a `Configuration` error if the configuration is invalid or the
    /// default HTTP transport cannot be created
    pub fn build(self) -> Result<ApiClient> {
        self.config.validate()?;

        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(self.config.timeout)?),
        };
        let storage = self
            .storage
            .unwrap_or_else(|| Arc::new(FileStore::new()));
        let tokens = TokenStore::new(storage);
        let coordinator = RefreshCoordinator::new(
            tokens.clone(),
            Arc::clone(&transport),
            self.config.refresh_url(),
            self.on_auth_failure,
        );

        Ok(ApiClient {
            retry: self.config.retry_policy(),
            config: self.config,
            transport,
            tokens,
            coordinator,
            interceptors: RwLock::new(InterceptorChain::new()),
        })
    }
}

// ============================================================================
// Client
// ============================================================================

/// Authenticated client for the Tradeboard REST API
pub struct ApiClient {
    config: ClientConfig,
    retry: RetryPolicy,
    transport: Arc<dyn Transport>,
    tokens: TokenStore,
    coordinator: RefreshCoordinator,
    interceptors: RwLock<InterceptorChain>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("config", &self.config)
            .field("coordinator", &self.coordinator)
            .field("interceptors", &self.chain_snapshot())
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Create a builder
    #[must_use]
    pub fn builder(config: ClientConfig) -> ApiClientBuilder {
        ApiClientBuilder::new(config)
    }

    /// Client configuration
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Session token store
    #[must_use]
    pub fn token_store(&self) -> &TokenStore {
        &self.tokens
    }

    /// Refresh coordinator shared by every call on this client
    #[must_use]
    pub fn refresh_coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    // ------------------------------------------------------------------------
    // Session
    // ------------------------------------------------------------------------

    /// Store the token pair obtained from a login
    ///
    /// # Errors
    /// Returns an error if session storage cannot be written
    pub fn login(&self, tokens: &TokenPair) -> Result<()> {
        self.tokens
            .set_tokens(&tokens.access_token, &tokens.refresh_token)?;
        tracing::debug!("Session stored");
        Ok(())
    }

    /// Forget the session
    ///
    /// # Errors
    /// Returns an error if session storage cannot be written
    pub fn logout(&self) -> Result<()> {
        self.tokens.clear()?;
        tracing::debug!("Session cleared");
        Ok(())
    }

    /// Whether an access token is stored
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.tokens.get_access_token().is_some()
    }

    // ------------------------------------------------------------------------
    // Interceptors
    // ------------------------------------------------------------------------

    fn chain_mut(&self) -> std::sync::RwLockWriteGuard<'_, InterceptorChain> {
        self.interceptors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn chain_snapshot(&self) -> InterceptorChain {
        self.interceptors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Append a request interceptor
    pub fn add_request_interceptor(
        &self,
        interceptor: impl RequestInterceptor + 'static,
    ) -> InterceptorId {
        self.chain_mut().add_request(Arc::new(interceptor))
    }

    /// Append a response interceptor
    pub fn add_response_interceptor(
        &self,
        interceptor: impl ResponseInterceptor + 'static,
    ) -> InterceptorId {
        self.chain_mut().add_response(Arc::new(interceptor))
    }

    /// Append an error interceptor
    pub fn add_error_interceptor(
        &self,
        interceptor: impl ErrorInterceptor + 'static,
    ) -> InterceptorId {
        self.chain_mut().add_error(Arc::new(interceptor))
    }

    /// Remove a previously registered interceptor
    ///
    /// Calls already in flight keep the chain they started with.
    pub fn remove_interceptor(&self, id: InterceptorId) -> bool {
        self.chain_mut().remove(id)
    }

    // ------------------------------------------------------------------------
    // Verbs
    // ------------------------------------------------------------------------

    /// GET a resource and return its data
    ///
    /// # Errors
    /// Returns a typed error for any non-2xx outcome
    pub async fn get(&self, url: &str) -> Result<serde_json::Value> {
        self.data(url, Method::Get, None).await
    }

    /// GET a resource and deserialize its data
    ///
    /// # Errors
    /// Returns a typed error for any non-2xx outcome or a mismatched payload
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        self.request(url, RequestOptions::with_method(Method::Get))
            .await?
            .json()
    }

    /// POST a JSON body
    ///
    /// # Errors
    /// Returns a typed error for any non-2xx outcome
    pub async fn post<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> Result<serde_json::Value> {
        self.data(url, Method::Post, Some(serde_json::to_value(body)?))
            .await
    }

    /// PUT a JSON body
    ///
    /// # Errors
    /// Returns a typed error for any non-2xx outcome
    pub async fn put<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> Result<serde_json::Value> {
        self.data(url, Method::Put, Some(serde_json::to_value(body)?))
            .await
    }

    /// PATCH with a JSON body
    ///
    /// # Errors
    /// Returns a typed error for any non-2xx outcome
    pub async fn patch<B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<serde_json::Value> {
        self.data(url, Method::Patch, Some(serde_json::to_value(body)?))
            .await
    }

    /// DELETE a resource
    ///
    /// # Errors
    /// Returns a typed error for any non-2xx outcome
    pub async fn delete(&self, url: &str) -> Result<serde_json::Value> {
        self.data(url, Method::Delete, None).await
    }

    async fn data(
        &self,
        url: &str,
        method: Method,
        body: Option<serde_json::Value>,
    ) -> Result<serde_json::Value> {
        let options = RequestOptions {
            method,
            body: body.map(RequestBody::Json),
            ..Default::default()
        };
        Ok(self.request(url, options).await?.into_data())
    }

    // ------------------------------------------------------------------------
    // Executor
    // ------------------------------------------------------------------------

    /// Execute a request with full control over method, headers and body
    ///
    /// # Errors
    /// Returns the request interceptor's error if one rejects the call,
    /// `Cancelled` if the cancellation token fires, and otherwise a typed
    /// error for any non-2xx outcome (unless an error interceptor recovers)
    pub async fn request(&self, url: &str, options: RequestOptions) -> Result<ApiResponse> {
        let cancel = options.cancellation.clone();
        let cancel = cancel.as_ref();
        let chain = self.chain_snapshot();
        let mut config = self.build_config(url, options);

        if let Err(err) = self.authorize(&mut config, cancel).await {
            return chain.run_error(err, &config).await;
        }

        let mut config = chain.run_request(config).await?;

        match self.execute(&mut config, cancel).await {
            Ok(response) => chain.run_response(response).await,
            Err(err) => {
                tracing::debug!(
                    method = %config.method,
                    url = %config.url,
                    kind = %err.kind,
                    status = ?err.status,
                    "Request failed"
                );
                chain.run_error(err, &config).await
            }
        }
    }

    fn build_config(&self, url: &str, options: RequestOptions) -> RequestConfig {
        let mut config = RequestConfig::new(options.method, self.config.resolve_url(url));
        for (name, value) in &self.config.default_headers {
            config.set_header(name, value.clone());
        }
        for (name, value) in options.headers {
            config.set_header(&name, value);
        }
        config.query = options.query;
        config.body = options.body;
        config.skip_auth = options.skip_auth;
        config
    }

    async fn authorize(
        &self,
        config: &mut RequestConfig,
        cancel: Option<&CancellationToken>,
    ) -> Result<()> {
        if config.skip_auth {
            return Ok(());
        }
        let Some(mut token) = self.tokens.get_access_token() else {
            return Ok(());
        };

        if let Some(leeway) = self.config.refresh_leeway {
            if TokenStore::is_expired(&token, leeway) {
                tracing::debug!(url = %config.url, "Access token expiring, refreshing before send");
                token = self.coordinator.refresh_with_cancel(cancel).await?;
            }
        }

        config.set_bearer(&token);
        Ok(())
    }

    async fn execute(
        &self,
        config: &mut RequestConfig,
        cancel: Option<&CancellationToken>,
    ) -> Result<ApiResponse> {
        loop {
            let attempt = config.retry_state.attempt;
            tracing::debug!(method = %config.method, url = %config.url, attempt, "Sending request");

            match cancellable(self.transport.send(config), cancel).await? {
                Ok(raw) if raw.status == 401 && can_refresh(config) => {
                    config.retry_state.auth_retried = true;
                    let token = self.token_after_unauthorized(config, cancel).await?;
                    config.set_bearer(&token);
                    tracing::debug!(url = %config.url, "Resending with refreshed token");
                }
                Ok(raw) => match self.retry.next_delay_for_status(raw.status, attempt) {
                    Some(delay) => {
                        tracing::warn!(
                            url = %config.url,
                            attempt,
                            status = raw.status,
                            delay_ms = millis(delay),
                            "Transient response, retrying"
                        );
                        self.back_off(config, delay, cancel).await?;
                    }
                    None => return normalize(raw),
                },
                Err(err) => match self.retry.next_delay(&err, attempt) {
                    Some(delay) => {
                        tracing::warn!(
                            url = %config.url,
                            attempt,
                            status = ?err.status,
                            delay_ms = millis(delay),
                            error = %err,
                            "Transient failure, retrying"
                        );
                        self.back_off(config, delay, cancel).await?;
                    }
                    None => return Err(err.into()),
                },
            }
        }
    }

    async fn back_off(
        &self,
        config: &mut RequestConfig,
        delay: Duration,
        cancel: Option<&CancellationToken>,
    ) -> Result<()> {
        cancellable(tokio::time::sleep(delay), cancel).await?;
        config.retry_state.attempt += 1;
        Ok(())
    }

    /// Token to resend with after a 401
    ///
    /// If another call rotated the session since this request was sent, the
    /// stored token is already fresh and no refresh is needed. If the session
    /// was ended while it was in flight (a failed refresh or a logout), the
    /// call fails without starting another refresh, so the auth-failure
    /// callback is not fired a second time.
    async fn token_after_unauthorized(
        &self,
        config: &RequestConfig,
        cancel: Option<&CancellationToken>,
    ) -> Result<String> {
        match self.tokens.get_access_token() {
            Some(current) if config.bearer_token() != Some(current.as_str()) => Ok(current),
            None if config.bearer_token().is_some() && self.tokens.get_refresh_token().is_none() => {
                tracing::debug!(url = %config.url, "Session ended while request was in flight");
                Err(ApiError::authentication("Session ended"))
            }
            _ => self.coordinator.refresh_with_cancel(cancel).await,
        }
    }
}

fn millis(delay: Duration) -> u64 {
    u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)
}

fn can_refresh(config: &RequestConfig) -> bool {
    !config.skip_auth && !config.retry_state.auth_retried
}

/// Race a future against an optional cancellation token
async fn cancellable<F: Future>(
    future: F,
    cancel: Option<&CancellationToken>,
) -> Result<F::Output> {
    match cancel {
        Some(token) => {
            tokio::select! {
                biased;
                () = token.cancelled() => Err(ApiError::cancelled()),
                output = future => Ok(output),
            }
        }
        None => Ok(future.await),
    }
}
