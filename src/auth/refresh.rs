//! Single-flight access token refresh
//!
//! The coordinator is a two-state machine (`Idle`, `Refreshing`) with a FIFO
//! queue of waiters:
//!
//! ```text
//!   Idle ──first caller──▶ Refreshing ──refresh settles──▶ Idle
//!                            │   ▲
//!              later callers │   │ queued as waiters
//!                            ▼   │
//!                        waiter queue (drained once, in order)
//! ```
//!
//! Every caller, including the one that starts the refresh, is a waiter.
//! The network call runs on its own task, so a caller that is cancelled or
//! dropped cannot leave the coordinator stuck in `Refreshing`. The queue is
//! taken and the state reset under a single lock before anyone is notified,
//! so a waiter that immediately needs another refresh starts a fresh cycle
//! instead of joining the one that just finished.

use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::FutureExt;
use serde::Deserialize;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use super::token::TokenStore;
use crate::error::{ApiError, Result};
use crate::transport::Transport;
use crate::types::{Method, RequestBody, RequestConfig};

/// Outcome delivered to every waiter: the new access token or the failure
pub type RefreshOutcome = Result<String>;

/// Receiver side of a waiter registration
pub type RefreshWaiter = oneshot::Receiver<RefreshOutcome>;

/// Invoked once per failed refresh, after the session has been cleared
///
/// Applications use it to navigate to their login entry point.
pub type AuthFailureCallback = Arc<dyn Fn(&ApiError) + Send + Sync>;

/// Coordinator state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    /// No refresh in flight
    Idle,
    /// A refresh call is in flight; callers queue behind it
    Refreshing,
}

/// Refresh endpoint response body
#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Default)]
struct WaiterQueue {
    refreshing: bool,
    waiters: VecDeque<oneshot::Sender<RefreshOutcome>>,
}

struct Inner {
    store: TokenStore,
    transport: Arc<dyn Transport>,
    refresh_url: String,
    on_auth_failure: Option<AuthFailureCallback>,
    queue: Mutex<WaiterQueue>,
    refresh_count: AtomicU64,
}

/// Ensures at most one token refresh is in flight per client
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("refresh_url", &self.inner.refresh_url)
            .field("state", &self.state())
            .field("pending_waiters", &self.pending_waiters())
            .finish_non_exhaustive()
    }
}

impl RefreshCoordinator {
    /// Create a coordinator that refreshes through `transport` at `refresh_url`
    pub fn new(
        store: TokenStore,
        transport: Arc<dyn Transport>,
        refresh_url: impl Into<String>,
        on_auth_failure: Option<AuthFailureCallback>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                transport,
                refresh_url: refresh_url.into(),
                on_auth_failure,
                queue: Mutex::new(WaiterQueue::default()),
                refresh_count: AtomicU64::new(0),
            }),
        }
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> RefreshState {
        if self.inner.lock_queue().refreshing {
            RefreshState::Refreshing
        } else {
            RefreshState::Idle
        }
    }

    /// Whether a refresh is in flight
    #[must_use]
    pub fn is_refreshing(&self) -> bool {
        self.state() == RefreshState::Refreshing
    }

    /// Number of waiters queued behind the in-flight refresh
    #[must_use]
    pub fn pending_waiters(&self) -> usize {
        self.inner.lock_queue().waiters.len()
    }

    /// Number of refresh calls started over the coordinator's lifetime
    #[must_use]
    pub fn refresh_count(&self) -> u64 {
        self.inner.refresh_count.load(Ordering::SeqCst)
    }

    /// Obtain a fresh access token, starting a refresh or joining the one in flight
    ///
    /// # Errors
    /// Returns an `Authentication` error if the refresh fails
    pub async fn refresh(&self) -> Result<String> {
        self.refresh_with_cancel(None).await
    }

    /// Like [`refresh`](Self::refresh), but gives up with a `Cancelled` error
    /// when `cancel` fires. The refresh itself keeps running for other waiters.
    ///
    /// # Errors
    /// Returns an `Authentication` error if the refresh fails, or `Cancelled`
    pub async fn refresh_with_cancel(&self, cancel: Option<&CancellationToken>) -> Result<String> {
        let waiter = self.join_or_start();
        wait_for(waiter, cancel).await
    }

    /// Subscribe to the in-flight refresh without starting one
    ///
    /// Returns `None` when idle.
    #[must_use]
    pub fn on_refreshed(&self) -> Option<RefreshWaiter> {
        let mut queue = self.inner.lock_queue();
        if !queue.refreshing {
            return None;
        }
        let (tx, rx) = oneshot::channel();
        queue.waiters.push_back(tx);
        Some(rx)
    }

    fn join_or_start(&self) -> RefreshWaiter {
        let (tx, rx) = oneshot::channel();
        let start = {
            let mut queue = self.inner.lock_queue();
            queue.waiters.push_back(tx);
            !std::mem::replace(&mut queue.refreshing, true)
        };

        if start {
            tracing::debug!(url = %self.inner.refresh_url, "Starting token refresh");
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move { inner.run().await });
        } else {
            tracing::trace!("Refresh in flight, queued as waiter");
        }

        rx
    }
}

impl Inner {
    fn lock_queue(&self) -> MutexGuard<'_, WaiterQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn run(&self) {
        self.refresh_count.fetch_add(1, Ordering::SeqCst);

        let outcome = AssertUnwindSafe(self.perform())
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(ApiError::authentication("Token refresh panicked")));

        match &outcome {
            Ok(_) => tracing::info!("Access token refreshed"),
            Err(e) => {
                tracing::warn!(error = %e, "Token refresh failed, clearing session");
                if let Err(clear_err) = self.store.clear() {
                    tracing::warn!(error = %clear_err, "Failed to clear session storage");
                }
            }
        }

        let waiters = {
            let mut queue = self.lock_queue();
            queue.refreshing = false;
            std::mem::take(&mut queue.waiters)
        };

        if let Err(e) = &outcome {
            if let Some(callback) = &self.on_auth_failure {
                callback(e);
            }
        }

        tracing::debug!(waiters = waiters.len(), "Notifying refresh waiters");
        for waiter in waiters {
            // a dropped receiver is a cancelled caller
            let _ = waiter.send(outcome.clone());
        }
    }

    async fn perform(&self) -> RefreshOutcome {
        let refresh_token = self
            .store
            .get_refresh_token()
            .ok_or_else(|| ApiError::authentication("No refresh token available"))?;

        let mut request = RequestConfig::new(Method::Post, self.refresh_url.clone());
        request.set_header("content-type", "application/json");
        request.set_header("accept", "application/json");
        request.body = Some(RequestBody::Json(
            serde_json::json!({ "refresh_token": refresh_token }),
        ));
        request.skip_auth = true;

        let raw = self
            .transport
            .send(&request)
            .await
            .map_err(|e| ApiError::authentication(format!("Token refresh failed: {e}")))?;

        if !raw.is_success() {
            let details = crate::normalize::parse_body(&raw);
            let mut err = ApiError::authentication(format!(
                "Token refresh rejected with status {}",
                raw.status
            ));
            if !details.is_null() {
                err = err.with_details(details);
            }
            return Err(err);
        }

        let response: RefreshResponse = serde_json::from_slice(&raw.body)
            .map_err(|e| ApiError::authentication(format!("Invalid refresh response: {e}")))?;

        let refresh_token = response.refresh_token.unwrap_or(refresh_token);
        self.store
            .set_tokens(&response.access_token, &refresh_token)
            .map_err(|e| {
                ApiError::authentication(format!("Failed to persist refreshed tokens: {e}"))
            })?;

        Ok(response.access_token)
    }
}

/// Wait for a refresh outcome, optionally racing a cancellation token
pub(crate) async fn wait_for(
    waiter: RefreshWaiter,
    cancel: Option<&CancellationToken>,
) -> Result<String> {
    let received = match cancel {
        Some(token) => {
            tokio::select! {
                biased;
                () = token.cancelled() => return Err(ApiError::cancelled()),
                received = waiter => received,
            }
        }
        None => waiter.await,
    };

    received.unwrap_or_else(|_| {
        Err(ApiError::authentication(
            "Token refresh ended without a result",
        ))
    })
}
