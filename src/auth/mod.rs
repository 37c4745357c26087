//! Session authentication: token storage, expiry checks and refresh
//!
//! # Overview
//!
//! The session is an access/refresh token pair held by a [`TokenStore`].
//! Every API call reads the access token from the store; only the
//! [`RefreshCoordinator`] (after a successful refresh) and an explicit
//! login/logout write to it.
//!
//! 1. A call finds its access token expired (within the leeway), or the
//!    server answers 401
//! 2. The call asks the coordinator for a fresh token
//! 3. The first such caller starts the refresh; everyone else queues
//! 4. On success the new pair is persisted and every waiter resumes with it
//! 5. On failure the session is cleared, every waiter fails with an
//!    `Authentication` error and the auth-failure callback fires once
//!
//! # Token Storage
//!
//! Tokens live in a [`KeyValueStore`]. [`FileStore`] persists them to the
//! platform-specific config directory (e.g. `~/.config/tradeboard/` on
//! Linux) so sessions survive restarts; [`MemoryStore`] keeps them in
//! process.
//!
//! # Example
//!
//! ```
//! use tradeboard_client::auth::TokenStore;
//! use std::time::Duration;
//!
//! let store = TokenStore::in_memory();
//! store.set_tokens("header.payload.signature", "refresh-token")?;
//!
//! let token = store.get_access_token().unwrap();
//! // not a readable JWT, so it counts as expired
//! assert!(TokenStore::is_expired(&token, Duration::from_secs(30)));
//! # Ok::<(), tradeboard_client::auth::StorageError>(())
//! ```

pub mod jwt;
mod refresh;
mod token;

pub use refresh::{
    AuthFailureCallback, RefreshCoordinator, RefreshOutcome, RefreshState, RefreshWaiter,
};
pub use token::{
    ACCESS_TOKEN_KEY, FileStore, KeyValueStore, MemoryStore, REFRESH_TOKEN_KEY, StorageError,
    TokenPair, TokenStore,
};
