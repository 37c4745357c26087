//! Session token storage

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;

use super::jwt;

/// Storage key for the access token
pub const ACCESS_TOKEN_KEY: &str = "access_token";

/// Storage key for the refresh token
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

/// Errors that can occur in a storage backend
#[derive(Debug, Error)]
pub enum StorageError {
    /// I/O error during storage operations
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Durable key-value storage for session state
///
/// Values have no TTL; they persist until overwritten or removed.
pub trait KeyValueStore: Send + Sync {
    /// Read a value
    ///
    /// # Errors
    /// Returns an error if the backend cannot be read
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write a value
    ///
    /// # Errors
    /// Returns an error if the backend cannot be written
    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Delete a value (missing keys are not an error)
    ///
    /// # Errors
    /// Returns an error if the backend cannot be written
    fn remove_item(&self, key: &str) -> Result<(), StorageError>;

    /// Write several values as one unit
    ///
    /// The default writes them in order and, if one fails, restores the
    /// values already overwritten. Backends that can commit in a single
    /// operation override it.
    ///
    /// # Errors
    /// Returns the first write error
    fn set_items(&self, items: &[(&str, &str)]) -> Result<(), StorageError> {
        let mut written: Vec<(&str, Option<String>)> = Vec::with_capacity(items.len());
        for &(key, value) in items {
            let previous = self.get_item(key)?;
            if let Err(e) = self.set_item(key, value) {
                for (key, previous) in written.into_iter().rev() {
                    let restored = match previous {
                        Some(previous) => self.set_item(key, &previous),
                        None => self.remove_item(key),
                    };
                    if let Err(rollback) = restored {
                        tracing::warn!(key, error = %rollback, "Failed to restore session storage");
                    }
                }
                return Err(e);
            }
            written.push((key, previous));
        }
        Ok(())
    }
}

// ============================================================================
// Memory Store
// ============================================================================

/// In-process storage, lost on exit
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(items.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        items.remove(key);
        Ok(())
    }

    fn set_items(&self, entries: &[(&str, &str)]) -> Result<(), StorageError> {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        for &(key, value) in entries {
            items.insert(key.to_string(), value.to_string());
        }
        Ok(())
    }
}

// ============================================================================
// File Store
// ============================================================================

/// JSON file storage in the platform config directory
///
/// The default location is e.g. `~/.config/tradeboard/session.json` on Linux.
/// On Unix the file is written with user-only permissions (600).
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    // serializes read-modify-write cycles within the process
    write_lock: Mutex<()>,
}

impl Default for FileStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FileStore {
    /// Create file storage at the default path
    #[must_use]
    pub fn new() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tradeboard");

        Self::with_path(config_dir.join("session.json"))
    }

    /// Create file storage at a custom path
    #[must_use]
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    /// Get the storage path
    #[must_use]
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, String>, StorageError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }

        let content = std::fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    fn save(&self, items: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(items)?;

        let mut options = std::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&self.path)?;

        // mode() only applies on creation; tighten an existing file before writing
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
        }

        file.write_all(content.as_bytes())?;
        file.sync_all()?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.load()?.remove(key))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut items = self.load()?;
        items.insert(key.to_string(), value.to_string());
        self.save(&items)
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut items = self.load()?;
        if items.remove(key).is_some() {
            self.save(&items)?;
        }
        Ok(())
    }

    fn set_items(&self, entries: &[(&str, &str)]) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut items = self.load()?;
        for &(key, value) in entries {
            items.insert(key.to_string(), value.to_string());
        }
        self.save(&items)
    }
}

// ============================================================================
// Token Store
// ============================================================================

/// Access and refresh token pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    /// Short-lived credential attached to API calls
    pub access_token: String,
    /// Longer-lived credential used to obtain a new access token
    pub refresh_token: String,
}

impl TokenPair {
    /// Create a token pair
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

/// Owner of the session's token pair
///
/// Reads never fail: a backend read error is logged and treated as "no token".
#[derive(Clone)]
pub struct TokenStore {
    storage: Arc<dyn KeyValueStore>,
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore")
            .field("storage", &"<storage>")
            .finish()
    }
}

impl TokenStore {
    /// Create a token store over a storage backend
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        Self { storage }
    }

    /// Create a token store backed by memory
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Current access token
    #[must_use]
    pub fn get_access_token(&self) -> Option<String> {
        self.read(ACCESS_TOKEN_KEY)
    }

    /// Current refresh token
    #[must_use]
    pub fn get_refresh_token(&self) -> Option<String> {
        self.read(REFRESH_TOKEN_KEY)
    }

    /// Both tokens, if both are present
    #[must_use]
    pub fn tokens(&self) -> Option<TokenPair> {
        Some(TokenPair {
            access_token: self.get_access_token()?,
            refresh_token: self.get_refresh_token()?,
        })
    }

    /// Store a new token pair, replacing the previous one
    ///
    /// # Errors
    /// Returns an error if the backend cannot be written
    /// Both keys are written as one unit; on error the previous pair is kept.
    pub fn set_tokens(&self, access_token: &str, refresh_token: &str) -> Result<(), StorageError> {
        self.storage.set_items(&[
            (ACCESS_TOKEN_KEY, access_token),
            (REFRESH_TOKEN_KEY, refresh_token),
        ])
    }

    /// Remove both tokens
    ///
    /// # Errors
    /// Returns an error if the backend cannot be written
    pub fn clear(&self) -> Result<(), StorageError> {
        let access = self.storage.remove_item(ACCESS_TOKEN_KEY);
        let refresh = self.storage.remove_item(REFRESH_TOKEN_KEY);
        access.and(refresh)
    }

    /// Check whether a token is expired or expires within `leeway`
    ///
    /// Malformed tokens are treated as expired.
    #[must_use]
    pub fn is_expired(token: &str, leeway: Duration) -> bool {
        jwt::is_expired(token, leeway)
    }

    fn read(&self, key: &str) -> Option<String> {
        match self.storage.get_item(key) {
            Ok(value) => value.filter(|v| !v.is_empty()),
            Err(e) => {
                tracing::warn!(key, error = %e, "Failed to read session storage");
                None
            }
        }
    }
}
