//! Bearer token persistence and the resident token holder.
//!
//! # Design
//! `TokenStore` is the durable side: one credential string in whatever secure
//! storage the platform offers. `TokenHolder` is the in-memory side that every
//! request reads. The holder writes through to its store, but reads never
//! touch storage after `load`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock};

use crate::error::StorageError;

/// Durable storage for exactly one credential string.
pub trait TokenStore: Send + Sync {
    /// Persist `token`, replacing any previous value.
    fn save(&self, token: &str) -> Result<(), StorageError>;

    /// The stored token, or `None` when absent or unreadable.
    fn load(&self) -> Option<String>;

    /// Remove the stored token. Deleting a missing token is not an error.
    fn delete(&self) -> Result<(), StorageError>;
}

/// Process-local store for tests and sessions that must not persist.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: &str) -> Self {
        Self {
            token: Mutex::new(Some(token.to_string())),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn save(&self, token: &str) -> Result<(), StorageError> {
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = Some(token.to_string());
        Ok(())
    }

    fn load(&self) -> Option<String> {
        self.token.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn delete(&self) -> Result<(), StorageError> {
        self.token.lock().unwrap_or_else(PoisonError::into_inner).take();
        Ok(())
    }
}

/// Stands in for a platform without secure storage. Saves fail, loads
/// find nothing.
#[derive(Debug, Default)]
pub struct UnavailableTokenStore;

impl TokenStore for UnavailableTokenStore {
    fn save(&self, _token: &str) -> Result<(), StorageError> {
        Err(StorageError::Unavailable("no secure storage on this platform".to_string()))
    }

    fn load(&self) -> Option<String> {
        None
    }

    fn delete(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

/// Token kept in a single file readable only by the owner. Used by desktop
/// and development hosts.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn save(&self, token: &str) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&self.path)?;
        io::Write::write_all(&mut file, token.as_bytes())?;
        Ok(())
    }

    fn load(&self) -> Option<String> {
        let contents = fs::read_to_string(&self.path).ok()?;
        let token = contents.trim();
        (!token.is_empty()).then(|| token.to_string())
    }

    fn delete(&self) -> Result<(), StorageError> {
        match fs::remove_file(&self.path) {
            Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err.into()),
            _ => Ok(()),
        }
    }
}

/// The resident bearer token plus the store it is persisted to.
///
/// Shared between the client (which reads it per request and evicts it on
/// 401) and the auth helpers (which set it on login and clear it on logout).
/// Writes hold `writes` across the memory update and the store call, so
/// memory and storage always end up agreeing.
pub struct TokenHolder {
    resident: RwLock<Option<String>>,
    writes: Mutex<()>,
    store: Box<dyn TokenStore>,
}

impl TokenHolder {
    pub fn new(store: impl TokenStore + 'static) -> Self {
        Self {
            resident: RwLock::new(None),
            writes: Mutex::new(()),
            store: Box::new(store),
        }
    }

    /// Holder backed by a `MemoryTokenStore`.
    pub fn in_memory() -> Self {
        Self::new(MemoryTokenStore::new())
    }

    /// The resident token. Never reads storage.
    pub fn get(&self) -> Option<String> {
        self.resident.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Replace the resident token and persist it; `None` deletes it.
    ///
    /// The in-memory value is updated even when persistence fails, so the
    /// current session keeps working. The storage error is returned for the
    /// caller to report.
    pub fn set(&self, token: Option<&str>) -> Result<(), StorageError> {
        let _writing = self.writes.lock().unwrap_or_else(PoisonError::into_inner);
        *self.resident.write().unwrap_or_else(PoisonError::into_inner) = token.map(str::to_string);
        let persisted = match token {
            Some(token) => self.store.save(token),
            None => self.store.delete(),
        };
        if let Err(err) = &persisted {
            tracing::warn!(%err, "token kept in memory only");
        }
        persisted
    }

    pub fn clear(&self) -> Result<(), StorageError> {
        self.set(None)
    }

    /// Read the persisted token into memory on cold start. Storage failures
    /// count as "no token".
    pub fn load(&self) -> Option<String> {
        let _writing = self.writes.lock().unwrap_or_else(PoisonError::into_inner);
        let token = self.store.load();
        *self.resident.write().unwrap_or_else(PoisonError::into_inner) = token.clone();
        token
    }

    /// Drop the session after a 401, in memory and in storage.
    pub(crate) fn evict(&self) {
        let _writing = self.writes.lock().unwrap_or_else(PoisonError::into_inner);
        let had_token = self
            .resident
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some();
        if let Err(err) = self.store.delete() {
            tracing::warn!(%err, "failed to delete persisted token after 401");
        }
        if had_token {
            tracing::warn!("received 401, resident token evicted");
        }
    }
}

impl std::fmt::Debug for TokenHolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenHolder")
            .field("has_token", &self.get().is_some())
            .finish_non_exhaustive()
    }
}
