//! Durable storage for the member session.
//!
//! The session is three string values under fixed [`StorageKey`]s: access token,
//! refresh token, and expiry in epoch milliseconds. [`TokenStore`] is the seam;
//! [`MemoryTokenStore`] backs tests and short-lived processes, [`FileTokenStore`]
//! survives restarts.

use async_trait::async_trait;
use dashmap::DashMap;
use promptpos_types::session::StorageKey;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::SessionError;

/// Key/value storage for session state.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn get(&self, key: StorageKey) -> Result<Option<String>, SessionError>;

    async fn set(&self, key: StorageKey, value: String) -> Result<(), SessionError>;

    async fn remove(&self, key: StorageKey) -> Result<(), SessionError>;

    /// Removes every session key.
    async fn clear(&self) -> Result<(), SessionError> {
        for key in StorageKey::ALL {
            self.remove(key).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl<T: TokenStore + ?Sized> TokenStore for Arc<T> {
    async fn get(&self, key: StorageKey) -> Result<Option<String>, SessionError> {
        (**self).get(key).await
    }

    async fn set(&self, key: StorageKey, value: String) -> Result<(), SessionError> {
        (**self).set(key, value).await
    }

    async fn remove(&self, key: StorageKey) -> Result<(), SessionError> {
        (**self).remove(key).await
    }

    async fn clear(&self) -> Result<(), SessionError> {
        (**self).clear().await
    }
}

/// In-process store. Clones share state.
#[derive(Clone, Debug, Default)]
pub struct MemoryTokenStore {
    values: Arc<DashMap<StorageKey, String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn get(&self, key: StorageKey) -> Result<Option<String>, SessionError> {
        Ok(self.values.get(&key).map(|v| v.value().clone()))
    }

    async fn set(&self, key: StorageKey, value: String) -> Result<(), SessionError> {
        self.values.insert(key, value);
        Ok(())
    }

    async fn remove(&self, key: StorageKey) -> Result<(), SessionError> {
        self.values.remove(&key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), SessionError> {
        self.values.clear();
        Ok(())
    }
}

/// A JSON object on disk, keyed by [`StorageKey::as_str`].
///
/// ```json
/// { "accessToken": "...", "refreshToken": "...", "tokenExpiry": "1700000000000" }
/// ```
///
/// Writes go to a sibling temporary file which then replaces the original, so a
/// crash never leaves a half-written session behind. On Unix the file is
/// readable by its owner only.
#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

type StoredValues = BTreeMap<String, String>;

impl FileTokenStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_values(&self) -> Result<StoredValues, SessionError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(StoredValues::new()),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(SessionError::storage),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(StoredValues::new()),
            Err(e) => Err(SessionError::storage(format!(
                "Failed to read {}: {e}",
                self.path.display()
            ))),
        }
    }

    async fn write_values(&self, values: &StoredValues) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(SessionError::storage)?;
        }
        let bytes = serde_json::to_vec_pretty(values).map_err(SessionError::storage)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(SessionError::storage)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))
                .await
                .map_err(SessionError::storage)?;
        }
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(SessionError::storage)
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn get(&self, key: StorageKey) -> Result<Option<String>, SessionError> {
        let _guard = self.lock.lock().await;
        let mut values = self.read_values().await?;
        Ok(values.remove(key.as_str()))
    }

    async fn set(&self, key: StorageKey, value: String) -> Result<(), SessionError> {
        let _guard = self.lock.lock().await;
        let mut values = self.read_values().await?;
        values.insert(key.as_str().to_string(), value);
        self.write_values(&values).await
    }

    async fn remove(&self, key: StorageKey) -> Result<(), SessionError> {
        let _guard = self.lock.lock().await;
        let mut values = self.read_values().await?;
        if values.remove(key.as_str()).is_some() {
            self.write_values(&values).await?;
        }
        Ok(())
    }

    async fn clear(&self) -> Result<(), SessionError> {
        let _guard = self.lock.lock().await;
        let mut values = self.read_values().await?;
        let before = values.len();
        values.retain(|k, _| StorageKey::ALL.iter().all(|key| key.as_str() != k));
        if values.len() != before {
            self.write_values(&values).await?;
        }
        Ok(())
    }
}
