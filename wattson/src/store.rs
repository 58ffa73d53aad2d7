//! Durable storage for the signed-in session.
//!
//! The credential and the username always travel together: a store either
//! holds both or nothing.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::types::{Credential, Identity};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("session store io error at {path}: {source}", path = .path.display())]
    Io { path: PathBuf, source: io::Error },
    #[error("session store serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A complete persisted session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSession {
    pub credential: Credential,
    pub identity: Identity,
}

/// Local persistence for [`StoredSession`].
///
/// Implementations must make `save` and `clear` all-or-nothing.
pub trait SessionStore: Send + Sync {
    /// Reads the persisted session, if a complete one exists.
    ///
    /// # Errors
    /// Returns an error if the backing storage cannot be read.
    fn load(&self) -> Result<Option<StoredSession>, StoreError>;

    /// Persists credential and identity together.
    ///
    /// # Errors
    /// Returns an error if the session cannot be written.
    fn save(&self, session: &StoredSession) -> Result<(), StoreError>;

    /// Removes the persisted session.
    ///
    /// # Errors
    /// Returns an error if the session cannot be removed.
    fn clear(&self) -> Result<(), StoreError>;
}

/// On-disk layout. Both fields are optional so that a hand-edited or
/// truncated document loads as "no session" instead of failing.
#[derive(Debug, Default, Serialize, Deserialize)]
struct SessionDocument {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    username: Option<String>,
}

impl SessionDocument {
    fn into_session(self) -> Option<StoredSession> {
        match (self.token, self.username) {
            (Some(token), Some(username)) if !token.is_empty() && !username.is_empty() => {
                Some(StoredSession {
                    credential: Credential::new(token),
                    identity: Identity::new(username),
                })
            }
            _ => None,
        }
    }
}

/// Stores the session as a single JSON file.
///
/// Writes go to a temporary file in the same directory which is then renamed
/// over the target, so readers never see a half-written document.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Result<Option<StoredSession>, StoreError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(self.io_error(err)),
        };
        match serde_json::from_str::<SessionDocument>(&contents) {
            Ok(document) => Ok(document.into_session()),
            Err(err) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %err,
                    "ignoring unreadable session file"
                );
                Ok(None)
            }
        }
    }

    fn save(&self, session: &StoredSession) -> Result<(), StoreError> {
        let document = SessionDocument {
            token: Some(session.credential.as_str().to_string()),
            username: Some(session.identity.username.clone()),
        };
        let body = serde_json::to_vec_pretty(&document)?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|e| self.io_error(e))?;

        let mut file = NamedTempFile::new_in(&dir).map_err(|e| self.io_error(e))?;
        file.write_all(&body).map_err(|e| self.io_error(e))?;
        file.as_file().sync_all().map_err(|e| self.io_error(e))?;
        file.persist(&self.path).map_err(|e| self.io_error(e.error))?;
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(self.io_error(err)),
        }
    }
}

/// In-process store, mostly useful for tests and embedders that persist
/// elsewhere.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    session: Mutex<Option<StoredSession>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that already holds `session`.
    pub fn with_session(session: StoredSession) -> Self {
        Self {
            session: Mutex::new(Some(session)),
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Result<Option<StoredSession>, StoreError> {
        Ok(self.session.lock().clone())
    }

    fn save(&self, session: &StoredSession) -> Result<(), StoreError> {
        *self.session.lock() = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        *self.session.lock() = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> StoredSession {
        StoredSession {
            credential: Credential::new("tok1"),
            identity: Identity::new("alice"),
        }
    }

    #[test]
    fn file_store_round_trips_and_clears() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path().join("session.json"));

        assert!(store.load().unwrap().is_none());
        store.save(&session()).unwrap();
        assert_eq!(store.load().unwrap(), Some(session()));

        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
        assert!(!store.path().exists());
    }

    #[test]
    fn clearing_an_empty_file_store_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path().join("missing.json"));
        store.clear().unwrap();
    }

    #[test]
    fn partial_document_loads_as_no_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, r#"{"token": "tok1"}"#).unwrap();

        let store = FileSessionStore::new(&path);
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn garbage_document_loads_as_no_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, "not json").unwrap();

        let store = FileSessionStore::new(&path);
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn save_creates_missing_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path().join("nested/deeper/session.json"));
        store.save(&session()).unwrap();
        assert_eq!(store.load().unwrap(), Some(session()));
    }

    #[test]
    fn memory_store_holds_both_fields_or_nothing() {
        let store = MemorySessionStore::with_session(session());
        assert_eq!(store.load().unwrap(), Some(session()));
        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
    }
}
