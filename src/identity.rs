//! # Session Identity Store
//!
//! Local persistence of the signed-in user. The external auth flow writes
//! the identity after a successful login; the ledger reads the user id from
//! here before every update and refuses to touch the network without one.
//!
//! ## Storage Layout
//!
//! Identity lives under flat string keys so any key-value backend can hold it:
//!
//! | Key | Value |
//! |-----|-------|
//! | `userId` | backend user id (required) |
//! | `username` | display name (optional) |
//! | `userEmail` | email (optional) |
//! | `isLoggedIn` | `"true"` while signed in |
//!
//! Sign-out clears every key in the store, not only the four above.
//!
//! ## Backends
//!
//! - [`JsonFileStore`]: one JSON object on disk, replaced atomically on write
//! - [`MemoryStore`]: process-local map, used by tests and embedders

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PipelineError, PipelineResult};

pub const KEY_USER_ID: &str = "userId";
pub const KEY_USERNAME: &str = "username";
pub const KEY_EMAIL: &str = "userEmail";
pub const KEY_LOGGED_IN: &str = "isLoggedIn";

/// The signed-in user as far as the pipeline cares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionIdentity {
    pub user_id: String,
    pub username: Option<String>,
    pub email: Option<String>,
}

impl SessionIdentity {
    /// Identity with only a user id.
    ///
    /// # Errors
    /// [`PipelineError::Validation`] when `user_id` is blank.
    pub fn new(user_id: impl Into<String>) -> PipelineResult<Self> {
        let user_id = user_id.into().trim().to_string();
        if user_id.is_empty() {
            return Err(PipelineError::validation("user_id", "must not be empty"));
        }
        Ok(Self {
            user_id,
            username: None,
            email: None,
        })
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

/// String key-value persistence.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> PipelineResult<Option<String>>;

    /// Apply several changes in one step. `Some` sets a key, `None` removes it.
    async fn write_many(&self, entries: &[(&str, Option<String>)]) -> PipelineResult<()>;

    /// Remove every key.
    async fn clear(&self) -> PipelineResult<()>;
}

fn apply(map: &mut BTreeMap<String, String>, entries: &[(&str, Option<String>)]) {
    for (key, value) in entries {
        match value {
            Some(value) => map.insert((*key).to_string(), value.clone()),
            None => map.remove(*key),
        };
    }
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> PipelineResult<Option<String>> {
        Ok(self.entries().get(key).cloned())
    }

    async fn write_many(&self, entries: &[(&str, Option<String>)]) -> PipelineResult<()> {
        apply(&mut self.entries(), entries);
        Ok(())
    }

    async fn clear(&self) -> PipelineResult<()> {
        self.entries().clear();
        Ok(())
    }
}

/// Store backed by a single JSON object file.
///
/// A missing file reads as an empty store. Writes go to a fresh temp file in
/// the same directory that is then persisted over the target, so a crash
/// never leaves half a file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> PipelineResult<BTreeMap<String, String>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(BTreeMap::new()),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                PipelineError::storage("decode", format!("{}: {e}", self.path.display()))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(PipelineError::storage(
                "read",
                format!("{}: {e}", self.path.display()),
            )),
        }
    }

    async fn save(&self, map: BTreeMap<String, String>) -> PipelineResult<()> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || -> PipelineResult<()> {
            let bytes = serde_json::to_vec_pretty(&map)?;
            let dir = match path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => PathBuf::from("."),
            };
            let write_err = |e: std::io::Error| {
                PipelineError::storage("write", format!("{}: {e}", path.display()))
            };

            std::fs::create_dir_all(&dir).map_err(write_err)?;
            let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(write_err)?;
            tmp.write_all(&bytes).map_err(write_err)?;
            tmp.as_file().sync_all().map_err(write_err)?;
            tmp.persist(&path).map_err(|e| write_err(e.error))?;
            Ok(())
        })
        .await
        .map_err(|e| PipelineError::storage("write", format!("write task failed: {e}")))?
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    async fn get(&self, key: &str) -> PipelineResult<Option<String>> {
        Ok(self.load().await?.remove(key))
    }

    async fn write_many(&self, entries: &[(&str, Option<String>)]) -> PipelineResult<()> {
        let mut map = self.load().await?;
        apply(&mut map, entries);
        self.save(map).await
    }

    async fn clear(&self) -> PipelineResult<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PipelineError::storage(
                "clear",
                format!("{}: {e}", self.path.display()),
            )),
        }
    }
}

/// Identity accessors over a [`KeyValueStore`].
#[derive(Clone)]
pub struct SessionStore {
    store: Arc<dyn KeyValueStore>,
}

impl SessionStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self::new(Arc::new(JsonFileStore::new(path)))
    }

    /// The stored identity, or `None` when nobody is signed in.
    ///
    /// A missing or blank `userId` means no identity, whatever else is stored.
    pub async fn get_identity(&self) -> PipelineResult<Option<SessionIdentity>> {
        let user_id = match self.store.get(KEY_USER_ID).await? {
            Some(id) if !id.trim().is_empty() => id.trim().to_string(),
            _ => return Ok(None),
        };
        let username = non_blank(self.store.get(KEY_USERNAME).await?);
        let email = non_blank(self.store.get(KEY_EMAIL).await?);

        Ok(Some(SessionIdentity {
            user_id,
            username,
            email,
        }))
    }

    /// Like [`SessionStore::get_identity`], but absence is an error.
    pub async fn require_identity(&self) -> PipelineResult<SessionIdentity> {
        self.get_identity()
            .await?
            .ok_or_else(|| PipelineError::identity("no user id in the session store"))
    }

    pub async fn set_identity(&self, identity: &SessionIdentity) -> PipelineResult<()> {
        if identity.user_id.trim().is_empty() {
            return Err(PipelineError::validation("user_id", "must not be empty"));
        }
        // Absent optional fields remove what a previous sign-in left behind
        let entries = [
            (KEY_USER_ID, Some(identity.user_id.clone())),
            (KEY_USERNAME, identity.username.clone()),
            (KEY_EMAIL, identity.email.clone()),
            (KEY_LOGGED_IN, Some("true".to_string())),
        ];
        self.store.write_many(&entries).await?;
        debug!(user_id = %identity.user_id, "identity stored");
        Ok(())
    }

    pub async fn clear_identity(&self) -> PipelineResult<()> {
        self.store.clear().await?;
        debug!("identity cleared");
        Ok(())
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_round_trip_and_clear() {
        let store = SessionStore::in_memory();
        assert_eq!(store.get_identity().await.unwrap(), None);

        let identity = SessionIdentity::new("u-17").unwrap().with_username("sam");
        store.set_identity(&identity).await.unwrap();
        assert_eq!(store.get_identity().await.unwrap(), Some(identity));

        store.clear_identity().await.unwrap();
        assert_eq!(store.get_identity().await.unwrap(), None);
        assert_eq!(store.require_identity().await.unwrap_err().category(), "identity");
    }

    #[tokio::test]
    async fn test_blank_user_id_is_no_identity() {
        let kv = Arc::new(MemoryStore::new());
        kv.write_many(&[(KEY_USER_ID, Some("   ".to_string())), (KEY_USERNAME, Some("sam".to_string()))])
            .await
            .unwrap();
        let store = SessionStore::new(kv);
        assert_eq!(store.get_identity().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_json_file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");

        let identity = SessionIdentity::new("42")
            .unwrap()
            .with_email("sam@example.com");
        SessionStore::at_path(&path).set_identity(&identity).await.unwrap();

        let reopened = SessionStore::at_path(&path);
        assert_eq!(reopened.get_identity().await.unwrap(), Some(identity));

        reopened.clear_identity().await.unwrap();
        assert!(!path.exists());
        assert_eq!(reopened.get_identity().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, b"{not json").unwrap();

        let err = SessionStore::at_path(&path).get_identity().await.unwrap_err();
        assert_eq!(err.category(), "storage");
    }

    #[tokio::test]
    async fn test_relogin_drops_previous_optional_fields() {
        let dir = tempfile::tempdir().unwrap();
        for store in [
            SessionStore::in_memory(),
            SessionStore::at_path(dir.path().join("session.json")),
        ] {
            let alice = SessionIdentity::new("A")
                .unwrap()
                .with_username("alice")
                .with_email("alice@example.com");
            store.set_identity(&alice).await.unwrap();

            let bob = SessionIdentity::new("B").unwrap();
            store.set_identity(&bob).await.unwrap();
            assert_eq!(store.get_identity().await.unwrap(), Some(bob));
        }
    }

    #[tokio::test]
    async fn test_concurrent_file_writes_leave_valid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let store = JsonFileStore::new(&path);

        let writes = (0..8).map(|i| {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .write_many(&[(KEY_USER_ID, Some(format!("user-{i}")))])
                    .await
            })
        });
        for write in writes.collect::<Vec<_>>() {
            write.await.unwrap().unwrap();
        }

        let id = store.get(KEY_USER_ID).await.unwrap().unwrap();
        assert!(id.starts_with("user-"), "{id}");
        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1, "only the store file remains");
    }

    #[test]
    fn test_identity_rejects_blank_id() {
        assert!(SessionIdentity::new("  ").is_err());
        assert_eq!(SessionIdentity::new(" 7 ").unwrap().user_id, "7");
    }
}
