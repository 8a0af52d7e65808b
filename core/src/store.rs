//! Persistence of the bearer token and the signed-in user.
//!
//! The store is a tiny key/value map with two keys: `jwt` holds the token and
//! `user` holds the JSON-serialized user object. `FileStore` keeps that map
//! in a JSON file and replaces it atomically on every write, so both keys
//! always change together.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::Value;

use crate::error::{ApiError, Result};

pub const TOKEN_KEY: &str = "jwt";
pub const USER_KEY: &str = "user";

#[derive(Debug, Clone, PartialEq)]
pub struct Credentials {
    pub jwt: String,
    pub user: Value,
}

impl Credentials {
    fn to_entries(&self) -> Result<BTreeMap<String, String>> {
        let user = serde_json::to_string(&self.user).map_err(|e| ApiError::Serialization(e.to_string()))?;
        Ok(BTreeMap::from([
            (TOKEN_KEY.to_string(), self.jwt.clone()),
            (USER_KEY.to_string(), user),
        ]))
    }

    /// A token alone is enough to count as signed in; a missing or unreadable
    /// user becomes `null`.
    fn from_entries(entries: &BTreeMap<String, String>) -> Option<Self> {
        let jwt = entries.get(TOKEN_KEY).filter(|jwt| !jwt.is_empty())?.clone();
        let user = entries
            .get(USER_KEY)
            .and_then(|user| serde_json::from_str(user).ok())
            .unwrap_or(Value::Null);
        Some(Self { jwt, user })
    }
}

pub trait CredentialStore: Send + Sync {
    fn load(&self) -> Result<Option<Credentials>>;
    fn save(&self, credentials: &Credentials) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// Lets the host keep a handle on the store a `Session` owns.
impl<S: CredentialStore + ?Sized> CredentialStore for std::sync::Arc<S> {
    fn load(&self) -> Result<Option<Credentials>> {
        (**self).load()
    }

    fn save(&self, credentials: &Credentials) -> Result<()> {
        (**self).save(credentials)
    }

    fn clear(&self) -> Result<()> {
        (**self).clear()
    }
}

/// Process-lifetime store; nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credentials(credentials: &Credentials) -> Result<Self> {
        Ok(Self {
            entries: Mutex::new(credentials.to_entries()?),
        })
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl CredentialStore for MemoryStore {
    fn load(&self) -> Result<Option<Credentials>> {
        Ok(Credentials::from_entries(&self.entries()))
    }

    fn save(&self, credentials: &Credentials) -> Result<()> {
        *self.entries() = credentials.to_entries()?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut entries = self.entries();
        entries.remove(TOKEN_KEY);
        entries.remove(USER_KEY);
        Ok(())
    }
}

/// JSON file on disk.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<BTreeMap<String, String>> {
        match fs::read_to_string(&self.path) {
            Ok(text) => serde_json::from_str(&text).map_err(|e| {
                ApiError::Storage(format!("{} is not a credential file: {e}", self.path.display()))
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(ApiError::Storage(format!("cannot read {}: {e}", self.path.display()))),
        }
    }

    fn write(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| ApiError::Storage(format!("cannot create {}: {e}", parent.display())))?;
        }
        let text = serde_json::to_string_pretty(entries).map_err(|e| ApiError::Serialization(e.to_string()))?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, text)
            .and_then(|()| fs::rename(&tmp, &self.path))
            .map_err(|e| ApiError::Storage(format!("cannot write {}: {e}", self.path.display())))
    }
}

impl CredentialStore for FileStore {
    fn load(&self) -> Result<Option<Credentials>> {
        Ok(Credentials::from_entries(&self.read()?))
    }

    fn save(&self, credentials: &Credentials) -> Result<()> {
        let mut entries = self.read().unwrap_or_default();
        entries.extend(credentials.to_entries()?);
        self.write(&entries)
    }

    fn clear(&self) -> Result<()> {
        let mut entries = match self.read() {
            Ok(entries) => entries,
            // An unreadable file is replaced rather than left holding a token.
            Err(_) => BTreeMap::new(),
        };
        entries.remove(TOKEN_KEY);
        entries.remove(USER_KEY);
        self.write(&entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn credentials() -> Credentials {
        Credentials {
            jwt: "t0k3n".to_string(),
            user: json!({"id": 1, "username": "ana"}),
        }
    }

    #[test]
    fn memory_store_save_load_clear() {
        let store = MemoryStore::new();
        assert_eq!(store.load().unwrap(), None);

        store.save(&credentials()).unwrap();
        assert_eq!(store.load().unwrap(), Some(credentials()));

        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn file_store_persists_both_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("credentials.json");
        let store = FileStore::new(&path);
        store.save(&credentials()).unwrap();

        let raw: BTreeMap<String, String> =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw[TOKEN_KEY], "t0k3n");
        let user: Value = serde_json::from_str(&raw[USER_KEY]).unwrap();
        assert_eq!(user["username"], "ana");

        let reopened = FileStore::new(&path);
        assert_eq!(reopened.load().unwrap(), Some(credentials()));
    }

    #[test]
    fn file_store_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("absent.json"));
        assert_eq!(store.load().unwrap(), None);
        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn token_without_user_still_counts() {
        let entries = BTreeMap::from([(TOKEN_KEY.to_string(), "abc".to_string())]);
        let creds = Credentials::from_entries(&entries).unwrap();
        assert_eq!(creds.user, Value::Null);
    }

    #[test]
    fn corrupt_file_is_a_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        fs::write(&path, "not json").unwrap();
        let store = FileStore::new(&path);
        assert!(matches!(store.load(), Err(ApiError::Storage(_))));
        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), None);
    }
}
