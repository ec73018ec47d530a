use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::error::{ApiError, ApiResult};

pub type BearerToken = String;

/// Well-known key the credential is stored under.
pub const TOKEN_KEY: &str = "access_token";

/// Persists the bearer credential. Absence is the only "logged out" signal; no expiry is tracked.
pub trait TokenStore: Send + Sync {
    fn get(&self) -> Option<BearerToken>;
    fn set(&self, token: &str) -> ApiResult<()>;
    /// Idempotent: clearing an empty store is not an error.
    fn clear(&self) -> ApiResult<()>;
}

/// Process-local store; lives as long as the client.
#[derive(Default)]
pub struct MemoryTokenStore {
    slot: RwLock<Option<BearerToken>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self { Self::default() }

    pub fn with_token(token: &str) -> Self { Self { slot: RwLock::new(Some(token.to_string())) } }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self) -> Option<BearerToken> { self.slot.read().clone() }

    fn set(&self, token: &str) -> ApiResult<()> {
        *self.slot.write() = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) -> ApiResult<()> {
        self.slot.write().take();
        Ok(())
    }
}

/// Durable store: a small JSON key-value file that survives restarts of the client.
pub struct FileTokenStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), write_lock: Mutex::new(()) }
    }

    pub fn path(&self) -> &Path { &self.path }

    fn read_map(&self) -> ApiResult<HashMap<String, String>> {
        match fs::read(&self.path) {
            Ok(bytes) if bytes.is_empty() => Ok(HashMap::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_map(&self, map: &HashMap<String, String>) -> ApiResult<()> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() { fs::create_dir_all(dir)?; }
        }
        // write-then-rename so a crash never leaves a partial credential behind
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_vec(map)?)?;
        restrict_permissions(&tmp)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl TokenStore for FileTokenStore {
    fn get(&self) -> Option<BearerToken> {
        match self.read_map() {
            Ok(mut map) => map.remove(TOKEN_KEY).filter(|t| !t.is_empty()),
            Err(e) => {
                warn!(target: "token_store", path = %self.path.display(), error = %e, "unreadable token file, treating as logged out");
                None
            }
        }
    }

    fn set(&self, token: &str) -> ApiResult<()> {
        if token.is_empty() {
            return Err(ApiError::storage("empty_token", "refusing to store an empty credential"));
        }
        let _guard = self.write_lock.lock();
        let mut map = self.read_map().unwrap_or_default();
        map.insert(TOKEN_KEY.to_string(), token.to_string());
        self.write_map(&map)?;
        debug!(target: "token_store", path = %self.path.display(), "credential stored");
        Ok(())
    }

    fn clear(&self) -> ApiResult<()> {
        let _guard = self.write_lock.lock();
        let mut map = match self.read_map() {
            Ok(m) => m,
            // a corrupt file holds no usable credential; drop it
            Err(_) => {
                return match fs::remove_file(&self.path) {
                    Ok(()) => Ok(()),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                    Err(e) => Err(e.into()),
                };
            }
        };
        if map.remove(TOKEN_KEY).is_none() { return Ok(()); }
        if map.is_empty() {
            match fs::remove_file(&self.path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        } else {
            self.write_map(&map)?;
        }
        debug!(target: "token_store", path = %self.path.display(), "credential cleared");
        Ok(())
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> std::io::Result<()> { Ok(()) }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_get_set_clear() {
        let s = MemoryTokenStore::new();
        assert_eq!(s.get(), None);
        s.set("tok123").unwrap();
        assert_eq!(s.get().as_deref(), Some("tok123"));
        s.clear().unwrap();
        assert_eq!(s.get(), None);
        s.clear().unwrap();
        assert_eq!(s.get(), None);
    }

    #[test]
    fn file_store_survives_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("state").join("session.json");
        FileTokenStore::new(&path).set("abc").unwrap();
        let reopened = FileTokenStore::new(&path);
        assert_eq!(reopened.get().as_deref(), Some("abc"));
        reopened.clear().unwrap();
        assert!(!path.exists());
        assert_eq!(FileTokenStore::new(&path).get(), None);
    }

    #[test]
    fn file_store_clear_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let s = FileTokenStore::new(tmp.path().join("session.json"));
        s.clear().unwrap();
        s.set("x").unwrap();
        s.clear().unwrap();
        s.clear().unwrap();
        assert_eq!(s.get(), None);
    }

    #[test]
    fn file_store_keeps_unrelated_keys() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("session.json");
        fs::write(&path, r#"{"locale":"en","access_token":"t1"}"#).unwrap();
        let s = FileTokenStore::new(&path);
        assert_eq!(s.get().as_deref(), Some("t1"));
        s.clear().unwrap();
        assert!(path.exists());
        let left: HashMap<String, String> = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(left.get("locale").map(String::as_str), Some("en"));
        assert!(!left.contains_key(TOKEN_KEY));
    }

    #[test]
    fn corrupt_file_reads_as_absent() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("session.json");
        fs::write(&path, b"{not json").unwrap();
        let s = FileTokenStore::new(&path);
        assert_eq!(s.get(), None);
        s.clear().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn empty_token_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let s = FileTokenStore::new(tmp.path().join("session.json"));
        assert!(s.set("").is_err());
        assert_eq!(s.get(), None);
    }
}
