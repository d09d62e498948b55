//! Persisted OAuth tokens.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
#[cfg(unix)]
use std::io::Write;
use std::path::{Path, PathBuf};

use super::SyncError;

/// An access token is only reused while it has at least this long to live.
pub const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedToken {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Unix seconds
    pub expires_at: i64,
}

impl CachedToken {
    pub fn new(access_token: String, refresh_token: Option<String>, expires_in: i64, now: DateTime<Utc>) -> Self {
        Self {
            access_token,
            refresh_token,
            expires_at: (now + Duration::seconds(expires_in)).timestamp(),
        }
    }

    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        !self.access_token.is_empty() && now.timestamp() + EXPIRY_MARGIN_SECS < self.expires_at
    }
}

pub trait TokenStore {
    fn load(&self) -> Result<Option<CachedToken>, SyncError>;
    fn save(&self, token: &CachedToken) -> Result<(), SyncError>;
}

/// JSON file, readable by the owner only.
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

    fn cache_error(&self, message: impl ToString) -> SyncError {
        SyncError::TokenCache {
            path: self.path.clone(),
            message: message.to_string(),
        }
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Result<Option<CachedToken>, SyncError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.cache_error(e)),
        };
        match serde_json::from_str(&text) {
            Ok(token) => Ok(Some(token)),
            Err(e) => {
                tracing::warn!("ignoring unreadable token cache {}: {e}", self.path.display());
                Ok(None)
            }
        }
    }

    fn save(&self, token: &CachedToken) -> Result<(), SyncError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.cache_error(e))?;
        }
        let json = serde_json::to_string_pretty(token).map_err(|e| self.cache_error(e))?;
        write_private(&self.path, json.as_bytes()).map_err(|e| self.cache_error(e))
    }
}

/// The file is created 0600, so the token is never readable by others, even
/// briefly. An existing file with wider bits is tightened before the write.
#[cfg(unix)]
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.set_permissions(fs::Permissions::from_mode(0o600))?;
    file.write_all(contents)
}

#[cfg(not(unix))]
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    fs::write(path, contents)
}

/// Process-local store.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: std::cell::RefCell<Option<CachedToken>>,
}

#[cfg(test)]
impl MemoryTokenStore {
    pub fn with_token(token: CachedToken) -> Self {
        Self {
            token: std::cell::RefCell::new(Some(token)),
        }
    }

    pub fn current(&self) -> Option<CachedToken> {
        self.token.borrow().clone()
    }
}

#[cfg(test)]
impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Result<Option<CachedToken>, SyncError> {
        Ok(self.current())
    }

    fn save(&self, token: &CachedToken) -> Result<(), SyncError> {
        *self.token.borrow_mut() = Some(token.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_freshness_margin() {
        let token = CachedToken::new("a".into(), None, 3600, now());
        assert!(token.is_fresh(now()));
        assert!(token.is_fresh(now() + Duration::seconds(3539)));
        assert!(!token.is_fresh(now() + Duration::seconds(3540)));
        assert!(!CachedToken::new(String::new(), None, 3600, now()).is_fresh(now()));
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("cache").join("token.json"));
        assert_eq!(store.load().unwrap(), None);

        let token = CachedToken::new("access".into(), Some("refresh".into()), 3600, now());
        store.save(&token).unwrap();
        assert_eq!(store.load().unwrap(), Some(token));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(store.path()).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_existing_world_readable_cache_is_tightened() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        fs::write(&path, "{}").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

        let store = FileTokenStore::new(&path);
        store.save(&CachedToken::new("access".into(), None, 3600, now())).unwrap();
        assert_eq!(fs::metadata(&path).unwrap().permissions().mode() & 0o777, 0o600);
        assert_eq!(store.load().unwrap().unwrap().access_token, "access");
    }

    #[test]
    fn test_corrupt_cache_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        fs::write(&path, "{not json").unwrap();
        assert_eq!(FileTokenStore::new(path).load().unwrap(), None);
    }

    #[test]
    fn test_cache_without_refresh_token() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        fs::write(&path, r#"{"access_token":"a","expires_at":1706792400}"#).unwrap();
        let token = FileTokenStore::new(path).load().unwrap().unwrap();
        assert_eq!(token.refresh_token, None);
        assert_eq!(token.expires_at, 1706792400);
    }
}
