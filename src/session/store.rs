//! Durable client-side session state.
//!
//! One JSON document holds both keys (the serialized user record and the raw
//! credential). A save writes a temp file in the same directory and renames
//! it over the target, so the pair updates atomically and no half-updated
//! state is ever observable. Loads tolerate a missing or corrupt file by
//! reporting an empty session.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;

use super::UserRecord;

const SESSION_FILE: &str = "session.json";

/// The persisted pair. Both fields clear together.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistedSession {
    #[serde(default)]
    pub user: Option<UserRecord>,
    #[serde(default)]
    pub credential: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    /// Store rooted at `dir`; the session document lives at
    /// `dir/session.json`.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(SESSION_FILE),
        }
    }

    /// Load the persisted session. A missing file is an empty session; a
    /// corrupt file is logged and treated the same way.
    pub fn load(&self) -> PersistedSession {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return PersistedSession::default(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to read session file");
                return PersistedSession::default();
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(session) => session,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "session file is corrupt, ignoring");
                PersistedSession::default()
            }
        }
    }

    /// Persist the pair in a single atomic write.
    pub fn save(&self, user: &UserRecord, credential: &str) -> io::Result<()> {
        let session = PersistedSession {
            user: Some(user.clone()),
            credential: Some(credential.to_string()),
        };
        let bytes = serde_json::to_vec_pretty(&session)?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &self.path)
    }

    /// Remove the persisted session. Idempotent.
    pub fn clear(&self) -> io::Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn test_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "stitchgate-store-{}-{}",
            name,
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    fn sample_user() -> UserRecord {
        UserRecord {
            id: "u-1".to_string(),
            email: "ada@stitchwork.org".to_string(),
            email_confirmed_at: Some("2026-01-01T00:00:00Z".to_string()),
            display_name: Some("Ada".to_string()),
            extra: Map::new(),
        }
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let store = SessionStore::new(test_dir("missing"));
        let session = store.load();
        assert!(session.user.is_none());
        assert!(session.credential.is_none());
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = test_dir("round-trip");
        let store = SessionStore::new(&dir);
        store.save(&sample_user(), "a.b.c").unwrap();

        let session = store.load();
        assert_eq!(session.credential.as_deref(), Some("a.b.c"));
        assert_eq!(session.user.unwrap().email, "ada@stitchwork.org");

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_save_leaves_no_temp_file() {
        let dir = test_dir("no-temp");
        let store = SessionStore::new(&dir);
        store.save(&sample_user(), "a.b.c").unwrap();

        let entries: Vec<_> = fs::read_dir(&dir)
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from(SESSION_FILE)]);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_clear_is_idempotent() {
        let dir = test_dir("clear");
        let store = SessionStore::new(&dir);
        store.save(&sample_user(), "a.b.c").unwrap();

        store.clear().unwrap();
        store.clear().unwrap();
        assert!(store.load().credential.is_none());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_corrupt_file_is_empty_session() {
        let dir = test_dir("corrupt");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(SESSION_FILE), b"{not json").unwrap();

        let store = SessionStore::new(&dir);
        let session = store.load();
        assert!(session.user.is_none());
        assert!(session.credential.is_none());

        let _ = fs::remove_dir_all(&dir);
    }
}
