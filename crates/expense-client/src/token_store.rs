//! Persisted session storage.
//!
//! The session is kept as three independent key/value entries so that a
//! refresh can replace the access token without touching the others.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::error::{ClientError, Result};
use crate::models::{Session, User};

pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";
pub const USER_KEY: &str = "user";

/// Storage for the current session.
///
/// `set` only writes the fields it is given: `None` for `refresh_token` or
/// `user` keeps the stored value.
pub trait TokenStore: Send + Sync {
    fn get(&self) -> Result<Session>;

    fn set(
        &self,
        access_token: &str,
        refresh_token: Option<&str>,
        user: Option<&User>,
    ) -> Result<()>;

    fn clear(&self) -> Result<()>;
}

type Entries = BTreeMap<String, String>;

fn session_from_entries(entries: &Entries) -> Session {
    let user = entries.get(USER_KEY).and_then(|raw| {
        serde_json::from_str::<User>(raw)
            .map_err(|e| tracing::warn!(error = %e, "Ignoring unreadable stored user profile"))
            .ok()
    });

    Session {
        access_token: entries.get(ACCESS_TOKEN_KEY).cloned(),
        refresh_token: entries.get(REFRESH_TOKEN_KEY).cloned(),
        user,
    }
}

fn apply_set(
    entries: &mut Entries,
    access_token: &str,
    refresh_token: Option<&str>,
    user: Option<&User>,
) -> Result<()> {
    entries.insert(ACCESS_TOKEN_KEY.to_string(), access_token.to_string());
    if let Some(refresh) = refresh_token {
        entries.insert(REFRESH_TOKEN_KEY.to_string(), refresh.to_string());
    }
    if let Some(user) = user {
        let raw = serde_json::to_string(user).map_err(|e| ClientError::Storage(e.to_string()))?;
        entries.insert(USER_KEY.to_string(), raw);
    }
    Ok(())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Session store backed by a JSON file on disk.
#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
    guard: Mutex<()>,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    /// Store at `$EXPENSECTL_SESSION_FILE`, or `~/.expensectl/session.json`.
    pub fn default_location() -> Result<Self> {
        if let Ok(path) = std::env::var("EXPENSECTL_SESSION_FILE") {
            return Ok(Self::new(path));
        }
        let home = dirs::home_dir()
            .ok_or_else(|| ClientError::Storage("could not find home directory".to_string()))?;
        Ok(Self::new(home.join(".expensectl").join("session.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> Result<Entries> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Entries::new()),
            Err(e) => return Err(e.into()),
        };
        if content.trim().is_empty() {
            return Ok(Entries::new());
        }
        serde_json::from_str(&content).map_err(|e| {
            ClientError::Storage(format!("corrupt session file {}: {}", self.path.display(), e))
        })
    }

    fn write_entries(&self, entries: &Entries) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;
        let content =
            serde_json::to_string_pretty(entries).map_err(|e| ClientError::Storage(e.to_string()))?;

        // Unique owner-only (0600 on unix) temp file per write, renamed over
        // the session file so readers never see half a session.
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| ClientError::from(e.error))?;
        Ok(())
    }
}

impl TokenStore for FileTokenStore {
    fn get(&self) -> Result<Session> {
        let _guard = lock(&self.guard);
        Ok(session_from_entries(&self.read_entries()?))
    }

    fn set(
        &self,
        access_token: &str,
        refresh_token: Option<&str>,
        user: Option<&User>,
    ) -> Result<()> {
        let _guard = lock(&self.guard);
        let mut entries = self.read_entries()?;
        apply_set(&mut entries, access_token, refresh_token, user)?;
        self.write_entries(&entries)
    }

    fn clear(&self) -> Result<()> {
        let _guard = lock(&self.guard);
        // The file holds nothing but the session keys.
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process session store.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    entries: Mutex<Entries>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with a token pair.
    pub fn with_tokens(access_token: &str, refresh_token: &str) -> Self {
        let mut entries = Entries::new();
        entries.insert(ACCESS_TOKEN_KEY.to_string(), access_token.to_string());
        entries.insert(REFRESH_TOKEN_KEY.to_string(), refresh_token.to_string());
        Self {
            entries: Mutex::new(entries),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self) -> Result<Session> {
        Ok(session_from_entries(&lock(&self.entries)))
    }

    fn set(
        &self,
        access_token: &str,
        refresh_token: Option<&str>,
        user: Option<&User>,
    ) -> Result<()> {
        apply_set(&mut lock(&self.entries), access_token, refresh_token, user)
    }

    fn clear(&self) -> Result<()> {
        lock(&self.entries).clear();
        Ok(())
    }
}
