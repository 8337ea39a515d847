use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Token file name in cache directory
const TOKEN_FILE: &str = "tokens.json";

/// Keys under which the session credential pair is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKey {
    Access,
    Refresh,
}

impl TokenKey {
    pub const ALL: [TokenKey; 2] = [TokenKey::Access, TokenKey::Refresh];

    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKey::Access => "access_token",
            TokenKey::Refresh => "refresh_token",
        }
    }
}

impl fmt::Display for TokenKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Synchronous key-value store holding the session credential pair.
///
/// Reads never fail: an unreadable entry is reported as absent, which the
/// gateway treats the same as "no token".
pub trait TokenStore: Send + Sync {
    fn get(&self, key: TokenKey) -> Option<String>;

    fn set(&self, key: TokenKey, value: &str) -> Result<()>;

    fn remove(&self, key: TokenKey) -> Result<()>;

    /// Remove both tokens
    fn clear(&self) -> Result<()> {
        for key in TokenKey::ALL {
            self.remove(key)?;
        }
        Ok(())
    }
}

/// In-process token store. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    tokens: Mutex<HashMap<TokenKey, String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with a credential pair
    pub fn with_tokens(access: Option<&str>, refresh: Option<&str>) -> Self {
        let mut tokens = HashMap::new();
        if let Some(access) = access {
            tokens.insert(TokenKey::Access, access.to_string());
        }
        if let Some(refresh) = refresh {
            tokens.insert(TokenKey::Refresh, refresh.to_string());
        }
        Self {
            tokens: Mutex::new(tokens),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<TokenKey, String>> {
        self.tokens.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self, key: TokenKey) -> Option<String> {
        self.lock().get(&key).cloned()
    }

    fn set(&self, key: TokenKey, value: &str) -> Result<()> {
        self.lock().insert(key, value.to_string());
        Ok(())
    }

    fn remove(&self, key: TokenKey) -> Result<()> {
        self.lock().remove(&key);
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct TokenFile {
    access_token: Option<String>,
    refresh_token: Option<String>,
    updated_at: Option<DateTime<Utc>>,
}

impl TokenFile {
    fn slot(&mut self, key: TokenKey) -> &mut Option<String> {
        match key {
            TokenKey::Access => &mut self.access_token,
            TokenKey::Refresh => &mut self.refresh_token,
        }
    }
}

/// Token store persisted as JSON in the cache directory.
pub struct FileTokenStore {
    cache_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileTokenStore {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self {
            cache_dir,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.cache_dir.join(TOKEN_FILE)
    }

    /// Last time any token was written, if the file exists
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.read().ok().and_then(|file| file.updated_at)
    }

    fn read(&self) -> Result<TokenFile> {
        let path = self.path();
        if !path.exists() {
            return Ok(TokenFile::default());
        }
        let contents = std::fs::read_to_string(&path)
            .context("Failed to read token file")?;
        serde_json::from_str(&contents).context("Failed to parse token file")
    }

    fn write(&self, file: &TokenFile) -> Result<()> {
        let path = self.path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create cache directory")?;
        }
        // Write beside the target and rename so a crash never leaves a torn file
        let tmp_path = self.tmp_path();
        let contents = serde_json::to_string_pretty(file)?;
        std::fs::write(&tmp_path, contents).context("Failed to write token file")?;
        std::fs::rename(&tmp_path, &path).context("Failed to replace token file")?;
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        self.cache_dir.join(format!("{}.tmp", TOKEN_FILE))
    }

    fn lock_writes(&self) -> std::sync::MutexGuard<'_, ()> {
        self.write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn update(&self, key: TokenKey, value: Option<&str>) -> Result<()> {
        let _guard = self.lock_writes();
        let mut file = self.read().unwrap_or_else(|e| {
            warn!(error = %e, "Discarding unreadable token file");
            TokenFile::default()
        });
        *file.slot(key) = value.map(str::to_string);
        file.updated_at = Some(Utc::now());
        self.write(&file)
    }
}

impl TokenStore for FileTokenStore {
    fn get(&self, key: TokenKey) -> Option<String> {
        match self.read() {
            Ok(mut file) => file.slot(key).take(),
            Err(e) => {
                warn!(
                    key = %key,
                    error = %e,
                    "Token file unreadable, treating token as absent"
                );
                None
            }
        }
    }

    fn set(&self, key: TokenKey, value: &str) -> Result<()> {
        self.update(key, Some(value))
    }

    fn remove(&self, key: TokenKey) -> Result<()> {
        self.update(key, None)
    }

    fn clear(&self) -> Result<()> {
        let _guard = self.lock_writes();
        let path = self.path();
        if path.exists() {
            std::fs::remove_file(path).context("Failed to remove token file")?;
        }
        Ok(())
    }
}
