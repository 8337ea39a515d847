//! Application configuration management.
//!
//! This module handles loading and saving the application configuration,
//! which includes the API base URL, where tokens are kept, and the last
//! used login.
//!
//! Configuration is stored at `~/.config/freelancepro/config.json`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::api::DEFAULT_BASE_URL;
use crate::auth::{FileTokenStore, KeyringTokenStore, Role, TokenStore};

/// Application name used for config/cache directory paths
pub const APP_NAME: &str = "freelancepro";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable overriding the configured base URL
pub const BASE_URL_ENV: &str = "FREELANCEPRO_API_URL";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenBackend {
    #[default]
    File,
    Keyring,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub api_base_url: Option<String>,
    pub last_email: Option<String>,
    pub last_role: Option<Role>,
    pub token_backend: TokenBackend,
    /// Unset means requests wait indefinitely
    pub request_timeout_secs: Option<u64>,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::path()?)
    }

    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .context("Failed to read config file")?;
            serde_json::from_str(&contents).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Location of the persisted config file
    pub fn path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Base URL: environment override, then config file, then the default
    pub fn base_url(&self) -> String {
        Self::resolve_base_url(std::env::var(BASE_URL_ENV).ok(), self.api_base_url.as_deref())
    }

    fn resolve_base_url(env: Option<String>, configured: Option<&str>) -> String {
        env.filter(|url| !url.trim().is_empty())
            .or_else(|| configured.map(str::to_string))
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    /// Build the token store selected by `token_backend`
    pub fn token_store(&self) -> Result<Arc<dyn TokenStore>> {
        let store: Arc<dyn TokenStore> = match self.token_backend {
            TokenBackend::File => Arc::new(FileTokenStore::new(self.cache_dir()?)),
            TokenBackend::Keyring => Arc::new(KeyringTokenStore::new()),
        };
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_precedence() {
        assert_eq!(Config::resolve_base_url(None, None), DEFAULT_BASE_URL);
        assert_eq!(
            Config::resolve_base_url(None, Some("https://api.example.com")),
            "https://api.example.com"
        );
        assert_eq!(
            Config::resolve_base_url(
                Some("http://env:9000".into()),
                Some("https://api.example.com")
            ),
            "http://env:9000"
        );
        // Blank env var does not count
        assert_eq!(Config::resolve_base_url(Some("  ".into()), None), DEFAULT_BASE_URL);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = serde_json::from_str(r#"{"last_email": "ada@example.com"}"#).unwrap();
        assert_eq!(config.last_email.as_deref(), Some("ada@example.com"));
        assert_eq!(config.token_backend, TokenBackend::File);
        assert!(config.request_timeout().is_none());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("freelancepro").join(CONFIG_FILE);

        assert!(Config::load_from(&path).unwrap().api_base_url.is_none());

        let config = Config {
            api_base_url: Some("https://api.example.com".into()),
            last_role: Some(Role::Designer),
            token_backend: TokenBackend::Keyring,
            request_timeout_secs: Some(30),
            ..Default::default()
        };
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.last_role, Some(Role::Designer));
        assert_eq!(loaded.token_backend, TokenBackend::Keyring);
        assert_eq!(loaded.request_timeout(), Some(Duration::from_secs(30)));
    }
}
