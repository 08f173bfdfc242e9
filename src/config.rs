//! Relay configuration.
//!
//! Loaded from a TOML file and hot-reloaded while the process runs:
//! edits to the file swap in a fresh immutable snapshot after a short
//! debounce, so readers never observe a half-updated record.

use crate::error::RelayError;
use crate::watch::{watch_file, WatchedFile};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

const RELOAD_DEBOUNCE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RelayConfig {
    pub notifications: NotificationConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Substitute the bundled icon when a request carries none. Some
    /// native notifiers render their own placeholder instead.
    pub placeholder_icon_enabled: bool,
    /// Send a desktop notification when a newer release is found.
    pub notification_on_update: bool,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            placeholder_icon_enabled: true,
            notification_on_update: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// TCP port to listen for requests on.
    pub port: u16,
    /// Seconds until a wait-mode notification is considered timed out.
    pub timeout: u64,
    /// Clients must pass basic auth unless their IP is whitelisted.
    pub require_authentication: bool,
    /// Request IPs that bypass authentication entirely.
    pub ip_whitelist: Vec<String>,
    pub proxy: ProxyConfig,
    pub cors: CorsConfig,
    pub asset_cache: AssetCacheConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8042,
            timeout: 15,
            require_authentication: true,
            ip_whitelist: Vec::new(),
            proxy: ProxyConfig::default(),
            cors: CorsConfig::default(),
            asset_cache: AssetCacheConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    /// Leave empty to disable proxy authentication.
    pub user: String,
    pub pass: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: String::new(),
            port: 3128,
            user: String::new(),
            pass: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    pub enabled: bool,
    pub allow_origin: String,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allow_origin: "*".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetCacheConfig {
    /// Seconds after which a cached asset expires and is re-fetched on
    /// next use.
    pub entry_expires_after: u64,
}

impl Default for AssetCacheConfig {
    fn default() -> Self {
        Self {
            entry_expires_after: 86_400,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Write every dispatched notification to the notification log.
    pub log_notifications: bool,
    /// How many notifications to keep before the oldest is evicted.
    pub notification_log_size: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_notifications: true,
            notification_log_size: 30,
        }
    }
}

impl RelayConfig {
    pub fn load(path: &Path) -> Result<Self, RelayError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RelayError::Configuration(format!("Can't read {}: {}", path.display(), e)))?;
        toml::from_str(&content)
            .map_err(|e| RelayError::Configuration(format!("Can't parse {}: {}", path.display(), e)))
    }
}

/// Shared, hot-reloadable configuration handle.
#[derive(Clone)]
pub struct SharedConfig {
    inner: Arc<RwLock<RelayConfig>>,
    path: Option<PathBuf>,
}

impl SharedConfig {
    /// Load the config file, falling back to defaults when it is absent.
    /// A present-but-invalid file is a fatal startup condition.
    pub fn load_or_default(path: &Path) -> Result<Self, RelayError> {
        let config = if path.exists() {
            RelayConfig::load(path)?
        } else {
            tracing::info!("No config file at {}, using defaults", path.display());
            RelayConfig::default()
        };

        Ok(Self {
            inner: Arc::new(RwLock::new(config)),
            path: Some(path.to_path_buf()),
        })
    }

    pub fn from_value(config: RelayConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
            path: None,
        }
    }

    /// Current immutable snapshot.
    pub fn snapshot(&self) -> RelayConfig {
        self.inner.read().unwrap().clone()
    }

    /// Re-read the backing file and swap the snapshot. A reload failure
    /// keeps the previous snapshot; the process never crashes over an
    /// edit mid-save.
    pub fn reload(&self) {
        let Some(path) = &self.path else {
            return;
        };
        match RelayConfig::load(path) {
            Ok(config) => {
                *self.inner.write().unwrap() = config;
                tracing::info!("Reloaded configuration from {}", path.display());
            }
            Err(e) => tracing::warn!("Keeping previous configuration: {}", e),
        }
    }

    /// Start watching the backing file for external edits.
    pub fn spawn_watch(&self) -> Option<WatchedFile> {
        let path = self.path.clone()?;
        if !path.exists() {
            return None;
        }

        let handle = self.clone();
        match watch_file(&path, RELOAD_DEBOUNCE, move || handle.reload()) {
            Ok(watch) => Some(watch),
            Err(e) => {
                tracing::warn!("Config watch disabled: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = RelayConfig::default();
        assert_eq!(config.server.port, 8042);
        assert_eq!(config.server.timeout, 15);
        assert!(config.server.require_authentication);
        assert!(config.server.ip_whitelist.is_empty());
        assert_eq!(config.server.asset_cache.entry_expires_after, 86_400);
        assert_eq!(config.logging.notification_log_size, 30);
        assert!(config.notifications.placeholder_icon_enabled);
        assert_eq!(config.server.cors.allow_origin, "*");
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("notify-relay.toml");
        std::fs::write(
            &path,
            "[server]\nport = 9000\nip_whitelist = [\"127.0.0.1\"]\n\n[logging]\nnotification_log_size = 5\n",
        )
        .unwrap();

        let config = RelayConfig::load(&path).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.ip_whitelist, vec!["127.0.0.1".to_string()]);
        assert_eq!(config.logging.notification_log_size, 5);
        // untouched sections keep their defaults
        assert_eq!(config.server.timeout, 15);
        assert!(config.logging.log_notifications);
    }

    #[test]
    fn invalid_file_is_a_configuration_error() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("notify-relay.toml");
        std::fs::write(&path, "server = \"not a table\"").unwrap();

        let err = SharedConfig::load_or_default(&path).err().unwrap();
        assert!(matches!(err, RelayError::Configuration(_)));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let temp = tempfile::TempDir::new().unwrap();
        let shared =
            SharedConfig::load_or_default(&temp.path().join("nonexistent.toml")).unwrap();
        assert_eq!(shared.snapshot().server.port, 8042);
    }
}
