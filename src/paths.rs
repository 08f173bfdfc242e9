//! Data directory layout.
//!
//! All persisted state lives under one per-user directory:
//! credentials file, property bag, notification log, cache manifest and
//! the downloaded asset files.

use std::path::{Path, PathBuf};

/// Get the platform-specific default data directory.
///
/// Returns:
/// - Windows: %LOCALAPPDATA%\notify-relay
/// - macOS: ~/Library/Application Support/notify-relay
/// - Linux/Other: ~/.local/share/notify-relay
pub fn default_data_dir() -> PathBuf {
    let base = dirs::data_local_dir()
        .or_else(dirs::data_dir)
        .or_else(|| dirs::home_dir().map(|h| h.join(".data")))
        .unwrap_or_else(|| PathBuf::from("."));

    base.join("notify-relay")
}

/// Resolved layout of the relay's data directory.
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the data directory and the downloaded-assets directory.
    pub fn ensure(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::create_dir_all(self.assets_dir())?;
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn credentials_file(&self) -> PathBuf {
        self.root.join("credentials.env")
    }

    pub fn properties_file(&self) -> PathBuf {
        self.root.join("properties.json")
    }

    pub fn notification_log_file(&self) -> PathBuf {
        self.root.join("notifications.json")
    }

    pub fn cache_manifest_file(&self) -> PathBuf {
        self.root.join("cache_manifest.json")
    }

    pub fn assets_dir(&self) -> PathBuf {
        self.root.join("assets")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_data_dir_ends_with_app_name() {
        let dir = default_data_dir();
        assert!(dir.to_string_lossy().ends_with("notify-relay"));
    }

    #[test]
    fn ensure_creates_assets_dir() {
        let temp = tempfile::TempDir::new().unwrap();
        let data = DataDir::new(temp.path().join("state"));
        data.ensure().unwrap();
        assert!(data.assets_dir().is_dir());
        assert!(data.credentials_file().starts_with(data.root()));
    }
}
