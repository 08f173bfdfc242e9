//! Process property bag.
//!
//! A flat key-value JSON file holding runtime metadata (install
//! timestamps, version, update-reminder flags). Keys are read and
//! overwritten independently; no schema is enforced beyond the values
//! being JSON.

use crate::error::{RelayError, Result};
use serde_json::{Map, Value};
use std::path::PathBuf;
use tokio::fs;

/// Service over the properties file.
#[derive(Clone)]
pub struct PropertyStore {
    path: PathBuf,
}

impl PropertyStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Create the file from the first-run template if it is missing.
    pub async fn init(&self, version: &str) -> Result<()> {
        if self.path.exists() {
            return Ok(());
        }

        let mut template = Map::new();
        template.insert(
            "directoriesInitialized".to_string(),
            Value::from(chrono::Utc::now().timestamp_millis()),
        );
        template.insert("initVersion".to_string(), Value::from(version));
        self.write(&template).await
    }

    /// Read a single property. `None` when the key is absent.
    pub async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.read().await?.get(key).cloned())
    }

    /// Set a single property, leaving every other key untouched.
    pub async fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut properties = self.read().await?;
        properties.insert(key.to_string(), value);
        self.write(&properties).await
    }

    /// The full property bag.
    pub async fn all(&self) -> Result<Value> {
        Ok(Value::Object(self.read().await?))
    }

    async fn read(&self) -> Result<Map<String, Value>> {
        if !self.path.exists() {
            return Ok(Map::new());
        }

        let content = fs::read_to_string(&self.path).await?;
        let value: Value = serde_json::from_str(&content).map_err(|e| {
            RelayError::Persistence(format!("Can't parse {}: {}", self.path.display(), e))
        })?;

        match value {
            Value::Object(map) => Ok(map),
            _ => Err(RelayError::Persistence(format!(
                "{} does not hold a JSON object",
                self.path.display()
            ))),
        }
    }

    async fn write(&self, properties: &Map<String, Value>) -> Result<()> {
        let content = serde_json::to_string_pretty(&Value::Object(properties.clone()))?;
        fs::write(&self.path, content).await.map_err(|e| {
            RelayError::Persistence(format!("Can't write {}: {}", self.path.display(), e))
        })
    }
}
