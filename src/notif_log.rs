//! Notification log.
//!
//! An ordered JSON array file of dispatched notifications, oldest
//! first, capped at a configured size. Single-writer by construction;
//! every append rewrites the whole file.

use crate::config::SharedConfig;
use crate::error::{RelayError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;

/// One logged notification. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggedNotification {
    pub title: String,
    pub message: String,
    pub icon: Option<String>,
    pub actions: Option<Vec<String>>,
    pub wait: bool,
    /// Millisecond UNIX timestamp of the dispatch.
    pub timestamp: i64,
}

/// One page of log entries, newest first.
#[derive(Debug, Clone, Serialize)]
pub struct LogPage {
    pub entries: Vec<LoggedNotification>,
    pub page: usize,
    pub page_count: usize,
    pub total: usize,
}

#[derive(Clone)]
pub struct NotificationLog {
    path: PathBuf,
    config: SharedConfig,
}

impl NotificationLog {
    pub fn new(path: impl Into<PathBuf>, config: SharedConfig) -> Self {
        Self {
            path: path.into(),
            config,
        }
    }

    /// Append an entry, evicting the oldest one first when the log is
    /// at capacity.
    pub async fn append(&self, entry: LoggedNotification) -> Result<()> {
        let max_size = self.config.snapshot().logging.notification_log_size.max(1);

        let mut entries = self.read_entries().await?;
        while entries.len() >= max_size {
            entries.remove(0);
        }
        entries.push(entry);

        let content = serde_json::to_string_pretty(&entries)?;
        fs::write(&self.path, content).await.map_err(|e| {
            RelayError::Persistence(format!("Can't write {}: {}", self.path.display(), e))
        })
    }

    /// Read one page of entries sorted newest first. `None` when the
    /// log is empty or absent. `page` is clamped to the last page and
    /// `page_size` to at least one entry.
    pub async fn read_page(&self, page: usize, page_size: usize) -> Result<Option<LogPage>> {
        let mut entries = self.read_entries().await?;
        if entries.is_empty() {
            return Ok(None);
        }

        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        let page_size = page_size.max(1);
        let total = entries.len();
        let page_count = total.div_ceil(page_size);
        let page = page.min(page_count - 1);

        let entries = entries
            .into_iter()
            .skip(page * page_size)
            .take(page_size)
            .collect();

        Ok(Some(LogPage {
            entries,
            page,
            page_count,
            total,
        }))
    }

    /// Delete the backing file; the next append recreates it.
    pub async fn clear_all(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path).await?;
        }
        Ok(())
    }

    async fn read_entries(&self) -> Result<Vec<LoggedNotification>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.path).await?;
        serde_json::from_str(&content).map_err(|e| {
            RelayError::Persistence(format!("Can't parse {}: {}", self.path.display(), e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelayConfig;

    fn log_with_cap(dir: &tempfile::TempDir, cap: usize) -> NotificationLog {
        let mut config = RelayConfig::default();
        config.logging.notification_log_size = cap;
        NotificationLog::new(
            dir.path().join("notifications.json"),
            SharedConfig::from_value(config),
        )
    }

    fn entry(title: &str, timestamp: i64) -> LoggedNotification {
        LoggedNotification {
            title: title.to_string(),
            message: format!("{} body", title),
            icon: None,
            actions: None,
            wait: false,
            timestamp,
        }
    }

    #[tokio::test]
    async fn append_evicts_oldest_at_capacity() {
        let temp = tempfile::TempDir::new().unwrap();
        let log = log_with_cap(&temp, 3);

        for (i, title) in ["A", "B", "C", "D"].iter().enumerate() {
            log.append(entry(title, i as i64)).await.unwrap();
        }

        let raw = std::fs::read_to_string(temp.path().join("notifications.json")).unwrap();
        let entries: Vec<LoggedNotification> = serde_json::from_str(&raw).unwrap();

        let titles: Vec<&str> = entries.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["B", "C", "D"]);
    }

    #[tokio::test]
    async fn read_page_is_newest_first_with_clamps() {
        let temp = tempfile::TempDir::new().unwrap();
        let log = log_with_cap(&temp, 10);

        for i in 0..5 {
            log.append(entry(&format!("n{}", i), i)).await.unwrap();
        }

        let page = log.read_page(0, 2).await.unwrap().unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.page_count, 3);
        assert_eq!(page.entries[0].title, "n4");
        assert_eq!(page.entries[1].title, "n3");

        // out-of-range page clamps to the last one
        let last = log.read_page(99, 2).await.unwrap().unwrap();
        assert_eq!(last.page, 2);
        assert_eq!(last.entries.len(), 1);
        assert_eq!(last.entries[0].title, "n0");

        // zero page size is bumped to one entry per page
        let narrow = log.read_page(0, 0).await.unwrap().unwrap();
        assert_eq!(narrow.entries.len(), 1);
    }

    #[tokio::test]
    async fn empty_and_absent_logs_read_as_none() {
        let temp = tempfile::TempDir::new().unwrap();
        let log = log_with_cap(&temp, 10);

        assert!(log.read_page(0, 5).await.unwrap().is_none());

        log.append(entry("only", 1)).await.unwrap();
        assert!(log.read_page(0, 5).await.unwrap().is_some());

        log.clear_all().await.unwrap();
        assert!(!temp.path().join("notifications.json").exists());
        assert!(log.read_page(0, 5).await.unwrap().is_none());

        // appends after a clear recreate the file
        log.append(entry("again", 2)).await.unwrap();
        assert_eq!(log.read_page(0, 5).await.unwrap().unwrap().total, 1);
    }
}
