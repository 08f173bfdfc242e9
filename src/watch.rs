//! Debounced single-file watcher.
//!
//! Wraps the platform watcher behind a small watched-resource contract:
//! a path, a debounce interval and a reload callback. Change events are
//! coalesced so an editor writing a file several times in quick
//! succession triggers one reload, not a storm.

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;

/// Keeps the underlying watcher alive; dropping this stops the watch.
pub struct WatchedFile {
    _watcher: RecommendedWatcher,
}

/// Watch `path` and invoke `on_change` after writes settle for `debounce`.
///
/// The watch is registered on the parent directory so the file may be
/// replaced atomically (rename-over) without losing the subscription.
pub fn watch_file<F>(path: &Path, debounce: Duration, on_change: F) -> Result<WatchedFile, String>
where
    F: Fn() + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<notify::Result<Event>>();

    let mut watcher = RecommendedWatcher::new(tx, Config::default())
        .map_err(|e| format!("Watcher create failed: {}", e))?;

    let watch_root = path.parent().unwrap_or(path);
    watcher
        .watch(watch_root, RecursiveMode::NonRecursive)
        .map_err(|e| format!("Watch {} failed: {}", watch_root.display(), e))?;

    let target: PathBuf = path.to_path_buf();
    std::thread::spawn(move || {
        loop {
            let event = match rx.recv() {
                Ok(event) => event,
                Err(_) => break,
            };

            if !is_relevant(&event, &target) {
                continue;
            }

            // Swallow follow-up events until the file settles.
            while let Ok(next) = rx.recv_timeout(debounce) {
                if let Err(e) = next {
                    tracing::warn!("Watch error on {}: {}", target.display(), e);
                }
            }

            on_change();
        }
    });

    Ok(WatchedFile { _watcher: watcher })
}

fn is_relevant(event: &notify::Result<Event>, target: &Path) -> bool {
    match event {
        Ok(event) => {
            let Some(name) = target.file_name() else {
                return false;
            };
            matches!(
                event.kind,
                notify::EventKind::Create(_)
                    | notify::EventKind::Modify(_)
                    | notify::EventKind::Remove(_)
            ) && event.paths.iter().any(|p| p.file_name() == Some(name))
        }
        Err(e) => {
            tracing::warn!("Watch error on {}: {}", target.display(), e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn coalesces_rapid_writes_into_one_reload() {
        let temp = tempfile::TempDir::new().unwrap();
        let file = temp.path().join("watched.txt");
        std::fs::write(&file, "initial").unwrap();

        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let _watch = watch_file(&file, Duration::from_millis(200), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        // Give the watcher time to register before writing.
        std::thread::sleep(Duration::from_millis(300));
        for i in 0..5 {
            std::fs::write(&file, format!("write {}", i)).unwrap();
            std::thread::sleep(Duration::from_millis(10));
        }

        std::thread::sleep(Duration::from_millis(800));
        let count = fired.load(Ordering::SeqCst);
        assert!(count >= 1, "expected at least one reload");
        assert!(count <= 2, "expected rapid writes to coalesce, got {}", count);
    }
}
