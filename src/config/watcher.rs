//! Manifest file watcher for hot reload.
//!
//! The parent directory is watched rather than the file itself: editors and
//! ConfigMap mounts replace the manifest by renaming a new file (or a
//! `..data` symlink) over it, which would orphan a watch on the old inode.
//! Events are filtered to the manifest's file name and those `..` entries,
//! then debounced. A reload is sent only when the file content changed.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::loader::load_manifest;
use crate::config::schema::Manifest;

/// Quiet period after the last file event before reloading.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(200);

/// Watches a manifest file and sends every changed, valid manifest.
///
/// A manifest that fails to load is logged and dropped, leaving the current
/// dispatcher in place.
pub struct ManifestWatcher {
    path: PathBuf,
    debounce: Duration,
    update_tx: mpsc::UnboundedSender<Manifest>,
}

/// Keeps a running watch alive. Dropping it stops watching.
pub struct WatchHandle {
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl ManifestWatcher {
    /// Returns the watcher and the receiving end of its update channel.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<Manifest>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let watcher = Self {
            path: path.to_path_buf(),
            debounce: DEFAULT_DEBOUNCE,
            update_tx,
        };
        (watcher, update_rx)
    }

    pub fn debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Start watching. Must be called inside a tokio runtime.
    pub fn run(self) -> Result<WatchHandle, notify::Error> {
        let directory = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let file_name = self.path.file_name().map(|name| name.to_os_string()).ok_or_else(|| {
            notify::Error::generic("manifest path has no file name").add_path(self.path.clone())
        })?;

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) if touches_manifest(&event, &file_name) => {
                let _ = event_tx.send(());
            }
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, "Manifest watch error"),
        })?;
        watcher.watch(&directory, RecursiveMode::NonRecursive)?;

        let last = fs::read(&self.path).ok();
        let task = tokio::spawn(reload_loop(self.path.clone(), self.debounce, last, event_rx, self.update_tx));

        tracing::info!(path = ?self.path, directory = ?directory, "Manifest watcher started");
        Ok(WatchHandle {
            _watcher: watcher,
            task,
        })
    }
}

fn touches_manifest(event: &Event, file_name: &OsString) -> bool {
    let relevant_kind = matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Any
    );
    relevant_kind
        && event.paths.iter().any(|path| match path.file_name() {
            Some(name) => name == file_name.as_os_str() || name.to_string_lossy().starts_with(".."),
            None => false,
        })
}

async fn reload_loop(
    path: PathBuf,
    debounce: Duration,
    mut last: Option<Vec<u8>>,
    mut events: mpsc::UnboundedReceiver<()>,
    updates: mpsc::UnboundedSender<Manifest>,
) {
    while events.recv().await.is_some() {
        // Swallow the rest of the burst.
        while let Ok(Some(())) = tokio::time::timeout(debounce, events.recv()).await {}

        let content = match fs::read(&path) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(path = ?path, error = %e, "Manifest unreadable, keeping current dispatcher");
                continue;
            }
        };
        if last.as_deref() == Some(content.as_slice()) {
            continue;
        }

        match load_manifest(&path) {
            Ok(manifest) => {
                last = Some(content);
                tracing::info!(path = ?path, upstreams = manifest.upstreams().len(), "Manifest changed, reloading");
                if updates.send(manifest).is_err() {
                    return;
                }
            }
            Err(e) => {
                tracing::error!(path = ?path, error = %e, "Failed to reload manifest, keeping current dispatcher");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};

    fn event(kind: EventKind, path: &str) -> Event {
        Event::new(kind).add_path(PathBuf::from(path))
    }

    #[test]
    fn test_event_filter() {
        let name = OsString::from("manifest.toml");
        assert!(touches_manifest(&event(EventKind::Modify(ModifyKind::Any), "/etc/pass/manifest.toml"), &name));
        assert!(touches_manifest(&event(EventKind::Create(CreateKind::File), "/etc/pass/manifest.toml"), &name));
        assert!(touches_manifest(
            &event(EventKind::Modify(ModifyKind::Name(RenameMode::To)), "/etc/pass/manifest.toml"),
            &name
        ));
        assert!(touches_manifest(&event(EventKind::Create(CreateKind::Any), "/etc/pass/..data"), &name));
        assert!(!touches_manifest(&event(EventKind::Modify(ModifyKind::Any), "/etc/pass/other.toml"), &name));
        assert!(!touches_manifest(&event(EventKind::Remove(RemoveKind::File), "/etc/pass/manifest.toml"), &name));
    }

    #[tokio::test]
    async fn test_reload_loop_skips_unchanged_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.toml");
        let first = "[[upstream]]\nidentifier = \"a\"\ndestination = \"http://a.internal\"\n";
        fs::write(&path, first).unwrap();

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (update_tx, mut update_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(reload_loop(
            path.clone(),
            Duration::from_millis(10),
            Some(first.as_bytes().to_vec()),
            event_rx,
            update_tx,
        ));

        event_tx.send(()).unwrap();
        fs::write(&path, "[[upstream]]\nidentifier = \"b\"\ndestination = \"http://b.internal\"\n").unwrap();
        event_tx.send(()).unwrap();

        let manifest = tokio::time::timeout(Duration::from_secs(5), update_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(manifest.upstreams()[0].identifier, "b");

        event_tx.send(()).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(update_rx.try_recv().is_err());
        task.abort();
    }
}
