//! Sources of settings snapshots and their change notifications.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use eyre::Context;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::watch;

use crate::config::Settings;

pub trait ConfigProvider: Send + Sync {
    /// The latest settings.
    fn current(&self) -> Arc<Settings>;

    /// A receiver that observes every settings change from now on.
    fn subscribe(&self) -> watch::Receiver<Arc<Settings>>;
}

/// Settings held in memory, changed with [`StaticProvider::set`].
pub struct StaticProvider {
    tx: watch::Sender<Arc<Settings>>,
}

impl StaticProvider {
    pub fn new(settings: Settings) -> Self {
        let (tx, _) = watch::channel(Arc::new(settings));
        Self { tx }
    }

    pub fn set(&self, settings: Settings) {
        self.tx.send_replace(Arc::new(settings));
    }
}

impl ConfigProvider for StaticProvider {
    fn current(&self) -> Arc<Settings> {
        self.tx.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<Arc<Settings>> {
        self.tx.subscribe()
    }
}

/// Settings read from a JSON or TOML file and reloaded whenever it changes
/// on disk. A file that fails to parse is logged and the previous settings
/// stay current.
pub struct FileProvider {
    path: PathBuf,
    tx: Arc<watch::Sender<Arc<Settings>>>,
    _watcher: RecommendedWatcher,
}

impl FileProvider {
    pub fn open(path: impl Into<PathBuf>) -> eyre::Result<Self> {
        let path = path.into();
        let settings = Settings::load(&path)?;
        let (tx, _) = watch::channel(Arc::new(settings));
        let tx = Arc::new(tx);

        // Watch the directory, editors tend to replace files instead of
        // writing them in place.
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();

        let watched = path.clone();
        let sender = tx.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            match res {
                Ok(event) if is_relevant(&event, &watched) => reload(&watched, &sender),
                Ok(_) => {}
                Err(e) => tracing::warn!(target: "logwright", "settings watcher error: {}", e),
            }
        })
        .context("Failed creating settings file watcher")?;

        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed watching {:?}", dir))?;

        Ok(Self {
            path,
            tx,
            _watcher: watcher,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-reads the file right away, same as a change notification would.
    pub fn reload(&self) {
        reload(&self.path, &self.tx);
    }
}

impl ConfigProvider for FileProvider {
    fn current(&self) -> Arc<Settings> {
        self.tx.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<Arc<Settings>> {
        self.tx.subscribe()
    }
}

fn is_relevant(event: &Event, path: &Path) -> bool {
    matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Any
    ) && event
        .paths
        .iter()
        .any(|p| p.file_name().is_some_and(|name| Some(name) == path.file_name()))
}

fn reload(path: &Path, tx: &watch::Sender<Arc<Settings>>) {
    match Settings::load(path) {
        Ok(settings) => {
            let changed = tx.send_if_modified(|current| {
                if **current == settings {
                    return false;
                }
                *current = Arc::new(settings);
                true
            });
            if changed {
                tracing::info!(target: "logwright", "reloaded settings from {:?}", path);
            }
        }
        Err(e) => {
            tracing::warn!(target: "logwright", "ignoring settings change in {:?}: {}", path, e)
        }
    }
}
