use crate::schema::Config;
use arc_swap::ArcSwap;
use std::{path::PathBuf, sync::Arc, time::Duration};
use tokio::sync::mpsc;

/// Editors write a file in several steps; changes closer together than
/// this are folded into one reload.
const DEBOUNCE: Duration = Duration::from_millis(250);

/// Keeps the served [`Config`] in sync with its file.
///
/// Handlers hold the handle from [`ConfigWatcher::arc`] and load it per
/// request, so a new backend URL or token source applies to the next
/// request without a restart. A file that fails to parse is ignored and the
/// previous configuration keeps serving.
pub struct ConfigWatcher {
    current: Arc<ArcSwap<Config>>,
    path: PathBuf,
}

impl ConfigWatcher {
    /// # Errors
    ///
    /// Returns a [`figment::Error`] if the file cannot be read or parsed.
    #[allow(clippy::result_large_err)]
    pub fn new(path: PathBuf) -> Result<Self, figment::Error> {
        let config = Config::from_file(&path)?;
        Ok(Self {
            current: Arc::new(ArcSwap::from_pointee(config)),
            path,
        })
    }

    #[must_use]
    pub fn load(&self) -> arc_swap::Guard<Arc<Config>> {
        self.current.load()
    }

    #[must_use]
    pub fn arc(&self) -> Arc<ArcSwap<Config>> {
        Arc::clone(&self.current)
    }

    /// Re-read the file now. An incomplete file is still applied, with a
    /// warning naming what is missing.
    ///
    /// # Errors
    ///
    /// Returns a [`figment::Error`] if the file cannot be read or parsed; the
    /// current configuration is left untouched.
    #[allow(clippy::result_large_err)]
    pub fn reload(&self) -> Result<(), figment::Error> {
        let next = Config::from_file(&self.path)?;
        let missing = next.missing_for_serve();
        if !missing.is_empty() {
            tracing::warn!(path = %self.path.display(), ?missing, "reloaded config is incomplete");
        }
        self.current.store(Arc::new(next));
        tracing::info!(path = %self.path.display(), "configuration reloaded");
        Ok(())
    }

    /// Reload on every change to the file until the runtime shuts down.
    /// Must be called from within a tokio runtime.
    pub fn watch(self: Arc<Self>) {
        use notify::{EventKind, RecursiveMode, Watcher as _};

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut watcher = match notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res
                && matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
            {
                let _ = tx.send(());
            }
        }) {
            Ok(w) => w,
            Err(e) => {
                tracing::error!(error = %e, "config watcher unavailable, hot reload disabled");
                return;
            }
        };
        if let Err(e) = watcher.watch(&self.path, RecursiveMode::NonRecursive) {
            tracing::error!(path = %self.path.display(), error = %e, "cannot watch config file");
            return;
        }

        tokio::spawn(async move {
            // Owned by the task so watching stops when it ends.
            let _watcher = watcher;
            while rx.recv().await.is_some() {
                tokio::time::sleep(DEBOUNCE).await;
                while rx.try_recv().is_ok() {}
                if let Err(e) = self.reload() {
                    tracing::error!(error = %e, "config reload failed, keeping previous config");
                }
            }
        });
    }
}
