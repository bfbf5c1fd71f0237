use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use crossbeam::channel::{self, Receiver, Sender, select};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use super::store::{ConfigStore, WatchDecision};
use crate::error::ConfigError;

type NotifyEvent = notify::Result<notify::Event>;

/// Watches the configuration file and reloads the store on external edits.
///
/// Dropping the watcher stops the background thread.
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    shutdown: Option<Sender<()>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl ConfigWatcher {
    pub fn spawn(store: Arc<ConfigStore>) -> Result<Self, ConfigError> {
        let (event_tx, event_rx) = channel::unbounded::<NotifyEvent>();
        let (shutdown_tx, shutdown_rx) = channel::bounded::<()>(0);

        // The file is replaced by rename on save, so watch its directory.
        let dir = store.paths().dir.clone();
        let mut watcher = notify::recommended_watcher(move |res: NotifyEvent| {
            let _ = event_tx.send(res);
        })?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        let thread = thread::Builder::new()
            .name("config_watcher".into())
            .spawn(move || watch_loop(&store, &event_rx, &shutdown_rx))
            .map_err(|e| ConfigError::io("watch", &dir, e))?;

        tracing::info!(path = %dir.display(), "config watcher started");

        Ok(ConfigWatcher {
            _watcher: watcher,
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        })
    }
}

impl Drop for ConfigWatcher {
    fn drop(&mut self) {
        drop(self.shutdown.take());
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

enum Step {
    Shutdown,
    Notified(notify::Event),
    WatchError(notify::Error),
    Settled,
}

fn watch_loop(store: &ConfigStore, events: &Receiver<NotifyEvent>, shutdown: &Receiver<()>) {
    let target = store.paths().file_name().map(|n| n.to_os_string());
    let mut pending: Option<Instant> = None;

    loop {
        let settle = match pending {
            Some(at) => channel::at(at),
            None => channel::never(),
        };

        let step = select! {
            recv(shutdown) -> _ => Step::Shutdown,
            recv(events) -> msg => match msg {
                Ok(Ok(event)) => Step::Notified(event),
                Ok(Err(e)) => Step::WatchError(e),
                Err(_) => Step::Shutdown,
            },
            recv(settle) -> _ => Step::Settled,
        };

        match step {
            Step::Shutdown => break,
            Step::Notified(event) if touches_config(&event, target.as_deref()) => {
                match store.on_notification(Instant::now()) {
                    WatchDecision::Suppressed => {
                        tracing::debug!("config change ignored (own write)");
                    }
                    WatchDecision::ReloadAt(at) => {
                        tracing::debug!("config file changed, reloading shortly");
                        pending = Some(at);
                    }
                }
            }
            Step::Notified(_) => {}
            Step::WatchError(e) => tracing::warn!(error = %e, "file watcher error"),
            Step::Settled => {
                pending = None;
                // Failures are logged by the store; the previous table stays live.
                let _ = store.reload();
            }
        }
    }

    tracing::info!("config watcher shutting down");
}

fn touches_config(event: &notify::Event, target: Option<&std::ffi::OsStr>) -> bool {
    let Some(target) = target else {
        return false;
    };
    matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
        && event
            .paths
            .iter()
            .any(|path: &PathBuf| path.file_name() == Some(target))
}
