//! Reload path aliases when the project's tsconfig/jsconfig changes.
//!
//! The project root is watched non-recursively, along with the directory of
//! every file the active config `extends` from outside it. Events for those
//! files are sent to a tokio task that coalesces bursts and reloads once per
//! burst. Each reload refreshes the set of watched files and directories.

use super::PathAliasResolver;
use crate::lifecycle::{install_exit_hook, remove_exit_hook, HookId};
use notify::{
    event::ModifyKind, Config, Event, EventKind, RecommendedWatcher, RecursiveMode,
    Watcher as NotifyWatcher,
};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Event coalescing window.
const COALESCE_WINDOW_MS: u64 = 50;

type WatcherSlot = Arc<Mutex<Option<RecommendedWatcher>>>;

/// Live watch on the project's path-alias config.
///
/// Dropping it stops the watch.
#[derive(Debug)]
pub struct PathAliasWatcher {
    root: PathBuf,
    watcher: WatcherSlot,
    hook: Mutex<Option<HookId>>,
    reloads: Arc<AtomicU64>,
}

impl PathAliasWatcher {
    /// Start watching the config files of `resolver`'s project.
    ///
    /// Must be called from within a tokio runtime. Registers an exit hook
    /// that stops the watch.
    ///
    /// # Errors
    /// Returns an error if there is no runtime, the root is not a directory,
    /// or the platform watcher cannot be created.
    pub fn start(resolver: Arc<PathAliasResolver>) -> Result<Self, WatchError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| WatchError::NoRuntime)?;

        let root = resolver.project_root().to_path_buf();
        if !root.is_dir() {
            return Err(WatchError::InvalidRoot(root.display().to_string()));
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<PathBuf>>();

        let filter = Arc::clone(&resolver);
        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    if !should_process_event(&event) {
                        return;
                    }
                    let paths: Vec<PathBuf> = event
                        .paths
                        .into_iter()
                        .filter(|p| filter.is_watched(p))
                        .collect();
                    if !paths.is_empty() {
                        if let Err(e) = tx.send(paths) {
                            warn!(error = %e, "Failed to send watch event");
                        }
                    }
                }
                Err(e) => {
                    error!(error = %e, "Watch error");
                }
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )
        .map_err(|e| WatchError::WatcherFailed(e.to_string()))?;

        watcher
            .watch(&root, RecursiveMode::NonRecursive)
            .map_err(|e| WatchError::WatcherFailed(e.to_string()))?;
        info!(root = %root.display(), "Watching path-alias config");

        let slot: WatcherSlot = Arc::new(Mutex::new(Some(watcher)));
        let mut extra_dirs = BTreeSet::new();
        sync_extra_dirs(&slot, &resolver, &mut extra_dirs);
        let reloads = Arc::new(AtomicU64::new(0));

        let task = EventTask {
            resolver,
            slot: Arc::clone(&slot),
            extra_dirs,
            reloads: Arc::clone(&reloads),
        };
        runtime.spawn(async move {
            task.run(&mut rx).await;
        });

        let hook_slot = Arc::clone(&slot);
        let hook = install_exit_hook(move || {
            if hook_slot.lock().take().is_some() {
                debug!("Path-alias watch stopped on exit");
            }
        });

        Ok(Self {
            root,
            watcher: slot,
            hook: Mutex::new(Some(hook)),
            reloads,
        })
    }

    /// Directory being watched.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.watcher.lock().is_some()
    }

    /// Number of reloads applied so far.
    #[must_use]
    pub fn reload_count(&self) -> u64 {
        self.reloads.load(Ordering::Acquire)
    }

    /// Stop watching and deregister the exit hook.
    ///
    /// # Errors
    /// Returns [`WatchError::NotRunning`] if already stopped.
    pub fn stop(&self) -> Result<(), WatchError> {
        if let Some(hook) = self.hook.lock().take() {
            remove_exit_hook(hook);
        }
        // Dropping the platform watcher closes the channel, which ends the task
        if self.watcher.lock().take().is_none() {
            return Err(WatchError::NotRunning);
        }
        info!(root = %self.root.display(), "Path-alias watch stopped");
        Ok(())
    }
}

impl Drop for PathAliasWatcher {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// State of the event-processing task.
struct EventTask {
    resolver: Arc<PathAliasResolver>,
    slot: WatcherSlot,
    /// Directories watched besides the project root.
    extra_dirs: BTreeSet<PathBuf>,
    reloads: Arc<AtomicU64>,
}

impl EventTask {
    /// Coalesce events, then reload once per burst.
    async fn run(mut self, rx: &mut mpsc::UnboundedReceiver<Vec<PathBuf>>) {
        let mut pending = false;

        loop {
            let timeout =
                tokio::time::timeout(Duration::from_millis(COALESCE_WINDOW_MS), rx.recv()).await;

            match timeout {
                Ok(Some(paths)) => {
                    for path in &paths {
                        debug!(path = %path.display(), "Path-alias config changed");
                    }
                    pending = true;
                }
                Ok(None) => {
                    debug!("Path-alias watch channel closed");
                    break;
                }
                Err(_) => {
                    if pending {
                        pending = false;
                        self.reload().await;
                    }
                }
            }
        }
    }

    async fn reload(&mut self) {
        // Config reads are blocking file I/O
        let resolver = Arc::clone(&self.resolver);
        match tokio::task::spawn_blocking(move || resolver.reload()).await {
            Ok(Ok(())) => {
                self.reloads.fetch_add(1, Ordering::Release);
                sync_extra_dirs(&self.slot, &self.resolver, &mut self.extra_dirs);
            }
            Ok(Err(e)) => warn!(error = %e, "Failed to reload path aliases"),
            Err(e) => error!(error = %e, "Path-alias reload task failed"),
        }
    }
}

/// Directories holding watched files outside the project root.
fn extra_dirs_for(resolver: &PathAliasResolver) -> BTreeSet<PathBuf> {
    let root = resolver.project_root();
    resolver
        .watched_files()
        .iter()
        .filter_map(|file| file.parent())
        .filter(|dir| *dir != root)
        .map(Path::to_path_buf)
        .collect()
}

/// Watch directories the config now extends from; unwatch the ones it no
/// longer does.
fn sync_extra_dirs(slot: &WatcherSlot, resolver: &PathAliasResolver, current: &mut BTreeSet<PathBuf>) {
    let wanted = extra_dirs_for(resolver);
    let mut guard = slot.lock();
    let Some(watcher) = guard.as_mut() else {
        return;
    };

    for dir in current.difference(&wanted) {
        if let Err(e) = watcher.unwatch(dir) {
            debug!(dir = %dir.display(), error = %e, "Failed to unwatch directory");
        }
    }
    current.retain(|dir| wanted.contains(dir));

    for dir in wanted {
        if current.contains(&dir) {
            continue;
        }
        match watcher.watch(&dir, RecursiveMode::NonRecursive) {
            Ok(()) => {
                debug!(dir = %dir.display(), "Watching extended config directory");
                current.insert(dir);
            }
            Err(e) => warn!(dir = %dir.display(), error = %e, "Failed to watch extended config directory"),
        }
    }
}

/// Creates, content changes, renames and removals. Metadata-only changes
/// are ignored.
fn should_process_event(event: &Event) -> bool {
    match &event.kind {
        EventKind::Create(_) | EventKind::Remove(_) => true,
        EventKind::Modify(ModifyKind::Metadata(_)) => false,
        EventKind::Modify(_) => true,
        _ => false,
    }
}

/// Watcher error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WatchError {
    #[error("Watching requires a tokio runtime")]
    NoRuntime,
    #[error("Watcher is not running")]
    NotRunning,
    #[error("Invalid watch root: {0}")]
    InvalidRoot(String),
    #[error("Watcher failed: {0}")]
    WatcherFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, MetadataKind, RemoveKind};

    #[test]
    fn test_extra_dirs_cover_extends_outside_root() {
        let shared = tempfile::tempdir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let base = shared.path().join("base.json");
        std::fs::write(&base, r#"{ "compilerOptions": { "baseUrl": "." } }"#).unwrap();
        let rel = fastresolve_util::fs::relative_specifier(dir.path(), &base);
        std::fs::write(
            dir.path().join("tsconfig.json"),
            format!(r#"{{ "extends": "{rel}" }}"#),
        )
        .unwrap();
        std::fs::write(dir.path().join("tsconfig.local.json"), "{}").unwrap();

        let resolver = PathAliasResolver::load(dir.path()).unwrap();
        let dirs = extra_dirs_for(&resolver);
        assert_eq!(dirs.into_iter().collect::<Vec<_>>(), vec![shared.path().to_path_buf()]);
    }

    #[test]
    fn test_should_process_event() {
        let event = |kind| Event::new(kind);
        assert!(should_process_event(&event(EventKind::Create(CreateKind::File))));
        assert!(should_process_event(&event(EventKind::Modify(ModifyKind::Data(
            DataChange::Content
        )))));
        assert!(should_process_event(&event(EventKind::Remove(RemoveKind::File))));
        assert!(!should_process_event(&event(EventKind::Modify(
            ModifyKind::Metadata(MetadataKind::WriteTime)
        ))));
        assert!(!should_process_event(&event(EventKind::Access(
            notify::event::AccessKind::Any
        ))));
    }

    #[test]
    fn test_watch_error_messages() {
        assert_eq!(WatchError::NotRunning.to_string(), "Watcher is not running");
        assert_eq!(
            WatchError::InvalidRoot("/nope".into()).to_string(),
            "Invalid watch root: /nope"
        );
        let err: Box<dyn std::error::Error> = Box::new(WatchError::NoRuntime);
        assert!(err.source().is_none());
    }

    #[test]
    fn test_start_outside_runtime_fails() {
        let resolver = Arc::new(PathAliasResolver::new(std::env::temp_dir(), None));
        let err = PathAliasWatcher::start(resolver).unwrap_err();
        assert_eq!(err, WatchError::NoRuntime);
    }
}
