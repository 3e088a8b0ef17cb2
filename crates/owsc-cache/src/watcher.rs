//! File system watching for cache invalidation.
//!
//! [`ChangeWatcher`] keeps the set of files that currently have a cached
//! document and mirrors it into an OS watcher. Raw notify events are funneled
//! through a channel to a background thread that debounces them and hands each
//! changed path to the cache once per burst.

use std::collections::HashSet;
use std::sync::mpsc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use anyhow::Result;
use camino::Utf8Path;
use camino::Utf8PathBuf;
use notify::Config;
use notify::Event;
use notify::EventKind;
use notify::RecommendedWatcher;
use notify::RecursiveMode;
use notify::Watcher;

/// The watch set of the configuration cache.
///
/// A path is in the set exactly while it has a cached document. The OS watcher
/// is optional: a detached watcher only tracks the set, and invalidation is
/// driven by explicit [`ConfigCache::on_path_changed`](crate::ConfigCache::on_path_changed)
/// calls.
pub struct ChangeWatcher {
    state: Mutex<WatchState>,
}

struct WatchState {
    paths: HashSet<Utf8PathBuf>,
    backend: Option<RecommendedWatcher>,
}

impl ChangeWatcher {
    /// A watcher with no OS backend.
    #[must_use]
    pub fn detached() -> Self {
        Self {
            state: Mutex::new(WatchState {
                paths: HashSet::new(),
                backend: None,
            }),
        }
    }

    /// A watcher backed by the platform's recommended notify implementation.
    ///
    /// Every create, modify or remove event on a watched file is sent to `tx`.
    pub fn with_notify(tx: mpsc::Sender<Utf8PathBuf>) -> Result<Self> {
        let backend = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    for path in changed_paths(event) {
                        let _ = tx.send(path);
                    }
                }
                Err(err) => tracing::warn!("File watcher error: {err}"),
            },
            Config::default(),
        )?;

        Ok(Self {
            state: Mutex::new(WatchState {
                paths: HashSet::new(),
                backend: Some(backend),
            }),
        })
    }

    fn state(&self) -> MutexGuard<'_, WatchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a path to the watch set.
    ///
    /// A failed OS registration is logged and the path is still tracked, so
    /// explicit invalidation keeps working for it.
    pub(crate) fn watch(&self, path: &Utf8Path) {
        let mut state = self.state();
        if !state.paths.insert(path.to_path_buf()) {
            return;
        }
        if let Some(backend) = state.backend.as_mut() {
            if let Err(err) = backend.watch(path.as_std_path(), RecursiveMode::NonRecursive) {
                tracing::warn!(path = %path, "Failed to watch configuration file: {err}");
            }
        }
    }

    /// Remove a path from the watch set. Returns whether it was watched.
    pub(crate) fn unwatch(&self, path: &Utf8Path) -> bool {
        let mut state = self.state();
        if !state.paths.remove(path) {
            return false;
        }
        if let Some(backend) = state.backend.as_mut() {
            // The OS drops watches on deleted files by itself.
            if let Err(err) = backend.unwatch(path.as_std_path()) {
                tracing::debug!(path = %path, "Failed to unwatch configuration file: {err}");
            }
        }
        true
    }

    #[must_use]
    pub fn is_watched(&self, path: &Utf8Path) -> bool {
        self.state().paths.contains(path)
    }

    /// Watched paths in sorted order.
    #[must_use]
    pub fn watched_paths(&self) -> Vec<Utf8PathBuf> {
        let mut paths: Vec<Utf8PathBuf> = self.state().paths.iter().cloned().collect();
        paths.sort();
        paths
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state().paths.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether an OS watcher is attached.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.state().backend.is_some()
    }
}

impl std::fmt::Debug for ChangeWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("ChangeWatcher")
            .field("paths", &state.paths)
            .field("attached", &state.backend.is_some())
            .finish()
    }
}

/// Spawn the thread that turns raw change events into cache invalidations.
///
/// `on_change` is called once per distinct path per debounced batch. The thread
/// exits when it returns `false` or when every sender has been dropped.
pub(crate) fn spawn_dispatcher<F>(
    rx: mpsc::Receiver<Utf8PathBuf>,
    debounce: Duration,
    on_change: F,
) -> std::io::Result<thread::JoinHandle<()>>
where
    F: FnMut(&Utf8Path) -> bool + Send + 'static,
{
    thread::Builder::new()
        .name("owsc-watch".to_string())
        .spawn(move || process_events(&rx, debounce, on_change))
}

fn process_events<F>(rx: &mpsc::Receiver<Utf8PathBuf>, debounce: Duration, mut on_change: F)
where
    F: FnMut(&Utf8Path) -> bool,
{
    let mut pending: Vec<Utf8PathBuf> = Vec::new();
    let mut last_event = Instant::now();

    loop {
        match rx.recv_timeout(Duration::from_millis(50)) {
            Ok(path) => {
                if !pending.contains(&path) {
                    pending.push(path);
                }
                last_event = Instant::now();
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                flush(&mut pending, &mut on_change);
                break;
            }
        }

        let quiet = last_event.elapsed() >= debounce;
        if !pending.is_empty() && quiet && !flush(&mut pending, &mut on_change) {
            break;
        }
    }
}

/// Deliver pending paths in arrival order. Returns `false` once the consumer
/// is gone.
fn flush<F>(pending: &mut Vec<Utf8PathBuf>, on_change: &mut F) -> bool
where
    F: FnMut(&Utf8Path) -> bool,
{
    for path in pending.drain(..) {
        if !on_change(&path) {
            return false;
        }
    }
    true
}

/// Paths touched by a content-affecting notify event.
fn changed_paths(event: Event) -> Vec<Utf8PathBuf> {
    match event.kind {
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) => event
            .paths
            .into_iter()
            .filter_map(|path| Utf8PathBuf::try_from(path).ok())
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use notify::event::AccessKind;
    use notify::event::ModifyKind;
    use notify::event::RemoveKind;

    use super::*;

    #[test]
    fn detached_watcher_tracks_paths() {
        let watcher = ChangeWatcher::detached();
        let path = Utf8Path::new("/srv/a.qgs");

        assert!(!watcher.is_attached());
        watcher.watch(path);
        watcher.watch(path);
        assert!(watcher.is_watched(path));
        assert_eq!(watcher.len(), 1);

        assert!(watcher.unwatch(path));
        assert!(!watcher.unwatch(path));
        assert!(watcher.is_empty());
    }

    #[test]
    fn watched_paths_are_sorted() {
        let watcher = ChangeWatcher::detached();
        watcher.watch(Utf8Path::new("/b.xml"));
        watcher.watch(Utf8Path::new("/a.xml"));
        assert_eq!(
            watcher.watched_paths(),
            vec![Utf8PathBuf::from("/a.xml"), Utf8PathBuf::from("/b.xml")]
        );
    }

    #[test]
    fn content_events_yield_paths() {
        let modify = Event::new(EventKind::Modify(ModifyKind::Any))
            .add_path(PathBuf::from("/srv/a.qgs"));
        let remove = Event::new(EventKind::Remove(RemoveKind::File))
            .add_path(PathBuf::from("/srv/b.qgs"));

        assert_eq!(changed_paths(modify), vec![Utf8PathBuf::from("/srv/a.qgs")]);
        assert_eq!(changed_paths(remove), vec![Utf8PathBuf::from("/srv/b.qgs")]);
    }

    #[test]
    fn access_events_are_ignored() {
        let access = Event::new(EventKind::Access(AccessKind::Any))
            .add_path(PathBuf::from("/srv/a.qgs"));
        assert!(changed_paths(access).is_empty());
    }

    #[test]
    fn bursts_are_deduplicated() {
        let (tx, rx) = mpsc::channel();
        tx.send(Utf8PathBuf::from("/a.xml")).unwrap();
        tx.send(Utf8PathBuf::from("/b.xml")).unwrap();
        tx.send(Utf8PathBuf::from("/a.xml")).unwrap();
        drop(tx);

        let mut seen = Vec::new();
        process_events(&rx, Duration::from_secs(60), |path| {
            seen.push(path.to_path_buf());
            true
        });

        assert_eq!(
            seen,
            vec![Utf8PathBuf::from("/a.xml"), Utf8PathBuf::from("/b.xml")]
        );
    }

    #[test]
    fn stops_when_consumer_is_gone() {
        let (tx, rx) = mpsc::channel();
        let handle = spawn_dispatcher(rx, Duration::ZERO, |_| false).unwrap();

        tx.send(Utf8PathBuf::from("/a.xml")).unwrap();
        handle.join().unwrap();

        // The receiver went away with the thread.
        assert!(tx.send(Utf8PathBuf::from("/b.xml")).is_err());
    }
}
