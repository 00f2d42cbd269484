//! Dev-server filesystem watcher: batches raw filesystem events with a
//! debounce interval before handing them to the full-rebuild classifier.

use crate::orchestrate::{ChangeEvent, EventKind};
use notify::{EventKind as NotifyEventKind, RecommendedWatcher, RecursiveMode, Watcher};
use rustc_hash::FxHashSet;
use std::path::PathBuf;
use std::sync::mpsc::{Receiver, RecvTimeoutError, channel};
use std::time::{Duration, Instant};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

fn classify_notify_kind(kind: &NotifyEventKind) -> EventKind {
    match kind {
        NotifyEventKind::Create(_) => EventKind::Created,
        NotifyEventKind::Remove(_) => EventKind::Deleted,
        NotifyEventKind::Modify(notify::event::ModifyKind::Name(_)) => EventKind::Moved,
        _ => EventKind::Modified,
    }
}

/// Pure batching logic: accumulates raw `(path, kind, observed_at)`
/// events and flushes a batch once `debounce` has elapsed since the
/// last observed event, deduplicating by path (last kind wins).
#[derive(Default)]
pub struct DebounceBatcher {
    pending: Vec<ChangeEvent>,
    last_seen: Option<Instant>,
}

impl DebounceBatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, path: String, kind: EventKind, at: Instant) {
        if let Some(existing) = self.pending.iter_mut().find(|e| e.path == path) {
            existing.kind = kind;
        } else {
            self.pending.push(ChangeEvent { path, kind });
        }
        self.last_seen = Some(at);
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// `true` once `debounce` has elapsed since the last pushed event.
    pub fn ready(&self, now: Instant, debounce: Duration) -> bool {
        match self.last_seen {
            Some(last) => !self.pending.is_empty() && now.duration_since(last) >= debounce,
            None => false,
        }
    }

    pub fn flush(&mut self) -> Vec<ChangeEvent> {
        self.last_seen = None;
        std::mem::take(&mut self.pending)
    }
}

/// Watches a fixed set of root directories, recursively, re-attaching
/// roots that are removed and recreated (e.g. during a clean rebuild).
pub struct RootWatcher {
    desired: Vec<PathBuf>,
    attached: FxHashSet<PathBuf>,
}

impl RootWatcher {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self {
            desired: roots,
            attached: FxHashSet::default(),
        }
    }

    pub fn attach_existing(&mut self, watcher: &mut RecommendedWatcher) -> notify::Result<()> {
        for path in &self.desired {
            if !path.exists() {
                continue;
            }
            match watcher.watch(path, RecursiveMode::Recursive) {
                Ok(()) => {
                    self.attached.insert(path.clone());
                }
                Err(err) => {
                    if !path.exists() {
                        continue;
                    }
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    pub fn maintain(&mut self, watcher: &mut RecommendedWatcher) {
        self.attached.retain(|path| path.exists());
        for path in &self.desired {
            if self.attached.contains(path) || !path.exists() {
                continue;
            }
            if watcher.watch(path, RecursiveMode::Recursive).is_ok() {
                self.attached.insert(path.clone());
            }
        }
    }
}

/// Runs `watcher_thread` until `rx` yields a batch or the channel closes.
/// Intended to be driven from a dedicated thread; `on_batch` is invoked
/// once per debounced batch of changed paths.
pub fn run_debounced(
    rx: &Receiver<notify::Result<notify::Event>>,
    debounce: Duration,
    mut on_batch: impl FnMut(Vec<ChangeEvent>),
) {
    let mut batcher = DebounceBatcher::new();
    loop {
        match rx.recv_timeout(Duration::from_millis(50)) {
            Ok(Ok(event)) => {
                let kind = classify_notify_kind(&event.kind);
                for path in event.paths {
                    batcher.push(crate::paths::to_posix(&path), kind, Instant::now());
                }
            }
            Ok(Err(_)) => {}
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        if batcher.ready(Instant::now(), debounce) {
            on_batch(batcher.flush());
        }
    }
}

pub fn build_watcher(
    roots: Vec<PathBuf>,
) -> notify::Result<(RecommendedWatcher, Receiver<notify::Result<notify::Event>>, RootWatcher)> {
    let (tx, rx) = channel();
    let mut watcher = notify::recommended_watcher(move |event| {
        let _ = tx.send(event);
    })?;
    let mut roots_mgr = RootWatcher::new(roots);
    roots_mgr.attach_existing(&mut watcher)?;
    Ok((watcher, rx, roots_mgr))
}
