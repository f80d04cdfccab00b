//! Filesystem watcher
//!
//! Coalesces `notify` events through a debounce window and drives the
//! ingestion pipeline through a [`BatchSink`] port. State machine:
//! `Idle → Collecting → Draining → Idle`; events arriving mid-drain
//! re-enter Collecting. Back-pressure from the sink (the embedder's
//! semaphore, ultimately) pauses the drain naturally because the drain
//! blocks on the sink call.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use codelens_core::config::WatchConfig;
use codelens_core::{EngineError, Language, Result};
use codelens_store::DATA_DIR_NAME;

/// Where drained batches go (the ingestion pipeline in production)
pub trait BatchSink: Send + Sync {
    fn handle_batch(&self, paths: Vec<PathBuf>);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Idle,
    Collecting,
    Draining,
}

/// Debounce window over raw events; pure state, separately testable.
pub struct DebounceBuffer {
    pending: HashMap<PathBuf, Instant>,
    window: Duration,
    batch_size: usize,
}

impl DebounceBuffer {
    pub fn new(window: Duration, batch_size: usize) -> Self {
        Self {
            pending: HashMap::new(),
            window,
            batch_size: batch_size.max(1),
        }
    }

    pub fn record(&mut self, path: PathBuf, now: Instant) {
        self.pending.insert(path, now);
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// When the newest event is older than the window, take a batch
    /// (bounded by `batch_size`), ordered by path.
    pub fn take_ready(&mut self, now: Instant) -> Option<Vec<PathBuf>> {
        if self.pending.is_empty() {
            return None;
        }
        let newest = self.pending.values().max().copied()?;
        if now.duration_since(newest) < self.window {
            return None;
        }

        let mut paths: Vec<PathBuf> = self.pending.keys().cloned().collect();
        paths.sort();
        paths.truncate(self.batch_size);
        for path in &paths {
            self.pending.remove(path);
        }
        Some(paths)
    }
}

pub struct WorkspaceWatcher {
    workspace_root: PathBuf,
    config: WatchConfig,
    sink: Arc<dyn BatchSink>,
    state: Arc<Mutex<WatcherState>>,
    running: Arc<AtomicBool>,
    watcher: Option<RecommendedWatcher>,
    thread: Option<thread::JoinHandle<()>>,
}

impl WorkspaceWatcher {
    pub fn new(
        workspace_root: impl Into<PathBuf>,
        config: WatchConfig,
        sink: Arc<dyn BatchSink>,
    ) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            config,
            sink,
            state: Arc::new(Mutex::new(WatcherState::Idle)),
            running: Arc::new(AtomicBool::new(false)),
            watcher: None,
            thread: None,
        }
    }

    pub fn state(&self) -> WatcherState {
        *self.state.lock()
    }

    pub fn start(&mut self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(EngineError::configuration("watcher already running"));
        }

        let (tx, rx) = channel::<Event>();
        let mut watcher = RecommendedWatcher::new(
            move |outcome: notify::Result<Event>| match outcome {
                Ok(event) => {
                    let _ = tx.send(event);
                }
                Err(e) => warn!(error = %e, "watch event error"),
            },
            notify::Config::default(),
        )
        .map_err(|e| EngineError::internal(format!("cannot create watcher: {e}")))?;

        watcher
            .watch(&self.workspace_root, RecursiveMode::Recursive)
            .map_err(|e| {
                EngineError::workspace(format!("cannot watch workspace: {e}"))
                    .with_path(&self.workspace_root)
            })?;
        self.watcher = Some(watcher);

        let root = self.workspace_root.clone();
        let window = Duration::from_millis(self.config.debounce_ms);
        let batch_size = self.config.batch_size;
        let sink = Arc::clone(&self.sink);
        let state = Arc::clone(&self.state);
        let running = Arc::clone(&self.running);

        self.thread = Some(thread::spawn(move || {
            event_loop(rx, root, window, batch_size, sink, state, running);
        }));

        info!(root = %self.workspace_root.display(), "watcher started");
        Ok(())
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.watcher = None; // drops the notify watcher, closing the channel
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        *self.state.lock() = WatcherState::Idle;
        info!("watcher stopped");
    }
}

impl Drop for WorkspaceWatcher {
    fn drop(&mut self) {
        if self.running.load(Ordering::SeqCst) {
            self.stop();
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn event_loop(
    rx: Receiver<Event>,
    root: PathBuf,
    window: Duration,
    batch_size: usize,
    sink: Arc<dyn BatchSink>,
    state: Arc<Mutex<WatcherState>>,
    running: Arc<AtomicBool>,
) {
    let mut buffer = DebounceBuffer::new(window, batch_size);
    let poll = window.max(Duration::from_millis(20));

    while running.load(Ordering::SeqCst) {
        match rx.recv_timeout(poll) {
            Ok(event) => {
                if relevant(&event) {
                    let now = Instant::now();
                    for path in event.paths {
                        if admits(&root, &path) {
                            buffer.record(path, now);
                            *state.lock() = WatcherState::Collecting;
                        }
                    }
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        if let Some(batch) = buffer.take_ready(Instant::now()) {
            *state.lock() = WatcherState::Draining;
            debug!(files = batch.len(), "draining watch batch");
            sink.handle_batch(batch);
            // events that landed mid-drain re-enter Collecting
            *state.lock() = if buffer.is_empty() {
                WatcherState::Idle
            } else {
                WatcherState::Collecting
            };
        } else if buffer.is_empty() {
            *state.lock() = WatcherState::Idle;
        }
    }
}

fn relevant(event: &Event) -> bool {
    matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

/// Supported-language files outside the data directory.
fn admits(root: &Path, path: &Path) -> bool {
    if path
        .components()
        .any(|c| c.as_os_str() == DATA_DIR_NAME || c.as_os_str() == ".git")
    {
        return false;
    }
    if !path.starts_with(root) {
        return false;
    }
    path.to_str()
        .map(|p| Language::from_file_path(p).is_some())
        .unwrap_or(false)
}
