//! Advisory workspace locking
//!
//! One exclusive writer, unlimited shared readers, serialized
//! process-wide through a flock on `<data>/.lock`. Acquisition polls up
//! to a deadline and returns a structured lock-timeout error, never
//! deadlocking. A dead owner's lock is released by the kernel, so stale
//! locks reclaim themselves; the owner PID is written into the file for
//! diagnostics only.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fs2::FileExt;
use tracing::{debug, warn};

use crate::error::{Result, StoreError};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

pub struct WorkspaceLock {
    path: PathBuf,
    timeout: Duration,
}

impl WorkspaceLock {
    pub fn new(path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            timeout,
        }
    }

    /// Acquire the writer lease.
    pub fn exclusive(&self, op: &str) -> Result<LockGuard> {
        self.acquire(op, LockMode::Exclusive)
    }

    /// Acquire a reader lease.
    pub fn shared(&self, op: &str) -> Result<LockGuard> {
        self.acquire(op, LockMode::Shared)
    }

    fn acquire(&self, op: &str, mode: LockMode) -> Result<LockGuard> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)?;

        let started = Instant::now();
        loop {
            let attempt = match mode {
                LockMode::Exclusive => fs2::FileExt::try_lock_exclusive(&file),
                LockMode::Shared => fs2::FileExt::try_lock_shared(&file),
            };
            match attempt {
                Ok(()) => {
                    if mode == LockMode::Exclusive {
                        stamp_owner(&file);
                    }
                    debug!(op, ?mode, "lock acquired");
                    return Ok(LockGuard { file, mode });
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    if started.elapsed() >= self.timeout {
                        let waited_ms = started.elapsed().as_millis() as u64;
                        warn!(
                            op,
                            waited_ms,
                            holder = current_owner(&self.path).as_deref().unwrap_or("unknown"),
                            "lock acquisition timed out"
                        );
                        return Err(StoreError::LockTimeout {
                            op: op.to_string(),
                            waited_ms,
                        });
                    }
                    std::thread::sleep(POLL_INTERVAL.min(self.timeout));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Held lease; released when dropped
#[derive(Debug)]
pub struct LockGuard {
    file: File,
    mode: LockMode,
}

impl LockGuard {
    pub fn mode(&self) -> LockMode {
        self.mode
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

fn stamp_owner(mut file: &File) {
    // Best-effort diagnostics; the flock itself is the source of truth
    let _ = file.set_len(0);
    let _ = write!(file, "{}", std::process::id());
    let _ = file.flush();
}

fn current_owner(path: &Path) -> Option<String> {
    let mut text = String::new();
    File::open(path).ok()?.read_to_string(&mut text).ok()?;
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}
