//! Per-scope write serialization.
//!
//! Two layers:
//! - [`ScopeLocks`]: an in-process registry with one mutex per scope key, so
//!   writers to the same scope queue up while other scopes proceed.
//! - [`ScopeFileLock`]: a `create_new` lock file next to a scope document,
//!   so separate processes sharing a store directory do not interleave
//!   read-modify-write cycles.

use crate::error::BomError;
use crate::scope::Scope;
use chrono::Utc;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(10);

/// In-process registry of per-scope mutexes.
#[derive(Debug, Default)]
pub struct ScopeLocks {
    registry: Mutex<BTreeMap<String, Arc<Mutex<()>>>>,
}

impl ScopeLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the write lock for `scope`.
    pub fn with_scope<T>(&self, scope: &Scope, f: impl FnOnce() -> T) -> T {
        let slot = {
            let mut registry = self
                .registry
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            Arc::clone(registry.entry(scope.key()).or_default())
        };
        // Saves are atomic renames; a poisoned slot guards no partial state.
        let _held = slot.lock().unwrap_or_else(PoisonError::into_inner);
        f()
    }

    /// Number of scopes that have been locked at least once.
    pub fn tracked_scopes(&self) -> usize {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

pub fn scope_lock_path(document_path: &Path) -> PathBuf {
    let mut path: OsString = document_path.as_os_str().to_os_string();
    path.push(".lock");
    PathBuf::from(path)
}

/// Cross-process lock file guarding one scope document. Removed on drop.
#[derive(Debug)]
pub struct ScopeFileLock {
    lock_path: PathBuf,
    _file: File,
}

impl ScopeFileLock {
    /// Acquire the lock for `document_path`, retrying until `timeout`
    /// elapses.
    pub fn acquire(document_path: &Path, timeout: Duration) -> Result<Self, BomError> {
        let lock_path = scope_lock_path(document_path);
        if let Some(parent) = lock_path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| lock_io(&lock_path, e))?;
        }

        let started = Instant::now();
        loop {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&lock_path)
            {
                Ok(mut file) => {
                    let _ = writeln!(
                        file,
                        "pid={}\nutc={}",
                        std::process::id(),
                        Utc::now().to_rfc3339()
                    );
                    return Ok(Self {
                        lock_path,
                        _file: file,
                    });
                }
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                    if started.elapsed() >= timeout {
                        return Err(BomError::LockBusy {
                            lock_path: lock_path.display().to_string(),
                        });
                    }
                    thread::sleep(LOCK_RETRY_INTERVAL);
                }
                Err(err) => return Err(lock_io(&lock_path, err)),
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.lock_path
    }
}

impl Drop for ScopeFileLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.lock_path);
    }
}

fn lock_io(lock_path: &Path, err: std::io::Error) -> BomError {
    BomError::Storage(format!(
        "failed to acquire scope lock {}: {err}",
        lock_path.display()
    ))
}
