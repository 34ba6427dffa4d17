//! Per-database mutual exclusion.
//!
//! At most one merge runs against a given application database file at a
//! time within this process. The registry is keyed by canonical path, so
//! `./app.db` and `/abs/app.db` contend for the same lock. Merges against
//! different files proceed in parallel.
//!
//! Other processes are serialized by SQLite's own locking (`BEGIN
//! IMMEDIATE` plus the busy timeout), not by this registry.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Condvar, LazyLock, Mutex, MutexGuard, PoisonError};

use tracing::debug;

struct Registry {
    held: Mutex<HashSet<PathBuf>>,
    released: Condvar,
}

static REGISTRY: LazyLock<Registry> = LazyLock::new(|| Registry {
    held: Mutex::new(HashSet::new()),
    released: Condvar::new(),
});

fn held() -> MutexGuard<'static, HashSet<PathBuf>> {
    // The set stays consistent even if a holder panicked
    REGISTRY.held.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Exclusive claim on one database file, released on drop.
#[derive(Debug)]
pub struct DatabaseLock {
    key: PathBuf,
}

impl DatabaseLock {
    /// Block until no other holder in this process has `path`, then claim it.
    #[must_use]
    pub fn acquire(path: &Path) -> Self {
        let key = lock_key(path);
        let mut held = held();

        if held.contains(&key) {
            debug!(path = %key.display(), "Waiting for in-flight transfer on database");
        }
        while held.contains(&key) {
            held = REGISTRY
                .released
                .wait(held)
                .unwrap_or_else(PoisonError::into_inner);
        }

        held.insert(key.clone());
        Self { key }
    }

    /// Claim `path` only if nobody holds it.
    #[must_use]
    pub fn try_acquire(path: &Path) -> Option<Self> {
        let key = lock_key(path);
        let mut held = held();
        if held.insert(key.clone()) {
            Some(Self { key })
        } else {
            None
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.key
    }
}

impl Drop for DatabaseLock {
    fn drop(&mut self) {
        held().remove(&self.key);
        REGISTRY.released.notify_all();
    }
}

/// Whether two paths name the same database file once resolved.
pub(crate) fn same_file(a: &Path, b: &Path) -> bool {
    lock_key(a) == lock_key(b)
}

fn lock_key(path: &Path) -> PathBuf {
    path.canonicalize()
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf())
}
