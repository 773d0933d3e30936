//! Advisory file locks keyed by path.
//!
//! Several table objects (buffers, per-level split files, retried attempts)
//! can reference the same physical bulk file. The table-level `RwLock` only
//! protects one instance, so readers and writers of a path are additionally
//! serialized here, across every instance in the process.

use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

/// Fixed backoff between two attempts to take a contended file lock.
pub const FILE_LOCK_POLL: Duration = Duration::from_millis(5);

/// Process-wide registry: the lock is keyed by path, not by table instance.
pub static FILE_LOCKS: LazyLock<FileLockRegistry> = LazyLock::new(FileLockRegistry::default);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileAccess {
    Read,
    Write,
}

#[derive(Debug, Default)]
struct Holders {
    readers: usize,
    writer: bool,
}

#[derive(Default)]
pub struct FileLockRegistry {
    held: DashMap<PathBuf, Holders>,
}

impl FileLockRegistry {
    /// Blocks until `access` on `path` is granted, polling with a fixed backoff.
    pub fn acquire(&self, path: &Path, access: FileAccess) -> FileLockGuard<'_> {
        let mut polls = 0u64;

        while !self.try_acquire(path, access) {
            if polls == 0 {
                tracing::debug!("File lock contention on {} ({:?})", path.display(), access);
            }
            polls += 1;
            std::thread::sleep(FILE_LOCK_POLL);
        }

        if polls > 0 {
            tracing::debug!(
                "Acquired {:?} lock on {} after {} polls",
                access,
                path.display(),
                polls
            );
        }

        FileLockGuard {
            registry: self,
            path: path.to_path_buf(),
            access,
        }
    }

    pub fn try_acquire(&self, path: &Path, access: FileAccess) -> bool {
        let mut holders = self.held.entry(path.to_path_buf()).or_default();
        match access {
            FileAccess::Read if !holders.writer => {
                holders.readers += 1;
                true
            }
            FileAccess::Write if !holders.writer && holders.readers == 0 => {
                holders.writer = true;
                true
            }
            _ => false,
        }
    }

    pub fn is_locked(&self, path: &Path) -> bool {
        self.held
            .get(path)
            .map(|holders| holders.writer || holders.readers > 0)
            .unwrap_or(false)
    }

    fn release(&self, path: &Path, access: FileAccess) {
        {
            let Some(mut holders) = self.held.get_mut(path) else {
                return;
            };
            match access {
                FileAccess::Read => holders.readers = holders.readers.saturating_sub(1),
                FileAccess::Write => holders.writer = false,
            }
        }
        self.held
            .remove_if(path, |_, holders| !holders.writer && holders.readers == 0);
    }
}

pub struct FileLockGuard<'a> {
    registry: &'a FileLockRegistry,
    path: PathBuf,
    access: FileAccess,
}

impl Drop for FileLockGuard<'_> {
    fn drop(&mut self) {
        self.registry.release(&self.path, self.access);
    }
}
