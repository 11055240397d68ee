//! Advisory file locks over working-copy paths
//!
//! Each locked path maps to a sentinel file in `<worktree>/.aiflow-locks/`
//! held under an `fs2` exclusive lock. Locks are cooperative: the scheduler
//! already prevents overlapping tasks from sharing a batch, so these locks
//! defend against graph-construction bugs and concurrent aiflow invocations
//! on the same working copy.
//!
//! Path separators are escaped into the sentinel name, so every sentinel is
//! a direct child of the lock directory and stale-lock cleanup is a flat
//! scan.

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::error::EngineError;

pub const LOCK_DIR_NAME: &str = ".aiflow-locks";
const LOCK_SUFFIX: &str = ".aiflow.lock";
const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct LockManager {
    lock_dir: PathBuf,
    timeout: Duration,
}

/// One held sentinel lock.
#[derive(Debug)]
struct HeldLock {
    file: File,
    sentinel: PathBuf,
}

/// The locks one executor holds for the duration of one task. Released in
/// reverse acquisition order on drop; sentinel files are removed best-effort.
#[derive(Default, Debug)]
pub struct LockSet {
    held: Vec<HeldLock>,
}

impl LockSet {
    pub fn len(&self) -> usize {
        self.held.len()
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }

    /// Explicit release; equivalent to dropping.
    pub fn release(self) {}
}

impl Drop for LockSet {
    fn drop(&mut self) {
        while let Some(held) = self.held.pop() {
            let _ = FileExt::unlock(&held.file);
            let _ = std::fs::remove_file(&held.sentinel);
        }
    }
}

impl LockManager {
    /// A manager for the lock directory of one working copy.
    pub fn new(worktree: &Path, timeout: Duration) -> Self {
        Self {
            lock_dir: worktree.join(LOCK_DIR_NAME),
            timeout,
        }
    }

    /// Acquire every path, in order, polling until the configured timeout.
    /// All-or-nothing: any failure releases the locks already acquired in
    /// this call. Duplicate paths are deduplicated.
    pub fn acquire(&self, paths: &[String]) -> Result<LockSet, EngineError> {
        let deadline = Instant::now() + self.timeout;
        self.acquire_until(paths, Some(deadline))
    }

    /// Non-blocking variant: `None` when any path is already held elsewhere.
    pub fn try_acquire(&self, paths: &[String]) -> Result<Option<LockSet>, EngineError> {
        match self.acquire_until(paths, None) {
            Ok(set) => Ok(Some(set)),
            Err(EngineError::LockTimeout { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn acquire_until(
        &self,
        paths: &[String],
        deadline: Option<Instant>,
    ) -> Result<LockSet, EngineError> {
        let paths = dedup(paths);
        let mut set = LockSet::default();
        if paths.is_empty() {
            return Ok(set);
        }

        self.ensure_lock_dir()?;

        for path in paths {
            let sentinel = self.sentinel_path(&path);
            loop {
                let file = open_sentinel(&sentinel)?;
                match file.try_lock_exclusive() {
                    Ok(()) => {
                        set.held.push(HeldLock { file, sentinel });
                        break;
                    }
                    Err(e) if is_contended(&e) => {
                        // Dropping `set` here releases everything acquired in
                        // this call.
                        match deadline {
                            Some(deadline) if Instant::now() < deadline => {
                                std::thread::sleep(POLL_INTERVAL.min(
                                    deadline.saturating_duration_since(Instant::now()),
                                ));
                            }
                            _ => return Err(EngineError::LockTimeout { path }),
                        }
                    }
                    Err(e) => {
                        return Err(EngineError::Persistence {
                            reason: format!("lock sentinel {}: {e}", sentinel.display()),
                        });
                    }
                }
            }
        }

        Ok(set)
    }

    /// Remove sentinel files nobody holds. A sentinel whose lock can be
    /// acquired immediately has no live holder.
    pub fn cleanup_stale(&self) -> Result<usize, EngineError> {
        let entries = match std::fs::read_dir(&self.lock_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => {
                return Err(EngineError::Persistence {
                    reason: format!("lock directory {}: {e}", self.lock_dir.display()),
                });
            }
        };

        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if !path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(LOCK_SUFFIX))
            {
                continue;
            }
            let Ok(file) = File::open(&path) else {
                continue;
            };
            if file.try_lock_exclusive().is_ok() {
                let _ = FileExt::unlock(&file);
                if std::fs::remove_file(&path).is_ok() {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    fn ensure_lock_dir(&self) -> Result<(), EngineError> {
        if self.lock_dir.exists() {
            return Ok(());
        }
        std::fs::create_dir_all(&self.lock_dir).map_err(|e| EngineError::Persistence {
            reason: format!("failed to create {}: {e}", self.lock_dir.display()),
        })?;
        // The lock directory lives inside the working copy; keep it out of
        // version control the way git does for its own directories.
        let _ = std::fs::write(self.lock_dir.join(".gitignore"), "*\n");
        Ok(())
    }

    fn sentinel_path(&self, path: &str) -> PathBuf {
        self.lock_dir.join(format!("{}{LOCK_SUFFIX}", escape(path)))
    }
}

fn open_sentinel(sentinel: &Path) -> Result<File, EngineError> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .open(sentinel)
        .map_err(|e| EngineError::Persistence {
            reason: format!("failed to open lock sentinel {}: {e}", sentinel.display()),
        })
}

fn is_contended(e: &std::io::Error) -> bool {
    e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

/// Escape a working-copy path into a flat sentinel file name.
fn escape(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for c in path.chars() {
        match c {
            '%' => out.push_str("%25"),
            '/' => out.push_str("%2F"),
            '\\' => out.push_str("%5C"),
            _ => out.push(c),
        }
    }
    out
}

fn dedup(paths: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    paths
        .iter()
        .filter(|p| seen.insert(p.as_str()))
        .cloned()
        .collect()
}
