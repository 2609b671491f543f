//! Process-wide registry of per-directory locks
//!
//! Starting, initializing and stopping a server on the same data directory
//! from several threads must not interleave. Every supervisor operation on a
//! directory holds that directory's lock for its whole duration.

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

// =============================================================================
// Global Directory Lock Registry
// =============================================================================
//
// Entries are weak so a lock disappears once no operation holds it. Dead
// entries are pruned whenever a new lock is created.

/// Registry of data directory locks (absolute path -> weak lock)
static DIR_LOCKS: Lazy<Mutex<HashMap<PathBuf, Weak<Mutex<()>>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Get the lock serializing supervisor operations on `data_dir`
///
/// `data_dir` must already be absolute so that different spellings of the
/// same directory share one lock.
pub(crate) fn dir_lock(data_dir: &Path) -> Arc<Mutex<()>> {
    let mut locks = DIR_LOCKS.lock();
    if let Some(lock) = locks.get(data_dir).and_then(Weak::upgrade) {
        return lock;
    }
    locks.retain(|_, weak| weak.strong_count() > 0);
    let lock = Arc::new(Mutex::new(()));
    locks.insert(data_dir.to_path_buf(), Arc::downgrade(&lock));
    lock
}
