//! Flag Store
//!
//! Versioned, concurrent key to flag storage. Readers share access, writers
//! are exclusive, and every lock acquisition waits at most a bounded time:
//!
//! - a read that times out behaves as if the flag were absent
//! - a write that times out is dropped and logged
//!
//! Callers must therefore tolerate a rare stale or empty read under heavy
//! write contention.
//!
//! Writes are ordered by flag version, not by arrival. Deletes leave a
//! tombstone carrying the delete's version so a late upsert with an older
//! version cannot resurrect the flag.

use crate::flag::Flag;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Default bound on lock acquisition.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(1);

/// What a store write did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The write was committed
    Applied,
    /// The stored version was equal or newer; nothing changed
    Stale,
    /// The lock could not be acquired in time; nothing changed
    LockTimeout,
}

impl WriteOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, WriteOutcome::Applied)
    }
}

/// Flag store trait.
///
/// Implementations must be safe for unbounded concurrent callers. Flags are
/// handed out as shared read-only snapshots; writers replace entries rather
/// than mutating them.
pub trait FlagStore: Send + Sync {
    /// Get a live flag by key.
    ///
    /// Returns `None` for unknown and deleted keys.
    fn get(&self, key: &str) -> Option<Arc<Flag>>;

    /// Snapshot of every live flag.
    fn all(&self) -> HashMap<String, Arc<Flag>>;

    /// Replace the entire contents and mark the store initialized.
    fn init(&self, flags: HashMap<String, Flag>) -> WriteOutcome;

    /// Insert `flag` unless an entry with an equal or newer version exists.
    fn upsert(&self, key: &str, flag: Flag) -> WriteOutcome;

    /// Tombstone `key` at `version` unless an equal or newer entry exists.
    fn delete(&self, key: &str, version: u64) -> WriteOutcome;

    /// Whether at least one `init` has completed.
    fn initialized(&self) -> bool;
}

/// In-memory flag store backed by a `parking_lot::RwLock`.
///
/// # Example
///
/// ```
/// use flagship_eval::{Flag, FlagStore, InMemoryFlagStore, WriteOutcome};
///
/// let store = InMemoryFlagStore::new();
/// assert_eq!(store.upsert("beta", Flag::new("beta", "s").with_version(2)), WriteOutcome::Applied);
///
/// // Older versions are ignored
/// assert_eq!(store.upsert("beta", Flag::new("beta", "s").with_version(1)), WriteOutcome::Stale);
///
/// assert_eq!(store.delete("beta", 3), WriteOutcome::Applied);
/// assert!(store.get("beta").is_none());
/// ```
#[derive(Debug)]
pub struct InMemoryFlagStore {
    flags: RwLock<HashMap<String, Arc<Flag>>>,
    initialized: AtomicBool,
    lock_timeout: Duration,
}

impl InMemoryFlagStore {
    /// Create an empty store with [`DEFAULT_LOCK_TIMEOUT`].
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    /// Create an empty store with a custom lock wait bound.
    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            flags: RwLock::new(HashMap::new()),
            initialized: AtomicBool::new(false),
            lock_timeout,
        }
    }

    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    /// Run `f` under the write lock, or report a timeout.
    fn write<F>(&self, operation: &str, key: &str, f: F) -> WriteOutcome
    where
        F: FnOnce(&mut HashMap<String, Arc<Flag>>) -> WriteOutcome,
    {
        match self.flags.try_write_for(self.lock_timeout) {
            Some(mut flags) => f(&mut flags),
            None => {
                warn!(
                    operation,
                    key,
                    timeout = ?self.lock_timeout,
                    "Flag store write lock timed out, dropping write"
                );
                WriteOutcome::LockTimeout
            }
        }
    }
}

impl Default for InMemoryFlagStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FlagStore for InMemoryFlagStore {
    fn get(&self, key: &str) -> Option<Arc<Flag>> {
        let Some(flags) = self.flags.try_read_for(self.lock_timeout) else {
            warn!(key, timeout = ?self.lock_timeout, "Flag store read lock timed out");
            return None;
        };

        flags.get(key).filter(|flag| !flag.deleted).cloned()
    }

    fn all(&self) -> HashMap<String, Arc<Flag>> {
        let Some(flags) = self.flags.try_read_for(self.lock_timeout) else {
            warn!(timeout = ?self.lock_timeout, "Flag store read lock timed out");
            return HashMap::new();
        };

        flags
            .iter()
            .filter(|(_, flag)| !flag.deleted)
            .map(|(key, flag)| (key.clone(), Arc::clone(flag)))
            .collect()
    }

    fn init(&self, flags: HashMap<String, Flag>) -> WriteOutcome {
        let count = flags.len();
        let outcome = self.write("init", "*", |stored| {
            *stored = flags
                .into_iter()
                .map(|(key, flag)| (key, Arc::new(flag)))
                .collect();
            WriteOutcome::Applied
        });

        if outcome.is_applied() {
            self.initialized.store(true, Ordering::Release);
            debug!(count, "Flag store initialized");
        }
        outcome
    }

    fn upsert(&self, key: &str, flag: Flag) -> WriteOutcome {
        self.write("upsert", key, |stored| {
            if let Some(existing) = stored.get(key)
                && existing.version >= flag.version
            {
                debug!(
                    key,
                    stored_version = existing.version,
                    version = flag.version,
                    "Ignoring stale upsert"
                );
                return WriteOutcome::Stale;
            }

            stored.insert(key.to_string(), Arc::new(flag));
            WriteOutcome::Applied
        })
    }

    fn delete(&self, key: &str, version: u64) -> WriteOutcome {
        self.write("delete", key, |stored| {
            if let Some(existing) = stored.get(key)
                && existing.version >= version
            {
                debug!(
                    key,
                    stored_version = existing.version,
                    version,
                    "Ignoring stale delete"
                );
                return WriteOutcome::Stale;
            }

            stored.insert(key.to_string(), Arc::new(Flag::tombstone(key, version)));
            WriteOutcome::Applied
        })
    }

    fn initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flag::Variation;
    use std::thread;

    fn flag(key: &str, version: u64) -> Flag {
        Flag::new(key, "salt")
            .with_version(version)
            .with_variation(Variation::new(true, 100.0))
    }

    #[test]
    fn test_get_missing() {
        let store = InMemoryFlagStore::new();
        assert!(store.get("missing").is_none());
        assert!(store.all().is_empty());
        assert!(!store.initialized());
    }

    #[test]
    fn test_upsert_inserts_and_replaces_newer() {
        let store = InMemoryFlagStore::new();
        assert_eq!(store.upsert("f", flag("f", 1)), WriteOutcome::Applied);
        assert_eq!(store.upsert("f", flag("f", 2)), WriteOutcome::Applied);
        assert_eq!(store.get("f").unwrap().version, 2);
    }

    #[test]
    fn test_upsert_rejects_equal_and_older() {
        let store = InMemoryFlagStore::new();
        store.upsert("f", flag("f", 5).with_name("current"));

        assert_eq!(
            store.upsert("f", flag("f", 5).with_name("same")),
            WriteOutcome::Stale
        );
        assert_eq!(
            store.upsert("f", flag("f", 4).with_name("older")),
            WriteOutcome::Stale
        );

        let stored = store.get("f").unwrap();
        assert_eq!(stored.version, 5);
        assert_eq!(stored.name, "current");
    }

    #[test]
    fn test_delete_existing() {
        let store = InMemoryFlagStore::new();
        store.upsert("f", flag("f", 1));

        assert_eq!(store.delete("f", 2), WriteOutcome::Applied);
        assert!(store.get("f").is_none());
        assert!(store.all().is_empty());
    }

    #[test]
    fn test_stale_delete_is_ignored() {
        let store = InMemoryFlagStore::new();
        store.upsert("f", flag("f", 3));

        assert_eq!(store.delete("f", 3), WriteOutcome::Stale);
        assert_eq!(store.delete("f", 2), WriteOutcome::Stale);
        assert_eq!(store.get("f").unwrap().version, 3);
    }

    #[test]
    fn test_delete_unknown_key_leaves_tombstone() {
        let store = InMemoryFlagStore::new();
        assert_eq!(store.delete("f", 5), WriteOutcome::Applied);

        // The late insert carries an older version than the delete.
        assert_eq!(store.upsert("f", flag("f", 4)), WriteOutcome::Stale);
        assert!(store.get("f").is_none());

        // A newer insert revives the key.
        assert_eq!(store.upsert("f", flag("f", 6)), WriteOutcome::Applied);
        assert_eq!(store.get("f").unwrap().version, 6);
    }

    #[test]
    fn test_init_replaces_contents() {
        let store = InMemoryFlagStore::new();
        store.upsert("old", flag("old", 1));

        let mut flags = HashMap::new();
        flags.insert("a".to_string(), flag("a", 1));
        flags.insert("b".to_string(), flag("b", 1));
        assert_eq!(store.init(flags), WriteOutcome::Applied);

        assert!(store.initialized());
        assert!(store.get("old").is_none());
        let all = store.all();
        assert_eq!(all.len(), 2);
        assert!(all.contains_key("a"));
        assert!(all.contains_key("b"));
    }

    #[test]
    fn test_init_hides_deleted_entries() {
        let store = InMemoryFlagStore::new();
        let mut flags = HashMap::new();
        flags.insert("live".to_string(), flag("live", 1));
        flags.insert("dead".to_string(), Flag::tombstone("dead", 2));
        store.init(flags);

        assert!(store.get("dead").is_none());
        assert_eq!(store.all().len(), 1);
    }

    #[test]
    fn test_initialized_never_reverts() {
        let store = InMemoryFlagStore::new();
        store.init(HashMap::new());
        store.upsert("f", flag("f", 1));
        store.delete("f", 2);
        assert!(store.initialized());
    }

    #[test]
    fn test_snapshot_is_not_live() {
        let store = InMemoryFlagStore::new();
        store.upsert("f", flag("f", 1));

        let snapshot = store.all();
        store.upsert("g", flag("g", 1));
        store.delete("f", 2);

        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.contains_key("f"));
    }

    #[test]
    fn test_read_times_out_to_absent() {
        let store = InMemoryFlagStore::with_lock_timeout(Duration::from_millis(20));
        store.upsert("f", flag("f", 1));

        let _writer = store.flags.write();
        assert!(store.get("f").is_none());
        assert!(store.all().is_empty());
    }

    #[test]
    fn test_write_times_out_and_is_dropped() {
        let store = InMemoryFlagStore::with_lock_timeout(Duration::from_millis(20));
        store.upsert("f", flag("f", 1));

        {
            let _reader = store.flags.read();
            assert_eq!(store.upsert("f", flag("f", 2)), WriteOutcome::LockTimeout);
            assert_eq!(store.delete("f", 3), WriteOutcome::LockTimeout);
            assert_eq!(store.init(HashMap::new()), WriteOutcome::LockTimeout);
        }

        assert!(!store.initialized());
        assert_eq!(store.get("f").unwrap().version, 1);
    }

    #[test]
    fn test_concurrent_readers_and_writer() {
        let store = Arc::new(InMemoryFlagStore::new());

        let writer = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for version in 1..=500 {
                    store.upsert("f", flag("f", version));
                    if version % 50 == 0 {
                        store.delete("f", version + 1);
                    }
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    let mut last_seen = 0;
                    for _ in 0..1_000 {
                        if let Some(f) = store.get("f") {
                            assert!(!f.deleted);
                            assert!(f.version >= last_seen);
                            last_seen = f.version;
                        }
                        assert!(store.all().values().all(|f| !f.deleted));
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
    }
}
