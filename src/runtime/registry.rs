use std::hash::Hash;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tokio::process::Child;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// A child process this host spawned and still tracks.
#[derive(Debug)]
pub struct Tracked {
    pub child: Child,
    pub pid: u32,
    pub spawned_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Absent,
    Alive(u32),
    Exited(Option<i32>),
}

/// Per-project registry slot. Holding its lock is holding the project lock.
#[derive(Debug, Default)]
pub struct Slot {
    tracked: Option<Tracked>,
}

impl Slot {
    pub fn liveness(&mut self) -> Liveness {
        let Some(tracked) = self.tracked.as_mut() else {
            return Liveness::Absent;
        };
        match tracked.child.try_wait() {
            Ok(None) => Liveness::Alive(tracked.pid),
            Ok(Some(status)) => Liveness::Exited(exit_code(status)),
            Err(e) => {
                tracing::warn!(pid = tracked.pid, "Failed to poll child: {e}");
                Liveness::Exited(None)
            }
        }
    }

    pub fn track(&mut self, tracked: Tracked) {
        self.tracked = Some(tracked);
    }

    pub fn take(&mut self) -> Option<Tracked> {
        self.tracked.take()
    }

    pub fn tracked(&self) -> Option<&Tracked> {
        self.tracked.as_ref()
    }
}

/// Exit code, or `128 + signal` for a child killed by a signal.
pub fn exit_code(status: ExitStatus) -> Option<i32> {
    status.code().or_else(|| status.signal().map(|sig| 128 + sig))
}

/// Live children keyed by project id. One registry per supervisor.
#[derive(Default)]
pub struct ProcessRegistry {
    slots: KeyedLocks<Uuid, Slot>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, project_id: Uuid) -> OwnedMutexGuard<Slot> {
        self.slots.lock(project_id).await
    }

    /// Drop the slot of a project that no longer exists.
    pub fn forget(&self, project_id: Uuid) {
        self.slots.remove(&project_id);
    }

    /// Number of projects with a tracked child, without waiting on busy slots.
    pub fn tracked_count(&self) -> usize {
        self.slots.count_where(|slot| slot.tracked().is_some())
    }
}

/// Lazily created async mutexes keyed by id.
pub struct KeyedLocks<K, V> {
    entries: DashMap<K, Arc<Mutex<V>>>,
}

impl<K, V> Default for KeyedLocks<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl<K, V> KeyedLocks<K, V>
where
    K: Eq + Hash + Clone,
    V: Default,
{
    pub async fn lock(&self, key: K) -> OwnedMutexGuard<V> {
        // Clone the Arc out so the map shard is not held across the await.
        let mutex = self.entries.entry(key).or_default().clone();
        mutex.lock_owned().await
    }

    pub fn remove(&self, key: &K) {
        self.entries.remove(key);
    }

    pub fn count_where<F: Fn(&V) -> bool>(&self, predicate: F) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.value().try_lock().is_ok_and(|value| predicate(&*value)))
            .count()
    }
}
