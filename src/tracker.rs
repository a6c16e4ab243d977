//! Time-bounded membership set of tasks currently believed to be executing
//! externally. Entries expire a fixed TTL after admission (never refreshed
//! on read), so the TTL reflects wall-clock time since the worker handed
//! the task to the job runner. Expiry is the only self-healing path for
//! jobs that never report completion.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::watch;
use uuid::Uuid;

use crate::task::{LifecycleTarget, Task};

/// Why an entry left the tracker. Every eviction fires the callback exactly
/// once; the scheduling loop treats all causes identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionCause {
    /// Removed by an explicit completion report or a submission failure.
    Deleted,
    /// Displaced by a newer entry while at capacity. Workers check room
    /// before admitting, so this surfacing in logs indicates a bug.
    CapacityEvicted,
    /// TTL elapsed without a completion report.
    TtlExpired,
}

impl EvictionCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvictionCause::Deleted => "deleted",
            EvictionCause::CapacityEvicted => "capacity-evicted",
            EvictionCause::TtlExpired => "ttl-expired",
        }
    }
}

/// Invoked once per evicted entry, concurrently with workers and the
/// scheduling loop, never while the tracker lock is held.
pub type EvictionCallback<T> = Box<dyn Fn(Task<T>, EvictionCause) + Send + Sync>;

struct Entry<T> {
    task: Task<T>,
    expires_at: Instant,
}

pub struct ActiveJobTracker<T> {
    capacity: usize,
    ttl: Duration,
    entries: Mutex<HashMap<Uuid, Entry<T>>>,
    on_evict: EvictionCallback<T>,
}

impl<T: LifecycleTarget> ActiveJobTracker<T> {
    pub fn new(capacity: usize, ttl: Duration, on_evict: EvictionCallback<T>) -> Arc<Self> {
        Arc::new(Self {
            capacity,
            ttl,
            entries: Mutex::new(HashMap::with_capacity(capacity)),
            on_evict,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }

    pub fn has(&self, key: &Uuid) -> bool {
        self.entries.lock().unwrap().contains_key(key)
    }

    /// Admit a task with the configured TTL. If the tracker is at capacity,
    /// the entry closest to expiry is displaced first and reported as
    /// `CapacityEvicted`.
    pub fn set(&self, task: Task<T>) {
        let displaced = {
            let mut entries = self.entries.lock().unwrap();
            let mut displaced = None;
            if entries.len() >= self.capacity && !entries.contains_key(&task.key()) {
                tracing::error!(
                    key = %task.key(),
                    "tracker at capacity on admission; displacing entry closest to expiry"
                );
                if let Some(oldest) = entries
                    .values()
                    .min_by_key(|e| e.expires_at)
                    .map(|e| e.task.key())
                {
                    displaced = entries.remove(&oldest).map(|e| e.task);
                }
            }
            entries.insert(
                task.key(),
                Entry {
                    task,
                    expires_at: Instant::now() + self.ttl,
                },
            );
            displaced
        };
        if let Some(task) = displaced {
            (self.on_evict)(task, EvictionCause::CapacityEvicted);
        }
    }

    /// Remove a key; a no-op when absent, so a completion report racing a
    /// TTL expiry cannot release the same slot twice.
    pub fn delete(&self, key: &Uuid) -> bool {
        let removed = self.entries.lock().unwrap().remove(key);
        match removed {
            Some(entry) => {
                (self.on_evict)(entry.task, EvictionCause::Deleted);
                true
            }
            None => false,
        }
    }

    /// Evict every entry whose TTL has elapsed. Returns the eviction count.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<Task<T>> = {
            let mut entries = self.entries.lock().unwrap();
            let keys: Vec<Uuid> = entries
                .iter()
                .filter(|(_, e)| e.expires_at <= now)
                .map(|(k, _)| *k)
                .collect();
            keys.iter()
                .filter_map(|k| entries.remove(k).map(|e| e.task))
                .collect()
        };
        let count = expired.len();
        for task in expired {
            tracing::warn!(
                key = %task.key(),
                kind = task.kind().as_str(),
                "active job expired without completion report"
            );
            (self.on_evict)(task, EvictionCause::TtlExpired);
        }
        count
    }

    /// Spawn the background expiry sweep. Stops when the shutdown flag flips.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        let tracker = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let evicted = tracker.sweep_expired();
                        if evicted > 0 {
                            tracing::debug!(evicted, "expiry sweep reclaimed capacity");
                        }
                    }
                    _ = shutdown.changed() => break,
                }
            }
        })
    }
}
