//! Fixed-capacity circular queue forming the hot admission window.
//! O(1) enqueue, dequeue, and membership check. Capacity equals the
//! worker count, so a full hot queue means every worker has a task lined up.

use std::collections::HashMap;

use uuid::Uuid;

use crate::task::{LifecycleTarget, Task};

/// Bounded FIFO work queue over a circular buffer.
///
/// `full` is tracked explicitly because head == tail is ambiguous between
/// empty and full in a circular buffer. Thread safety comes from the
/// scheduler facade's admission lock, not from this structure.
pub struct HotQueue<T> {
    slots: Vec<Option<Task<T>>>,
    by_key: HashMap<Uuid, usize>,
    head: usize,
    tail: usize,
    full: bool,
}

impl<T: LifecycleTarget> HotQueue<T> {
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            slots,
            by_key: HashMap::with_capacity(capacity),
            head: 0,
            tail: 0,
            // A zero-capacity queue is permanently full.
            full: capacity == 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        if self.full {
            self.slots.len()
        } else {
            (self.tail + self.slots.len() - self.head) % self.slots.len().max(1)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.full
    }

    pub fn free_capacity(&self) -> usize {
        self.capacity() - self.len()
    }

    pub fn has(&self, key: &Uuid) -> bool {
        self.by_key.contains_key(key)
    }

    /// Append a task; fails iff the queue is full, handing the task back.
    pub fn enqueue(&mut self, task: Task<T>) -> Result<(), Task<T>> {
        if self.full {
            return Err(task);
        }
        debug_assert!(
            !self.by_key.contains_key(&task.key()),
            "duplicate key enqueued into hot queue"
        );
        self.by_key.insert(task.key(), self.tail);
        self.slots[self.tail] = Some(task);
        self.tail = (self.tail + 1) % self.slots.len();
        self.full = self.tail == self.head;
        Ok(())
    }

    /// Remove and return the oldest task; `None` iff empty.
    pub fn dequeue(&mut self) -> Option<Task<T>> {
        if self.is_empty() {
            return None;
        }
        let task = self.slots[self.head].take();
        debug_assert!(task.is_some(), "occupied slot was empty");
        let task = task?;
        self.by_key.remove(&task.key());
        self.head = (self.head + 1) % self.slots.len();
        self.full = false;
        Some(task)
    }
}
