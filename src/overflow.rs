//! Capped FIFO queue absorbing requests that cannot immediately enter the
//! hot admission window. Pressure relief only: an item here never skips
//! ahead of one already in the hot queue, and relief is strictly FIFO to
//! bound worst-case wait.

use std::collections::{HashSet, VecDeque};

use uuid::Uuid;

use crate::task::{LifecycleTarget, Task};

pub struct OverflowQueue<T> {
    queue: VecDeque<Task<T>>,
    keys: HashSet<Uuid>,
    capacity: usize,
}

impl<T: LifecycleTarget> OverflowQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(capacity),
            keys: HashSet::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn has(&self, key: &Uuid) -> bool {
        self.keys.contains(key)
    }

    /// Append a task; fails iff at declared capacity, handing the task back.
    pub fn push(&mut self, task: Task<T>) -> Result<(), Task<T>> {
        if self.queue.len() >= self.capacity {
            return Err(task);
        }
        debug_assert!(
            !self.keys.contains(&task.key()),
            "duplicate key pushed into overflow queue"
        );
        self.keys.insert(task.key());
        self.queue.push_back(task);
        Ok(())
    }

    /// Remove and return the oldest accepted task; `None` iff empty.
    pub fn pop(&mut self) -> Option<Task<T>> {
        let task = self.queue.pop_front()?;
        self.keys.remove(&task.key());
        Some(task)
    }
}
