//! Thread-safe, unbounded FIFO stock of resource units. Never blocks.

use std::collections::VecDeque;
use std::sync::Mutex;

/// An insertion-ordered queue shared by every robot in the factory.
pub struct SharedQueue<T> {
    inner: Mutex<VecDeque<T>>,
}

impl<T> Default for SharedQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SharedQueue<T> {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
        }
    }

    /// Append a unit; never fails.
    pub fn put(&self, item: T) {
        let mut guard = self.inner.lock().expect("shared queue mutex poisoned");
        guard.push_back(item);
    }

    /// Remove the oldest unit, or `None` if the queue is empty.
    pub fn try_take(&self) -> Option<T> {
        let mut guard = self.inner.lock().expect("shared queue mutex poisoned");
        guard.pop_front()
    }

    /// Remove exactly `count` oldest units, or nothing if fewer are queued.
    pub fn take_many(&self, count: usize) -> Option<Vec<T>> {
        let mut guard = self.inner.lock().expect("shared queue mutex poisoned");
        if guard.len() < count {
            return None;
        }
        Some(guard.drain(..count).collect())
    }

    /// Remove the oldest unit of `self` and of `other` together, or neither.
    ///
    /// Locks `self` before `other`. Callers must always pair two queues in
    /// the same order.
    pub fn take_with<U>(&self, other: &SharedQueue<U>) -> Option<(T, U)> {
        let mut first = self.inner.lock().expect("shared queue mutex poisoned");
        let mut second = other.inner.lock().expect("shared queue mutex poisoned");
        if first.is_empty() || second.is_empty() {
            return None;
        }
        let a = first.pop_front()?;
        let b = second.pop_front()?;
        Some((a, b))
    }

    /// Current number of queued units.
    pub fn len(&self) -> usize {
        let guard = self.inner.lock().expect("shared queue mutex poisoned");
        guard.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
