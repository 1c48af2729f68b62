use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

/// First-in, first-out queue shared between one producer worker and one consumer worker.
///
/// Cloning yields another handle to the same queue. The lock is held only for the duration of
/// a single push or pop, so neither side ever waits on the other's network I/O. A burst pushed
/// with [`FifoQueue::push_burst`] lands contiguously; the consumer never observes half of it.
#[derive(Debug)]
pub struct FifoQueue<T> {
    inner: Arc<Mutex<VecDeque<T>>>,
}

impl<T> FifoQueue<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    pub fn push(&self, item: T) {
        self.lock().push_back(item);
    }

    /// Appends every item of `items` in order under one lock acquisition.
    pub fn push_burst<I>(&self, items: I) -> usize
    where
        I: IntoIterator<Item = T>,
    {
        let mut queue = self.lock();
        let before = queue.len();
        queue.extend(items);
        queue.len() - before
    }

    pub fn pop(&self) -> Option<T> {
        self.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Removes and returns everything queued, oldest first.
    pub fn drain(&self) -> Vec<T> {
        self.lock().drain(..).collect()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        // push and pop never leave the deque inconsistent, so poisoning is ignored
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<T> Clone for FifoQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for FifoQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
