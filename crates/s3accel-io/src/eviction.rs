//! Fixed-capacity FIFO eviction ring
//!
//! Bounds the memory held by one object stream. Items are admitted in order
//! and, once the ring is full, each insertion evicts and closes the oldest
//! item before returning.

use std::collections::VecDeque;

use s3accel_common::Result;
use tracing::{debug, error};

/// A resource that must be released when it leaves the cache
pub trait Close {
    /// Release the resource. Must be idempotent.
    fn close(&mut self) -> Result<()>;
}

/// Close `item`, logging instead of propagating a failure
pub(crate) fn safe_close<T: Close>(item: &mut T) {
    if let Err(e) = item.close() {
        error!("Failed to close evicted item: {}", e);
    }
}

/// Fixed-capacity container with oldest-first eviction
#[derive(Debug)]
pub struct EvictionRing<T: Close> {
    capacity: usize,
    entries: VecDeque<T>,
}

impl<T: Close> EvictionRing<T> {
    /// Create a ring holding at most `capacity` items.
    ///
    /// A zero capacity is raised to one so an inserted item always survives
    /// its own insertion.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append `item`. If the ring overflows, the oldest item is closed and
    /// returned.
    pub fn insert(&mut self, item: T) -> Option<T> {
        self.entries.push_back(item);
        if self.entries.len() <= self.capacity {
            return None;
        }

        let mut evicted = self.entries.pop_front()?;
        debug!(capacity = self.capacity, "Evicting oldest entry");
        safe_close(&mut evicted);
        Some(evicted)
    }

    /// Items from oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.entries.iter_mut()
    }

    /// Close every item, oldest first. A failing close is logged and does not
    /// stop the others. Items stay in the ring.
    pub fn close(&mut self) {
        self.entries.iter_mut().for_each(safe_close);
    }

    /// Close and remove every item
    pub fn clear(&mut self) {
        self.close();
        self.entries.clear();
    }
}

impl<'a, T: Close> IntoIterator for &'a EvictionRing<T> {
    type Item = &'a T;
    type IntoIter = std::collections::vec_deque::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use s3accel_common::Error;

    #[derive(Debug)]
    struct Tracked {
        id: u32,
        closes: u32,
        fail_close: bool,
    }

    impl Tracked {
        fn new(id: u32) -> Self {
            Self {
                id,
                closes: 0,
                fail_close: false,
            }
        }
    }

    impl Close for Tracked {
        fn close(&mut self) -> Result<()> {
            self.closes += 1;
            if self.fail_close {
                return Err(Error::resource_release(format!("item {}", self.id)));
            }
            Ok(())
        }
    }

    #[test]
    fn test_insert_within_capacity() {
        let mut ring = EvictionRing::new(3);
        for id in 0..3 {
            assert!(ring.insert(Tracked::new(id)).is_none());
        }
        assert_eq!(ring.len(), 3);
        assert!(ring.iter().all(|t| t.closes == 0));
    }

    #[test]
    fn test_overflow_evicts_oldest_exactly_once() {
        let mut ring = EvictionRing::new(3);
        for id in 0..3 {
            ring.insert(Tracked::new(id));
        }

        let evicted = ring.insert(Tracked::new(3)).unwrap();
        assert_eq!(evicted.id, 0);
        assert_eq!(evicted.closes, 1);
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.iter().map(|t| t.id).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert!(ring.iter().all(|t| t.closes == 0));
    }

    #[test]
    fn test_len_never_exceeds_capacity() {
        let mut ring = EvictionRing::new(4);
        for id in 0..50 {
            ring.insert(Tracked::new(id));
            assert!(ring.len() <= ring.capacity());
        }
        assert_eq!(ring.iter().map(|t| t.id).collect::<Vec<_>>(), vec![46, 47, 48, 49]);
    }

    #[test]
    fn test_failed_close_still_evicts() {
        let mut ring = EvictionRing::new(1);
        let mut first = Tracked::new(0);
        first.fail_close = true;
        ring.insert(first);

        let evicted = ring.insert(Tracked::new(1)).unwrap();
        assert_eq!(evicted.id, 0);
        assert_eq!(ring.len(), 1);
    }

    #[test]
    fn test_close_is_best_effort() {
        let mut ring = EvictionRing::new(3);
        let mut failing = Tracked::new(0);
        failing.fail_close = true;
        ring.insert(failing);
        ring.insert(Tracked::new(1));
        ring.insert(Tracked::new(2));

        ring.close();
        assert!(ring.iter().all(|t| t.closes == 1));
    }

    #[test]
    fn test_iter_is_restartable() {
        let mut ring = EvictionRing::new(2);
        ring.insert(Tracked::new(7));
        ring.insert(Tracked::new(8));
        let first: Vec<_> = ring.iter().map(|t| t.id).collect();
        let second: Vec<_> = (&ring).into_iter().map(|t| t.id).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_zero_capacity_holds_one() {
        let mut ring = EvictionRing::new(0);
        assert!(ring.insert(Tracked::new(1)).is_none());
        assert_eq!(ring.capacity(), 1);
    }
}
