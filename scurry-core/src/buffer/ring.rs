use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("ring capacity must be positive")]
pub struct ZeroCapacity;

/// Failed `put`, handing the rejected item back to the caller.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PutError<T> {
    #[error("ring buffer full")]
    Full(T),
    #[error("ring put timed out")]
    TimedOut(T),
}

impl<T> PutError<T> {
    pub fn into_inner(self) -> T {
        match self {
            PutError::Full(item) | PutError::TimedOut(item) => item,
        }
    }
}

struct Slots<T> {
    slots: Box<[Option<T>]>,
    head: usize, // next write
    tail: usize, // next read
    size: usize,
}

impl<T> Slots<T> {
    fn insert(&mut self, item: T) {
        debug_assert!(self.size < self.slots.len());
        self.slots[self.head] = Some(item);
        self.head = (self.head + 1) % self.slots.len();
        self.size += 1;
    }

    fn remove(&mut self) -> T {
        debug_assert!(self.size > 0);
        // vacate the slot so the item is released immediately
        let item = self.slots[self.tail].take().expect("occupied ring slot");
        self.tail = (self.tail + 1) % self.slots.len();
        self.size -= 1;
        item
    }
}

/// Capacity-bounded SPSC ring. Producers only `put`, consumers only `get`;
/// FIFO order is guaranteed between one producer and one consumer.
pub struct Ring<T> {
    inner: Mutex<Slots<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

impl<T> Ring<T> {
    pub fn new(capacity: usize) -> Result<Ring<T>, ZeroCapacity> {
        if capacity == 0 {
            return Err(ZeroCapacity);
        }
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Ok(Ring {
            inner: Mutex::new(Slots {
                slots: slots.into_boxed_slice(),
                head: 0,
                tail: 0,
                size: 0,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Non-blocking insert; fails immediately when the ring is full.
    pub fn try_put(&self, item: T) -> Result<(), PutError<T>> {
        let mut inner = self.inner.lock().unwrap();
        if inner.size == self.capacity {
            return Err(PutError::Full(item));
        }
        let was_empty = inner.size == 0;
        inner.insert(item);
        drop(inner);
        if was_empty {
            self.not_empty.notify_one();
        }
        Ok(())
    }

    /// Blocking insert; suspends until space is available.
    pub fn put(&self, item: T) {
        let mut inner = self.inner.lock().unwrap();
        while inner.size == self.capacity {
            inner = self.not_full.wait(inner).unwrap();
        }
        let was_empty = inner.size == 0;
        inner.insert(item);
        drop(inner);
        if was_empty {
            self.not_empty.notify_one();
        }
    }

    /// Blocking insert with a deadline.
    pub fn put_timeout(&self, item: T, timeout: Duration) -> Result<(), PutError<T>> {
        let start = Instant::now();
        let mut inner = self.inner.lock().unwrap();
        while inner.size == self.capacity {
            let elapsed = start.elapsed();
            if elapsed >= timeout {
                return Err(PutError::TimedOut(item));
            }
            let (guard, _) = self.not_full.wait_timeout(inner, timeout - elapsed).unwrap();
            inner = guard;
        }
        let was_empty = inner.size == 0;
        inner.insert(item);
        drop(inner);
        if was_empty {
            self.not_empty.notify_one();
        }
        Ok(())
    }

    /// Non-blocking remove.
    pub fn try_get(&self) -> Option<T> {
        let mut inner = self.inner.lock().unwrap();
        if inner.size == 0 {
            return None;
        }
        let was_full = inner.size == self.capacity;
        let item = inner.remove();
        drop(inner);
        if was_full {
            self.not_full.notify_one();
        }
        Some(item)
    }

    /// Blocking remove; suspends until an item arrives.
    pub fn get(&self) -> T {
        let mut inner = self.inner.lock().unwrap();
        while inner.size == 0 {
            inner = self.not_empty.wait(inner).unwrap();
        }
        let was_full = inner.size == self.capacity;
        let item = inner.remove();
        drop(inner);
        if was_full {
            self.not_full.notify_one();
        }
        item
    }

    /// Blocking remove with a deadline; `None` when the deadline passes
    /// before an item arrives.
    pub fn get_timeout(&self, timeout: Duration) -> Option<T> {
        let start = Instant::now();
        let mut inner = self.inner.lock().unwrap();
        while inner.size == 0 {
            let elapsed = start.elapsed();
            if elapsed >= timeout {
                return None;
            }
            let (guard, _) = self
                .not_empty
                .wait_timeout(inner, timeout - elapsed)
                .unwrap();
            inner = guard;
        }
        let was_full = inner.size == self.capacity;
        let item = inner.remove();
        drop(inner);
        if was_full {
            self.not_full.notify_one();
        }
        Some(item)
    }

    /// Snapshot of the current occupancy; stale as soon as the other side
    /// runs.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().size
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() == self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(Ring::<u32>::new(0).is_err());
    }

    #[test]
    fn test_try_put_full() {
        let ring = Ring::new(2).unwrap();
        ring.try_put(1).unwrap();
        ring.try_put(2).unwrap();
        assert_eq!(ring.try_put(3), Err(PutError::Full(3)));
        assert_eq!(ring.len(), 2);
    }

    #[test]
    fn test_fifo_order() {
        let ring = Ring::new(8).unwrap();
        for n in 0..8 {
            ring.try_put(n).unwrap();
        }
        for n in 0..8 {
            assert_eq!(ring.try_get(), Some(n));
        }
        assert_eq!(ring.try_get(), None);
    }

    #[test]
    fn test_wraparound_preserves_order() {
        let ring = Ring::new(3).unwrap();
        ring.try_put(1).unwrap();
        ring.try_put(2).unwrap();
        assert_eq!(ring.try_get(), Some(1));
        ring.try_put(3).unwrap();
        ring.try_put(4).unwrap();
        for expect in [2, 3, 4] {
            assert_eq!(ring.try_get(), Some(expect));
        }
    }

    #[test]
    fn test_put_timeout_elapses() {
        let ring = Ring::new(1).unwrap();
        ring.try_put(1).unwrap();
        let start = Instant::now();
        let result = ring.put_timeout(2, Duration::from_millis(50));
        assert_eq!(result, Err(PutError::TimedOut(2)));
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_get_timeout_elapses() {
        let ring: Ring<u32> = Ring::new(1).unwrap();
        assert_eq!(ring.get_timeout(Duration::from_millis(50)), None);
    }

    #[test]
    fn test_capacity_one_serializes() {
        // with capacity 1 the producer and consumer strictly alternate
        let ring = Arc::new(Ring::new(1).unwrap());
        let producer = {
            let ring = ring.clone();
            thread::spawn(move || {
                for n in 0..1000u32 {
                    ring.put(n);
                }
            })
        };
        let consumer = {
            let ring = ring.clone();
            thread::spawn(move || {
                for n in 0..1000u32 {
                    assert_eq!(ring.get(), n);
                }
            })
        };
        producer.join().unwrap();
        consumer.join().unwrap();
    }

    #[test]
    fn test_spsc_threads_fifo() {
        let ring = Arc::new(Ring::new(16).unwrap());
        let producer = {
            let ring = ring.clone();
            thread::spawn(move || {
                for n in 0..5000u32 {
                    ring.put(n);
                }
            })
        };
        let mut seen = Vec::with_capacity(5000);
        for _ in 0..5000 {
            seen.push(ring.get());
        }
        producer.join().unwrap();
        assert!(seen.windows(2).all(|w| w[0] + 1 == w[1]));
    }

    #[test]
    fn test_size_stays_bounded() {
        let ring = Arc::new(Ring::new(4).unwrap());
        let producer = {
            let ring = ring.clone();
            thread::spawn(move || {
                for n in 0..2000u32 {
                    ring.put(n);
                }
            })
        };
        for _ in 0..2000 {
            assert!(ring.len() <= ring.capacity());
            let _ = ring.get();
        }
        producer.join().unwrap();
    }
}
