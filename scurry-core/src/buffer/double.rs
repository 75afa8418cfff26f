use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use super::ring::{PutError, Ring, ZeroCapacity};

/// Two-ring swap buffer: the producer inserts into `front`, the consumer
/// drains `back`, and `swap` exchanges the two.
///
/// The swap lock is held only around pointer exchange and the producer's
/// non-blocking insert, never across I/O; between swaps both sides run on
/// their own ring with no shared lock traffic.
pub struct DoubleBuffer<T> {
    rings: Mutex<Pair<T>>,
    dropped: AtomicU64,
}

struct Pair<T> {
    front: Arc<Ring<T>>,
    back: Arc<Ring<T>>,
}

impl<T> DoubleBuffer<T> {
    pub fn new(capacity: usize) -> Result<DoubleBuffer<T>, ZeroCapacity> {
        Ok(DoubleBuffer {
            rings: Mutex::new(Pair {
                front: Arc::new(Ring::new(capacity)?),
                back: Arc::new(Ring::new(capacity)?),
            }),
            dropped: AtomicU64::new(0),
        })
    }

    /// Producer-side insert. When `front` is full: with `drop_if_full` the
    /// item is silently discarded (and counted); otherwise the rings are
    /// swapped and the insert retried once. A second failure hands the item
    /// back, which means the consumer has stalled with both rings full.
    pub fn put(&self, item: T, drop_if_full: bool) -> Result<(), T> {
        let mut pair = self.rings.lock().unwrap();
        match pair.front.try_put(item) {
            Ok(()) => Ok(()),
            Err(err) => {
                let item = err.into_inner();
                if drop_if_full {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    return Ok(());
                }
                let pair = &mut *pair;
                mem::swap(&mut pair.front, &mut pair.back);
                match pair.front.try_put(item) {
                    Ok(()) => Ok(()),
                    Err(PutError::Full(item)) | Err(PutError::TimedOut(item)) => Err(item),
                }
            }
        }
    }

    /// True when `back` holds at least one element.
    pub fn ready(&self) -> bool {
        !self.back_ring().is_empty()
    }

    /// Removes a single element from `back`.
    pub fn pop(&self) -> Option<T> {
        self.back_ring().try_get()
    }

    /// Snapshot iterator over `back`: yields at most the number of elements
    /// present when the iterator was created, even if a swap promotes the
    /// ring back to `front` mid-drain.
    pub fn drain(&self) -> Drain<T> {
        let ring = self.back_ring();
        let remaining = ring.len();
        Drain { ring, remaining }
    }

    /// Exchanges `front` and `back`. The consumer calls this once `back`
    /// runs dry so items parked in `front` become drainable; the producer
    /// path swaps internally on overflow.
    pub fn swap(&self) {
        let mut pair = self.rings.lock().unwrap();
        let pair = &mut *pair;
        mem::swap(&mut pair.front, &mut pair.back);
    }

    /// Total elements across both rings.
    pub fn len(&self) -> usize {
        let pair = self.rings.lock().unwrap();
        pair.front.len() + pair.back.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Items discarded by `put` with `drop_if_full`.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn back_ring(&self) -> Arc<Ring<T>> {
        self.rings.lock().unwrap().back.clone()
    }
}

pub struct Drain<T> {
    ring: Arc<Ring<T>>,
    remaining: usize,
}

impl<T> Iterator for Drain<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        self.ring.try_get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_lands_in_front_until_swap() {
        let buffer = DoubleBuffer::new(4).unwrap();
        buffer.put(1, false).unwrap();
        buffer.put(2, false).unwrap();
        assert!(!buffer.ready());
        buffer.swap();
        assert!(buffer.ready());
        assert_eq!(buffer.pop(), Some(1));
        assert_eq!(buffer.pop(), Some(2));
        assert_eq!(buffer.pop(), None);
    }

    #[test]
    fn test_overflow_swaps_and_retries() {
        let buffer = DoubleBuffer::new(2).unwrap();
        buffer.put(1, false).unwrap();
        buffer.put(2, false).unwrap();
        // front is full; this put swaps and lands in the (empty) other ring
        buffer.put(3, false).unwrap();
        assert_eq!(buffer.len(), 3);
        // the full ring became back and is drainable
        let drained: Vec<_> = buffer.drain().collect();
        assert_eq!(drained, vec![1, 2]);
    }

    #[test]
    fn test_stalled_consumer_signals_full() {
        let buffer = DoubleBuffer::new(1).unwrap();
        buffer.put(1, false).unwrap();
        buffer.put(2, false).unwrap();
        assert_eq!(buffer.put(3, false), Err(3));
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn test_drop_if_full_discards_and_counts() {
        let buffer = DoubleBuffer::new(1).unwrap();
        buffer.put(1, true).unwrap();
        buffer.put(2, true).unwrap();
        buffer.put(3, true).unwrap();
        // ring capacity 1: item 1 kept, 2 and 3 dropped without swapping
        assert_eq!(buffer.dropped(), 2);
        assert_eq!(buffer.len(), 1);
        buffer.swap();
        assert_eq!(buffer.pop(), Some(1));
    }

    #[test]
    fn test_drain_is_bounded_snapshot() {
        let buffer = DoubleBuffer::new(8).unwrap();
        for n in 0..4 {
            buffer.put(n, false).unwrap();
        }
        buffer.swap();
        let mut drain = buffer.drain();
        assert_eq!(drain.next(), Some(0));
        // a concurrent swap hands the ring back to the producer...
        buffer.swap();
        buffer.put(99, false).unwrap();
        // ...but the iterator still yields at most its snapshot length
        let rest: Vec<_> = drain.collect();
        assert_eq!(rest, vec![1, 2, 3]);
    }

    #[test]
    fn test_everything_put_is_eventually_popped() {
        let buffer = DoubleBuffer::new(4).unwrap();
        let mut seen = Vec::new();
        for n in 0..32 {
            buffer.put(n, false).unwrap();
            if !buffer.ready() {
                buffer.swap();
            }
            while let Some(item) = buffer.pop() {
                seen.push(item);
            }
        }
        assert_eq!(seen, (0..32).collect::<Vec<_>>());
    }
}
