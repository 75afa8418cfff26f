//! Admitted device sessions and the priority pool the dispatcher feeds
//! from. Priority is the integer delta between the gateway's clock and the
//! hello timestamp: the freshest client dispatches first.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::net::TcpListener;
use std::sync::{Arc, Condvar, Mutex};

use scurry_protocol::{DeviceKind, TimestampMs};

pub struct Session {
    pub kind: DeviceKind,
    pub ident: u32,
    pub created_ts: TimestampMs,
    pub delay_ms: i64,
    pub listener: TcpListener,
}

struct Entry {
    delay_ms: i64,
    seq: u64,
    session: Session,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.delay_ms == other.delay_ms && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: invert so the smallest delay (freshest
        // hello) pops first, admission order breaking ties
        other
            .delay_ms
            .cmp(&self.delay_ms)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Priority queue of admitted sessions awaiting a consumer thread. Owns
/// nothing long-lived beyond its entries.
pub struct SessionPool {
    entries: Mutex<(BinaryHeap<Entry>, u64)>,
    available: Condvar,
}

impl SessionPool {
    pub fn new() -> Arc<SessionPool> {
        Arc::new(SessionPool {
            entries: Mutex::new((BinaryHeap::new(), 0)),
            available: Condvar::new(),
        })
    }

    pub fn admit(&self, session: Session) {
        let mut guard = self.entries.lock().unwrap();
        let (heap, seq) = &mut *guard;
        *seq += 1;
        heap.push(Entry {
            delay_ms: session.delay_ms,
            seq: *seq,
            session,
        });
        drop(guard);
        self.available.notify_one();
    }

    /// Blocks until a session is available, freshest first.
    pub fn take(&self) -> Session {
        let mut guard = self.entries.lock().unwrap();
        loop {
            if let Some(entry) = guard.0.pop() {
                return entry.session;
            }
            guard = self.available.wait(guard).unwrap();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().0.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(kind: DeviceKind, ident: u32, delay_ms: i64) -> Session {
        Session {
            kind,
            ident,
            created_ts: TimestampMs(0.0),
            delay_ms,
            listener: TcpListener::bind("127.0.0.1:0").unwrap(),
        }
    }

    #[test]
    fn test_freshest_session_pops_first() {
        let pool = SessionPool::new();
        pool.admit(session(DeviceKind::Sensor, 0, 250));
        pool.admit(session(DeviceKind::Camera, 0, 10));
        pool.admit(session(DeviceKind::Sensor, 1, 90));

        assert_eq!(pool.take().kind, DeviceKind::Camera);
        assert_eq!(pool.take().ident, 1);
        assert_eq!(pool.take().ident, 0);
    }

    #[test]
    fn test_equal_delay_dispatches_in_admission_order() {
        let pool = SessionPool::new();
        pool.admit(session(DeviceKind::Aux, 0, 40));
        pool.admit(session(DeviceKind::Aux, 1, 40));
        pool.admit(session(DeviceKind::Aux, 2, 40));

        for expect in 0..3 {
            assert_eq!(pool.take().ident, expect);
        }
    }

    #[test]
    fn test_take_blocks_until_admit() {
        let pool = SessionPool::new();
        let waiter = {
            let pool = pool.clone();
            std::thread::spawn(move || pool.take().ident)
        };
        std::thread::sleep(std::time::Duration::from_millis(50));
        pool.admit(session(DeviceKind::Audio, 7, 5));
        assert_eq!(waiter.join().unwrap(), 7);
    }
}
