//! Fixed-cadence frame scheduler. Producers anchor on a monotonic clock and
//! advance one interval per frame, so long-term drift stays bounded by one
//! interval regardless of per-frame jitter.

use std::thread;
use std::time::{Duration, Instant};

/// Coarse sleeps undershoot deadlines by a scheduler quantum; inside this
/// window we spin on the clock instead.
const SPIN_WINDOW: Duration = Duration::from_micros(1500);

pub struct Cadence {
    interval: Duration,
    next: Instant,
}

impl Cadence {
    pub fn new(rate_hz: u32) -> Cadence {
        assert!(rate_hz > 0, "cadence rate must be positive");
        Cadence::from_interval(Duration::from_secs(1) / rate_hz)
    }

    pub fn from_interval(interval: Duration) -> Cadence {
        Cadence {
            interval,
            next: Instant::now() + interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Blocks until the next frame deadline, then advances it by one
    /// interval. Returns the number of whole frames abandoned when the
    /// caller is running behind (0 in steady state); slight lateness is
    /// absorbed without skipping.
    pub fn wait(&mut self) -> u64 {
        let deadline = self.next;
        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let remaining = deadline - now;
            if remaining > SPIN_WINDOW {
                thread::sleep(remaining - SPIN_WINDOW);
            } else {
                std::hint::spin_loop();
            }
        }

        self.next += self.interval;

        // overload: drop whole frames rather than chasing an unpayable debt
        let now = Instant::now();
        let mut skipped = 0;
        while now >= self.next {
            self.next += self.interval;
            skipped += 1;
        }
        skipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_holds_rate_without_drift() {
        let interval = Duration::from_millis(5);
        let mut cadence = Cadence::from_interval(interval);
        let start = Instant::now();
        let frames = 40u32;
        let mut total_skipped = 0u64;
        for _ in 0..frames {
            total_skipped += cadence.wait();
        }
        let elapsed = start.elapsed();
        // every deadline met or explicitly skipped: cumulative drift stays
        // within one interval plus OS jitter
        let ticks = frames + total_skipped as u32;
        assert!(elapsed >= interval * frames - interval);
        assert!(
            elapsed <= interval * ticks + interval * 4,
            "drifted: {elapsed:?} over {ticks} ticks"
        );
    }

    #[test]
    fn test_skips_whole_frames_under_overload() {
        let interval = Duration::from_millis(2);
        let mut cadence = Cadence::from_interval(interval);
        cadence.wait();
        thread::sleep(interval * 5);
        let skipped = cadence.wait();
        assert!(skipped >= 3, "expected a deficit, skipped {skipped}");
        // after shedding the debt the schedule is live again
        assert!(cadence.wait() <= 1);
    }

    #[test]
    fn test_slight_lateness_does_not_skip() {
        let interval = Duration::from_millis(20);
        let mut cadence = Cadence::from_interval(interval);
        cadence.wait();
        thread::sleep(interval / 4);
        assert_eq!(cadence.wait(), 0);
    }
}
