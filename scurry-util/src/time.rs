use nix::sys::time::TimeValLike;
use nix::time::ClockId;

use scurry_protocol::{MonotonicNs, TimestampMs};

/// Monotonic clock read for frame scheduling and drift accounting. Never
/// leaves the host.
pub fn monotonic_now() -> MonotonicNs {
    let timespec = nix::time::clock_gettime(ClockId::CLOCK_MONOTONIC_RAW)
        .expect("clock_gettime(CLOCK_MONOTONIC_RAW) failed, are we on Linux?");

    let nanos = u64::try_from(timespec.num_nanoseconds())
        .expect("cannot convert i64 time value to u64");

    MonotonicNs(nanos)
}

/// Wall-clock milliseconds since the Unix epoch, UTC. This is the timestamp
/// that travels on the wire and lands in the data files.
pub fn wall_ms_now() -> TimestampMs {
    let timespec =
        nix::time::clock_gettime(ClockId::CLOCK_REALTIME).expect("clock_gettime(CLOCK_REALTIME)");

    let millis = timespec.tv_sec() as f64 * 1_000.0 + timespec.tv_nsec() as f64 / 1_000_000.0;

    TimestampMs(millis)
}

/// Experiment capture stamp shared by all cameras of one run; whole
/// milliseconds since the epoch keeps it sortable and filesystem-safe.
pub fn capture_stamp() -> u64 {
    wall_ms_now().0 as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic_is_monotonic() {
        let a = monotonic_now();
        let b = monotonic_now();
        assert!(b >= a);
    }

    #[test]
    fn test_wall_ms_is_past_2020() {
        // 2020-01-01 in ms since epoch
        assert!(wall_ms_now().0 > 1.577e12);
    }
}
