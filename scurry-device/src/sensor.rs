use std::sync::Arc;

use thiserror::Error;

use scurry_core::buffer::ZeroCapacity;
use scurry_core::DoubleBuffer;
use scurry_protocol::{Pose, TimestampMs};
use scurry_util::time;

#[derive(Debug, Error)]
pub enum SensorError {
    #[error("sensor at address {0:#04x} not connected")]
    NotConnected(u8),
    #[error(transparent)]
    Capacity(#[from] ZeroCapacity),
}

/// Seam for the vendor odometry SDK: an opaque polling object. The bench
/// build substitutes [`crate::sim::SimPose`].
pub trait PoseDriver: Send {
    fn begin(&mut self) -> Result<(), SensorError>;
    fn get_pose(&mut self) -> Option<Pose>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseSample {
    pub ts: TimestampMs,
    pub pose: Pose,
}

/// One optical-odometry sensor and its buffer.
pub struct Sensor {
    addr: u8,
    driver: Box<dyn PoseDriver>,
    buffer: Arc<DoubleBuffer<PoseSample>>,
}

impl Sensor {
    pub fn open(
        addr: u8,
        mut driver: Box<dyn PoseDriver>,
        capacity: usize,
    ) -> Result<Sensor, SensorError> {
        driver.begin()?;
        Ok(Sensor {
            addr,
            driver,
            buffer: Arc::new(DoubleBuffer::new(capacity)?),
        })
    }

    /// Polls the driver once and enqueues the reading with a fresh host
    /// timestamp. Returns false when the driver had nothing new. Odometry
    /// is not droppable: a stalled transmit side costs the sample and a
    /// warning.
    pub fn append(&mut self) -> bool {
        let Some(pose) = self.driver.get_pose() else {
            return false;
        };
        let sample = PoseSample {
            ts: time::wall_ms_now(),
            pose,
        };
        if self.buffer.put(sample, false).is_err() {
            log::warn!(
                "sensor {:#04x}: both rings full, transmit stalled; sample lost",
                self.addr
            );
        }
        true
    }

    /// Consumer-side handle for the transmit task.
    pub fn buffer(&self) -> Arc<DoubleBuffer<PoseSample>> {
        self.buffer.clone()
    }

    pub fn addr(&self) -> u8 {
        self.addr
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimPose;

    #[test]
    fn test_append_then_pop() {
        let mut sensor = Sensor::open(0x17, Box::new(SimPose::new()), 8).unwrap();
        assert!(sensor.append());
        assert!(sensor.append());

        let buffer = sensor.buffer();
        buffer.swap();
        let first = buffer.pop().unwrap();
        let second = buffer.pop().unwrap();
        assert!(second.ts >= first.ts);
        assert_eq!(buffer.pop(), None);
    }

    #[test]
    fn test_zero_capacity_fails_open() {
        assert!(Sensor::open(0x17, Box::new(SimPose::new()), 0).is_err());
    }
}
