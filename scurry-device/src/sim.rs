//! Simulated device backends: drop-in stand-ins for hardware absent from a
//! development bench. Same seams as the real drivers, deterministic output.

use std::f64::consts::{FRAC_PI_2, TAU};
use std::thread;
use std::time::Duration;

use scurry_protocol::{Pose, FRAME_CHANNELS, FRAME_HEIGHT, FRAME_WIDTH};

use crate::camera::FrameSource;
use crate::microphone::{CaptureError, CaptureSource};
use crate::sensor::{PoseDriver, SensorError};
use crate::aux::ScalarSource;

/// Walks a unit circle; heading tracks the tangent.
pub struct SimPose {
    tick: u64,
}

impl SimPose {
    pub fn new() -> SimPose {
        SimPose { tick: 0 }
    }
}

impl Default for SimPose {
    fn default() -> Self {
        Self::new()
    }
}

impl PoseDriver for SimPose {
    fn begin(&mut self) -> Result<(), SensorError> {
        Ok(())
    }

    fn get_pose(&mut self) -> Option<Pose> {
        let t = self.tick as f64 / 100.0;
        self.tick += 1;
        Some(Pose {
            x: t.cos(),
            y: t.sin(),
            h: (t + FRAC_PI_2) % TAU,
        })
    }
}

/// Gradient frames with a rolling offset so consecutive frames differ.
pub struct SimFrames {
    width: usize,
    height: usize,
    channels: usize,
    counter: u64,
}

impl SimFrames {
    pub fn new(width: usize, height: usize, channels: usize) -> SimFrames {
        SimFrames {
            width,
            height,
            channels,
            counter: 0,
        }
    }

    /// Full capture-rig geometry.
    pub fn full_size() -> SimFrames {
        SimFrames::new(FRAME_WIDTH, FRAME_HEIGHT, FRAME_CHANNELS)
    }
}

impl FrameSource for SimFrames {
    fn read_frame(&mut self) -> Option<Vec<u8>> {
        let mut data = vec![0u8; self.frame_len()];
        for (i, px) in data.iter_mut().enumerate() {
            *px = (i as u64).wrapping_add(self.counter) as u8;
        }
        self.counter += 1;
        Some(data)
    }

    fn frame_len(&self) -> usize {
        self.width * self.height * self.channels
    }
}

/// A 440 Hz test tone. Sleeps one period per read so the pacing matches a
/// blocking capture device.
pub struct SimCapture {
    period: Duration,
    sample_rate: f64,
    tone_hz: f64,
    phase: u64,
}

impl SimCapture {
    pub fn new(rate: u32, framerate: u32) -> SimCapture {
        SimCapture {
            period: Duration::from_secs(1) / framerate,
            sample_rate: rate as f64,
            tone_hz: 440.0,
            phase: 0,
        }
    }
}

impl CaptureSource for SimCapture {
    fn read_period(&mut self, buf: &mut [i16]) -> Result<(), CaptureError> {
        thread::sleep(self.period);
        for sample in buf {
            let t = self.phase as f64 / self.sample_rate;
            *sample = (0.25 * (TAU * self.tone_hz * t).sin() * i16::MAX as f64) as i16;
            self.phase += 1;
        }
        Ok(())
    }
}

/// Monotonic counter as a big-endian scalar.
pub struct SimScalar {
    tick: u64,
}

impl SimScalar {
    pub fn new() -> SimScalar {
        SimScalar { tick: 0 }
    }
}

impl Default for SimScalar {
    fn default() -> Self {
        Self::new()
    }
}

impl ScalarSource for SimScalar {
    fn sample(&mut self) -> [u8; 8] {
        self.tick += 1;
        self.tick.to_be_bytes()
    }
}
