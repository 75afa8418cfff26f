use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use scurry_core::buffer::ZeroCapacity;
use scurry_core::DoubleBuffer;
use scurry_protocol::{MonotonicNs, TimestampMs};
use scurry_util::time;

#[derive(Debug, Error)]
pub enum CameraError {
    #[error(transparent)]
    Capacity(#[from] ZeroCapacity),
    #[error("creating tee file {0}: {1}")]
    Tee(PathBuf, io::Error),
    #[error("frame source yields {got} byte frames, expected {expected}")]
    FrameLen { expected: usize, got: usize },
}

/// Seam for the capture pipeline: an opaque source of fixed-size raw pixel
/// buffers. Timestamp overlays, format conversion and the like belong to the
/// implementation behind this trait.
pub trait FrameSource: Send {
    /// Grabs one frame; `None` when the pipeline hiccups (logged and
    /// skipped upstream).
    fn read_frame(&mut self) -> Option<Vec<u8>>;
    /// Fixed frame size in bytes (`width * height * channels`).
    fn frame_len(&self) -> usize;
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    pub ts: TimestampMs,
    /// Capture instant on the monotonic clock, for drift accounting only.
    pub captured: MonotonicNs,
    pub data: Vec<u8>,
}

/// One camera and its buffer. Frames are droppable under overload; odometry
/// and audio are not.
pub struct Camera {
    ident: u8,
    source: Box<dyn FrameSource>,
    buffer: Arc<DoubleBuffer<VideoFrame>>,
    tee: Option<File>,
}

impl Camera {
    pub fn open(
        ident: u8,
        source: Box<dyn FrameSource>,
        capacity: usize,
    ) -> Result<Camera, CameraError> {
        Ok(Camera {
            ident,
            source,
            buffer: Arc::new(DoubleBuffer::new(capacity)?),
            tee: None,
        })
    }

    /// Mirrors every captured frame to a raw file, orthogonal to the network
    /// path. `capture_stamp` groups the files of one experiment run.
    pub fn tee_to(&mut self, dir: &Path, capture_stamp: u64) -> Result<PathBuf, CameraError> {
        let path = dir.join(format!("{capture_stamp}_cam{}.raw", self.ident));
        let file = File::create(&path).map_err(|e| CameraError::Tee(path.clone(), e))?;
        self.tee = Some(file);
        Ok(path)
    }

    /// Captures one frame into the buffer; false when the source skipped.
    pub fn append(&mut self) -> Result<bool, CameraError> {
        let Some(data) = self.source.read_frame() else {
            log::warn!("camera{}: unable to grab frame", self.ident);
            return Ok(false);
        };
        if data.len() != self.source.frame_len() {
            return Err(CameraError::FrameLen {
                expected: self.source.frame_len(),
                got: data.len(),
            });
        }

        if let Some(tee) = &mut self.tee {
            if let Err(e) = tee.write_all(&data) {
                log::warn!("camera{}: tee write failed, disabling tee: {e}", self.ident);
                self.tee = None;
            }
        }

        let frame = VideoFrame {
            ts: time::wall_ms_now(),
            captured: time::monotonic_now(),
            data,
        };
        let _ = self.buffer.put(frame, true);
        Ok(true)
    }

    pub fn buffer(&self) -> Arc<DoubleBuffer<VideoFrame>> {
        self.buffer.clone()
    }

    pub fn ident(&self) -> u8 {
        self.ident
    }

    pub fn frame_len(&self) -> usize {
        self.source.frame_len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimFrames;

    #[test]
    fn test_append_captures_fixed_size_frames() {
        let mut camera = Camera::open(0, Box::new(SimFrames::new(8, 4, 1)), 4).unwrap();
        assert!(camera.append().unwrap());

        let buffer = camera.buffer();
        buffer.swap();
        let frame = buffer.pop().unwrap();
        assert_eq!(frame.data.len(), 32);
    }

    #[test]
    fn test_overloaded_camera_drops_frames() {
        let mut camera = Camera::open(1, Box::new(SimFrames::new(2, 2, 1)), 1).unwrap();
        for _ in 0..5 {
            camera.append().unwrap();
        }
        // ring capacity 1 and nobody draining: the excess is shed
        assert_eq!(camera.buffer().dropped(), 4);
        assert_eq!(camera.buffer().len(), 1);
    }

    #[test]
    fn test_tee_writes_alongside_buffer() {
        let dir = std::env::temp_dir().join(format!("scurry-cam-tee-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let mut camera = Camera::open(0, Box::new(SimFrames::new(4, 2, 1)), 4).unwrap();
        let path = camera.tee_to(&dir, 42).unwrap();
        camera.append().unwrap();
        camera.append().unwrap();

        let teed = std::fs::read(path).unwrap();
        assert_eq!(teed.len(), 16);
    }
}
