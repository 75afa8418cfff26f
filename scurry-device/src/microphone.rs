use std::sync::Arc;

use thiserror::Error;

use scurry_core::buffer::ZeroCapacity;
use scurry_core::DoubleBuffer;
use scurry_protocol::TimestampMs;
use scurry_util::time;

/// ALSA takes a moment to come up after boot on the target; opening retries
/// this many times, one second apart.
pub const OPEN_RETRIES: u32 = 10;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("audio driver not ready after {0} attempts")]
    NotReady(u32),
    #[error("unsupported capture format {0}; capture is S16_LE only")]
    UnsupportedFormat(String),
    #[error(transparent)]
    Capacity(#[from] ZeroCapacity),
    #[cfg(all(feature = "alsa", target_os = "linux"))]
    #[error("alsa: {0}")]
    Alsa(#[from] alsa::Error),
}

/// Seam for the audio capture backend. One call blocks for exactly one
/// period of `rate / framerate` frames and fills `buf` with interleaved
/// 16-bit samples.
pub trait CaptureSource: Send {
    fn read_period(&mut self, buf: &mut [i16]) -> Result<(), CaptureError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    pub ts: TimestampMs,
    pub samples: Vec<u8>,
}

/// The microphone and its buffer. Pacing comes from the blocking period
/// read, not from a scheduler.
pub struct Microphone {
    source: Box<dyn CaptureSource>,
    buffer: Arc<DoubleBuffer<AudioChunk>>,
    chunk_len: usize,
}

impl Microphone {
    pub fn open(
        source: Box<dyn CaptureSource>,
        chunk_len: usize,
        capacity: usize,
    ) -> Result<Microphone, CaptureError> {
        Ok(Microphone {
            source,
            buffer: Arc::new(DoubleBuffer::new(capacity)?),
            chunk_len,
        })
    }

    /// Blocks for one capture period and enqueues it with a fresh host
    /// timestamp.
    pub fn append(&mut self) -> Result<(), CaptureError> {
        let mut frames = vec![0i16; self.chunk_len / 2];
        self.source.read_period(&mut frames)?;
        let chunk = AudioChunk {
            ts: time::wall_ms_now(),
            samples: bytemuck::cast_slice(&frames).to_vec(),
        };
        if self.buffer.put(chunk, false).is_err() {
            log::warn!("microphone: both rings full, transmit stalled; period lost");
        }
        Ok(())
    }

    pub fn buffer(&self) -> Arc<DoubleBuffer<AudioChunk>> {
        self.buffer.clone()
    }

    pub fn chunk_len(&self) -> usize {
        self.chunk_len
    }
}

#[cfg(all(feature = "alsa", target_os = "linux"))]
pub mod alsa_pcm {
    use std::thread;
    use std::time::Duration;

    use alsa::pcm::{Access, Format, HwParams, PCM};
    use alsa::{Direction, ValueOr};

    use super::{CaptureError, CaptureSource, OPEN_RETRIES};

    pub struct AlsaCapture {
        pcm: PCM,
        channels: usize,
    }

    impl AlsaCapture {
        pub fn open(
            device: &str,
            rate: u32,
            channels: u32,
            period_frames: usize,
        ) -> Result<AlsaCapture, CaptureError> {
            let mut attempt = 0;
            loop {
                attempt += 1;
                match Self::try_open(device, rate, channels, period_frames) {
                    Ok(capture) => return Ok(capture),
                    Err(err) if attempt < OPEN_RETRIES => {
                        log::warn!("[attempt {attempt}] audio capture not ready: {err}");
                        thread::sleep(Duration::from_secs(1));
                    }
                    Err(_) => return Err(CaptureError::NotReady(OPEN_RETRIES)),
                }
            }
        }

        fn try_open(
            device: &str,
            rate: u32,
            channels: u32,
            period_frames: usize,
        ) -> Result<AlsaCapture, alsa::Error> {
            let pcm = PCM::new(device, Direction::Capture, false)?;

            {
                let hwp = HwParams::any(&pcm)?;
                hwp.set_channels(channels)?;
                hwp.set_rate(rate, ValueOr::Nearest)?;
                hwp.set_format(Format::s16())?;
                hwp.set_access(Access::RWInterleaved)?;
                hwp.set_period_size(period_frames as i64, ValueOr::Nearest)?;
                pcm.hw_params(&hwp)?;
            }

            let (buffer, period) = pcm.get_params()?;
            log::info!("opened ALSA capture with buffer_size={buffer}, period_size={period}");

            Ok(AlsaCapture {
                pcm,
                channels: channels as usize,
            })
        }
    }

    impl CaptureSource for AlsaCapture {
        fn read_period(&mut self, buf: &mut [i16]) -> Result<(), CaptureError> {
            let io = unsafe {
                // the checked variants call snd_pcm_hw_params_current which
                // mallocs under the hood
                self.pcm.io_unchecked::<i16>()
            };

            let mut filled = 0;
            while filled < buf.len() {
                match io.readi(&mut buf[filled..]) {
                    Ok(frames) => filled += frames * self.channels,
                    Err(err) => match err.errno() {
                        libc::EPIPE | libc::ESTRPIPE | libc::EINTR => {
                            log::warn!("recovering capture stream: {}", err.errno());
                            self.pcm.recover(err.errno(), false)?;
                        }
                        _ => return Err(err.into()),
                    },
                }
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimCapture;

    #[test]
    fn test_append_fills_one_chunk() {
        let chunk_len = 64;
        let source = SimCapture::new(16_000, 1000);
        let mut mic = Microphone::open(Box::new(source), chunk_len, 4).unwrap();
        mic.append().unwrap();

        let buffer = mic.buffer();
        buffer.swap();
        let chunk = buffer.pop().unwrap();
        assert_eq!(chunk.samples.len(), chunk_len);
    }
}
