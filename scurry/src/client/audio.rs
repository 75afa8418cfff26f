//! Audio capture governor. Pacing comes from the blocking period read, not
//! from a scheduler: one `append` blocks for `rate / framerate` frames.

use std::net::TcpStream;
use std::thread::JoinHandle;

use scurry_device::microphone::{AudioChunk, CaptureSource, Microphone};
use scurry_protocol::wire::AudioRecord;
use scurry_protocol::DeviceKind;
use scurry_util::thread;

use crate::client::governor::{
    control_connect, control_listener, transmit_loop, Lifecycle, State, TermFlag, TxLane,
};
use crate::client::net::DeviceLink;
use crate::client::RunError;
use crate::config::Settings;

pub struct AudioGovernor {
    microphone: Microphone,
    lanes: Vec<TxLane<AudioChunk>>,
    control: TcpStream,
    term: TermFlag,
    lifecycle: Lifecycle,
}

#[cfg(all(feature = "alsa", target_os = "linux"))]
fn capture_source(settings: &Settings) -> Result<Box<dyn CaptureSource>, RunError> {
    use crate::config::AudioFormat;
    use scurry_device::microphone::{alsa_pcm::AlsaCapture, CaptureError};

    match settings.audio.format {
        AudioFormat::S16Le => Ok(Box::new(AlsaCapture::open(
            "default",
            settings.audio.rate,
            settings.audio.channels,
            (settings.audio.rate / settings.buffer.framerate) as usize,
        )?)),
        other => Err(RunError::Capture(CaptureError::UnsupportedFormat(
            other.to_string(),
        ))),
    }
}

#[cfg(not(all(feature = "alsa", target_os = "linux")))]
fn capture_source(settings: &Settings) -> Result<Box<dyn CaptureSource>, RunError> {
    use scurry_device::sim::SimCapture;

    log::info!(
        "ALSA capture compiled out; simulating a {} microphone",
        settings.audio.format
    );
    Ok(Box::new(SimCapture::new(
        settings.audio.rate,
        settings.buffer.framerate,
    )))
}

impl AudioGovernor {
    pub fn init(settings: &Settings) -> Result<AudioGovernor, RunError> {
        let mut lifecycle = Lifecycle::new("audio");
        let capacity = settings.buffer.ring_capacity();
        let chunk_len = settings.chunk_bytes();

        let source = capture_source(settings)?;
        let microphone = Microphone::open(source, chunk_len, capacity)?;

        let link = DeviceLink::handshake(&settings.ingestor, DeviceKind::Audio, 0)?;
        let lanes = vec![TxLane::new(
            "audio0".to_string(),
            microphone.buffer(),
            link,
            AudioRecord::wire_len(chunk_len),
            Box::new(|chunk: AudioChunk| {
                AudioRecord {
                    ts: chunk.ts,
                    samples: chunk.samples,
                }
                .encode()
            }),
        )];

        let control = control_connect(&settings.bmi)?;
        lifecycle.advance(State::Ready);

        Ok(AudioGovernor {
            microphone,
            lanes,
            control,
            term: TermFlag::new(),
            lifecycle,
        })
    }

    pub fn start(mut self) -> Vec<JoinHandle<()>> {
        self.lifecycle.advance(State::Running);

        let produce = {
            let term = self.term.clone();
            let mut microphone = self.microphone;
            thread::start("scurry/audio-enq", move || {
                while !term.is_set() {
                    if let Err(e) = microphone.append() {
                        log::error!("audio capture failed: {e}");
                        break;
                    }
                }
                log::debug!("audio producer finished");
            })
        };

        let tx = {
            let term = self.term.clone();
            let lanes = self.lanes;
            let lifecycle = self.lifecycle;
            thread::start("scurry/audio-tx", move || {
                transmit_loop(lanes, term, lifecycle)
            })
        };

        let listen = {
            let term = self.term.clone();
            let control = self.control;
            thread::start("scurry/audio-ctl", move || {
                control_listener("audio", control, term, None)
            })
        };

        vec![produce, tx, listen]
    }
}
