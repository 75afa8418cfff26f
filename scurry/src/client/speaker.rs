//! Speaker governor. No data stream to the ingestor: it only listens to the
//! controller, driving the output tone at whatever frequency was last
//! commanded and stopping on `BEGIN_STOP`.

use std::net::TcpStream;
use std::thread::JoinHandle;
use std::time::Duration;

use scurry_device::speaker::{FrequencyControl, Speaker, SpeakerOpt};
use scurry_util::thread;

use crate::client::governor::{control_connect, control_listener, Lifecycle, State, TermFlag};
use crate::client::RunError;
use crate::config::Settings;

/// The playback loop re-checks the termination flag at this interval; stop
/// latency is bounded by it.
const STOP_POLL: Duration = Duration::from_millis(100);

pub struct SpeakerGovernor {
    opt: SpeakerOpt,
    control_sock: TcpStream,
    frequency: FrequencyControl,
    term: TermFlag,
    lifecycle: Lifecycle,
}

impl SpeakerGovernor {
    pub fn init(settings: &Settings) -> Result<SpeakerGovernor, RunError> {
        let mut lifecycle = Lifecycle::new("speaker");
        let opt = SpeakerOpt {
            sample_rate: settings.audio.rate,
            block_size: settings.speaker.block_size,
            channels: settings.speaker.channels,
            amplitude: settings.speaker.amplitude,
        };

        let control_sock = control_connect(&settings.bmi)?;
        lifecycle.advance(State::Ready);

        Ok(SpeakerGovernor {
            opt,
            control_sock,
            frequency: FrequencyControl::new(0.0),
            term: TermFlag::new(),
            lifecycle,
        })
    }

    pub fn start(mut self) -> Vec<JoinHandle<()>> {
        self.lifecycle.advance(State::Running);

        // the output stream is built inside its own thread: the audio handle
        // is not Send, only the frequency control crosses threads
        let playback = {
            let term = self.term.clone();
            let frequency = self.frequency.clone();
            let opt = self.opt;
            let mut lifecycle = self.lifecycle;
            thread::start("scurry/speaker", move || {
                let mut speaker = Speaker::new(opt, frequency);
                if let Err(e) = speaker.start() {
                    log::error!("speaker failed to start: {e}");
                    lifecycle.advance(State::Stopped);
                    return;
                }
                while !term.is_set() {
                    std::thread::sleep(STOP_POLL);
                }
                lifecycle.advance(State::Draining);
                speaker.stop();
                lifecycle.advance(State::Stopped);
            })
        };

        let listen = {
            let term = self.term.clone();
            let control_sock = self.control_sock;
            let frequency = self.frequency.clone();
            thread::start("scurry/speaker-ctl", move || {
                control_listener("speaker", control_sock, term, Some(frequency))
            })
        };

        vec![playback, listen]
    }
}
