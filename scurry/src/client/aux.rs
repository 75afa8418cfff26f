//! Auxiliary scalar governor: the lick detector and three spare channels,
//! all stubbed until the bench grows real hardware.

use std::net::TcpStream;
use std::thread::JoinHandle;

use scurry_core::Cadence;
use scurry_device::aux::{AuxChannel, AuxSample};
use scurry_device::sim::SimScalar;
use scurry_protocol::wire::AuxRecord;
use scurry_protocol::{DeviceKind, AUX_CHANNELS};
use scurry_util::thread;

use crate::client::governor::{
    control_connect, control_listener, transmit_loop, Lifecycle, State, TermFlag, TxLane,
};
use crate::client::net::DeviceLink;
use crate::client::RunError;
use crate::config::Settings;

pub struct AuxGovernor {
    channels: Vec<AuxChannel>,
    lanes: Vec<TxLane<AuxSample>>,
    control: TcpStream,
    term: TermFlag,
    framerate: u32,
    lifecycle: Lifecycle,
}

impl AuxGovernor {
    pub fn init(settings: &Settings) -> Result<AuxGovernor, RunError> {
        let mut lifecycle = Lifecycle::new("aux");
        let capacity = settings.buffer.ring_capacity();

        let mut channels = Vec::new();
        let mut lanes = Vec::new();
        for ident in 0..AUX_CHANNELS as u8 {
            let channel = AuxChannel::open(ident, Box::new(SimScalar::new()), capacity)?;
            let link = DeviceLink::handshake(&settings.ingestor, DeviceKind::Aux, ident as u32)?;
            lanes.push(TxLane::new(
                format!("aux{ident}"),
                channel.buffer(),
                link,
                AuxRecord::LEN,
                Box::new(|sample: AuxSample| {
                    AuxRecord {
                        ts: sample.ts,
                        value: sample.value,
                    }
                    .encode()
                    .to_vec()
                }),
            ));
            channels.push(channel);
        }

        let control = control_connect(&settings.bmi)?;
        lifecycle.advance(State::Ready);

        Ok(AuxGovernor {
            channels,
            lanes,
            control,
            term: TermFlag::new(),
            framerate: settings.buffer.framerate,
            lifecycle,
        })
    }

    pub fn start(mut self) -> Vec<JoinHandle<()>> {
        self.lifecycle.advance(State::Running);

        let produce = {
            let term = self.term.clone();
            let mut channels = self.channels;
            let mut cadence = Cadence::new(self.framerate);
            thread::start("scurry/aux-enq", move || {
                while !term.is_set() {
                    let skipped = cadence.wait();
                    if skipped > 0 {
                        log::warn!("aux producer behind, skipped {skipped} frame(s)");
                    }
                    for channel in &mut channels {
                        channel.append();
                    }
                }
                log::debug!("aux producer finished");
            })
        };

        let tx = {
            let term = self.term.clone();
            let lanes = self.lanes;
            let lifecycle = self.lifecycle;
            thread::start("scurry/aux-tx", move || {
                transmit_loop(lanes, term, lifecycle)
            })
        };

        let listen = {
            let term = self.term.clone();
            let control = self.control;
            thread::start("scurry/aux-ctl", move || {
                control_listener("aux", control, term, None)
            })
        };

        vec![produce, tx, listen]
    }
}
