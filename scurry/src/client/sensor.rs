//! Sensor governor: owns both optical-odometry sensors, their buffers and
//! their streams to the ingestor.

use std::net::TcpStream;
use std::thread::JoinHandle;

use scurry_core::Cadence;
use scurry_device::sensor::{PoseSample, Sensor};
use scurry_device::sim::SimPose;
use scurry_protocol::wire::SensorRecord;
use scurry_protocol::DeviceKind;
use scurry_util::thread;

use crate::client::governor::{
    control_connect, control_listener, transmit_loop, Lifecycle, State, TermFlag, TxLane,
};
use crate::client::net::DeviceLink;
use crate::client::RunError;
use crate::config::Settings;

pub struct SensorGovernor {
    sensors: Vec<Sensor>,
    lanes: Vec<TxLane<PoseSample>>,
    control: TcpStream,
    term: TermFlag,
    framerate: u32,
    lifecycle: Lifecycle,
}

impl SensorGovernor {
    pub fn init(settings: &Settings) -> Result<SensorGovernor, RunError> {
        let mut lifecycle = Lifecycle::new("sensor");
        let capacity = settings.buffer.ring_capacity();

        let mut sensors = Vec::new();
        let mut lanes = Vec::new();
        for (idx, addr) in settings.sensor.i2c_addr.iter().enumerate() {
            // the OTOS SDK is the opaque seam here; the bench build polls a
            // simulated driver at the configured address
            let sensor = Sensor::open(*addr, Box::new(SimPose::new()), capacity)?;
            let link = DeviceLink::handshake(&settings.ingestor, DeviceKind::Sensor, idx as u32)?;

            let idx = idx as u32;
            lanes.push(TxLane::new(
                format!("sensor{idx}"),
                sensor.buffer(),
                link,
                SensorRecord::LEN,
                Box::new(move |sample: PoseSample| {
                    SensorRecord {
                        ts: sample.ts,
                        pose: sample.pose,
                        idx,
                    }
                    .encode()
                    .to_vec()
                }),
            ));
            sensors.push(sensor);
        }

        let control = control_connect(&settings.bmi)?;
        lifecycle.advance(State::Ready);

        Ok(SensorGovernor {
            sensors,
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
            let mut sensors = self.sensors;
            let mut cadence = Cadence::new(self.framerate);
            thread::start("scurry/sensor-enq", move || {
                while !term.is_set() {
                    let skipped = cadence.wait();
                    if skipped > 0 {
                        log::warn!("sensor producer behind, skipped {skipped} frame(s)");
                    }
                    for sensor in &mut sensors {
                        sensor.append();
                    }
                }
                log::debug!("sensor producer finished");
            })
        };

        let tx = {
            let term = self.term.clone();
            let lanes = self.lanes;
            let lifecycle = self.lifecycle;
            thread::start("scurry/sensor-tx", move || {
                transmit_loop(lanes, term, lifecycle)
            })
        };

        let listen = {
            let term = self.term.clone();
            let control = self.control;
            thread::start("scurry/sensor-ctl", move || {
                control_listener("sensor", control, term, None)
            })
        };

        vec![produce, tx, listen]
    }
}
