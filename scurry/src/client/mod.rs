//! The acquisition node. One governor per device class, each owning its
//! devices, buffers, sockets and threads; the only cross-thread primitives
//! are the rings, the swap locks and the per-governor termination flags.

mod audio;
mod aux;
mod camera;
pub mod governor;
pub mod net;
mod sensor;
mod speaker;

use std::path::PathBuf;

use structopt::StructOpt;
use thiserror::Error;

use scurry_core::buffer::ZeroCapacity;
use scurry_device::camera::CameraError;
use scurry_device::microphone::CaptureError;
use scurry_device::sensor::SensorError;

use crate::config::{ConfigError, Settings};

use self::net::LinkError;

#[derive(StructOpt)]
pub struct ClientOpt {
    /// Path to settings.yaml
    #[structopt(long, env = "SCURRY_CONFIG", default_value = "settings.yaml")]
    pub config: PathBuf,
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error("sensor: {0}")]
    Sensor(#[from] SensorError),
    #[error("camera: {0}")]
    Camera(#[from] CameraError),
    #[error("audio capture: {0}")]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Buffer(#[from] ZeroCapacity),
}

pub fn run(opt: ClientOpt) -> Result<(), RunError> {
    let settings = Settings::load(&opt.config)?;
    log::info!("client starting with settings from {}", opt.config.display());
    log::debug!(
        "configured endpoints: jetson {} (comm ports {}/{}), controller {}:{} (comm {})",
        settings.jetson.ip,
        settings.jetson.ingest_comm_port,
        settings.jetson.bmi_comm_port,
        settings.bmi.ip,
        settings.bmi.listen_port,
        settings.bmi.comm_port
    );

    // init is sequential and fail-fast: a device or handshake failure here
    // exits 1 before any thread spawns
    let sensor = sensor::SensorGovernor::init(&settings)?;
    let camera = camera::CameraGovernor::init(&settings)?;
    let audio = audio::AudioGovernor::init(&settings)?;
    let aux = aux::AuxGovernor::init(&settings)?;
    let speaker = speaker::SpeakerGovernor::init(&settings)?;

    let mut handles = Vec::new();
    handles.extend(sensor.start());
    handles.extend(camera.start());
    handles.extend(audio.start());
    handles.extend(aux.start());
    handles.extend(speaker.start());

    for handle in handles {
        if let Err(panic) = handle.join() {
            // a hard abort stays confined to its thread; siblings drain
            log::error!("client thread panicked: {panic:?}");
        }
    }

    log::info!("client shutdown complete");
    Ok(())
}
