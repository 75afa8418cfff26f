//! Camera governor. Frames are the heaviest stream on the wire and the only
//! droppable one: under overload the buffer sheds frames rather than stall
//! odometry.

use std::net::TcpStream;
use std::thread::JoinHandle;

use scurry_core::Cadence;
use scurry_device::camera::{Camera, VideoFrame};
use scurry_device::sim::SimFrames;
use scurry_protocol::wire::VideoRecord;
use scurry_protocol::DeviceKind;
use scurry_util::{thread, time};

use crate::client::governor::{
    control_connect, control_listener, transmit_loop, Lifecycle, State, TermFlag, TxLane,
};
use crate::client::net::DeviceLink;
use crate::client::RunError;
use crate::config::Settings;

pub struct CameraGovernor {
    cameras: Vec<Camera>,
    lanes: Vec<TxLane<VideoFrame>>,
    control: TcpStream,
    term: TermFlag,
    framerate: u32,
    lifecycle: Lifecycle,
}

impl CameraGovernor {
    pub fn init(settings: &Settings) -> Result<CameraGovernor, RunError> {
        let mut lifecycle = Lifecycle::new("camera");
        let capacity = settings.buffer.ring_capacity();

        // one capture stamp per run, shared by both cameras' tee files
        let capture_stamp = time::capture_stamp();
        let tee_dir = &settings.data_paths.camera;
        if let Err(e) = std::fs::create_dir_all(tee_dir) {
            log::warn!("camera tee disabled, cannot create {}: {e}", tee_dir.display());
        }

        let mut cameras = Vec::new();
        let mut lanes = Vec::new();
        for ident in settings.camera.ident {
            // the capture pipeline is the opaque seam; the bench build
            // synthesizes full-geometry frames
            let mut camera = Camera::open(ident, Box::new(SimFrames::full_size()), capacity)?;
            match camera.tee_to(tee_dir, capture_stamp) {
                Ok(path) => log::info!("camera{ident}: local tee at {}", path.display()),
                Err(e) => log::warn!("camera{ident}: tee disabled: {e}"),
            }

            let link =
                DeviceLink::handshake(&settings.ingestor, DeviceKind::Camera, ident as u32)?;
            lanes.push(TxLane::new(
                format!("camera{ident}"),
                camera.buffer(),
                link,
                VideoRecord::LEN,
                Box::new(|frame: VideoFrame| {
                    VideoRecord {
                        ts: frame.ts,
                        frame: frame.data,
                    }
                    .encode()
                }),
            ));
            cameras.push(camera);
        }

        let control = control_connect(&settings.bmi)?;
        lifecycle.advance(State::Ready);

        Ok(CameraGovernor {
            cameras,
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
            let mut cameras = self.cameras;
            let mut cadence = Cadence::new(self.framerate);
            thread::start("scurry/camera-enq", move || {
                thread::set_realtime_priority();
                while !term.is_set() {
                    let skipped = cadence.wait();
                    if skipped > 0 {
                        log::warn!("camera producer behind, skipped {skipped} frame(s)");
                    }
                    for camera in &mut cameras {
                        if let Err(e) = camera.append() {
                            log::error!("camera{}: {e}", camera.ident());
                        }
                    }
                }
                for camera in &cameras {
                    let dropped = camera.buffer().dropped();
                    if dropped > 0 {
                        log::warn!("camera{}: {dropped} frame(s) shed under overload", camera.ident());
                    }
                }
                log::debug!("camera producer finished");
            })
        };

        let tx = {
            let term = self.term.clone();
            let lanes = self.lanes;
            let lifecycle = self.lifecycle;
            thread::start("scurry/camera-tx", move || {
                transmit_loop(lanes, term, lifecycle)
            })
        };

        let listen = {
            let term = self.term.clone();
            let control = self.control;
            thread::start("scurry/camera-ctl", move || {
                control_listener("camera", control, term, None)
            })
        };

        vec![produce, tx, listen]
    }
}
