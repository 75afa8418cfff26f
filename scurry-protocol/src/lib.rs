pub mod legacy;
pub mod types;
pub mod wire;

pub use types::{DeviceKind, MonotonicNs, Pose, TimestampMs};

/// Camera frame geometry. Fixed for the capture rig; both ends of a camera
/// stream size their reads from these.
pub const FRAME_WIDTH: usize = 1280;
pub const FRAME_HEIGHT: usize = 720;
pub const FRAME_CHANNELS: usize = 1;
pub const FRAME_LEN: usize = FRAME_WIDTH * FRAME_HEIGHT * FRAME_CHANNELS;

/// Auxiliary scalar channels carried by the client (lick detector plus three
/// spare inputs).
pub const AUX_CHANNELS: usize = 4;
