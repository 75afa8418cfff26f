use core::fmt;

/// Milliseconds since the Unix epoch, UTC. Wire form is an 8-byte big-endian
/// IEEE-754 double; sub-millisecond resolution survives the trip.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, derive_more::Display)]
#[display(fmt = "{_0}")]
pub struct TimestampMs(pub f64);

/// Monotonic nanoseconds. Used for frame scheduling only; never transmitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct MonotonicNs(pub u64);

impl MonotonicNs {
    pub fn saturating_elapsed_since(&self, earlier: MonotonicNs) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

/// Planar position and heading reported by one optical-odometry sensor.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub h: f64,
}

/// Device class announced in the client hello. Wire form is 6 ASCII bytes,
/// NUL padded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    Sensor,
    Camera,
    Audio,
    Aux,
}

impl DeviceKind {
    pub const WIRE_LEN: usize = 6;

    pub fn tag(&self) -> [u8; Self::WIRE_LEN] {
        match self {
            DeviceKind::Sensor => *b"sensor",
            DeviceKind::Camera => *b"camera",
            DeviceKind::Audio => *b"audio\0",
            DeviceKind::Aux => *b"aux\0\0\0",
        }
    }

    pub fn from_tag(tag: &[u8; Self::WIRE_LEN]) -> Option<DeviceKind> {
        match tag {
            b"sensor" => Some(DeviceKind::Sensor),
            b"camera" => Some(DeviceKind::Camera),
            b"audio\0" => Some(DeviceKind::Audio),
            b"aux\0\0\0" => Some(DeviceKind::Aux),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceKind::Sensor => "sensor",
            DeviceKind::Camera => "camera",
            DeviceKind::Audio => "audio",
            DeviceKind::Aux => "aux",
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tag_roundtrip() {
        for kind in [
            DeviceKind::Sensor,
            DeviceKind::Camera,
            DeviceKind::Audio,
            DeviceKind::Aux,
        ] {
            assert_eq!(DeviceKind::from_tag(&kind.tag()), Some(kind));
        }
    }

    #[test]
    fn test_kind_tag_rejects_unknown() {
        assert_eq!(DeviceKind::from_tag(b"galvo\0"), None);
    }
}
