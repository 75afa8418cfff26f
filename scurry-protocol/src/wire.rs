//! Canonical wire formats between the client, the ingestor, and the
//! controller. All multi-byte fields are big-endian.
//!
//! ```text
//! client hello (18B)   | 6s kind | u32 ident | f64 ts_ms |
//! handshake reply (2B) | u16 data port |
//! sensor record (36B)  | f64 ts | f64 x | f64 y | f64 h | u32 idx |
//! aux record (16B)     | f64 ts | 8B value |
//! audio record         | f64 ts | 2*(rate/framerate) sample bytes |
//! video record         | f64 ts | FRAME_LEN frame bytes |
//! control message (10B)| "BEGIN_STOP" or f32 freq + 6 expansion bytes |
//! ```
//!
//! Data streams end with a sentinel beginning with `END_STOP`, NUL-padded to
//! the stream's record size so receivers always read whole records.

use std::io::{self, Read, Write};

use thiserror::Error;

use crate::types::{DeviceKind, Pose, TimestampMs};
use crate::FRAME_LEN;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("unknown device kind tag {0:?}")]
    UnknownKind([u8; DeviceKind::WIRE_LEN]),
    #[error("record length mismatch: expected {expected}, got {got}")]
    LengthMismatch { expected: usize, got: usize },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// First packet on the gateway connection: announces a device stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClientHello {
    pub kind: DeviceKind,
    pub ident: u32,
    pub ts: TimestampMs,
}

impl ClientHello {
    pub const LEN: usize = DeviceKind::WIRE_LEN + 4 + 8;

    pub fn encode(&self) -> [u8; Self::LEN] {
        let mut buf = [0u8; Self::LEN];
        buf[..6].copy_from_slice(&self.kind.tag());
        buf[6..10].copy_from_slice(&self.ident.to_be_bytes());
        buf[10..18].copy_from_slice(&self.ts.0.to_be_bytes());
        buf
    }

    pub fn decode(buf: &[u8; Self::LEN]) -> Result<ClientHello, WireError> {
        let mut tag = [0u8; DeviceKind::WIRE_LEN];
        tag.copy_from_slice(&buf[..6]);
        let kind = DeviceKind::from_tag(&tag).ok_or(WireError::UnknownKind(tag))?;
        let ident = u32::from_be_bytes(buf[6..10].try_into().unwrap());
        let ts = TimestampMs(f64::from_be_bytes(buf[10..18].try_into().unwrap()));
        Ok(ClientHello { kind, ident, ts })
    }

    pub fn read_from<R: Read>(reader: &mut R) -> Result<ClientHello, WireError> {
        let mut buf = [0u8; Self::LEN];
        reader.read_exact(&mut buf)?;
        Self::decode(&buf)
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.encode())
    }
}

/// Gateway's answer to a hello: the data port assigned to this device stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeReply(pub u16);

impl HandshakeReply {
    pub const LEN: usize = 2;

    pub fn encode(&self) -> [u8; Self::LEN] {
        self.0.to_be_bytes()
    }

    pub fn read_from<R: Read>(reader: &mut R) -> Result<HandshakeReply, WireError> {
        let mut buf = [0u8; Self::LEN];
        reader.read_exact(&mut buf)?;
        Ok(HandshakeReply(u16::from_be_bytes(buf)))
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.encode())
    }
}

/// One odometry reading. `idx` identifies which of the two sensors produced
/// it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorRecord {
    pub ts: TimestampMs,
    pub pose: Pose,
    pub idx: u32,
}

impl SensorRecord {
    pub const LEN: usize = 8 * 4 + 4;

    pub fn encode(&self) -> [u8; Self::LEN] {
        let mut buf = [0u8; Self::LEN];
        buf[..8].copy_from_slice(&self.ts.0.to_be_bytes());
        buf[8..16].copy_from_slice(&self.pose.x.to_be_bytes());
        buf[16..24].copy_from_slice(&self.pose.y.to_be_bytes());
        buf[24..32].copy_from_slice(&self.pose.h.to_be_bytes());
        buf[32..36].copy_from_slice(&self.idx.to_be_bytes());
        buf
    }

    pub fn decode(buf: &[u8; Self::LEN]) -> SensorRecord {
        SensorRecord {
            ts: TimestampMs(f64::from_be_bytes(buf[..8].try_into().unwrap())),
            pose: Pose {
                x: f64::from_be_bytes(buf[8..16].try_into().unwrap()),
                y: f64::from_be_bytes(buf[16..24].try_into().unwrap()),
                h: f64::from_be_bytes(buf[24..32].try_into().unwrap()),
            },
            idx: u32::from_be_bytes(buf[32..36].try_into().unwrap()),
        }
    }
}

/// One auxiliary scalar reading; the 8 payload bytes are opaque here.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AuxRecord {
    pub ts: TimestampMs,
    pub value: [u8; 8],
}

impl AuxRecord {
    pub const LEN: usize = 8 + 8;

    pub fn encode(&self) -> [u8; Self::LEN] {
        let mut buf = [0u8; Self::LEN];
        buf[..8].copy_from_slice(&self.ts.0.to_be_bytes());
        buf[8..].copy_from_slice(&self.value);
        buf
    }

    pub fn decode(buf: &[u8; Self::LEN]) -> AuxRecord {
        AuxRecord {
            ts: TimestampMs(f64::from_be_bytes(buf[..8].try_into().unwrap())),
            value: buf[8..].try_into().unwrap(),
        }
    }
}

/// One period of microphone capture. Payload length is fixed per stream at
/// `2 * rate / framerate` bytes (S16_LE mono).
#[derive(Debug, Clone, PartialEq)]
pub struct AudioRecord {
    pub ts: TimestampMs,
    pub samples: Vec<u8>,
}

impl AudioRecord {
    pub const HEADER_LEN: usize = 8;

    pub fn wire_len(chunk_len: usize) -> usize {
        Self::HEADER_LEN + chunk_len
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::HEADER_LEN + self.samples.len());
        buf.extend_from_slice(&self.ts.0.to_be_bytes());
        buf.extend_from_slice(&self.samples);
        buf
    }

    pub fn decode(buf: &[u8], chunk_len: usize) -> Result<AudioRecord, WireError> {
        if buf.len() != Self::wire_len(chunk_len) {
            return Err(WireError::LengthMismatch {
                expected: Self::wire_len(chunk_len),
                got: buf.len(),
            });
        }
        Ok(AudioRecord {
            ts: TimestampMs(f64::from_be_bytes(buf[..8].try_into().unwrap())),
            samples: buf[8..].to_vec(),
        })
    }
}

/// One raw camera frame, fixed at [`FRAME_LEN`] payload bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoRecord {
    pub ts: TimestampMs,
    pub frame: Vec<u8>,
}

impl VideoRecord {
    pub const HEADER_LEN: usize = 8;
    pub const LEN: usize = Self::HEADER_LEN + FRAME_LEN;

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::HEADER_LEN + self.frame.len());
        buf.extend_from_slice(&self.ts.0.to_be_bytes());
        buf.extend_from_slice(&self.frame);
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<VideoRecord, WireError> {
        if buf.len() != Self::LEN {
            return Err(WireError::LengthMismatch {
                expected: Self::LEN,
                got: buf.len(),
            });
        }
        Ok(VideoRecord {
            ts: TimestampMs(f64::from_be_bytes(buf[..8].try_into().unwrap())),
            frame: buf[8..].to_vec(),
        })
    }
}

/// Controller-to-client message, always exactly 10 bytes: either the
/// termination trigger or a speaker frequency with 6 reserved bytes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlMessage {
    Stop,
    Frequency(f32),
}

pub const BEGIN_STOP: &[u8; 10] = b"BEGIN_STOP";
const EXPANSION: &[u8; 6] = b"000000";

impl ControlMessage {
    pub const LEN: usize = 10;

    pub fn decode(buf: &[u8; Self::LEN]) -> ControlMessage {
        if buf.starts_with(BEGIN_STOP) {
            ControlMessage::Stop
        } else {
            ControlMessage::Frequency(f32::from_be_bytes(buf[..4].try_into().unwrap()))
        }
    }

    pub fn encode(&self) -> [u8; Self::LEN] {
        match self {
            ControlMessage::Stop => *BEGIN_STOP,
            ControlMessage::Frequency(hz) => {
                let mut buf = [0u8; Self::LEN];
                buf[..4].copy_from_slice(&hz.to_be_bytes());
                buf[4..].copy_from_slice(EXPANSION);
                buf
            }
        }
    }
}

pub const END_STOP: &[u8; 8] = b"END_STOP";
pub const SENTINEL_MIN_LEN: usize = 10;

/// Builds the end-of-stream sentinel for a stream whose records are
/// `record_len` bytes: `END_STOP` NUL-padded to the record size, so the
/// receiver's fixed-size read never straddles it.
pub fn sentinel(record_len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; record_len.max(SENTINEL_MIN_LEN)];
    buf[..END_STOP.len()].copy_from_slice(END_STOP);
    buf
}

pub fn is_sentinel(buf: &[u8]) -> bool {
    buf.starts_with(END_STOP)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hello_roundtrip() {
        for kind in [DeviceKind::Sensor, DeviceKind::Camera] {
            let hello = ClientHello {
                kind,
                ident: 1,
                ts: TimestampMs(1.7e12),
            };
            let decoded = ClientHello::decode(&hello.encode()).unwrap();
            assert_eq!(decoded, hello);
        }
    }

    #[test]
    fn test_hello_layout() {
        // sensor ident 0: 6-byte tag, 4 NUL ident bytes, then the timestamp
        let hello = ClientHello {
            kind: DeviceKind::Sensor,
            ident: 0,
            ts: TimestampMs(1.7e12),
        };
        let buf = hello.encode();
        assert_eq!(buf.len(), 18);
        assert_eq!(&buf[..10], b"sensor\x00\x00\x00\x00");
        assert_eq!(&buf[10..], &1.7e12f64.to_be_bytes());
    }

    #[test]
    fn test_hello_rejects_unknown_kind() {
        let mut buf = [0u8; ClientHello::LEN];
        buf[..6].copy_from_slice(b"galvo\0");
        assert!(matches!(
            ClientHello::decode(&buf),
            Err(WireError::UnknownKind(_))
        ));
    }

    #[test]
    fn test_handshake_reply_layout() {
        let reply = HandshakeReply(42000);
        assert_eq!(reply.encode(), 42000u16.to_be_bytes());
        let mut cursor = std::io::Cursor::new(reply.encode().to_vec());
        assert_eq!(HandshakeReply::read_from(&mut cursor).unwrap(), reply);
    }

    #[test]
    fn test_sensor_record_roundtrip() {
        let record = SensorRecord {
            ts: TimestampMs(1.7e12),
            pose: Pose {
                x: 1.5,
                y: -2.25,
                h: 0.0,
            },
            idx: 1,
        };
        let buf = record.encode();
        assert_eq!(buf.len(), 36);
        assert_eq!(SensorRecord::decode(&buf), record);
    }

    #[test]
    fn test_sensor_record_layout() {
        // matches the reference layout `>dddd I`
        let record = SensorRecord {
            ts: TimestampMs(1.7e12),
            pose: Pose {
                x: 1.5,
                y: -2.25,
                h: 0.0,
            },
            idx: 1,
        };
        let buf = record.encode();
        let mut expected = Vec::new();
        for v in [1.7e12f64, 1.5, -2.25, 0.0] {
            expected.extend_from_slice(&v.to_be_bytes());
        }
        expected.extend_from_slice(&1u32.to_be_bytes());
        assert_eq!(&buf[..], &expected[..]);
    }

    #[test]
    fn test_aux_record_roundtrip() {
        let record = AuxRecord {
            ts: TimestampMs(3.0),
            value: 7u64.to_be_bytes(),
        };
        assert_eq!(AuxRecord::decode(&record.encode()), record);
    }

    #[test]
    fn test_audio_record_roundtrip() {
        let record = AudioRecord {
            ts: TimestampMs(5.5),
            samples: vec![1, 2, 3, 4],
        };
        let buf = record.encode();
        assert_eq!(AudioRecord::decode(&buf, 4).unwrap(), record);
        assert!(matches!(
            AudioRecord::decode(&buf, 6),
            Err(WireError::LengthMismatch { expected: 14, .. })
        ));
    }

    #[test]
    fn test_control_message_stop() {
        assert_eq!(
            ControlMessage::decode(b"BEGIN_STOP"),
            ControlMessage::Stop
        );
        assert_eq!(&ControlMessage::Stop.encode(), b"BEGIN_STOP");
    }

    #[test]
    fn test_control_message_frequency() {
        let buf = ControlMessage::Frequency(750.0).encode();
        assert_eq!(&buf[..4], &750.0f32.to_be_bytes());
        assert_eq!(&buf[4..], b"000000");
        assert_eq!(
            ControlMessage::decode(&buf),
            ControlMessage::Frequency(750.0)
        );
    }

    #[test]
    fn test_sentinel_padding() {
        let s = sentinel(SensorRecord::LEN);
        assert_eq!(s.len(), 36);
        assert!(is_sentinel(&s));
        assert!(s[8..].iter().all(|b| *b == 0));

        // never shorter than the 10-byte control frame
        assert_eq!(sentinel(4).len(), 10);
    }

    #[test]
    fn test_sentinel_does_not_match_records() {
        let record = SensorRecord {
            ts: TimestampMs(1.7e12),
            pose: Pose::default(),
            idx: 0,
        };
        assert!(!is_sentinel(&record.encode()));
    }
}
