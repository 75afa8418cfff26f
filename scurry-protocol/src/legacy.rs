//! Legacy combined-mode packet, kept for interop with the first-generation
//! receiver. One fixed-size block multiplexes a microphone period and the
//! four auxiliary scalars:
//!
//! ```text
//! | u32 frame_count | f64 sent_ts | f64 audio_ts | f64 aux_ts x4 |
//! | audio bytes (2 * rate/framerate) | 8B aux x4 |
//! ```
//!
//! The canonical transport is the per-device-port model in [`crate::wire`];
//! nothing in the steady-state pipeline emits this format.

use crate::types::TimestampMs;
use crate::wire::WireError;
use crate::AUX_CHANNELS;

#[derive(Debug, Clone, PartialEq)]
pub struct CompositePacket {
    pub frame_count: u32,
    pub sent_ts: TimestampMs,
    pub audio_ts: TimestampMs,
    pub aux_ts: [TimestampMs; AUX_CHANNELS],
    pub audio: Vec<u8>,
    pub aux: [[u8; 8]; AUX_CHANNELS],
}

impl CompositePacket {
    pub const HEADER_LEN: usize = 4 + 8 * (2 + AUX_CHANNELS);

    pub fn wire_len(chunk_len: usize) -> usize {
        Self::HEADER_LEN + chunk_len + 8 * AUX_CHANNELS
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::wire_len(self.audio.len()));
        buf.extend_from_slice(&self.frame_count.to_be_bytes());
        buf.extend_from_slice(&self.sent_ts.0.to_be_bytes());
        buf.extend_from_slice(&self.audio_ts.0.to_be_bytes());
        for ts in &self.aux_ts {
            buf.extend_from_slice(&ts.0.to_be_bytes());
        }
        buf.extend_from_slice(&self.audio);
        for value in &self.aux {
            buf.extend_from_slice(value);
        }
        buf
    }

    pub fn decode(buf: &[u8], chunk_len: usize) -> Result<CompositePacket, WireError> {
        if buf.len() != Self::wire_len(chunk_len) {
            return Err(WireError::LengthMismatch {
                expected: Self::wire_len(chunk_len),
                got: buf.len(),
            });
        }

        let frame_count = u32::from_be_bytes(buf[..4].try_into().unwrap());
        let read_ts = |at: usize| {
            TimestampMs(f64::from_be_bytes(buf[at..at + 8].try_into().unwrap()))
        };
        let sent_ts = read_ts(4);
        let audio_ts = read_ts(12);
        let mut aux_ts = [TimestampMs::default(); AUX_CHANNELS];
        for (n, slot) in aux_ts.iter_mut().enumerate() {
            *slot = read_ts(20 + n * 8);
        }

        let audio_at = Self::HEADER_LEN;
        let aux_at = audio_at + chunk_len;
        let audio = buf[audio_at..aux_at].to_vec();
        let mut aux = [[0u8; 8]; AUX_CHANNELS];
        for (n, slot) in aux.iter_mut().enumerate() {
            slot.copy_from_slice(&buf[aux_at + n * 8..aux_at + (n + 1) * 8]);
        }

        Ok(CompositePacket {
            frame_count,
            sent_ts,
            audio_ts,
            aux_ts,
            audio,
            aux,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(chunk_len: usize) -> CompositePacket {
        CompositePacket {
            frame_count: 42,
            sent_ts: TimestampMs(1.0),
            audio_ts: TimestampMs(2.0),
            aux_ts: [
                TimestampMs(3.0),
                TimestampMs(4.0),
                TimestampMs(5.0),
                TimestampMs(6.0),
            ],
            audio: (0..chunk_len as u32).map(|n| n as u8).collect(),
            aux: [[1; 8], [2; 8], [3; 8], [4; 8]],
        }
    }

    #[test]
    fn test_composite_roundtrip() {
        let packet = sample(32);
        let buf = packet.encode();
        assert_eq!(buf.len(), CompositePacket::wire_len(32));
        assert_eq!(CompositePacket::decode(&buf, 32).unwrap(), packet);
    }

    #[test]
    fn test_composite_header_layout() {
        let packet = sample(4);
        let buf = packet.encode();
        assert_eq!(&buf[..4], &42u32.to_be_bytes());
        assert_eq!(&buf[4..12], &1.0f64.to_be_bytes());
        assert_eq!(CompositePacket::HEADER_LEN, 52);
    }

    #[test]
    fn test_composite_rejects_wrong_chunk() {
        let buf = sample(32).encode();
        assert!(CompositePacket::decode(&buf, 16).is_err());
    }
}
