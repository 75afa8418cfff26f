use std::sync::Arc;

use scurry_core::buffer::ZeroCapacity;
use scurry_core::DoubleBuffer;
use scurry_protocol::TimestampMs;
use scurry_util::time;

/// Seam for an auxiliary scalar input (lick detector and friends). All
/// current deployments run the simulated source; the trait is where real
/// hardware plugs in.
pub trait ScalarSource: Send {
    fn sample(&mut self) -> [u8; 8];
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AuxSample {
    pub ts: TimestampMs,
    pub value: [u8; 8],
}

pub struct AuxChannel {
    ident: u8,
    source: Box<dyn ScalarSource>,
    buffer: Arc<DoubleBuffer<AuxSample>>,
}

impl AuxChannel {
    pub fn open(
        ident: u8,
        source: Box<dyn ScalarSource>,
        capacity: usize,
    ) -> Result<AuxChannel, ZeroCapacity> {
        Ok(AuxChannel {
            ident,
            source,
            buffer: Arc::new(DoubleBuffer::new(capacity)?),
        })
    }

    /// Samples the channel once; scalar channels shed samples under
    /// overload.
    pub fn append(&mut self) {
        let sample = AuxSample {
            ts: time::wall_ms_now(),
            value: self.source.sample(),
        };
        let _ = self.buffer.put(sample, true);
    }

    pub fn buffer(&self) -> Arc<DoubleBuffer<AuxSample>> {
        self.buffer.clone()
    }

    pub fn ident(&self) -> u8 {
        self.ident
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimScalar;

    #[test]
    fn test_append_records_samples_in_order() {
        let mut channel = AuxChannel::open(0, Box::new(SimScalar::new()), 8).unwrap();
        channel.append();
        channel.append();

        let buffer = channel.buffer();
        buffer.swap();
        let first = buffer.pop().unwrap();
        let second = buffer.pop().unwrap();
        assert!(u64::from_be_bytes(second.value) > u64::from_be_bytes(first.value));
    }
}
