pub mod buffer;
pub mod cadence;

pub use buffer::{DoubleBuffer, PutError, Ring, ZeroCapacity};
pub use cadence::Cadence;
