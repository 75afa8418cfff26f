//! Single-producer / single-consumer buffering: a condition-protected ring
//! and the two-ring swap buffer built on top of it.

mod double;
mod ring;

pub use double::{DoubleBuffer, Drain};
pub use ring::{PutError, Ring, ZeroCapacity};
