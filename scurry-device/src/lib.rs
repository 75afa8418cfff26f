//! Device adapters. Each adapter owns its double buffer and bridges one
//! physical (or simulated) device onto the producer side of the pipeline;
//! the transmit side drains the buffer through a shared handle.

pub mod aux;
pub mod camera;
pub mod microphone;
pub mod sensor;
pub mod sim;
pub mod speaker;
