//! Per-path signal processing: delay lines, filters and ambisonic buffers.

pub mod ambisonic;
pub mod delay;
pub mod filter;

pub use ambisonic::FoaBuffer;
pub use delay::VariDelay;
pub use filter::{OnePole, air_absorption_coeff, air_absorption_scale};
