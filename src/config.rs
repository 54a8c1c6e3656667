//! Configuration for the acoustic world

use crate::error::{AcousticsError, Result};
use crate::math::EulerAccumulation;
use crate::mirror::MAX_MIRROR_ORDER;

/// Configuration descriptor for an [`AcousticWorld`](crate::AcousticWorld).
///
/// All values are fixed for the lifetime of the world; the block size and
/// sample rate size every delay line and output buffer at construction time.
#[derive(Debug, Clone)]
pub struct AcousticWorldDesc {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of frames processed per call to `process()`
    pub block_size: usize,
    /// Speed of sound in m/s
    pub speed_of_sound: f64,
    /// Maximum reflection order of the image source model (0 = direct paths only)
    pub mirror_order: u32,
    /// Use the historical receiver-independent cut point when validating reflections
    pub legacy_cut_point: bool,
    /// Upper bound on the number of image source candidates; extra candidates are dropped
    pub max_images: usize,
    /// Longest path any source may render, in meters. Source render
    /// distances are clamped to it, which bounds every delay line.
    pub max_path_distance: f64,
    /// Length of the receiver gain ramp, in blocks
    pub gain_ramp_blocks: u32,
    /// Capacity of the control-plane command queue
    pub command_capacity: usize,
    /// How incremental orientation changes are accumulated
    pub euler_accumulation: EulerAccumulation,
}

impl Default for AcousticWorldDesc {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            block_size: 1024,
            speed_of_sound: 340.0,
            mirror_order: 1,
            legacy_cut_point: false,
            max_images: 4096,
            max_path_distance: 3700.0,
            gain_ramp_blocks: 1,
            command_capacity: 256,
            euler_accumulation: EulerAccumulation::Exact,
        }
    }
}

impl AcousticWorldDesc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = rate;
        self
    }

    pub fn block_size(mut self, size: usize) -> Self {
        self.block_size = size;
        self
    }

    pub fn speed_of_sound(mut self, c: f64) -> Self {
        self.speed_of_sound = c;
        self
    }

    pub fn mirror_order(mut self, order: u32) -> Self {
        self.mirror_order = order;
        self
    }

    pub fn legacy_cut_point(mut self, legacy: bool) -> Self {
        self.legacy_cut_point = legacy;
        self
    }

    pub fn max_images(mut self, max: usize) -> Self {
        self.max_images = max;
        self
    }

    pub fn max_path_distance(mut self, meters: f64) -> Self {
        self.max_path_distance = meters;
        self
    }

    pub fn gain_ramp_blocks(mut self, blocks: u32) -> Self {
        self.gain_ramp_blocks = blocks;
        self
    }

    pub fn command_capacity(mut self, capacity: usize) -> Self {
        self.command_capacity = capacity;
        self
    }

    pub fn euler_accumulation(mut self, mode: EulerAccumulation) -> Self {
        self.euler_accumulation = mode;
        self
    }

    /// Duration of one block in seconds.
    pub fn block_duration(&self) -> f64 {
        self.block_size as f64 / self.sample_rate as f64
    }

    /// Checks that the descriptor can be used to build a world.
    ///
    /// # Errors
    ///
    /// Returns [`AcousticsError::Configuration`] naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(AcousticsError::Configuration(
                "sample_rate must be greater than zero".into(),
            ));
        }
        if self.block_size == 0 {
            return Err(AcousticsError::Configuration(
                "block_size must be greater than zero".into(),
            ));
        }
        if !(self.speed_of_sound.is_finite() && self.speed_of_sound > 0.0) {
            return Err(AcousticsError::Configuration(format!(
                "speed_of_sound must be positive, got {}",
                self.speed_of_sound
            )));
        }
        if self.mirror_order as usize > MAX_MIRROR_ORDER {
            return Err(AcousticsError::Configuration(format!(
                "mirror_order {} exceeds the supported maximum of {}",
                self.mirror_order, MAX_MIRROR_ORDER
            )));
        }
        if !(self.max_path_distance.is_finite() && self.max_path_distance > 0.0) {
            return Err(AcousticsError::Configuration(format!(
                "max_path_distance must be finite and positive, got {}",
                self.max_path_distance
            )));
        }
        if self.gain_ramp_blocks == 0 {
            return Err(AcousticsError::Configuration(
                "gain_ramp_blocks must be at least one block".into(),
            ));
        }
        if self.command_capacity == 0 {
            return Err(AcousticsError::Configuration(
                "command_capacity must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}
