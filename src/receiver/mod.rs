//! Receivers: accumulation buffers with a smoothed gain and a rendering mode.

pub mod modules;

pub use modules::{AmbisonicReceiver, OmniReceiver, SpeakerRingReceiver};

use crate::dsp::FoaBuffer;
use crate::error::Result;
use crate::math::{Cartesian, DVec3, ZyxEuler};
use crate::scene::BoundingBox;
use std::fmt;

/// Distance below which the inverse distance law is clamped, in meters.
pub const MIN_DISTANCE: f64 = 0.1;

/// Per-path memory a receiver module keeps between blocks.
///
/// Owned by the acoustic model of the path, so that modules themselves stay
/// stateless with respect to individual paths.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PathState {
    pub(crate) weights: [f32; 4],
    pub(crate) primed: bool,
}

/// Rendering mode of a receiver.
pub trait ReceiverModule: Send + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Number of output channels.
    fn channels(&self) -> usize;

    /// Allocates internal buffers. Called once before the first block.
    fn prepare(&mut self, _block_size: usize) {}

    /// Clears internal buffers at the start of a block.
    fn clear(&mut self) {}

    /// Adds a point source block arriving from `prel` (receiver frame).
    fn add_point_source(
        &mut self,
        prel: DVec3,
        audio: &[f32],
        out: &mut [Vec<f32>],
        state: &mut PathState,
    );

    /// Adds a diffuse field block, already rotated into the receiver frame.
    fn add_diffuse_source(&mut self, audio: &FoaBuffer, out: &mut [Vec<f32>]);

    /// Finishes the block, e.g. decodes an internal bus into the outputs.
    fn post_proc(&mut self, _out: &mut [Vec<f32>]) {}
}

/// A listening point.
#[derive(Debug)]
pub struct Receiver {
    pub position: DVec3,
    pub orientation: ZyxEuler,
    pub active: bool,
    /// User gain, applied through the same ramp as mask gains
    pub gain: f64,
    pub render_point: bool,
    pub render_diffuse: bool,
    /// Render image sources
    pub render_image: bool,
    /// Render direct (order 0) paths
    pub is_direct: bool,
    pub ism_min: u32,
    pub ism_max: u32,
    /// Attenuate by the global masks of the world
    pub use_global_mask: bool,
    pub diffuse_gain: f64,
    /// Delay compensation in seconds, subtracted from every path
    pub delay_comp: f64,
    pub bounding_box: BoundingBox,
    module: Box<dyn ReceiverModule>,
    outchannels: Vec<Vec<f32>>,
    x_gain: f64,
    dx_gain: f64,
    next_gain: f64,
    ramp_len: usize,
    ramp_remaining: usize,
}

impl Receiver {
    pub fn new(module: Box<dyn ReceiverModule>) -> Self {
        Self {
            position: DVec3::ZERO,
            orientation: ZyxEuler::IDENTITY,
            active: true,
            gain: 1.0,
            render_point: true,
            render_diffuse: true,
            render_image: true,
            is_direct: true,
            ism_min: 0,
            ism_max: u32::MAX,
            use_global_mask: true,
            diffuse_gain: 1.0,
            delay_comp: 0.0,
            bounding_box: BoundingBox::default(),
            module,
            outchannels: Vec::new(),
            x_gain: 1.0,
            dx_gain: 0.0,
            next_gain: 1.0,
            ramp_len: 1,
            ramp_remaining: 0,
        }
    }

    pub fn omni() -> Self {
        Self::new(Box::new(OmniReceiver))
    }

    pub fn ambisonic() -> Self {
        Self::new(Box::new(AmbisonicReceiver))
    }

    pub fn speaker_ring(speakers: usize) -> Result<Self> {
        Ok(Self::new(Box::new(SpeakerRingReceiver::new(speakers)?)))
    }

    pub fn at(mut self, position: DVec3) -> Self {
        self.position = position;
        self
    }

    pub fn with_orientation(mut self, orientation: ZyxEuler) -> Self {
        self.orientation = orientation;
        self
    }

    pub fn with_bounding_box(mut self, bounding_box: BoundingBox) -> Self {
        self.bounding_box = bounding_box;
        self
    }

    /// Sizes the output buffers and the gain ramp. The ramp starts settled
    /// at the user gain.
    pub fn prepare(&mut self, block_size: usize, ramp_len: usize) {
        self.outchannels = vec![vec![0.0; block_size]; self.module.channels()];
        self.module.prepare(block_size);
        self.ramp_len = ramp_len.max(1);
        self.x_gain = self.gain;
        self.next_gain = self.gain;
        self.dx_gain = 0.0;
        self.ramp_remaining = 0;
        log::info!(
            "Prepared {} receiver: {} channels, {} frames",
            self.module.name(),
            self.module.channels(),
            block_size
        );
    }

    pub fn module_name(&self) -> &'static str {
        self.module.name()
    }

    pub fn channels(&self) -> usize {
        self.outchannels.len()
    }

    pub fn outputs(&self) -> &[Vec<f32>] {
        &self.outchannels
    }

    pub fn current_gain(&self) -> f64 {
        self.x_gain
    }

    /// Whether a path of the given reflection order is rendered.
    pub fn accepts_order(&self, order: u32) -> bool {
        let kind = if order == 0 {
            self.is_direct
        } else {
            self.render_image
        };
        self.active && self.render_point && kind && (self.ism_min..=self.ism_max).contains(&order)
    }

    pub fn clear_output(&mut self) {
        for ch in &mut self.outchannels {
            ch.fill(0.0);
        }
        self.module.clear();
    }

    /// Position of a source in the receiver frame, its distance, and the
    /// distance law gain including the bounding box.
    ///
    /// `physical` is gated by the bounding box, `virtual_pos` sets direction
    /// and distance.
    pub fn update_refpoint(&self, physical: DVec3, virtual_pos: DVec3) -> (DVec3, f64, f64) {
        let prel = self.orientation.unrotate(virtual_pos - self.position);
        let distance = prel.norm();
        let gain = self.bounding_box.gain(physical) / distance.max(MIN_DISTANCE);
        (prel, distance, gain)
    }

    pub fn add_point_source(&mut self, prel: DVec3, audio: &[f32], state: &mut PathState) {
        self.module
            .add_point_source(prel, audio, &mut self.outchannels, state);
    }

    pub fn add_diffuse_source(&mut self, audio: &FoaBuffer) {
        self.module.add_diffuse_source(audio, &mut self.outchannels);
    }

    /// Requests a new gain, reached linearly over the ramp length.
    pub fn set_next_gain(&mut self, gain: f64) {
        if gain == self.next_gain {
            return;
        }
        self.next_gain = gain;
        self.ramp_remaining = self.ramp_len;
        self.dx_gain = (gain - self.x_gain) / self.ramp_len as f64;
    }

    /// Scales the outputs by the ramped gain.
    pub fn apply_gain(&mut self) {
        if self.ramp_remaining == 0 {
            if self.x_gain == 1.0 {
                return;
            }
            let g = self.x_gain as f32;
            for ch in &mut self.outchannels {
                ch.iter_mut().for_each(|v| *v *= g);
            }
            return;
        }
        let frames = self.outchannels.first().map_or(0, Vec::len);
        for k in 0..frames {
            if self.ramp_remaining > 0 {
                self.x_gain += self.dx_gain;
                self.ramp_remaining -= 1;
                if self.ramp_remaining == 0 {
                    self.x_gain = self.next_gain;
                }
            }
            let g = self.x_gain as f32;
            for ch in &mut self.outchannels {
                ch[k] *= g;
            }
        }
    }

    pub fn post_proc(&mut self) {
        self.module.post_proc(&mut self.outchannels);
    }
}
