//! Per source/receiver propagation paths.
//!
//! An [`AcousticModel`] renders one point source (primary or image) into one
//! receiver: delay, distance gain, air absorption and obstacle diffraction.
//! A [`DiffuseAcousticModel`] does the same for a diffuse field.

use crate::dsp::{FoaBuffer, OnePole, VariDelay, air_absorption_coeff, air_absorption_scale};
use crate::error::{AcousticsError, Result};
use crate::math::{DMat3, DVec3};
use crate::mirror::SurfaceChain;
use crate::receiver::{PathState, Receiver};
use crate::scene::{DiffractionState, DiffuseSource, Obstacle};
use crate::world::{DiffuseSourceId, ObstacleId, ReceiverId, SourceId};

/// Identity of a rendered path, used to keep per-path state across blocks.
///
/// Models are ordered by receiver, then primary source, then surface chain,
/// which fixes the order of accumulation into each receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PathKey {
    pub receiver: ReceiverId,
    pub primary: SourceId,
    pub chain: SurfaceChain,
}

impl PathKey {
    pub fn order(&self) -> u32 {
        self.chain.order()
    }
}

/// Where a model reads its audio from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathSource {
    /// Index into the primary source list
    Primary(usize),
    /// Index into the image source arena
    Image(usize),
}

/// Physical constants shared by all models of a world.
#[derive(Debug, Clone, Copy)]
pub struct PropagationConstants {
    pub speed_of_sound: f64,
    pub sample_rate: f64,
    /// Air absorption distance scale
    pub dscale: f64,
}

impl PropagationConstants {
    pub fn new(speed_of_sound: f64, sample_rate: f64) -> Self {
        Self {
            speed_of_sound,
            sample_rate,
            dscale: air_absorption_scale(sample_rate, speed_of_sound),
        }
    }
}

/// Geometry of a path for the current block.
#[derive(Debug, Clone, Copy)]
pub struct PathInput<'a> {
    /// Position the receiver hears the source from
    pub effective: DVec3,
    /// Gain of the source towards this receiver (door window, edge fade)
    pub source_gain: f64,
    /// Position gated by the receiver bounding box
    pub physical: DVec3,
    pub max_distance: f64,
    pub audio: &'a [f32],
}

/// Length in samples of a delay line covering `max_distance` meters.
///
/// # Errors
///
/// Returns [`AcousticsError::Configuration`] unless `max_distance` is finite
/// and positive.
pub fn delay_samples(max_distance: f64, constants: &PropagationConstants) -> Result<usize> {
    if !(max_distance.is_finite() && max_distance > 0.0) {
        return Err(AcousticsError::Configuration(format!(
            "max_distance must be finite and positive, got {}",
            max_distance
        )));
    }
    let dist_scale = constants.sample_rate / constants.speed_of_sound;
    Ok((max_distance * dist_scale).ceil() as usize + 1)
}

/// Values a model moves to over one block.
#[derive(Debug, Clone, Copy)]
struct BlockTargets {
    prel: DVec3,
    effective: DVec3,
    distance: f64,
    gain: f64,
    air_coeff: f64,
}

/// Propagation of one point source to one receiver.
#[derive(Debug)]
pub struct AcousticModel {
    key: PathKey,
    pub(crate) source: PathSource,
    pub(crate) receiver: usize,
    /// Rendering a last block towards zero gain before removal
    pub(crate) releasing: bool,
    delayline: VariDelay,
    air: OnePole,
    pub(crate) diffraction: Vec<DiffractionState>,
    path_state: PathState,
    audio: Vec<f32>,
    distance: f64,
    gain: f64,
    air_coeff: f64,
    prel: DVec3,
    source_position: DVec3,
    effective_position: DVec3,
    first: bool,
}

impl AcousticModel {
    /// Creates the model with a delay line long enough for `max_distance`.
    ///
    /// # Errors
    ///
    /// Returns [`AcousticsError::Configuration`] for a non-finite or
    /// non-positive `max_distance`, or an invalid interpolation setup.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        key: PathKey,
        source: PathSource,
        receiver: usize,
        constants: &PropagationConstants,
        block_size: usize,
        max_distance: f64,
        sinc_order: usize,
        obstacles: usize,
    ) -> Result<Self> {
        let dist_scale = constants.sample_rate / constants.speed_of_sound;
        let max_delay = delay_samples(max_distance, constants)?;
        Ok(Self {
            key,
            source,
            receiver,
            releasing: false,
            delayline: VariDelay::new(max_delay, dist_scale, sinc_order)?,
            air: OnePole::new(),
            diffraction: vec![DiffractionState::default(); obstacles],
            path_state: PathState::default(),
            audio: vec![0.0; block_size],
            distance: 0.0,
            gain: 0.0,
            air_coeff: 1.0,
            prel: DVec3::ZERO,
            source_position: DVec3::ZERO,
            effective_position: DVec3::ZERO,
            first: true,
        })
    }

    pub fn key(&self) -> &PathKey {
        &self.key
    }

    pub fn distance(&self) -> f64 {
        self.distance
    }

    pub fn gain(&self) -> f64 {
        self.gain
    }

    /// Effective source position used in the last block.
    pub fn effective_position(&self) -> DVec3 {
        self.effective_position
    }

    pub fn is_releasing(&self) -> bool {
        self.releasing
    }

    /// Whether the delay line can serve a path with these settings.
    pub(crate) fn fits(&self, max_delay: usize, sinc_order: usize) -> bool {
        self.delayline.order() == sinc_order && self.delayline.max_delay() >= max_delay as f64
    }

    /// Rebinds a pooled model to a new path, clearing all signal state.
    pub(crate) fn reset(&mut self, key: PathKey, source: PathSource, receiver: usize, obstacles: usize) {
        self.key = key;
        self.source = source;
        self.receiver = receiver;
        self.releasing = false;
        self.delayline.clear();
        self.air.reset();
        self.diffraction.clear();
        self.diffraction.resize(obstacles, DiffractionState::default());
        self.path_state = PathState::default();
        self.audio.fill(0.0);
        self.distance = 0.0;
        self.gain = 0.0;
        self.air_coeff = 1.0;
        self.first = true;
    }

    pub(crate) fn insert_obstacle(&mut self, index: usize) {
        if index <= self.diffraction.len() {
            self.diffraction.insert(index, DiffractionState::default());
        }
    }

    pub(crate) fn remove_obstacle(&mut self, index: usize) {
        if index < self.diffraction.len() {
            self.diffraction.remove(index);
        }
    }

    /// Renders one block into `receiver`. Returns whether the path was
    /// audible.
    ///
    /// Distance, gain and air absorption move linearly from their previous
    /// values to the values of this block; the first block starts at its
    /// targets.
    pub fn process(
        &mut self,
        input: &PathInput<'_>,
        constants: &PropagationConstants,
        receiver: &mut Receiver,
        obstacles: &[(ObstacleId, Obstacle)],
    ) -> bool {
        let (prel, distance, gain) = receiver.update_refpoint(input.physical, input.effective);
        let distance = (distance - constants.speed_of_sound * receiver.delay_comp).max(0.0);
        let audible = distance <= input.max_distance;
        let gain = if audible { gain * input.source_gain } else { 0.0 };
        let targets = BlockTargets {
            prel,
            effective: input.effective,
            distance,
            gain,
            air_coeff: air_absorption_coeff(distance, constants.dscale),
        };
        self.render(targets, Some(input.audio), constants, receiver, obstacles);
        gain != 0.0
    }

    /// Renders the last block of a path that stopped qualifying.
    ///
    /// The geometry is frozen, no new input enters the delay line and the
    /// gain ramps to zero, so whatever is still in flight fades out.
    pub fn release(
        &mut self,
        constants: &PropagationConstants,
        receiver: &mut Receiver,
        obstacles: &[(ObstacleId, Obstacle)],
    ) {
        let targets = BlockTargets {
            prel: self.prel,
            effective: self.source_position,
            distance: self.distance,
            gain: 0.0,
            air_coeff: self.air_coeff,
        };
        self.render(targets, None, constants, receiver, obstacles);
    }

    fn render(
        &mut self,
        targets: BlockTargets,
        input: Option<&[f32]>,
        constants: &PropagationConstants,
        receiver: &mut Receiver,
        obstacles: &[(ObstacleId, Obstacle)],
    ) {
        self.prel = targets.prel;
        self.source_position = targets.effective;
        self.effective_position = targets.effective;
        if self.first {
            self.distance = targets.distance;
            self.gain = targets.gain;
            self.air_coeff = targets.air_coeff;
            self.first = false;
        }

        let inv = 1.0 / self.audio.len().max(1) as f64;
        let d_distance = (targets.distance - self.distance) * inv;
        let d_gain = (targets.gain - self.gain) * inv;
        let d_air = (targets.air_coeff - self.air_coeff) * inv;
        for (k, out) in self.audio.iter_mut().enumerate() {
            let x = input.and_then(|a| a.get(k)).copied().unwrap_or(0.0);
            self.distance += d_distance;
            self.gain += d_gain;
            self.air_coeff += d_air;
            let y = self.delayline.get_dist_push(self.distance, x);
            *out = self.air.process(y, self.air_coeff as f32) * self.gain as f32;
        }
        self.distance = targets.distance;
        self.gain = targets.gain;
        self.air_coeff = targets.air_coeff;

        let mut prel = targets.prel;
        let mut effective = targets.effective;
        for ((_, obstacle), state) in obstacles.iter().zip(&mut self.diffraction) {
            if !obstacle.active {
                continue;
            }
            effective = obstacle.diffract(
                state,
                effective,
                receiver.position,
                &mut self.audio,
                constants.speed_of_sound,
                constants.sample_rate,
            );
        }
        if effective != targets.effective {
            prel = receiver.orientation.unrotate(effective - receiver.position);
            self.effective_position = effective;
        }
        receiver.add_point_source(prel, &self.audio, &mut self.path_state);
    }
}

/// Key of a diffuse path, ordered by receiver then source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DiffusePathKey {
    pub receiver: ReceiverId,
    pub source: DiffuseSourceId,
}

/// Rendering of one diffuse source into one receiver.
#[derive(Debug)]
pub struct DiffuseAcousticModel {
    key: DiffusePathKey,
    pub(crate) source: usize,
    pub(crate) receiver: usize,
    pub(crate) releasing: bool,
    audio: FoaBuffer,
    gain: f64,
    first: bool,
}

impl DiffuseAcousticModel {
    pub fn new(key: DiffusePathKey, source: usize, receiver: usize, block_size: usize) -> Self {
        Self {
            key,
            source,
            receiver,
            releasing: false,
            audio: FoaBuffer::new(block_size),
            gain: 0.0,
            first: true,
        }
    }

    pub(crate) fn reset(&mut self, key: DiffusePathKey, source: usize, receiver: usize) {
        self.key = key;
        self.source = source;
        self.receiver = receiver;
        self.releasing = false;
        self.gain = 0.0;
        self.first = true;
    }

    pub fn key(&self) -> &DiffusePathKey {
        &self.key
    }

    pub fn gain(&self) -> f64 {
        self.gain
    }

    pub fn is_releasing(&self) -> bool {
        self.releasing
    }

    /// Rotates the field into the receiver frame, applies the region falloff
    /// and adds it to `receiver`. Returns whether the field was audible.
    ///
    /// A releasing model ramps to zero over the block.
    pub fn process(&mut self, source: &DiffuseSource, receiver: &mut Receiver) -> bool {
        let gain = if source.active && !self.releasing {
            source.gain_at(receiver.position)
        } else {
            0.0
        };
        if self.first {
            self.gain = gain;
            self.first = false;
        }
        let rotation: DMat3 =
            receiver.orientation.to_mat3().transpose() * source.region.orientation.to_mat3();
        self.audio.rotate_from(source.audio(), &rotation);

        let n = self.audio.frames();
        let g0 = self.gain;
        let dg = (gain - g0) / n.max(1) as f64;
        let scale = receiver.diffuse_gain;
        for ch in self.audio.channels_mut() {
            for (k, v) in ch.iter_mut().enumerate() {
                *v *= ((g0 + dg * (k + 1) as f64) * scale) as f32;
            }
        }
        self.gain = gain;
        receiver.add_diffuse_source(&self.audio);
        gain != 0.0
    }
}
