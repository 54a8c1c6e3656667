//! Primary point sources and diffuse sound fields.

use super::raised_cosine;
use crate::dsp::FoaBuffer;
use crate::error::Result;
use crate::geometry::{Polygon, Shoebox};
use crate::math::{DVec3, ZyxEuler};

/// Default render distance of a point source, in meters.
pub const DEFAULT_MAX_DISTANCE: f64 = 3700.0;

/// Geometry of a door-shaped source.
///
/// The face is defined in the source frame and follows the source pose. A
/// receiver hears the door from the nearest point of its face, pushed back
/// behind the face by `distance`, and fades out laterally over `falloff`
/// meters once it leaves the region in front of the opening.
#[derive(Debug, Clone)]
pub struct DoorShape {
    pub face: Polygon,
    /// Virtual distance behind the face, in meters
    pub distance: f64,
    /// Width of the lateral raised-cosine window, in meters
    pub falloff: f64,
    /// Use the square root of the window (equal power)
    pub wnd_sqrt: bool,
}

impl DoorShape {
    pub fn new(face: Polygon) -> Self {
        Self {
            face,
            distance: 1.0,
            falloff: 1.0,
            wnd_sqrt: false,
        }
    }

    /// Effective position seen from `p_rec` and the door gain.
    pub fn effective_position(&self, p_rec: DVec3) -> (DVec3, f64) {
        let near = self.face.nearest(p_rec);
        let pos = near.point - self.face.normal() * self.distance;
        if !self.face.is_infront(p_rec) {
            return (pos, 0.0);
        }
        let lateral = (self.face.nearest_on_plane(p_rec) - near.point).length();
        let mut gain = raised_cosine(lateral, self.falloff);
        if self.wnd_sqrt {
            gain = gain.sqrt();
        }
        (pos, gain)
    }
}

/// How a point source radiates.
#[derive(Debug, Clone, Default)]
pub enum SourceShape {
    /// Ideal point at the source position
    #[default]
    Point,
    /// Opening whose effective position depends on the receiver
    Door(DoorShape),
}

/// A primary sound emitter.
///
/// The audio buffer holds one block and is written by the caller before each
/// call to `AcousticWorld::process`.
#[derive(Debug, Clone)]
pub struct PointSource {
    pub position: DVec3,
    pub orientation: ZyxEuler,
    pub active: bool,
    /// Render the direct path. Image sources are rendered either way.
    pub direct: bool,
    /// Paths longer than this are not rendered. Clamped to the world's
    /// `max_path_distance`.
    pub max_distance: f64,
    /// Fractional delay interpolation order, 0 for linear
    pub sinc_order: usize,
    pub shape: SourceShape,
    pub(crate) audio: Vec<f32>,
    rms: f32,
}

impl PointSource {
    pub fn new(position: DVec3) -> Self {
        Self {
            position,
            orientation: ZyxEuler::IDENTITY,
            active: true,
            direct: true,
            max_distance: DEFAULT_MAX_DISTANCE,
            sinc_order: 0,
            shape: SourceShape::Point,
            audio: Vec::new(),
            rms: 0.0,
        }
    }

    /// Door source with a `width` x `height` opening facing the local +x axis.
    pub fn door(position: DVec3, width: f64, height: f64) -> Result<Self> {
        let mut source = Self::new(position);
        source.shape = SourceShape::Door(DoorShape::new(Polygon::rectangle(width, height)?));
        source.preprocess();
        Ok(source)
    }

    pub fn with_orientation(mut self, orientation: ZyxEuler) -> Self {
        self.orientation = orientation;
        self.preprocess();
        self
    }

    pub fn with_max_distance(mut self, max_distance: f64) -> Self {
        self.max_distance = max_distance;
        self
    }

    pub fn with_sinc_order(mut self, order: usize) -> Self {
        self.sinc_order = order;
        self
    }

    /// Source that is only heard through its reflections.
    pub fn without_direct_path(mut self) -> Self {
        self.direct = false;
        self
    }

    /// Follows the source pose with any attached geometry and meters the
    /// current block.
    pub(crate) fn preprocess(&mut self) {
        if let SourceShape::Door(door) = &mut self.shape {
            door.face.apply_rot_loc(self.position, self.orientation);
        }
        self.rms = rms(&self.audio);
    }

    /// RMS level of the block seen by the last `AcousticWorld::process`.
    pub fn rms_level(&self) -> f32 {
        self.rms
    }

    pub fn physical_position(&self) -> DVec3 {
        self.position
    }

    /// Position a receiver at `p_rec` hears this source from, and a gain.
    pub fn effective_position(&self, p_rec: DVec3) -> (DVec3, f64) {
        match &self.shape {
            SourceShape::Point => (self.position, 1.0),
            SourceShape::Door(door) => door.effective_position(p_rec),
        }
    }

    pub fn audio(&self) -> &[f32] {
        &self.audio
    }

    pub fn audio_mut(&mut self) -> &mut [f32] {
        &mut self.audio
    }
}

/// A first-order ambisonic sound field filling a box.
#[derive(Debug, Clone)]
pub struct DiffuseSource {
    /// Region and orientation of the field
    pub region: Shoebox,
    /// Distance over which the field fades out around the region
    pub falloff: f64,
    pub active: bool,
    pub(crate) audio: FoaBuffer,
    rms: f32,
}

impl DiffuseSource {
    pub fn new(region: Shoebox, falloff: f64) -> Self {
        Self {
            region,
            falloff,
            active: true,
            audio: FoaBuffer::new(0),
            rms: 0.0,
        }
    }

    /// Meters the omnidirectional channel of the current block.
    pub(crate) fn preprocess(&mut self) {
        self.rms = rms(&self.audio.w);
    }

    /// RMS level of the W channel seen by the last `AcousticWorld::process`.
    pub fn rms_level(&self) -> f32 {
        self.rms
    }

    /// Gain of the field at `p`.
    pub fn gain_at(&self, p: DVec3) -> f64 {
        raised_cosine(self.region.distance(p), self.falloff)
    }

    pub fn audio(&self) -> &FoaBuffer {
        &self.audio
    }

    pub fn audio_mut(&mut self) -> &mut FoaBuffer {
        &mut self.audio
    }
}

fn rms(block: &[f32]) -> f32 {
    if block.is_empty() {
        return 0.0;
    }
    let sum: f64 = block.iter().map(|x| f64::from(*x) * f64::from(*x)).sum();
    (sum / block.len() as f64).sqrt() as f32
}
