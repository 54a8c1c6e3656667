//! Scene objects: sources, reflecting and diffracting surfaces, masks.

pub mod mask;
pub mod material;
pub mod source;
pub mod surface;

pub use mask::{BoundingBox, Mask};
pub use material::AcousticMaterial;
pub use source::{DiffuseSource, DoorShape, PointSource, SourceShape};
pub use surface::{DiffractionState, Obstacle, Reflector};

/// Raised-cosine falloff: 1 at distance 0, 0 at `falloff` and beyond.
#[inline]
pub(crate) fn raised_cosine(distance: f64, falloff: f64) -> f64 {
    if falloff <= 0.0 {
        return if distance > 0.0 { 0.0 } else { 1.0 };
    }
    0.5 + 0.5 * (std::f64::consts::PI * (distance / falloff).min(1.0)).cos()
}
