use super::raised_cosine;
use crate::geometry::Shoebox;
use crate::math::DVec3;

/// Region gating which source positions a receiver renders.
///
/// Sources outside the box are faded out over `falloff` meters; with a
/// falloff of zero they are cut hard.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub region: Shoebox,
    pub falloff: f64,
    pub active: bool,
}

impl BoundingBox {
    pub fn new(region: Shoebox, falloff: f64) -> Self {
        Self {
            region,
            falloff,
            active: true,
        }
    }

    pub fn gain(&self, p: DVec3) -> f64 {
        if !self.active {
            return 1.0;
        }
        raised_cosine(self.region.distance(p), self.falloff)
    }
}

impl Default for BoundingBox {
    /// An inactive box, letting everything through.
    fn default() -> Self {
        Self {
            region: Shoebox::default(),
            falloff: 1.0,
            active: false,
        }
    }
}

/// Global mask attenuating receivers by their own position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mask {
    pub region: Shoebox,
    pub falloff: f64,
    /// Attenuate inside the region instead of outside
    pub mask_inner: bool,
    pub active: bool,
}

impl Mask {
    pub fn new(region: Shoebox, falloff: f64) -> Self {
        Self {
            region,
            falloff,
            mask_inner: false,
            active: true,
        }
    }

    pub fn inner(mut self) -> Self {
        self.mask_inner = true;
        self
    }

    pub fn gain(&self, p: DVec3) -> f64 {
        let g = raised_cosine(self.region.distance(p), self.falloff);
        if self.mask_inner { 1.0 - g } else { g }
    }
}
