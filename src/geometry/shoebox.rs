use crate::math::{DVec3, ZyxEuler};

/// An oriented box, used for diffuse source regions, masks and bounding boxes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Shoebox {
    pub center: DVec3,
    pub size: DVec3,
    pub orientation: ZyxEuler,
}

impl Shoebox {
    pub fn new(center: DVec3, size: DVec3, orientation: ZyxEuler) -> Self {
        Self {
            center,
            size,
            orientation,
        }
    }

    /// Offset of `p` from the nearest point of the box, in the box frame.
    ///
    /// Zero for points inside the box.
    pub fn nextpoint(&self, p: DVec3) -> DVec3 {
        let local = self.orientation.unrotate(p - self.center);
        let half = self.size * 0.5;
        let clamp = |v: f64, h: f64| {
            if v.abs() <= h {
                0.0
            } else {
                v - h.copysign(v)
            }
        };
        DVec3::new(
            clamp(local.x, half.x),
            clamp(local.y, half.y),
            clamp(local.z, half.z),
        )
    }

    /// Distance from `p` to the box, zero inside.
    pub fn distance(&self, p: DVec3) -> f64 {
        self.nextpoint(p).length()
    }

    pub fn contains(&self, p: DVec3) -> bool {
        self.nextpoint(p) == DVec3::ZERO
    }

    pub fn volume(&self) -> f64 {
        self.size.x * self.size.y * self.size.z
    }

    pub fn area(&self) -> f64 {
        2.0 * (self.size.x * self.size.y + self.size.x * self.size.z + self.size.y * self.size.z)
    }
}

impl Default for Shoebox {
    fn default() -> Self {
        Self::new(DVec3::ZERO, DVec3::ONE, ZyxEuler::IDENTITY)
    }
}
