//! Math types for the propagation core
//!
//! Positions use a right-handed frame with x pointing to the front, y to the
//! left and z up. All angles are in radians.

pub use glam::{DMat3, DQuat, DVec3};

/// Floor applied to squared norms so that normalisation never divides by zero.
pub const NORM2_FLOOR: f64 = 1e-10;

/// Cartesian helpers on top of [`DVec3`].
pub trait Cartesian: Sized {
    /// Squared norm, floored at [`NORM2_FLOOR`].
    fn norm2(&self) -> f64;
    /// Euclidean norm, floored at `sqrt(NORM2_FLOOR)`.
    fn norm(&self) -> f64;
    /// Norm of the projection onto the horizontal plane.
    fn norm_xy(&self) -> f64;
    /// Azimuth, counter-clockwise from the x axis.
    fn azim(&self) -> f64;
    /// Elevation above the horizontal plane.
    fn elev(&self) -> f64;
    /// Unit vector in the same direction, safe for zero vectors.
    fn normal(&self) -> Self;
    fn rot_x(self, a: f64) -> Self;
    fn rot_y(self, a: f64) -> Self;
    fn rot_z(self, a: f64) -> Self;
    fn is_null(&self) -> bool;
    fn has_infinity(&self) -> bool;
}

impl Cartesian for DVec3 {
    #[inline]
    fn norm2(&self) -> f64 {
        self.length_squared().max(NORM2_FLOOR)
    }

    #[inline]
    fn norm(&self) -> f64 {
        self.norm2().sqrt()
    }

    #[inline]
    fn norm_xy(&self) -> f64 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    #[inline]
    fn azim(&self) -> f64 {
        self.y.atan2(self.x)
    }

    #[inline]
    fn elev(&self) -> f64 {
        self.z.atan2(self.norm_xy())
    }

    #[inline]
    fn normal(&self) -> Self {
        *self * (1.0 / self.norm())
    }

    #[inline]
    fn rot_x(self, a: f64) -> Self {
        if a == 0.0 {
            return self;
        }
        let (s, c) = a.sin_cos();
        DVec3::new(self.x, c * self.y - s * self.z, c * self.z + s * self.y)
    }

    #[inline]
    fn rot_y(self, a: f64) -> Self {
        if a == 0.0 {
            return self;
        }
        let (s, c) = a.sin_cos();
        DVec3::new(c * self.x + s * self.z, self.y, c * self.z - s * self.x)
    }

    #[inline]
    fn rot_z(self, a: f64) -> Self {
        if a == 0.0 {
            return self;
        }
        let (s, c) = a.sin_cos();
        DVec3::new(c * self.x - s * self.y, c * self.y + s * self.x, self.z)
    }

    #[inline]
    fn is_null(&self) -> bool {
        self.x == 0.0 && self.y == 0.0 && self.z == 0.0
    }

    fn has_infinity(&self) -> bool {
        !self.is_finite()
    }
}

/// Builds a Cartesian vector from radius, azimuth and elevation.
pub fn from_sphere(r: f64, az: f64, el: f64) -> DVec3 {
    let cel = el.cos();
    DVec3::new(r * az.cos() * cel, r * az.sin() * cel, r * el.sin())
}

/// Spherical coordinates (radius, azimuth, elevation).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Spherical {
    pub r: f64,
    pub az: f64,
    pub el: f64,
}

impl Spherical {
    pub fn new(r: f64, az: f64, el: f64) -> Self {
        Self { r, az, el }
    }

    pub fn to_cartesian(&self) -> DVec3 {
        from_sphere(self.r, self.az, self.el)
    }
}

impl From<DVec3> for Spherical {
    fn from(c: DVec3) -> Self {
        let xy2 = c.x * c.x + c.y * c.y;
        Self {
            r: (xy2 + c.z * c.z).sqrt(),
            az: c.y.atan2(c.x),
            el: c.z.atan2(xy2.sqrt()),
        }
    }
}

/// How an incremental orientation change is folded into an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EulerAccumulation {
    /// Compose the rotations (quaternion product).
    #[default]
    Exact,
    /// Add the angles component by component. Only correct for single-axis
    /// deltas; kept for control surfaces that were tuned against it.
    Componentwise,
}

/// Euler angles applied in z, y, x order.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ZyxEuler {
    /// Rotation around the z axis
    pub z: f64,
    /// Rotation around the y axis
    pub y: f64,
    /// Rotation around the x axis
    pub x: f64,
}

impl ZyxEuler {
    pub const IDENTITY: Self = Self {
        z: 0.0,
        y: 0.0,
        x: 0.0,
    };

    pub const fn new(z: f64, y: f64, x: f64) -> Self {
        Self { z, y, x }
    }

    /// Forward transform: rotate around z, then y, then x.
    #[inline]
    pub fn rotate(&self, p: DVec3) -> DVec3 {
        p.rot_z(self.z).rot_y(self.y).rot_x(self.x)
    }

    /// Inverse transform: the exact reverse of [`rotate`](Self::rotate).
    #[inline]
    pub fn unrotate(&self, p: DVec3) -> DVec3 {
        p.rot_x(-self.x).rot_y(-self.y).rot_z(-self.z)
    }

    pub fn scaled(&self, s: f64) -> Self {
        Self::new(self.z * s, self.y * s, self.x * s)
    }

    /// Quaternion performing the same forward transform as [`rotate`](Self::rotate).
    pub fn to_quat(&self) -> DQuat {
        DQuat::from_rotation_x(self.x) * DQuat::from_rotation_y(self.y) * DQuat::from_rotation_z(self.z)
    }

    /// Inverse of [`to_quat`](Self::to_quat). Near the y = ±90° singularity the
    /// z angle is folded into x.
    pub fn from_quat(q: DQuat) -> Self {
        let m = DMat3::from_quat(q.normalize());
        let m02 = m.z_axis.x.clamp(-1.0, 1.0);
        let y = m02.asin();
        if m02.abs() < 1.0 - 1e-12 {
            let z = (-m.y_axis.x).atan2(m.x_axis.x);
            let x = (-m.z_axis.y).atan2(m.z_axis.z);
            Self::new(z, y, x)
        } else {
            let x = m.y_axis.z.atan2(m.y_axis.y);
            Self::new(0.0, y, x)
        }
    }

    /// Rotation matrix of the forward transform.
    pub fn to_mat3(&self) -> DMat3 {
        DMat3::from_cols(
            self.rotate(DVec3::X),
            self.rotate(DVec3::Y),
            self.rotate(DVec3::Z),
        )
    }

    /// Applies `delta` after `self`.
    pub fn compose(&self, delta: &ZyxEuler, mode: EulerAccumulation) -> Self {
        match mode {
            EulerAccumulation::Exact => Self::from_quat(delta.to_quat() * self.to_quat()),
            EulerAccumulation::Componentwise => {
                Self::new(self.z + delta.z, self.y + delta.y, self.x + delta.x)
            }
        }
    }
}

/// Flushing of values that would stall the audio thread.
pub trait FriendlyNumber: Copy {
    /// Subnormal and non-finite values become zero.
    fn friendly(self) -> Self;
    /// Like [`friendly`](Self::friendly), and magnitudes above 1e6 also become zero.
    fn friendly_limited(self) -> Self;
}

macro_rules! impl_friendly_number {
    ($t:ty) => {
        impl FriendlyNumber for $t {
            #[inline]
            fn friendly(self) -> Self {
                if !self.is_finite() || (self != 0.0 && self.abs() < <$t>::MIN_POSITIVE) {
                    0.0
                } else {
                    self
                }
            }

            #[inline]
            fn friendly_limited(self) -> Self {
                if self.abs() > 1.0e6 {
                    0.0
                } else {
                    self.friendly()
                }
            }
        }
    };
}

impl_friendly_number!(f32);
impl_friendly_number!(f64);

#[inline]
pub fn make_friendly<T: FriendlyNumber>(x: T) -> T {
    x.friendly()
}

#[inline]
pub fn make_friendly_limited<T: FriendlyNumber>(x: T) -> T {
    x.friendly_limited()
}
