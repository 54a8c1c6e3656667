//! Acoustic material properties for reflectors and obstacles.
//!
//! A material reduces a surface to the three broadband coefficients used by the
//! image source renderer.

use crate::error::{AcousticsError, Result};

/// Broadband acoustic properties of a surface material.
///
/// - **Reflectivity**: pressure gain applied to a reflected path
/// - **Damping**: pole of the one-pole low-pass applied on reflection; higher
///   values darken reflections ("softer" surfaces)
/// - **Transmission**: fraction of the direct sound passing through an
///   obstacle; the rest is routed through the diffraction filter
///
/// # Example
///
/// ```
/// use petalsonic_acoustics::scene::AcousticMaterial;
///
/// let wall = AcousticMaterial::CONCRETE;
/// let custom = AcousticMaterial {
///     reflectivity: 0.8,
///     damping: 0.3,
///     transmission: 0.05,
/// };
/// assert!(custom.validate().is_ok());
/// assert!(wall.reflectivity > custom.reflectivity);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AcousticMaterial {
    /// Pressure reflection coefficient (0.0 - 1.0)
    pub reflectivity: f32,
    /// Reflection low-pass pole (0.0 - 1.0, exclusive of 1.0)
    pub damping: f32,
    /// Fraction of energy passing through the surface (0.0 - 1.0)
    pub transmission: f32,
}

impl AcousticMaterial {
    /// Ideal rigid mirror
    pub const RIGID: Self = Self {
        reflectivity: 1.0,
        damping: 0.0,
        transmission: 0.0,
    };

    /// Generic default material with moderate acoustic properties
    pub const GENERIC: Self = Self {
        reflectivity: 0.89,
        damping: 0.2,
        transmission: 0.05,
    };

    /// Brick - reflective, blocks well
    pub const BRICK: Self = Self {
        reflectivity: 0.98,
        damping: 0.04,
        transmission: 0.015,
    };

    /// Concrete - very reflective, excellent blocking
    pub const CONCRETE: Self = Self {
        reflectivity: 0.96,
        damping: 0.03,
        transmission: 0.002,
    };

    /// Carpet - absorbs mostly high frequencies
    pub const CARPET: Self = Self {
        reflectivity: 0.56,
        damping: 0.65,
        transmission: 0.005,
    };

    /// Glass - reflective with audible transmission
    pub const GLASS: Self = Self {
        reflectivity: 0.98,
        damping: 0.02,
        transmission: 0.044,
    };

    /// Plaster - moderately reflective
    pub const PLASTER: Self = Self {
        reflectivity: 0.97,
        damping: 0.05,
        transmission: 0.056,
    };

    /// Wood - moderately absorptive
    pub const WOOD: Self = Self {
        reflectivity: 0.96,
        damping: 0.1,
        transmission: 0.014,
    };

    /// Curtain - thin and soft, lets most sound through
    pub const CURTAIN: Self = Self {
        reflectivity: 0.5,
        damping: 0.7,
        transmission: 0.6,
    };

    /// Validates that all coefficients are within range.
    ///
    /// # Errors
    ///
    /// Returns [`AcousticsError::Configuration`] for reflectivity or
    /// transmission outside `[0, 1]` and damping outside `[0, 1)`.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.reflectivity) {
            return Err(AcousticsError::Configuration(format!(
                "reflectivity must be between 0.0 and 1.0, got {}",
                self.reflectivity
            )));
        }
        if !(0.0..1.0).contains(&self.damping) {
            return Err(AcousticsError::Configuration(format!(
                "damping must be in [0.0, 1.0), got {}",
                self.damping
            )));
        }
        if !(0.0..=1.0).contains(&self.transmission) {
            return Err(AcousticsError::Configuration(format!(
                "transmission must be between 0.0 and 1.0, got {}",
                self.transmission
            )));
        }
        Ok(())
    }
}

impl Default for AcousticMaterial {
    fn default() -> Self {
        Self::GENERIC
    }
}
