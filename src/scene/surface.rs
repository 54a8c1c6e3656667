//! Reflecting and diffracting surfaces.

use super::material::AcousticMaterial;
use crate::error::Result;
use crate::geometry::Polygon;
use crate::math::{Cartesian, DVec3, make_friendly};
use std::f64::consts::PI;

/// A reflecting face used by the image source model.
#[derive(Debug, Clone)]
pub struct Reflector {
    pub face: Polygon,
    /// Pressure gain of a reflection
    pub reflectivity: f32,
    /// Pole of the reflection low-pass
    pub damping: f32,
    /// Render reflections whose cut point misses the face, faded by distance
    pub edge_reflection: bool,
    pub active: bool,
}

impl Reflector {
    pub fn new(face: Polygon) -> Self {
        Self {
            face,
            reflectivity: 1.0,
            damping: 0.0,
            edge_reflection: true,
            active: true,
        }
    }

    /// Applies the reflection coefficients of `material`.
    pub fn with_material(mut self, material: AcousticMaterial) -> Result<Self> {
        material.validate()?;
        self.reflectivity = material.reflectivity;
        self.damping = material.damping;
        Ok(self)
    }

    pub fn with_edge_reflection(mut self, enabled: bool) -> Self {
        self.edge_reflection = enabled;
        self
    }
}

/// A face that shadows direct paths crossing it.
#[derive(Debug, Clone)]
pub struct Obstacle {
    pub face: Polygon,
    /// Fraction of the unfiltered signal passing through the face
    pub transmission: f32,
    pub active: bool,
}

impl Obstacle {
    pub fn new(face: Polygon) -> Self {
        Self {
            face,
            transmission: 0.0,
            active: true,
        }
    }

    pub fn with_material(mut self, material: AcousticMaterial) -> Result<Self> {
        material.validate()?;
        self.transmission = material.transmission;
        Ok(self)
    }

    /// Filters `audio` for the path `p_src -> p_rec` and returns the source
    /// position as heard around the nearest edge.
    pub fn diffract(
        &self,
        state: &mut DiffractionState,
        p_src: DVec3,
        p_rec: DVec3,
        audio: &mut [f32],
        c: f64,
        fs: f64,
    ) -> DVec3 {
        state.process(&self.face, p_src, p_rec, audio, c, fs, 1.0 - self.transmission)
    }
}

/// Filter memory of one diffraction path.
///
/// The coefficient `a1` is ramped over each block towards the value of the
/// current geometry, so moving in and out of the shadow does not click.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DiffractionState {
    pub a1: f64,
    pub s1: f32,
    pub s2: f32,
}

impl DiffractionState {
    /// Two cascaded one-pole low-passes with a dry/wet mix.
    ///
    /// When the straight path from `p_src` to `p_rec` crosses `face`, the
    /// cutoff follows the detour around the nearest edge: the larger the
    /// detour, the darker the result. Otherwise the filter opens fully and
    /// `p_src` is returned unchanged.
    #[allow(clippy::too_many_arguments)]
    pub fn process(
        &mut self,
        face: &Polygon,
        p_src: DVec3,
        p_rec: DVec3,
        audio: &mut [f32],
        c: f64,
        fs: f64,
        drywet: f32,
    ) -> DVec3 {
        let (target, position) = match face.intersection(p_src, p_rec) {
            Some((p_is, w)) if w > 0.0 && w < 1.0 && face.contains_projection(p_is) => {
                let (p_edge, _) = face.nearest_on_boundary(p_is);
                let r = (p_is - p_edge).length().min(face.aperture());
                let dir_in = (p_edge - p_src).normal();
                let dir_out = (p_rec - p_edge).normal();
                let detour = (r * (1.0 - dir_in.dot(dir_out))).max(1e-9);
                let f = 0.5 * c / detour;
                let a = (-PI * f / fs).exp();
                let position = p_edge - dir_out * (p_src - p_edge).length();
                (a, position)
            }
            _ => (0.0, p_src),
        };
        if audio.is_empty() {
            self.a1 = target;
            return position;
        }
        let da = (target - self.a1) / audio.len() as f64;
        let dry = 1.0 - drywet;
        for x in audio.iter_mut() {
            self.a1 += da;
            let a = self.a1 as f32;
            self.s1 = make_friendly((1.0 - a) * *x + a * self.s1);
            self.s2 = make_friendly((1.0 - a) * self.s1 + a * self.s2);
            *x = dry * *x + drywet * self.s2;
        }
        self.a1 = target;
        position
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::ZyxEuler;

    /// 2 x 2 m obstacle in the plane x = 2, centered on the x axis.
    fn screen() -> Obstacle {
        let mut face = Polygon::rectangle(2.0, 2.0).unwrap();
        face.apply_rot_loc(DVec3::new(2.0, 1.0, -1.0), ZyxEuler::new(PI, 0.0, 0.0));
        Obstacle::new(face)
    }

    #[test]
    fn test_clear_path_is_transparent() {
        let o = screen();
        let mut state = DiffractionState::default();
        let mut audio = vec![0.25f32; 64];
        let src = DVec3::new(1.0, 0.0, 0.0);
        let p = o.diffract(&mut state, src, DVec3::new(-3.0, 0.0, 0.0), &mut audio, 340.0, 48000.0);
        assert_eq!(p, src);
        assert!(audio.iter().all(|x| (*x - 0.25).abs() < 1e-6));
    }

    #[test]
    fn test_shadowed_path_is_low_passed() {
        let o = screen();
        let mut state = DiffractionState::default();
        let src = DVec3::new(4.0, 0.0, 0.0);
        let rec = DVec3::new(0.0, 0.0, 0.0);
        // alternating signal is close to Nyquist
        let mut audio: Vec<f32> = (0..256).map(|k| if k % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let p = o.diffract(&mut state, src, rec, &mut audio, 340.0, 48000.0);
        assert!(state.a1 > 0.0 && state.a1 < 1.0);
        let tail: f32 = audio[192..].iter().map(|x| x.abs()).sum::<f32>() / 64.0;
        assert!(tail < 0.5);
        // heard around the edge, same path length to the edge
        assert!((p - rec).length() > (src - rec).length() - 1e-9);
    }

    #[test]
    fn test_transmission_keeps_dry_part() {
        let mut o = screen();
        o.transmission = 1.0;
        let mut state = DiffractionState::default();
        let mut audio: Vec<f32> = (0..32).map(|k| if k % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let reference = audio.clone();
        o.diffract(&mut state, DVec3::new(4.0, 0.0, 0.0), DVec3::ZERO, &mut audio, 340.0, 48000.0);
        assert_eq!(audio, reference);
    }

    #[test]
    fn test_reflector_material() {
        let face = Polygon::rectangle(1.0, 1.0).unwrap();
        let r = Reflector::new(face).with_material(AcousticMaterial::CARPET).unwrap();
        assert_eq!(r.reflectivity, AcousticMaterial::CARPET.reflectivity);
        assert_eq!(r.damping, AcousticMaterial::CARPET.damping);
    }
}
