//! First-order ambisonic (B-format) buffers.
//!
//! Channels are W, X, Y, Z with SN3D weighting: a plane wave from unit
//! direction `d` is encoded as `(1, d.x, d.y, d.z)`.

use crate::math::{DMat3, DVec3};

/// One block of first-order ambisonic audio.
#[derive(Debug, Clone, PartialEq)]
pub struct FoaBuffer {
    pub w: Vec<f32>,
    pub x: Vec<f32>,
    pub y: Vec<f32>,
    pub z: Vec<f32>,
}

impl FoaBuffer {
    pub fn new(frames: usize) -> Self {
        Self {
            w: vec![0.0; frames],
            x: vec![0.0; frames],
            y: vec![0.0; frames],
            z: vec![0.0; frames],
        }
    }

    pub fn frames(&self) -> usize {
        self.w.len()
    }

    pub fn clear(&mut self) {
        self.w.fill(0.0);
        self.x.fill(0.0);
        self.y.fill(0.0);
        self.z.fill(0.0);
    }

    /// Encoding weights for a plane wave arriving from `direction`.
    pub fn encode_gains(direction: DVec3) -> [f32; 4] {
        let d = direction.normalize_or_zero();
        [1.0, d.x as f32, d.y as f32, d.z as f32]
    }

    /// Overwrites `self` with `src` whose first-order components are rotated
    /// by `m`.
    pub fn rotate_from(&mut self, src: &FoaBuffer, m: &DMat3) {
        let m = m.as_mat3();
        for k in 0..self.frames().min(src.frames()) {
            let v = m * glam::Vec3::new(src.x[k], src.y[k], src.z[k]);
            self.w[k] = src.w[k];
            self.x[k] = v.x;
            self.y[k] = v.y;
            self.z[k] = v.z;
        }
    }

    /// Adds `src` scaled sample by sample by `gain(k)`.
    pub fn add_scaled(&mut self, src: &FoaBuffer, mut gain: impl FnMut(usize) -> f32) {
        for k in 0..self.frames().min(src.frames()) {
            let g = gain(k);
            self.w[k] += g * src.w[k];
            self.x[k] += g * src.x[k];
            self.y[k] += g * src.y[k];
            self.z[k] += g * src.z[k];
        }
    }

    pub fn channels(&self) -> [&[f32]; 4] {
        [&self.w, &self.x, &self.y, &self.z]
    }

    pub fn channels_mut(&mut self) -> [&mut [f32]; 4] {
        [&mut self.w, &mut self.x, &mut self.y, &mut self.z]
    }
}
