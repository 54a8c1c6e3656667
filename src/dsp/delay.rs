//! Variable fractional delay line.

use crate::error::{AcousticsError, Result};
use crate::math::make_friendly;
use std::f64::consts::PI;

/// Ring-buffer delay line read at arbitrary fractional delays.
///
/// With `order == 0` reads interpolate linearly between neighbours; otherwise a
/// Hann-windowed sinc kernel of `2 * order` taps is used. The capacity is fixed
/// at construction, so neither [`push`](Self::push) nor [`get`](Self::get)
/// allocate.
#[derive(Debug, Clone)]
pub struct VariDelay {
    buf: Vec<f32>,
    pos: usize,
    /// Samples per meter of propagation
    dist_scale: f64,
    order: usize,
}

impl VariDelay {
    /// Creates a delay line able to hold `max_delay` samples.
    ///
    /// `dist_scale` converts a distance in meters to a delay in samples
    /// (`fs / c`).
    pub fn new(max_delay: usize, dist_scale: f64, order: usize) -> Result<Self> {
        if !(dist_scale.is_finite() && dist_scale > 0.0) {
            return Err(AcousticsError::Configuration(format!(
                "invalid delay distance scale {}",
                dist_scale
            )));
        }
        Ok(Self {
            buf: vec![0.0; max_delay + 2 * order + 2],
            pos: 0,
            dist_scale,
            order,
        })
    }

    /// Largest delay, in samples, that can be read without clamping.
    pub fn max_delay(&self) -> f64 {
        (self.buf.len() - self.order - 2) as f64
    }

    pub fn order(&self) -> usize {
        self.order
    }

    #[inline]
    pub fn push(&mut self, x: f32) {
        self.pos = (self.pos + 1) % self.buf.len();
        self.buf[self.pos] = make_friendly(x);
    }

    /// Sample written `k` pushes ago; zero when `k` is out of range.
    #[inline]
    fn tap(&self, k: isize) -> f32 {
        if k < 0 || k as usize >= self.buf.len() {
            return 0.0;
        }
        let len = self.buf.len();
        self.buf[(self.pos + len - k as usize) % len]
    }

    /// Reads the line `delay` samples in the past. Zero reads the last pushed
    /// sample.
    pub fn get(&self, delay: f64) -> f32 {
        let delay = delay.clamp(0.0, self.max_delay());
        let i = delay.floor();
        let frac = delay - i;
        let i = i as isize;
        if frac == 0.0 {
            return self.tap(i);
        }
        if self.order == 0 {
            let frac = frac as f32;
            return (1.0 - frac) * self.tap(i) + frac * self.tap(i + 1);
        }
        let n = self.order as isize;
        let mut acc = 0.0f64;
        for k in (1 - n)..=n {
            let t = (i + k) as f64 - delay;
            let window = 0.5 + 0.5 * (PI * t / n as f64).cos();
            acc += self.tap(i + k) as f64 * sinc(t) * window;
        }
        acc as f32
    }

    /// Pushes `x`, then reads at the delay of a path `dist` meters long.
    #[inline]
    pub fn get_dist_push(&mut self, dist: f64, x: f32) -> f32 {
        self.push(x);
        self.get(dist * self.dist_scale)
    }

    pub fn clear(&mut self) {
        self.buf.fill(0.0);
    }
}

#[inline]
fn sinc(t: f64) -> f64 {
    if t.abs() < 1e-12 {
        1.0
    } else {
        (PI * t).sin() / (PI * t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn impulse_response(delay: &mut VariDelay, dist: f64, len: usize) -> Vec<f32> {
        (0..len)
            .map(|k| delay.get_dist_push(dist, if k == 0 { 1.0 } else { 0.0 }))
            .collect()
    }

    #[test]
    fn test_integer_delay_is_exact() {
        // 1 m per sample
        let mut d = VariDelay::new(64, 1.0, 0).unwrap();
        let out = impulse_response(&mut d, 5.0, 16);
        for (k, v) in out.iter().enumerate() {
            assert_eq!(*v, if k == 5 { 1.0 } else { 0.0 });
        }

        let mut sinc = VariDelay::new(64, 1.0, 4).unwrap();
        let out = impulse_response(&mut sinc, 7.0, 16);
        assert_eq!(out[7], 1.0);
        assert_eq!(out.iter().filter(|v| **v != 0.0).count(), 1);
    }

    #[test]
    fn test_linear_fraction() {
        let mut d = VariDelay::new(16, 1.0, 0).unwrap();
        let out = impulse_response(&mut d, 2.25, 8);
        assert!((out[2] - 0.75).abs() < 1e-6);
        assert!((out[3] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_sinc_fraction_preserves_dc() {
        let mut d = VariDelay::new(64, 1.0, 8).unwrap();
        let mut last = 0.0;
        for _ in 0..64 {
            last = d.get_dist_push(10.5, 1.0);
        }
        assert!((last - 1.0).abs() < 0.05);
    }

    #[test]
    fn test_delay_is_clamped() {
        let d = VariDelay::new(8, 1.0, 0).unwrap();
        assert_eq!(d.get(1.0e9), 0.0);
        assert!(VariDelay::new(8, 0.0, 0).is_err());
    }
}
