//! Receiver rendering modes.

use super::{PathState, ReceiverModule};
use crate::dsp::FoaBuffer;
use crate::error::{AcousticsError, Result};
use crate::math::DVec3;
use std::f64::consts::TAU;

/// Encodes `audio` from `prel` with weights interpolated across the block.
fn add_encoded(prel: DVec3, audio: &[f32], out: [&mut [f32]; 4], state: &mut PathState) {
    let target = FoaBuffer::encode_gains(prel);
    if !state.primed {
        state.weights = target;
        state.primed = true;
    }
    let n = audio.len().max(1) as f32;
    for (ch, dst) in out.into_iter().enumerate() {
        let w0 = state.weights[ch];
        let dw = (target[ch] - w0) / n;
        for (k, (o, x)) in dst.iter_mut().zip(audio).enumerate() {
            *o += (w0 + dw * (k + 1) as f32) * *x;
        }
    }
    state.weights = target;
}

/// Single pressure channel.
#[derive(Debug, Default)]
pub struct OmniReceiver;

impl ReceiverModule for OmniReceiver {
    fn name(&self) -> &'static str {
        "omni"
    }

    fn channels(&self) -> usize {
        1
    }

    fn add_point_source(
        &mut self,
        _prel: DVec3,
        audio: &[f32],
        out: &mut [Vec<f32>],
        _state: &mut PathState,
    ) {
        for (o, x) in out[0].iter_mut().zip(audio) {
            *o += *x;
        }
    }

    fn add_diffuse_source(&mut self, audio: &FoaBuffer, out: &mut [Vec<f32>]) {
        for (o, w) in out[0].iter_mut().zip(&audio.w) {
            *o += *w;
        }
    }
}

/// First-order ambisonic output (W, X, Y, Z).
#[derive(Debug, Default)]
pub struct AmbisonicReceiver;

impl ReceiverModule for AmbisonicReceiver {
    fn name(&self) -> &'static str {
        "foa"
    }

    fn channels(&self) -> usize {
        4
    }

    fn add_point_source(
        &mut self,
        prel: DVec3,
        audio: &[f32],
        out: &mut [Vec<f32>],
        state: &mut PathState,
    ) {
        let [w, x, y, z] = out else {
            return;
        };
        add_encoded(
            prel,
            audio,
            [w.as_mut_slice(), x.as_mut_slice(), y.as_mut_slice(), z.as_mut_slice()],
            state,
        );
    }

    fn add_diffuse_source(&mut self, audio: &FoaBuffer, out: &mut [Vec<f32>]) {
        for (dst, src) in out.iter_mut().zip(audio.channels()) {
            for (o, x) in dst.iter_mut().zip(src) {
                *o += *x;
            }
        }
    }
}

/// Horizontal loudspeaker ring fed by an internal first-order bus.
///
/// Speakers are spaced evenly, the first one straight ahead, counting
/// counter-clockwise. The bus is decoded in [`post_proc`](ReceiverModule::post_proc)
/// with a basic (velocity) decoder.
#[derive(Debug)]
pub struct SpeakerRingReceiver {
    azimuths: Vec<f64>,
    bus: FoaBuffer,
}

impl SpeakerRingReceiver {
    /// # Errors
    ///
    /// Returns [`AcousticsError::Receiver`] for rings of fewer than three
    /// speakers, which cannot reproduce a horizontal field.
    pub fn new(speakers: usize) -> Result<Self> {
        if speakers < 3 {
            return Err(AcousticsError::Receiver(format!(
                "a speaker ring needs at least 3 speakers, got {}",
                speakers
            )));
        }
        Ok(Self {
            azimuths: (0..speakers)
                .map(|k| TAU * k as f64 / speakers as f64)
                .collect(),
            bus: FoaBuffer::new(0),
        })
    }

    pub fn azimuths(&self) -> &[f64] {
        &self.azimuths
    }
}

impl ReceiverModule for SpeakerRingReceiver {
    fn name(&self) -> &'static str {
        "speaker_ring"
    }

    fn channels(&self) -> usize {
        self.azimuths.len()
    }

    fn prepare(&mut self, block_size: usize) {
        self.bus = FoaBuffer::new(block_size);
    }

    fn clear(&mut self) {
        self.bus.clear();
    }

    fn add_point_source(
        &mut self,
        prel: DVec3,
        audio: &[f32],
        _out: &mut [Vec<f32>],
        state: &mut PathState,
    ) {
        add_encoded(prel, audio, self.bus.channels_mut(), state);
    }

    fn add_diffuse_source(&mut self, audio: &FoaBuffer, _out: &mut [Vec<f32>]) {
        self.bus.add_scaled(audio, |_| 1.0);
    }

    fn post_proc(&mut self, out: &mut [Vec<f32>]) {
        let n = self.azimuths.len() as f32;
        for (dst, az) in out.iter_mut().zip(&self.azimuths) {
            let cx = 2.0 * az.cos() as f32 / n;
            let cy = 2.0 * az.sin() as f32 / n;
            for (k, o) in dst.iter_mut().enumerate() {
                *o += self.bus.w[k] / n + cx * self.bus.x[k] + cy * self.bus.y[k];
            }
        }
    }
}
