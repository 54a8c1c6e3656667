use crate::math::make_friendly;

/// First-order low-pass `y = a * x + (1 - a) * y`.
///
/// `a = 1` passes the input unchanged, `a -> 0` freezes the output.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OnePole {
    state: f32,
}

impl OnePole {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn process(&mut self, x: f32, a: f32) -> f32 {
        self.state = make_friendly(a * x + (1.0 - a) * self.state);
        self.state
    }

    pub fn state(&self) -> f32 {
        self.state
    }

    pub fn set_state(&mut self, state: f32) {
        self.state = make_friendly(state);
    }

    pub fn reset(&mut self) {
        self.state = 0.0;
    }
}

/// Air absorption coefficient for a path of `distance` meters.
///
/// `dscale` is `fs / (c * 7782)`; the result is the `a` of a [`OnePole`].
#[inline]
pub fn air_absorption_coeff(distance: f64, dscale: f64) -> f64 {
    (-distance * dscale).exp()
}

/// Distance scale of the air absorption filter.
pub fn air_absorption_scale(sample_rate: f64, speed_of_sound: f64) -> f64 {
    sample_rate / (speed_of_sound * 7782.0)
}
