//! Scalar smoothing filters for cursor coordinates.
//!
//! Every filter tracks one channel; smoothing a 2-D position takes two
//! instances fed with the same timestamp (see [`AxisFilters`]). After
//! `reset()` the next update seeds the filter and comes back unchanged.

use std::collections::VecDeque;
use std::f64::consts::PI;

use crate::config::{FilterKind, SmoothingSettings};

/// Smallest time step the One-Euro filter will divide by (seconds).
pub const MIN_DT: f64 = 0.001;

/// Exponential moving average.
#[derive(Debug, Clone)]
pub struct Ema {
    alpha: f64,
    value: Option<f64>,
}

impl Ema {
    /// `alpha` is clamped to [0,1]; lower means smoother.
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha: alpha.clamp(0.0, 1.0),
            value: None,
        }
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Takes effect on the next update; history is kept.
    pub fn set_alpha(&mut self, alpha: f64) {
        self.alpha = alpha.clamp(0.0, 1.0);
    }

    pub fn update(&mut self, new_value: f64) -> f64 {
        let v = match self.value {
            None => new_value,
            // alpha*new + (1-alpha)*prev, arranged so a constant input is a fixed point
            Some(prev) => prev + self.alpha * (new_value - prev),
        };
        self.value = Some(v);
        v
    }

    pub fn reset(&mut self) {
        self.value = None;
    }
}

/// Arithmetic mean over the last `N` samples.
#[derive(Debug, Clone)]
pub struct MovingAverage {
    capacity: usize,
    window: VecDeque<f64>,
}

impl MovingAverage {
    pub fn new(window_size: usize) -> Self {
        let capacity = window_size.max(1);
        Self {
            capacity,
            window: VecDeque::with_capacity(capacity),
        }
    }

    pub fn update(&mut self, new_value: f64) -> f64 {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(new_value);
        self.window.iter().sum::<f64>() / self.window.len() as f64
    }

    pub fn reset(&mut self) {
        self.window.clear();
    }
}

/// One-Euro filter: the cutoff frequency rises with the smoothed speed of the
/// signal, so it is smooth at rest and responsive while moving.
#[derive(Debug, Clone)]
pub struct OneEuro {
    min_cutoff: f64,
    beta: f64,
    d_cutoff: f64,
    x_prev: Option<f64>,
    dx_prev: f64,
    t_prev: f64,
}

impl OneEuro {
    pub fn new(min_cutoff: f64, beta: f64, d_cutoff: f64) -> Self {
        Self {
            min_cutoff,
            beta,
            d_cutoff,
            x_prev: None,
            dx_prev: 0.0,
            t_prev: 0.0,
        }
    }

    fn smoothing_factor(dt: f64, cutoff: f64) -> f64 {
        let r = 2.0 * PI * cutoff * dt;
        r / (r + 1.0)
    }

    /// `t` is in seconds from a monotonic clock.
    pub fn update(&mut self, x: f64, t: f64) -> f64 {
        let Some(x_prev) = self.x_prev else {
            self.x_prev = Some(x);
            self.t_prev = t;
            return x;
        };

        let mut dt = t - self.t_prev;
        if dt <= 0.0 {
            dt = MIN_DT;
        }

        let dx = (x - x_prev) / dt;
        let a_d = Self::smoothing_factor(dt, self.d_cutoff);
        let dx_hat = self.dx_prev + a_d * (dx - self.dx_prev);

        let cutoff = self.min_cutoff + self.beta * dx_hat.abs();
        let a = Self::smoothing_factor(dt, cutoff);
        let x_hat = x_prev + a * (x - x_prev);

        self.x_prev = Some(x_hat);
        self.dx_prev = dx_hat;
        self.t_prev = t;
        x_hat
    }

    pub fn reset(&mut self) {
        self.x_prev = None;
        self.dx_prev = 0.0;
        self.t_prev = 0.0;
    }
}

/// Scalar Kalman filter with a constant-position model.
#[derive(Debug, Clone)]
pub struct Kalman {
    process_variance: f64,
    measurement_variance: f64,
    initial_error: f64,
    estimate: Option<f64>,
    error_estimate: f64,
}

impl Kalman {
    pub const INITIAL_ERROR: f64 = 1.0;

    pub fn new(process_variance: f64, measurement_variance: f64) -> Self {
        Self {
            process_variance,
            measurement_variance,
            initial_error: Self::INITIAL_ERROR,
            estimate: None,
            error_estimate: Self::INITIAL_ERROR,
        }
    }

    pub fn update(&mut self, measurement: f64) -> f64 {
        let Some(prediction) = self.estimate else {
            // seed; error_estimate stays at its initial value
            self.estimate = Some(measurement);
            return measurement;
        };

        let error_prediction = self.error_estimate + self.process_variance;
        let gain = error_prediction / (error_prediction + self.measurement_variance);
        let estimate = prediction + gain * (measurement - prediction);
        self.error_estimate = (1.0 - gain) * error_prediction;
        self.estimate = Some(estimate);
        estimate
    }

    pub fn error_estimate(&self) -> f64 {
        self.error_estimate
    }

    pub fn reset(&mut self) {
        self.estimate = None;
        self.error_estimate = self.initial_error;
    }
}

/// One filter of any kind, driven through a single `update(value, t)` call.
/// Filters that ignore time simply drop `t`.
#[derive(Debug, Clone)]
pub enum Filter {
    Ema(Ema),
    MovingAverage(MovingAverage),
    OneEuro(OneEuro),
    Kalman(Kalman),
}

impl Filter {
    /// `None` when smoothing is switched off.
    pub fn from_settings(s: &SmoothingSettings, alpha: f64) -> Option<Self> {
        let f = match s.kind {
            FilterKind::None => return None,
            FilterKind::Ema => Self::Ema(Ema::new(alpha)),
            FilterKind::MovingAverage => Self::MovingAverage(MovingAverage::new(s.window)),
            FilterKind::OneEuro => Self::OneEuro(OneEuro::new(s.min_cutoff, s.beta, s.d_cutoff)),
            FilterKind::Kalman => {
                Self::Kalman(Kalman::new(s.process_variance, s.measurement_variance))
            }
        };
        Some(f)
    }

    pub fn update(&mut self, value: f64, t: f64) -> f64 {
        match self {
            Self::Ema(f) => f.update(value),
            Self::MovingAverage(f) => f.update(value),
            Self::OneEuro(f) => f.update(value, t),
            Self::Kalman(f) => f.update(value),
        }
    }

    /// Only the EMA has an alpha; other kinds ignore it.
    pub fn set_alpha(&mut self, alpha: f64) {
        if let Self::Ema(f) = self {
            f.set_alpha(alpha);
        }
    }

    pub fn reset(&mut self) {
        match self {
            Self::Ema(f) => f.reset(),
            Self::MovingAverage(f) => f.reset(),
            Self::OneEuro(f) => f.reset(),
            Self::Kalman(f) => f.reset(),
        }
    }
}

/// Independent x and y channels sharing one timestamp per update.
#[derive(Debug, Clone)]
pub struct AxisFilters {
    pub x: Filter,
    pub y: Filter,
}

impl AxisFilters {
    pub fn from_settings(s: &SmoothingSettings, alpha: f64) -> Option<Self> {
        Some(Self {
            x: Filter::from_settings(s, alpha)?,
            y: Filter::from_settings(s, alpha)?,
        })
    }

    pub fn update(&mut self, pos: (f64, f64), t: f64) -> (f64, f64) {
        (self.x.update(pos.0, t), self.y.update(pos.1, t))
    }

    pub fn set_alpha(&mut self, alpha: f64) {
        self.x.set_alpha(alpha);
        self.y.set_alpha(alpha);
    }

    pub fn reset(&mut self) {
        self.x.reset();
        self.y.reset();
    }
}
