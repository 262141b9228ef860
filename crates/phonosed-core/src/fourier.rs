//! Discrete Fourier transforms along the time axis.
//!
//! Frequencies follow the standard sample-frequency ordering
//! `[0, 1, ..., ceil(n/2)-1, -floor(n/2), ..., -1] / (n dt)`. With the
//! timestep in picoseconds the frequencies are in THz.

use std::fmt;
use std::sync::Arc;

use ndarray::{Array1, Array3, Axis};
use num_complex::Complex64;
use rustfft::{Fft, FftPlanner};

use crate::error::{Result, SedError};

/// Sample frequencies (THz) of an `n`-point DFT with spacing `dt_ps`.
pub fn fft_frequencies(n: usize, dt_ps: f64) -> Array1<f64> {
    if n == 0 {
        return Array1::zeros(0);
    }
    let scale = 1.0 / (n as f64 * dt_ps);
    let n_pos = (n + 1) / 2;
    Array1::from_shape_fn(n, |i| {
        if i < n_pos {
            i as f64 * scale
        } else {
            (i as f64 - n as f64) * scale
        }
    })
}

/// Forward and inverse FFT plans for a fixed number of time samples.
#[derive(Clone)]
pub struct TimeFourier {
    len: usize,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
}

impl fmt::Debug for TimeFourier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimeFourier").field("len", &self.len).finish()
    }
}

impl TimeFourier {
    pub fn new(len: usize) -> Self {
        let mut planner = FftPlanner::<f64>::new();
        // zero-length transforms short-circuit before the plan is used
        let plan_len = len.max(1);
        Self {
            len,
            forward: planner.plan_fft_forward(plan_len),
            inverse: planner.plan_fft_inverse(plan_len),
        }
    }

    /// Forward DFT along axis 0, divided by the number of samples.
    pub fn forward_normalised(&self, series: &Array3<Complex64>) -> Result<Array3<Complex64>> {
        let scale = if self.len > 0 { 1.0 / self.len as f64 } else { 1.0 };
        self.transform_axis0(series, &self.forward, scale)
    }

    /// Inverse DFT along axis 0, divided by the number of samples so that
    /// `inverse(forward(x)) == x`.
    pub fn inverse(&self, spectrum: &Array3<Complex64>) -> Result<Array3<Complex64>> {
        let scale = if self.len > 0 { 1.0 / self.len as f64 } else { 1.0 };
        self.transform_axis0(spectrum, &self.inverse, scale)
    }

    /// Unnormalised forward DFT along axis 0.
    pub fn forward(&self, series: &Array3<Complex64>) -> Result<Array3<Complex64>> {
        self.transform_axis0(series, &self.forward, 1.0)
    }

    fn transform_axis0(
        &self,
        input: &Array3<Complex64>,
        plan: &Arc<dyn Fft<f64>>,
        scale: f64,
    ) -> Result<Array3<Complex64>> {
        let (n_t, n_a, n_c) = input.dim();
        if n_t != self.len {
            return Err(SedError::ShapeMismatch {
                left: vec![n_t, n_a, n_c],
                right: vec![self.len, n_a, n_c],
            });
        }
        let mut output = input.clone();
        if self.len == 0 {
            return Ok(output);
        }
        let mut buffer = vec![Complex64::new(0.0, 0.0); self.len];
        let mut scratch = vec![Complex64::new(0.0, 0.0); plan.get_inplace_scratch_len()];
        for mut lane in output.lanes_mut(Axis(0)) {
            for (b, v) in buffer.iter_mut().zip(lane.iter()) {
                *b = *v;
            }
            plan.process_with_scratch(&mut buffer, &mut scratch);
            for (v, b) in lane.iter_mut().zip(buffer.iter()) {
                *v = *b * scale;
            }
        }
        Ok(output)
    }
}
