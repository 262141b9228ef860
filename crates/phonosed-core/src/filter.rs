//! Gaussian band-pass filtering of per-atom time series.

use ndarray::{Array3, Zip};
use num_complex::Complex64;

use crate::diagnostics::{Diagnostic, Diagnostics, Outcome};
use crate::error::{Result, SedError};
use crate::fourier::{fft_frequencies, TimeFourier};

/// Filter widths and RMS values at or below this are negligible.
const MIN_SCALE: f64 = 1e-14;

/// Keep the frequency content of `data` (frames, atoms, 3) near the band
/// [w_min, w_max] (THz).
///
/// A Gaussian window centred on the band with σ = (w_max − w_min)/6 weights
/// every Fourier component; the window is applied on the signed frequency
/// axis and the real part of the inverse transform is returned.
pub fn band_filter(
    data: &Array3<f64>,
    dt_ps: f64,
    w_min: f64,
    w_max: f64,
) -> Result<Outcome<Array3<f64>>> {
    if !(dt_ps > 0.0 && dt_ps.is_finite()) {
        return Err(SedError::InvalidTimestep(dt_ps));
    }
    let mut diagnostics = Diagnostics::new();
    let sigma = if w_max > w_min { (w_max - w_min) / 6.0 } else { 0.0 };
    if sigma < MIN_SCALE {
        diagnostics.push(Diagnostic::FilterWidthNegligible { sigma });
        return Ok(diagnostics.finish(data.clone()));
    }

    let n_t = data.dim().0;
    let center = 0.5 * (w_min + w_max);
    log::info!(
        "Applying Gaussian filter: center = {:.2} THz, sigma = {:.2} THz",
        center,
        sigma
    );

    let window = fft_frequencies(n_t, dt_ps).mapv(|f| (-0.5 * ((f - center) / sigma).powi(2)).exp());
    let fourier = TimeFourier::new(n_t);
    let mut spectrum = fourier.forward(&data.mapv(|x| Complex64::new(x, 0.0)))?;
    for (mut plane, &w) in spectrum.outer_iter_mut().zip(window.iter()) {
        plane.mapv_inplace(|z| z * w);
    }
    let filtered = fourier.inverse(&spectrum)?.mapv(|z| z.re);
    Ok(diagnostics.finish(filtered))
}

/// Scale `data` so its root-mean-square equals `target`.
///
/// Data whose RMS is negligible is returned unchanged.
pub fn rescale_rms(data: &Array3<f64>, target: f64) -> Array3<f64> {
    let rms = data.mapv(|x| x * x).mean().map_or(0.0, f64::sqrt);
    if rms <= MIN_SCALE {
        log::warn!("RMS {:.3e} too small to rescale", rms);
        return data.clone();
    }
    let factor = target / rms;
    let mut out = data.clone();
    Zip::from(&mut out).for_each(|x| *x *= factor);
    out
}
