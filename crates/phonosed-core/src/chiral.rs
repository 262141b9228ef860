//! Relative phase between two polarization channels of a coherent SED.
//!
//! Treating each complex amplitude as a 2D vector (re, im), the three modes
//! measure how the two channels are phased:
//!
//! - `C`: wrapped phase difference folded into (−π/2, π/2]
//! - `A`: angle between the vectors, $\arccos(\hat z_1 \cdot \hat z_2)$, in [0, π]
//! - `B`: signed angle from the 2D cross product, $\arcsin(\hat z_1 \times \hat z_2)$, in [−π/2, π/2]

use std::f64::consts::{FRAC_PI_2, PI, TAU};
use std::fmt;

use ndarray::{Array2, ArrayView2, Zip};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::diagnostics::{Diagnostic, Diagnostics, Outcome};
use crate::error::{Result, SedError};

/// Squared magnitudes below this count as zero amplitude.
const MIN_NORM_SQR: f64 = 1e-18;

/// Chiral phase definition.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ChiralMode {
    #[default]
    C,
    A,
    B,
    Unknown(String),
}

impl From<&str> for ChiralMode {
    fn from(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "C" => ChiralMode::C,
            "A" => ChiralMode::A,
            "B" => ChiralMode::B,
            _ => ChiralMode::Unknown(s.to_string()),
        }
    }
}

impl From<String> for ChiralMode {
    fn from(s: String) -> Self {
        ChiralMode::from(s.as_str())
    }
}

impl From<ChiralMode> for String {
    fn from(mode: ChiralMode) -> Self {
        mode.to_string()
    }
}

impl fmt::Display for ChiralMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChiralMode::C => write!(f, "C"),
            ChiralMode::A => write!(f, "A"),
            ChiralMode::B => write!(f, "B"),
            ChiralMode::Unknown(s) => write!(f, "{}", s),
        }
    }
}

/// Element-wise chiral phase between two same-shaped (frequency, k) fields.
pub fn chiral_phase(
    z1: ArrayView2<Complex64>,
    z2: ArrayView2<Complex64>,
    mode: &ChiralMode,
) -> Result<Outcome<Array2<f64>>> {
    if z1.dim() != z2.dim() {
        return Err(SedError::ShapeMismatch {
            left: z1.shape().to_vec(),
            right: z2.shape().to_vec(),
        });
    }
    let mut diagnostics = Diagnostics::new();
    let mut out = Array2::zeros(z1.dim());

    let phase: fn(Complex64, Complex64) -> f64 = match mode {
        ChiralMode::C => folded_difference,
        ChiralMode::A => vector_angle,
        ChiralMode::B => signed_angle,
        ChiralMode::Unknown(name) => {
            diagnostics.push(Diagnostic::UnknownChiralMode(name.clone()));
            return Ok(diagnostics.finish(out));
        }
    };
    Zip::from(&mut out)
        .and(&z1)
        .and(&z2)
        .for_each(|o, &a, &b| *o = phase(a, b));
    Ok(diagnostics.finish(out))
}

fn folded_difference(a: Complex64, b: Complex64) -> f64 {
    let delta = (a.arg() - b.arg() + PI).rem_euclid(TAU) - PI;
    let folded = if delta > FRAC_PI_2 {
        PI - delta
    } else if delta < -FRAC_PI_2 {
        -PI - delta
    } else {
        delta
    };
    if folded == -FRAC_PI_2 {
        FRAC_PI_2
    } else {
        folded
    }
}

fn normalised_pair(a: Complex64, b: Complex64) -> Option<f64> {
    let (na, nb) = (a.norm_sqr(), b.norm_sqr());
    if na < MIN_NORM_SQR || nb < MIN_NORM_SQR {
        None
    } else {
        Some((na * nb).sqrt())
    }
}

fn vector_angle(a: Complex64, b: Complex64) -> f64 {
    normalised_pair(a, b).map_or(0.0, |n| ((a.re * b.re + a.im * b.im) / n).clamp(-1.0, 1.0).acos())
}

fn signed_angle(a: Complex64, b: Complex64) -> f64 {
    normalised_pair(a, b).map_or(0.0, |n| ((a.re * b.im - a.im * b.re) / n).clamp(-1.0, 1.0).asin())
}
