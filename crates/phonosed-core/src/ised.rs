//! Inverse SED: real-space animation of a single (k, ω) mode.
//!
//! The complex SED amplitude $\Phi_\alpha(k, \omega)$ of each atom group is
//! turned back into a travelling wave over one period,
//!
//! $$u_{j\alpha}(t) = \mathrm{Re}\left[\Phi_\alpha\, e^{i\phi_t - i k (\bar{\mathbf{r}}_j \cdot \hat{\mathbf{k}})}\right],
//!   \quad \phi_t = 2\pi t / N$$
//!
//! and the contributions of all groups are added.

use std::f64::consts::TAU;

use ndarray::{Array2, Array3, Axis};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::diagnostics::{Diagnostic, Diagnostics, Outcome};
use crate::error::{Result, SedError};
use crate::kspace::DirectionSpec;
use crate::sed::{AtomGroup, AtomSelector, SedCalculator, SummationMode};
use crate::types::{nearest_index, SedData, SedResult, SimulationCell};

/// Peak amplitudes and standard deviations at or below this are treated as zero.
pub const RESCALE_TOLERANCE: f64 = 1e-9;

/// How the reconstructed displacement field is scaled.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RescaleRepr", into = "RescaleRepr")]
pub enum Rescale {
    /// Multiply by a constant.
    Factor(f64),
    /// Normalise to unit peak, then scale to the mean displacement spread of
    /// the reconstructed atoms.
    Auto,
}

impl Default for Rescale {
    fn default() -> Self {
        Rescale::Factor(1.0)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RescaleRepr {
    Factor(f64),
    Text(String),
}

impl TryFrom<RescaleRepr> for Rescale {
    type Error = String;

    fn try_from(repr: RescaleRepr) -> std::result::Result<Self, Self::Error> {
        match repr {
            RescaleRepr::Factor(f) => Ok(Rescale::Factor(f)),
            RescaleRepr::Text(s) if s.trim().eq_ignore_ascii_case("auto") => Ok(Rescale::Auto),
            RescaleRepr::Text(s) => s
                .trim()
                .parse::<f64>()
                .map(Rescale::Factor)
                .map_err(|_| format!("rescale must be a number or \"auto\", got '{}'", s)),
        }
    }
}

impl From<Rescale> for RescaleRepr {
    fn from(r: Rescale) -> Self {
        match r {
            Rescale::Factor(f) => RescaleRepr::Factor(f),
            Rescale::Auto => RescaleRepr::Text("auto".into()),
        }
    }
}

fn default_n_k() -> usize {
    100
}

fn default_bz_coverage() -> f64 {
    1.0
}

fn default_n_frames() -> usize {
    100
}

/// Parameters of one iSED reconstruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsedRequest {
    pub direction: DirectionSpec,
    /// Target |k| (Å⁻¹).
    pub k_target: f64,
    /// Target frequency (THz).
    pub w_target: f64,
    /// Characteristic length used as the k-path lattice parameter (Å).
    pub characteristic_length: f64,
    #[serde(default = "default_n_k")]
    pub n_k: usize,
    #[serde(default = "default_bz_coverage")]
    pub bz_coverage: f64,
    #[serde(default, flatten)]
    pub selector: AtomSelector,
    #[serde(default)]
    pub rescale: Rescale,
    #[serde(default = "default_n_frames")]
    pub n_frames: usize,
}

impl IsedRequest {
    pub fn new(
        direction: impl Into<DirectionSpec>,
        k_target: f64,
        w_target: f64,
        characteristic_length: f64,
    ) -> Self {
        Self {
            direction: direction.into(),
            k_target,
            w_target,
            characteristic_length,
            n_k: default_n_k(),
            bz_coverage: default_bz_coverage(),
            selector: AtomSelector::default(),
            rescale: Rescale::default(),
            n_frames: default_n_frames(),
        }
    }
}

/// A reconstructed mode animation.
#[derive(Debug, Clone)]
pub struct IsedResult {
    /// Displacements from the mean positions, shape (n_frames, atoms, 3).
    pub displacements: Array3<f64>,
    /// Mean positions plus displacements.
    pub positions: Array3<f64>,
    pub types: Vec<u32>,
    pub cell: SimulationCell,
    pub k_index: usize,
    pub k_matched: f64,
    pub w_index: usize,
    pub w_matched: f64,
    /// Group-summed intensity along the reconstruction k-path.
    pub spectrum: SedResult,
    /// (k, ω) of the reconstructed mode, for highlighting on the spectrum.
    pub marker: (f64, f64),
}

/// Reconstruct the motion of the mode nearest (k_target, w_target).
pub fn reconstruct(calc: &SedCalculator, request: &IsedRequest) -> Result<Outcome<IsedResult>> {
    let traj = calc.trajectory();
    if traj.n_frames() == 0 {
        return Err(SedError::InvalidTrajectory(
            "iSED requires at least one trajectory frame".into(),
        ));
    }
    let mut diagnostics = Diagnostics::new();
    let unit = request.direction.unit_vector()?;

    let path = calc.k_path(
        &request.direction,
        request.bz_coverage,
        request.n_k,
        Some(request.characteristic_length),
    )?;
    diagnostics.extend(path.diagnostics);
    let kpoints = path.value;
    let k_index = kpoints
        .nearest_magnitude_index(request.k_target)
        .ok_or(SedError::InvalidKPointCount(0))?;
    let k_matched = kpoints.magnitudes[k_index];
    log::info!(
        "iSED: target k = {:.4} -> matched k = {:.4} Å⁻¹ (index {})",
        request.k_target,
        k_matched,
        k_index
    );

    let groups = request
        .selector
        .resolve(traj.types(), SummationMode::Incoherent, &mut diagnostics)?;

    let n_atoms = traj.n_atoms();
    let n_out = request.n_frames;
    let mean = calc.mean_positions();
    let projected: Vec<f64> = mean
        .rows()
        .into_iter()
        .map(|r| r[0] * unit.x + r[1] * unit.y + r[2] * unit.z)
        .collect();
    let phases: Vec<f64> = (0..n_out).map(|t| TAU * t as f64 / n_out as f64).collect();
    let original = traj.displacements();

    let frequencies = calc.frequencies();
    let mut wiggles = Array3::<f64>::zeros((n_out, n_atoms, 3));
    let mut intensity = Array2::<f64>::zeros((frequencies.len(), kpoints.len()));
    let mut w_match = (0, 0.0);
    let mut spread_sum = 0.0;
    let mut spread_atoms = 0;

    for (g, group) in groups.iter().enumerate() {
        log::info!("iSED group {}/{}: {} atoms", g + 1, groups.len(), group.len());
        let sed = calc.calculate_groups(
            &kpoints,
            std::slice::from_ref(group),
            SummationMode::Coherent,
            kpoints.len(),
        )?;
        let amplitudes = match sed.data() {
            SedData::Coherent(a) => a,
            SedData::Incoherent(_) => return Err(SedError::IncoherentInput),
        };

        intensity += &sed.intensity();

        let w_index = nearest_index(sed.frequencies().iter().copied(), request.w_target)
            .ok_or_else(|| SedError::InvalidTrajectory("empty frequency axis".into()))?;
        w_match = (w_index, sed.frequencies()[w_index]);
        log::info!(
            "iSED group {}: target ω = {:.3} -> matched ω = {:.3} THz (index {})",
            g + 1,
            request.w_target,
            w_match.1,
            w_index
        );

        for axis in 0..3 {
            let amp = amplitudes[[w_index, k_index, axis]];
            for &atom in group.indices() {
                let spatial = k_matched * projected[atom];
                for (t, &phi) in phases.iter().enumerate() {
                    wiggles[[t, atom, axis]] += (amp * Complex64::from_polar(1.0, phi - spatial)).re;
                }
            }
        }

        if !group.is_empty() {
            let values = original.select(Axis(1), group.indices());
            spread_sum += values.std(0.0) * group.len() as f64;
            spread_atoms += group.len();
        }
    }

    let reconstructed = AtomGroup::union(&groups);
    let scale_atoms = |wiggles: &mut Array3<f64>, factor: f64| {
        for &atom in reconstructed.indices() {
            wiggles.index_axis_mut(Axis(1), atom).mapv_inplace(|x| x * factor);
        }
    };
    match request.rescale {
        Rescale::Factor(f) => {
            scale_atoms(&mut wiggles, f);
            log::info!("iSED: rescaled displacements by {}", f);
        }
        Rescale::Auto => {
            let mut peak = 0.0_f64;
            for &atom in reconstructed.indices() {
                for x in wiggles.index_axis(Axis(1), atom).iter() {
                    peak = peak.max(x.abs());
                }
            }
            if peak > RESCALE_TOLERANCE {
                let spread = if spread_atoms > 0 {
                    spread_sum / spread_atoms as f64
                } else {
                    0.0
                };
                let factor = if spread > RESCALE_TOLERANCE { spread / peak } else { 1.0 / peak };
                scale_atoms(&mut wiggles, factor);
                log::info!(
                    "iSED: auto-rescaled; peak amplitude {:.3e}, mean displacement spread {:.3e}",
                    peak,
                    spread
                );
            } else {
                diagnostics.push(Diagnostic::RescaleSkipped { peak });
            }
        }
    }

    let positions = &wiggles + &mean.view().insert_axis(Axis(0));
    let spectrum = SedResult::new(SedData::Incoherent(intensity), frequencies, kpoints)?;

    Ok(diagnostics.finish(IsedResult {
        displacements: wiggles,
        positions,
        types: traj.types().to_vec(),
        cell: traj.cell().clone(),
        k_index,
        k_matched,
        w_index: w_match.0,
        w_matched: w_match.1,
        spectrum,
        marker: (k_matched, w_match.1),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rescale_deserialises_number_or_auto() {
        #[derive(Deserialize)]
        struct Holder {
            rescale: Rescale,
        }
        let h: Holder = serde_json::from_str(r#"{"rescale": "Auto"}"#).unwrap();
        assert_eq!(h.rescale, Rescale::Auto);
        let h: Holder = serde_json::from_str(r#"{"rescale": 2.5}"#).unwrap();
        assert_eq!(h.rescale, Rescale::Factor(2.5));
        assert!(serde_json::from_str::<Holder>(r#"{"rescale": "loud"}"#).is_err());
    }

    #[test]
    fn test_request_defaults() {
        let req: IsedRequest = serde_json::from_str(
            r#"{"direction": "x", "k_target": 0.5, "w_target": 2.0,
                "characteristic_length": 4.0, "atom_types": [1, 2]}"#,
        )
        .unwrap();
        assert_eq!(req.n_k, 100);
        assert_eq!(req.n_frames, 100);
        assert_eq!(req.rescale, Rescale::Factor(1.0));
        assert_eq!(req.selector, AtomSelector::types(vec![1, 2]));
    }
}
