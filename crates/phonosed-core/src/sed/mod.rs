//! Spectral energy density calculation.
//!
//! The SED at wavevector **k** and frequency ω is obtained by projecting the
//! per-atom displacement or velocity onto the plane wave $e^{i\mathbf{k}\cdot\bar{\mathbf{r}}}$
//! and Fourier transforming the projection along time:
//!
//! $$\Phi_\alpha(\mathbf{k}, \omega) = \frac{1}{N_t} \sum_t e^{-i\omega t}
//!   \sum_j q_{j\alpha}(t)\, e^{i \mathbf{k} \cdot \bar{\mathbf{r}}_j}$$
//!
//! Coherent summation keeps the complex amplitude per polarization.
//! Incoherent summation adds $\sum_\alpha |\Phi_\alpha|^2$ of independently
//! projected atom groups.

pub mod grouping;
pub mod projector;

use std::fmt;
use std::str::FromStr;

use ndarray::{s, Array1, Array2, Array3, Axis};
use serde::{Deserialize, Serialize};

pub use grouping::{AtomGroup, AtomSelector, GroupSpec};
pub use projector::SpaceTimeProjector;

use crate::diagnostics::{Diagnostic, Diagnostics, Outcome};
use crate::error::{Result, SedError};
use crate::fourier::{fft_frequencies, TimeFourier};
use crate::kspace::{self, DirectionSpec, KPlane, KPoints};
use crate::lattice::LatticeGeometry;
use crate::types::{Quantity, SedData, SedResult, Trajectory};

/// How atom groups are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummationMode {
    /// One projection over the union of all groups; complex result.
    #[default]
    Coherent,
    /// Sum of per-group intensities; real result.
    Incoherent,
}

impl FromStr for SummationMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "coherent" => Ok(SummationMode::Coherent),
            "incoherent" => Ok(SummationMode::Incoherent),
            other => Err(format!("unknown summation mode '{}'", other)),
        }
    }
}

impl fmt::Display for SummationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SummationMode::Coherent => write!(f, "coherent"),
            SummationMode::Incoherent => write!(f, "incoherent"),
        }
    }
}

/// One contiguous block of k columns.
struct SedChunk {
    start: usize,
    data: SedData,
}

/// Computes SEDs of one trajectory.
///
/// The lattice, mean positions and FFT plans are derived once at
/// construction and reused for every calculation.
#[derive(Debug)]
pub struct SedCalculator<'a> {
    trajectory: &'a Trajectory,
    lattice: LatticeGeometry,
    quantity: Quantity,
    mean_positions: Array2<f64>,
    fourier: TimeFourier,
}

impl<'a> SedCalculator<'a> {
    /// Prepare a calculator for a trajectory whose cell is an
    /// (nx × ny × nz) supercell.
    pub fn new(
        trajectory: &'a Trajectory,
        nx: usize,
        ny: usize,
        nz: usize,
        quantity: Quantity,
    ) -> Result<Self> {
        let lattice = LatticeGeometry::new(trajectory.cell(), nx, ny, nz)?;
        log::info!(
            "SED calculator: {} frames, {} atoms, dt = {} ps, quantity = {:?}",
            trajectory.n_frames(),
            trajectory.n_atoms(),
            trajectory.dt_ps(),
            quantity
        );
        Ok(Self {
            trajectory,
            lattice,
            quantity,
            mean_positions: trajectory.mean_positions(),
            fourier: TimeFourier::new(trajectory.n_frames()),
        })
    }

    pub fn trajectory(&self) -> &Trajectory {
        self.trajectory
    }

    pub fn lattice(&self) -> &LatticeGeometry {
        &self.lattice
    }

    pub fn quantity(&self) -> Quantity {
        self.quantity
    }

    /// Time-averaged atom positions, shape (atoms, 3).
    pub fn mean_positions(&self) -> &Array2<f64> {
        &self.mean_positions
    }

    /// Frequency axis (THz) of every result from this calculator.
    pub fn frequencies(&self) -> Array1<f64> {
        fft_frequencies(self.trajectory.n_frames(), self.trajectory.dt_ps())
    }

    /// A k-path through this calculator's reciprocal lattice.
    pub fn k_path(
        &self,
        direction: &DirectionSpec,
        bz_coverage: f64,
        n_k: usize,
        lattice_parameter: Option<f64>,
    ) -> Result<Outcome<KPoints>> {
        kspace::k_path(&self.lattice, direction, bz_coverage, n_k, lattice_parameter)
    }

    pub fn k_grid(
        &self,
        plane: KPlane,
        range_a: (f64, f64),
        range_b: (f64, f64),
        n_a: usize,
        n_b: usize,
        fixed_value: f64,
    ) -> Result<KPoints> {
        kspace::k_grid(plane, range_a, range_b, n_a, n_b, fixed_value)
    }

    /// Compute the SED over `kpoints`.
    ///
    /// # Arguments
    /// * `kpoints` - k-vectors from a path, a grid, or supplied directly.
    /// * `selector` - Which atoms to include and how to group them.
    /// * `mode` - Coherent or incoherent group summation.
    /// * `k_chunk_size` - Number of k-vectors projected at once.
    pub fn calculate(
        &self,
        kpoints: &KPoints,
        selector: &AtomSelector,
        mode: SummationMode,
        k_chunk_size: usize,
    ) -> Result<Outcome<SedResult>> {
        let mut diagnostics = Diagnostics::new();
        let n_t = self.trajectory.n_frames();
        let n_atoms = self.trajectory.n_atoms();
        let n_k = kpoints.len();

        if kpoints.vectors.ncols() != 3 {
            return Err(SedError::ShapeMismatch {
                left: vec![n_k, kpoints.vectors.ncols()],
                right: vec![n_k, 3],
            });
        }
        if n_k == 0 {
            diagnostics.push(Diagnostic::EmptyKPoints);
        }
        if n_t == 0 || n_atoms == 0 {
            diagnostics.push(Diagnostic::EmptyTrajectory {
                n_frames: n_t,
                n_atoms,
            });
            let result = SedResult::new(
                SedData::Coherent(Array3::zeros((n_t, n_k, 3))),
                self.frequencies(),
                kpoints.clone(),
            )?;
            return Ok(diagnostics.finish(result));
        }

        let groups = selector.resolve(self.trajectory.types(), mode, &mut diagnostics)?;
        let result = self.calculate_groups(kpoints, &groups, mode, k_chunk_size)?;
        Ok(diagnostics.finish(result))
    }

    /// Compute the SED for already-resolved, non-empty atom groups.
    pub(crate) fn calculate_groups(
        &self,
        kpoints: &KPoints,
        groups: &[AtomGroup],
        mode: SummationMode,
        k_chunk_size: usize,
    ) -> Result<SedResult> {
        let n_k = kpoints.len();
        let coherent = mode == SummationMode::Coherent || groups.len() <= 1;
        let merged;
        let groups = if coherent && groups.len() > 1 {
            merged = [AtomGroup::union(groups)];
            &merged[..]
        } else {
            groups
        };

        let chunk_size = if n_k == 0 {
            1
        } else {
            k_chunk_size.clamp(1, n_k)
        };
        log::debug!(
            "Projecting {} k-vectors in chunks of {} over {} group(s), {}",
            n_k,
            chunk_size,
            groups.len(),
            if coherent { "coherent" } else { "incoherent" }
        );

        let chunks = (0..n_k)
            .step_by(chunk_size)
            .map(|start| {
                let end = (start + chunk_size).min(n_k);
                log::debug!("k chunk {}..{}", start, end);
                self.project_chunk(kpoints, start, end, groups, coherent)
            })
            .collect::<Result<Vec<SedChunk>>>()?;

        let data = reduce_chunks(chunks, self.trajectory.n_frames(), n_k, coherent)?;
        SedResult::new(data, self.frequencies(), kpoints.clone())
    }

    fn project_chunk(
        &self,
        kpoints: &KPoints,
        start: usize,
        end: usize,
        groups: &[AtomGroup],
        coherent: bool,
    ) -> Result<SedChunk> {
        let k_view = kpoints.vectors.slice(s![start..end, ..]);
        let projector = SpaceTimeProjector::new(self.trajectory, &self.mean_positions, self.quantity);

        let data = if coherent {
            let amplitude = projector.project(&groups[0], k_view);
            SedData::Coherent(self.fourier.forward_normalised(&amplitude)?)
        } else {
            let mut intensity = Array2::zeros((self.trajectory.n_frames(), end - start));
            for group in groups {
                let spectrum = self.fourier.forward_normalised(&projector.project(group, k_view))?;
                intensity += &spectrum.mapv(|z| z.norm_sqr()).sum_axis(Axis(2));
            }
            SedData::Incoherent(intensity)
        };
        Ok(SedChunk { start, data })
    }
}

/// Concatenate chunk slices along k into one array.
fn reduce_chunks(chunks: Vec<SedChunk>, n_t: usize, n_k: usize, coherent: bool) -> Result<SedData> {
    let mut data = if coherent {
        SedData::Coherent(Array3::zeros((n_t, n_k, 3)))
    } else {
        SedData::Incoherent(Array2::zeros((n_t, n_k)))
    };
    let mut covered = 0;
    for chunk in chunks {
        if chunk.start != covered {
            return Err(SedError::InvalidResult(format!(
                "k chunk starts at {} but {} columns are assembled",
                chunk.start, covered
            )));
        }
        let width = chunk.data.n_k();
        let cols = chunk.start..chunk.start + width;
        match (&mut data, chunk.data) {
            (SedData::Coherent(full), SedData::Coherent(part)) => {
                full.slice_mut(s![.., cols, ..]).assign(&part);
            }
            (SedData::Incoherent(full), SedData::Incoherent(part)) => {
                full.slice_mut(s![.., cols]).assign(&part);
            }
            _ => {
                return Err(SedError::InvalidResult(
                    "k chunks mix coherent and incoherent data".into(),
                ))
            }
        }
        covered += width;
    }
    if covered != n_k {
        return Err(SedError::InvalidResult(format!(
            "k chunks cover {} of {} columns",
            covered, n_k
        )));
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SimulationCell;
    use approx::assert_abs_diff_eq;

    fn chain_trajectory(n_t: usize, n_atoms: usize) -> Trajectory {
        let spacing = 2.0;
        let positions = Array3::from_shape_fn((n_t, n_atoms, 3), |(t, a, c)| {
            if c == 0 {
                a as f64 * spacing + 0.05 * (0.7 * t as f64 + a as f64).sin()
            } else {
                0.0
            }
        });
        let velocities = Array3::from_shape_fn((n_t, n_atoms, 3), |(t, a, c)| {
            ((t * 3 + a * 5 + c) as f64 * 0.37).cos()
        });
        let types = (0..n_atoms).map(|a| (a % 2) as u32 + 1).collect();
        let cell = SimulationCell::orthorhombic(spacing * n_atoms as f64, 10.0, 10.0);
        Trajectory::new(positions, velocities, types, cell, 0.01).unwrap()
    }

    #[test]
    fn test_zero_frames_gives_empty_result() {
        let traj = Trajectory::new(
            Array3::zeros((0, 2, 3)),
            Array3::zeros((0, 2, 3)),
            vec![1, 1],
            SimulationCell::cubic(5.0),
            1.0,
        )
        .unwrap();
        let calc = SedCalculator::new(&traj, 1, 1, 1, Quantity::Velocity).unwrap();
        let kp = calc.k_path(&"x".into(), 1.0, 4, None).unwrap().into_value();
        let out = calc
            .calculate(&kp, &AtomSelector::all(), SummationMode::Coherent, 8)
            .unwrap();
        assert!(out.has(|d| matches!(d, Diagnostic::EmptyTrajectory { n_frames: 0, .. })));
        let result = out.value;
        assert!(result.is_complex());
        assert_eq!(result.frequencies().len(), 0);
        assert_eq!(result.intensity().dim(), (0, 4));
    }

    #[test]
    fn test_zero_atoms_keeps_frequency_axis() {
        let traj = Trajectory::new(
            Array3::zeros((6, 0, 3)),
            Array3::zeros((6, 0, 3)),
            vec![],
            SimulationCell::cubic(5.0),
            0.5,
        )
        .unwrap();
        let calc = SedCalculator::new(&traj, 1, 1, 1, Quantity::Velocity).unwrap();
        let kp = calc.k_path(&"x".into(), 1.0, 3, None).unwrap().into_value();
        let out = calc
            .calculate(&kp, &AtomSelector::indices(vec![4]), SummationMode::Incoherent, 8)
            .unwrap();
        assert!(out.has(|d| matches!(d, Diagnostic::EmptyTrajectory { n_atoms: 0, .. })));
        assert_eq!(out.value.frequencies().len(), 6);
        assert!(out.value.intensity().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_empty_kpoints() {
        let traj = chain_trajectory(8, 4);
        let calc = SedCalculator::new(&traj, 4, 1, 1, Quantity::Velocity).unwrap();
        let kp = KPoints::from_vectors(Array2::zeros((0, 3)));
        let out = calc
            .calculate(&kp, &AtomSelector::all(), SummationMode::Coherent, 0)
            .unwrap();
        assert!(out.has(|d| *d == Diagnostic::EmptyKPoints));
        assert_eq!(out.value.intensity().dim(), (8, 0));
    }

    #[test]
    fn test_grid_shape_must_cover_kpoints() {
        let traj = chain_trajectory(8, 4);
        let calc = SedCalculator::new(&traj, 4, 1, 1, Quantity::Velocity).unwrap();
        let mut kp = KPoints::from_vectors(Array2::from_elem((3, 3), 0.2));
        kp.grid_shape = Some((2, 2));
        for mode in [SummationMode::Coherent, SummationMode::Incoherent] {
            let err = calc
                .calculate(&kp, &AtomSelector::types(vec![1, 2]), mode, 2)
                .unwrap_err();
            assert!(matches!(err, SedError::InvalidResult(_)));
        }
    }

    #[test]
    fn test_chunking_is_invisible() {
        let traj = chain_trajectory(10, 6);
        let calc = SedCalculator::new(&traj, 6, 1, 1, Quantity::Displacement).unwrap();
        let kp = calc.k_path(&"x".into(), 1.0, 9, None).unwrap().into_value();
        let selector = AtomSelector::types(vec![1, 2]);

        for mode in [SummationMode::Coherent, SummationMode::Incoherent] {
            let reference = calc.calculate(&kp, &selector, mode, 9).unwrap().value.intensity();
            for chunk in [1, 4, 100] {
                let other = calc.calculate(&kp, &selector, mode, chunk).unwrap().value.intensity();
                for (a, b) in reference.iter().zip(other.iter()) {
                    assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
                }
            }
        }
    }

    #[test]
    fn test_single_group_incoherent_uses_coherent_path() {
        let traj = chain_trajectory(8, 4);
        let calc = SedCalculator::new(&traj, 4, 1, 1, Quantity::Velocity).unwrap();
        let kp = calc.k_path(&"x".into(), 1.0, 3, None).unwrap().into_value();
        let result = calc
            .calculate(&kp, &AtomSelector::all(), SummationMode::Incoherent, 2)
            .unwrap()
            .into_value();
        assert!(result.is_complex());
    }

    #[test]
    fn test_summation_mode_parsing() {
        assert_eq!("Incoherent".parse::<SummationMode>().unwrap(), SummationMode::Incoherent);
        assert!("partial".parse::<SummationMode>().is_err());
        assert_eq!(SummationMode::Coherent.to_string(), "coherent");
    }
}
