//! Core types shared across the phonosed workspace.
//!
//! This module defines the trajectory consumed by the analysis, the
//! simulation cell, and the spectral energy density result container.

use std::collections::BTreeMap;

use nalgebra::{Matrix3, Vector3};
use ndarray::{s, Array1, Array2, Array3, ArrayView2, Axis};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SedError};
use crate::kspace::KPoints;

/// A triclinic simulation cell.
///
/// The columns of the matrix are the cell edge vectors **a**, **b**, **c**.
/// For LAMMPS-style cells **a** lies along x and **b** in the xy plane, so
/// the matrix is upper triangular with the tilt factors above the diagonal.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationCell {
    /// Edge vectors as columns (Å).
    pub matrix: Matrix3<f64>,
    /// Lower corner of the cell (Å).
    pub origin: [f64; 3],
}

impl SimulationCell {
    pub fn from_matrix(matrix: Matrix3<f64>) -> Self {
        Self {
            matrix,
            origin: [0.0; 3],
        }
    }

    /// Build a cell from its three edge vectors.
    pub fn from_edges(a: [f64; 3], b: [f64; 3], c: [f64; 3]) -> Self {
        Self::from_matrix(Matrix3::from_columns(&[
            Vector3::from(a),
            Vector3::from(b),
            Vector3::from(c),
        ]))
    }

    pub fn orthorhombic(lx: f64, ly: f64, lz: f64) -> Self {
        Self::from_matrix(Matrix3::from_diagonal(&Vector3::new(lx, ly, lz)))
    }

    pub fn cubic(length: f64) -> Self {
        Self::orthorhombic(length, length, length)
    }

    pub fn with_origin(mut self, origin: [f64; 3]) -> Self {
        self.origin = origin;
        self
    }

    /// Edge vector `i` (0 = a, 1 = b, 2 = c).
    pub fn edge(&self, i: usize) -> Vector3<f64> {
        self.matrix.column(i).into_owned()
    }

    /// Diagonal box lengths (lx, ly, lz).
    pub fn lengths(&self) -> [f64; 3] {
        [self.matrix[(0, 0)], self.matrix[(1, 1)], self.matrix[(2, 2)]]
    }

    /// LAMMPS tilt factors (xy, xz, yz).
    pub fn tilts(&self) -> [f64; 3] {
        [self.matrix[(0, 1)], self.matrix[(0, 2)], self.matrix[(1, 2)]]
    }

    pub fn volume(&self) -> f64 {
        self.matrix.determinant().abs()
    }

    pub fn inverse(&self) -> Option<Matrix3<f64>> {
        self.matrix.try_inverse()
    }
}

/// Which per-atom time series enters the space-time Fourier transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quantity {
    /// Position minus the atom's time-averaged position.
    Displacement,
    /// Atomic velocity.
    #[default]
    Velocity,
}

/// A fully materialised, unwrapped molecular-dynamics trajectory.
#[derive(Debug, Clone)]
pub struct Trajectory {
    positions: Array3<f64>,
    velocities: Array3<f64>,
    types: Vec<u32>,
    cell: SimulationCell,
    dt_ps: f64,
}

impl Trajectory {
    /// Create a trajectory, validating array shapes and the timestep.
    ///
    /// # Arguments
    /// * `positions` - Unwrapped Cartesian positions, shape (frames, atoms, 3).
    /// * `velocities` - Velocities, same shape as `positions`.
    /// * `types` - Integer type label per atom.
    /// * `cell` - Simulation cell.
    /// * `dt_ps` - Time between stored frames (ps).
    pub fn new(
        positions: Array3<f64>,
        velocities: Array3<f64>,
        types: Vec<u32>,
        cell: SimulationCell,
        dt_ps: f64,
    ) -> Result<Self> {
        if !(dt_ps > 0.0 && dt_ps.is_finite()) {
            return Err(SedError::InvalidTimestep(dt_ps));
        }
        let (_, n_atoms, n_dim) = positions.dim();
        if n_dim != 3 {
            return Err(SedError::InvalidTrajectory(format!(
                "positions must have 3 components per atom, got {}",
                n_dim
            )));
        }
        if velocities.dim() != positions.dim() {
            return Err(SedError::InvalidTrajectory(format!(
                "velocities shape {:?} does not match positions shape {:?}",
                velocities.dim(),
                positions.dim()
            )));
        }
        if types.len() != n_atoms {
            return Err(SedError::InvalidTrajectory(format!(
                "{} type labels for {} atoms",
                types.len(),
                n_atoms
            )));
        }
        Ok(Self {
            positions,
            velocities,
            types,
            cell,
            dt_ps,
        })
    }

    pub fn n_frames(&self) -> usize {
        self.positions.dim().0
    }

    pub fn n_atoms(&self) -> usize {
        self.types.len()
    }

    pub fn positions(&self) -> &Array3<f64> {
        &self.positions
    }

    pub fn velocities(&self) -> &Array3<f64> {
        &self.velocities
    }

    pub fn types(&self) -> &[u32] {
        &self.types
    }

    pub fn cell(&self) -> &SimulationCell {
        &self.cell
    }

    pub fn dt_ps(&self) -> f64 {
        self.dt_ps
    }

    /// Time-averaged position of every atom, shape (atoms, 3).
    ///
    /// A trajectory without frames yields zeros.
    pub fn mean_positions(&self) -> Array2<f64> {
        self.positions
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array2::zeros((self.n_atoms(), 3)))
    }

    /// Displacement of every atom from its mean position, shape (frames, atoms, 3).
    pub fn displacements(&self) -> Array3<f64> {
        let mean = self.mean_positions();
        &self.positions - &mean.insert_axis(Axis(0))
    }

    /// Number of atoms carrying each type label.
    pub fn type_counts(&self) -> BTreeMap<u32, usize> {
        let mut counts = BTreeMap::new();
        for &t in &self.types {
            *counts.entry(t).or_insert(0) += 1;
        }
        counts
    }
}

/// Amplitude data of an SED result.
#[derive(Debug, Clone)]
pub enum SedData {
    /// Complex amplitude per polarization, shape (frequency, k, 3).
    Coherent(Array3<Complex64>),
    /// Intensity already summed over polarizations (and groups), shape (frequency, k).
    Incoherent(Array2<f64>),
}

impl SedData {
    pub fn n_frequencies(&self) -> usize {
        match self {
            SedData::Coherent(a) => a.dim().0,
            SedData::Incoherent(a) => a.dim().0,
        }
    }

    pub fn n_k(&self) -> usize {
        match self {
            SedData::Coherent(a) => a.dim().1,
            SedData::Incoherent(a) => a.dim().1,
        }
    }

    /// Polarization-summed intensity Σ|amplitude|², shape (frequency, k).
    pub fn intensity(&self) -> Array2<f64> {
        match self {
            SedData::Coherent(a) => a.mapv(|z| z.norm_sqr()).sum_axis(Axis(2)),
            SedData::Incoherent(a) => a.clone(),
        }
    }
}

/// The spectral energy density of a trajectory over a set of k-points.
///
/// Results are immutable; deriving a phase field produces a new result via
/// [`SedResult::with_phase`].
#[derive(Debug, Clone)]
pub struct SedResult {
    data: SedData,
    frequencies: Array1<f64>,
    kpoints: KPoints,
    phase: Option<Array2<f64>>,
}

impl SedResult {
    /// Assemble a result, checking that the frequency and k axes agree with
    /// the data shape and that path magnitudes and grid shape cover every
    /// k-vector.
    pub fn new(data: SedData, frequencies: Array1<f64>, kpoints: KPoints) -> Result<Self> {
        if data.n_frequencies() != frequencies.len() {
            return Err(SedError::InvalidResult(format!(
                "{} frequency rows but {} frequencies",
                data.n_frequencies(),
                frequencies.len()
            )));
        }
        if data.n_k() != kpoints.len() {
            return Err(SedError::InvalidResult(format!(
                "{} k columns but {} k-vectors",
                data.n_k(),
                kpoints.len()
            )));
        }
        let n_mag = kpoints.magnitudes.len();
        if n_mag != 0 && n_mag != kpoints.len() {
            return Err(SedError::InvalidResult(format!(
                "{} k magnitudes but {} k-vectors",
                n_mag,
                kpoints.len()
            )));
        }
        if let Some((rows, cols)) = kpoints.grid_shape {
            if rows * cols != kpoints.len() {
                return Err(SedError::InvalidResult(format!(
                    "grid shape {}x{} does not cover {} k-vectors",
                    rows,
                    cols,
                    kpoints.len()
                )));
            }
        }
        Ok(Self {
            data,
            frequencies,
            kpoints,
            phase: None,
        })
    }

    /// A copy of this result carrying a phase field of shape (frequency, k).
    pub fn with_phase(&self, phase: Array2<f64>) -> Result<Self> {
        let expected = (self.frequencies.len(), self.kpoints.len());
        if phase.dim() != expected {
            return Err(SedError::ShapeMismatch {
                left: vec![phase.dim().0, phase.dim().1],
                right: vec![expected.0, expected.1],
            });
        }
        Ok(Self {
            phase: Some(phase),
            ..self.clone()
        })
    }

    pub fn data(&self) -> &SedData {
        &self.data
    }

    pub fn is_complex(&self) -> bool {
        matches!(self.data, SedData::Coherent(_))
    }

    /// Frequency axis (THz) in FFT sample order.
    pub fn frequencies(&self) -> &Array1<f64> {
        &self.frequencies
    }

    pub fn kpoints(&self) -> &KPoints {
        &self.kpoints
    }

    pub fn k_magnitudes(&self) -> &Array1<f64> {
        &self.kpoints.magnitudes
    }

    pub fn k_vectors(&self) -> &Array2<f64> {
        &self.kpoints.vectors
    }

    pub fn grid_shape(&self) -> Option<(usize, usize)> {
        self.kpoints.grid_shape
    }

    pub fn phase(&self) -> Option<&Array2<f64>> {
        self.phase.as_ref()
    }

    pub fn intensity(&self) -> Array2<f64> {
        self.data.intensity()
    }

    /// The complex (frequency, k) slice of one polarization axis.
    pub fn polarization(&self, axis: usize) -> Result<ArrayView2<'_, Complex64>> {
        match &self.data {
            SedData::Coherent(a) if axis < 3 => Ok(a.slice(s![.., .., axis])),
            SedData::Coherent(_) => Err(SedError::ShapeMismatch {
                left: vec![axis],
                right: vec![3],
            }),
            SedData::Incoherent(_) => Err(SedError::IncoherentInput),
        }
    }

    /// Index of the frequency bin closest to `freq_thz`.
    pub fn nearest_frequency_index(&self, freq_thz: f64) -> Option<usize> {
        nearest_index(self.frequencies.iter().copied(), freq_thz)
    }

    /// Location (frequency index, k index) and value of the intensity maximum.
    pub fn peak(&self) -> Option<(usize, usize, f64)> {
        let intensity = self.intensity();
        let mut best: Option<(usize, usize, f64)> = None;
        for ((i, j), &v) in intensity.indexed_iter() {
            if best.map_or(true, |(_, _, b)| v > b) {
                best = Some((i, j, v));
            }
        }
        best
    }
}

/// Index of the value closest to `target`; ties resolve to the first.
pub fn nearest_index(values: impl Iterator<Item = f64>, target: f64) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, v) in values.enumerate() {
        let d = (v - target).abs();
        if best.map_or(true, |(_, bd)| d < bd) {
            best = Some((i, d));
        }
    }
    best.map(|(i, _)| i)
}
