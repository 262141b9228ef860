//! # Phonosed Core
//!
//! Phonon spectral energy density (SED) analysis of molecular-dynamics
//! trajectories. Given atomic positions and velocities sampled at a fixed
//! timestep, this crate computes how vibrational energy is distributed over
//! wavevector **k** and frequency ω, and can animate a chosen (k, ω) mode back
//! in real space.
//!
//! ## Pipeline
//!
//! A [`Trajectory`] and the supercell repeat counts give a
//! [`LatticeGeometry`]; [`kspace`] samples k-paths and k-grids from it; the
//! [`SedCalculator`] projects each atom group onto plane waves and Fourier
//! transforms along time. Coherent results can be analysed further with
//! [`chiral::chiral_phase`] or inverted with [`ised::reconstruct`].
//!
//! ## Modules
//!
//! - [`types`]: Trajectory, cell and result containers.
//! - [`lattice`]: Primitive and reciprocal lattice vectors.
//! - [`kspace`]: Directions, k-paths and planar k-grids.
//! - [`sed`]: Atom grouping, spatial projection and the SED calculator.
//! - [`fourier`]: Time-axis FFTs and sample frequencies.
//! - [`chiral`]: Relative phase between polarization channels.
//! - [`ised`]: Inverse SED mode reconstruction.
//! - [`filter`]: Gaussian band-pass filtering of time series.
//! - [`diagnostics`]: Recoverable conditions returned alongside results.

pub mod chiral;
pub mod diagnostics;
pub mod error;
pub mod filter;
pub mod fourier;
pub mod ised;
pub mod kspace;
pub mod lattice;
pub mod sed;
pub mod types;

pub use diagnostics::{Diagnostic, Diagnostics, Outcome};
pub use error::{Result, SedError};
pub use kspace::{DirectionSpec, KPlane, KPoints};
pub use lattice::LatticeGeometry;
pub use sed::{AtomSelector, SedCalculator, SummationMode};
pub use types::{Quantity, SedData, SedResult, SimulationCell, Trajectory};
