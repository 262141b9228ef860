//! Validation errors raised by the spectral engine.
//!
//! Every variant here is fatal to the call that produced it. Recoverable
//! conditions are reported through [`crate::diagnostics::Diagnostic`] instead.

use thiserror::Error;

/// Errors that can occur while setting up or running an SED analysis.
#[derive(Debug, Error)]
pub enum SedError {
    #[error("Supercell dimensions must be positive, got ({nx}, {ny}, {nz})")]
    InvalidSupercell { nx: usize, ny: usize, nz: usize },

    #[error("Degenerate primitive cell: {0}")]
    DegenerateCell(String),

    #[error("Timestep must be positive and finite, got {0} ps")]
    InvalidTimestep(f64),

    #[error("Invalid trajectory: {0}")]
    InvalidTrajectory(String),

    #[error("Number of k-points must be >= 1, got {0}")]
    InvalidKPointCount(usize),

    #[error("Grid point counts must be positive, got ({n_a}, {n_b})")]
    InvalidGridCount { n_a: usize, n_b: usize },

    #[error("Unknown k-grid plane '{0}'. Valid planes: xy, yz, zx")]
    UnknownPlane(String),

    #[error("Atom index {index} out of bounds for {n_atoms} atoms")]
    AtomIndexOutOfBounds { index: usize, n_atoms: usize },

    #[error("Shape mismatch: {left:?} vs {right:?}")]
    ShapeMismatch { left: Vec<usize>, right: Vec<usize> },

    #[error("Invalid direction: {0}")]
    InvalidDirection(String),

    #[error("Operation requires a coherent (complex) SED result")]
    IncoherentInput,

    #[error("Invalid SED result: {0}")]
    InvalidResult(String),
}

pub type Result<T> = std::result::Result<T, SedError>;
