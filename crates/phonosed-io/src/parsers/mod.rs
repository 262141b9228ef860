//! Trajectory file parsers.
//!
//! Supported formats:
//! - [`lammps`]: LAMMPS text dumps (`.dump`, `.lammpstrj`)

pub mod lammps;

use std::path::Path;

use phonosed_core::{SedError, Trajectory};
use thiserror::Error;

/// Errors during trajectory file parsing.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Parse error at line {line}: {message}")]
    FormatError { line: usize, message: String },

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("Inconsistent frames: {0}")]
    Inconsistent(String),

    #[error("Invalid trajectory: {0}")]
    Trajectory(#[from] SedError),
}

/// Read a trajectory, choosing the parser from `format` or, when absent or
/// `"auto"`, from the file extension.
pub fn read_trajectory(
    path: impl AsRef<Path>,
    dt_ps: f64,
    format: Option<&str>,
) -> Result<Trajectory, ParseError> {
    let path = path.as_ref();
    let format = match format.map(|f| f.trim().to_ascii_lowercase()) {
        Some(f) if f != "auto" => f,
        _ => path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default(),
    };
    match format.as_str() {
        "lammps" | "dump" | "lammpstrj" => lammps::read_lammps_dump(path, dt_ps),
        other => Err(ParseError::UnsupportedFormat(format!(
            "'{}' for {}",
            other,
            path.display()
        ))),
    }
}
