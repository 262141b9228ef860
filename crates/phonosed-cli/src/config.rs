//! TOML configuration deserialisation for SED analysis jobs.

use std::collections::HashSet;

use anyhow::Context;
use serde::Deserialize;

use phonosed_core::chiral::ChiralMode;
use phonosed_core::ised::IsedRequest;
use phonosed_core::{AtomSelector, DirectionSpec, KPlane, Quantity, SummationMode};

/// Top-level job configuration.
#[derive(Debug, Deserialize)]
pub struct JobConfig {
    pub trajectory: TrajectoryConfig,
    #[serde(default)]
    pub lattice: LatticeConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    /// k-path jobs (`[[path]]` tables).
    #[serde(default)]
    pub path: Vec<PathJob>,
    /// k-grid jobs (`[[grid]]` tables).
    #[serde(default)]
    pub grid: Vec<GridJob>,
    pub chiral: Option<ChiralConfig>,
    pub ised: Option<IsedRequest>,
    pub filter: Option<FilterConfig>,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Trajectory source.
#[derive(Debug, Deserialize)]
pub struct TrajectoryConfig {
    pub path: String,
    /// Time between stored frames in ps.
    pub dt_ps: f64,
    /// File format: "auto" (from extension) or "lammps". Default: "auto".
    #[serde(default = "default_format")]
    pub format: String,
}

fn default_format() -> String {
    "auto".into()
}

/// Supercell repeat counts of the primitive cell.
#[derive(Debug, Deserialize)]
pub struct LatticeConfig {
    #[serde(default = "default_repeat")]
    pub nx: usize,
    #[serde(default = "default_repeat")]
    pub ny: usize,
    #[serde(default = "default_repeat")]
    pub nz: usize,
}

impl Default for LatticeConfig {
    fn default() -> Self {
        Self {
            nx: 1,
            ny: 1,
            nz: 1,
        }
    }
}

fn default_repeat() -> usize {
    1
}

/// Settings shared by every path and grid job.
#[derive(Debug, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default)]
    pub quantity: Quantity,
    #[serde(default)]
    pub summation: SummationMode,
    #[serde(default = "default_k_chunk_size")]
    pub k_chunk_size: usize,
    /// `atom_indices` / `atom_types`, flat or nested.
    #[serde(flatten)]
    pub selector: AtomSelector,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            quantity: Quantity::default(),
            summation: SummationMode::default(),
            k_chunk_size: default_k_chunk_size(),
            selector: AtomSelector::default(),
        }
    }
}

fn default_k_chunk_size() -> usize {
    64
}

/// A k-path from Γ along one direction.
#[derive(Debug, Deserialize)]
pub struct PathJob {
    pub name: String,
    /// Angle (degrees), axis name, vector or `{ h, k, l }` table.
    pub direction: DirectionSpec,
    #[serde(default = "default_bz_coverage")]
    pub bz_coverage: f64,
    #[serde(default = "default_n_k")]
    pub n_k: usize,
    /// Characteristic length in Å; when absent the extent comes from the
    /// reciprocal lattice.
    pub lattice_parameter: Option<f64>,
}

fn default_bz_coverage() -> f64 {
    1.0
}
fn default_n_k() -> usize {
    100
}

/// A planar k-grid.
#[derive(Debug, Deserialize)]
pub struct GridJob {
    pub name: String,
    pub plane: KPlane,
    pub range_a: [f64; 2],
    pub range_b: [f64; 2],
    pub n_a: usize,
    pub n_b: usize,
    /// Value of the k component normal to the plane.
    #[serde(default)]
    pub fixed: f64,
}

/// Chiral phase between two polarization axes, attached to coherent results.
#[derive(Debug, Deserialize)]
pub struct ChiralConfig {
    #[serde(default = "default_axes")]
    pub axes: [usize; 2],
    #[serde(default)]
    pub mode: ChiralMode,
}

fn default_axes() -> [usize; 2] {
    [0, 1]
}

/// Gaussian band filter applied to the whole trajectory.
#[derive(Debug, Deserialize)]
pub struct FilterConfig {
    pub w_min: f64,
    pub w_max: f64,
    /// Target RMS of the filtered data; 1.0 leaves it unscaled.
    #[serde(default = "default_amplitude")]
    pub amplitude: f64,
    /// Filter velocities instead of displacements.
    #[serde(default)]
    pub use_velocities: bool,
}

fn default_amplitude() -> f64 {
    1.0
}

/// Output configuration.
#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    /// Output directory (default: "./output").
    #[serde(default = "default_output_dir")]
    pub directory: String,
    /// Whether to save SED tables as CSV (default: true).
    #[serde(default = "default_true")]
    pub save_csv: bool,
    /// Whether to also save positive-frequency dispersion points as JSON (default: false).
    #[serde(default)]
    pub save_json: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
            save_csv: true,
            save_json: false,
        }
    }
}

fn default_output_dir() -> String {
    "./output".into()
}
fn default_true() -> bool {
    true
}

impl JobConfig {
    /// Checks that can be made without reading the trajectory.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(self.trajectory.dt_ps > 0.0 && self.trajectory.dt_ps.is_finite()) {
            anyhow::bail!("trajectory.dt_ps must be positive, got {}", self.trajectory.dt_ps);
        }
        let l = &self.lattice;
        if l.nx == 0 || l.ny == 0 || l.nz == 0 {
            anyhow::bail!("lattice nx, ny, nz must be positive, got ({}, {}, {})", l.nx, l.ny, l.nz);
        }
        if self.path.is_empty() && self.grid.is_empty() && self.ised.is_none() && self.filter.is_none()
        {
            anyhow::bail!("Nothing to do: add a [[path]], [[grid]], [ised] or [filter] section");
        }

        let mut names = HashSet::new();
        for p in &self.path {
            if !names.insert(p.name.as_str()) {
                anyhow::bail!("Duplicate job name '{}'", p.name);
            }
            if p.n_k == 0 {
                anyhow::bail!("Path '{}': n_k must be at least 1", p.name);
            }
            p.direction
                .unit_vector()
                .map_err(|e| anyhow::anyhow!("Path '{}': {}", p.name, e))?;
        }
        for g in &self.grid {
            if !names.insert(g.name.as_str()) {
                anyhow::bail!("Duplicate job name '{}'", g.name);
            }
            if g.n_a == 0 || g.n_b == 0 {
                anyhow::bail!("Grid '{}': n_a and n_b must be positive", g.name);
            }
        }
        if let Some(chiral) = &self.chiral {
            if chiral.axes.iter().any(|&a| a > 2) {
                anyhow::bail!("chiral.axes must be 0 (x), 1 (y) or 2 (z), got {:?}", chiral.axes);
            }
        }
        if let Some(ised) = &self.ised {
            ised.direction
                .unit_vector()
                .map_err(|e| anyhow::anyhow!("ised: {}", e))?;
        }
        if let Some(filter) = &self.filter {
            if filter.w_max <= filter.w_min {
                anyhow::bail!(
                    "filter.w_max ({}) must exceed filter.w_min ({})",
                    filter.w_max,
                    filter.w_min
                );
            }
        }
        Ok(())
    }
}

/// Load and parse a TOML job configuration file.
pub fn load_config(path: &std::path::Path) -> anyhow::Result<JobConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config '{}'", path.display()))?;
    let config: JobConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config '{}'", path.display()))?;
    Ok(config)
}
