//! k-space sampling: directions, k-paths and planar k-grids.
//!
//! A k-path runs from Γ along a single direction out to a multiple of the
//! reciprocal-lattice extent in that direction. A k-grid sweeps two Cartesian
//! components of **k** over a plane with the third held fixed.

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use nalgebra::Vector3;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::diagnostics::{Diagnostic, Diagnostics, Outcome};
use crate::error::{Result, SedError};
use crate::lattice::LatticeGeometry;

/// Lattice parameters at or below this are treated as "not given" (Å).
const MIN_LATTICE_PARAMETER: f64 = 1e-6;
/// Reciprocal projections at or below this are negligible (Å⁻¹).
const MIN_PROJECTION: f64 = 1e-6;
/// Direction vectors shorter than this are rejected.
const MIN_DIRECTION_NORM: f64 = 1e-10;

/// A user-facing description of a direction in k-space.
///
/// Deserialises from any of the shapes accepted in job files:
/// `direction = 30.0`, `direction = "x"`, `direction = [1, 1, 0]`,
/// `direction = { h = 1, k = 1 }` or `direction = { angle = 45 }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DirectionSpec {
    /// Angle in degrees from +x, in the xy plane.
    Angle(f64),
    /// Axis name (`x`, `y`, `z`) or a numeric string read as an angle.
    Named(String),
    /// One component (an angle) or three components (a vector).
    Components(Vec<f64>),
    /// Angle in degrees given as a table.
    AngleMap { angle: f64 },
    /// Miller-index-like components, taken as Cartesian (h, k, l).
    Miller {
        #[serde(default)]
        h: f64,
        #[serde(default)]
        k: f64,
        #[serde(default)]
        l: f64,
    },
}

impl DirectionSpec {
    /// Resolve to a unit vector.
    pub fn unit_vector(&self) -> Result<Vector3<f64>> {
        let raw = match self {
            DirectionSpec::Angle(deg) | DirectionSpec::AngleMap { angle: deg } => in_plane(*deg),
            DirectionSpec::Named(name) => {
                let trimmed = name.trim();
                if let Ok(deg) = trimmed.parse::<f64>() {
                    in_plane(deg)
                } else {
                    match trimmed.to_ascii_lowercase().as_str() {
                        "x" => Vector3::x(),
                        "y" => Vector3::y(),
                        "z" => Vector3::z(),
                        _ => {
                            return Err(SedError::InvalidDirection(format!(
                                "unknown direction string '{}'",
                                name
                            )))
                        }
                    }
                }
            }
            DirectionSpec::Components(v) => match v.as_slice() {
                [deg] => in_plane(*deg),
                [x, y, z] => Vector3::new(*x, *y, *z),
                _ => {
                    return Err(SedError::InvalidDirection(format!(
                        "direction vector must have 1 or 3 components, got {}",
                        v.len()
                    )))
                }
            },
            DirectionSpec::Miller { h, k, l } => Vector3::new(*h, *k, *l),
        };

        let norm = raw.norm();
        if !(norm >= MIN_DIRECTION_NORM) {
            return Err(SedError::InvalidDirection("direction vector cannot be zero".into()));
        }
        Ok(raw / norm)
    }
}

impl From<[f64; 3]> for DirectionSpec {
    fn from(v: [f64; 3]) -> Self {
        DirectionSpec::Components(v.to_vec())
    }
}

impl From<&str> for DirectionSpec {
    fn from(s: &str) -> Self {
        DirectionSpec::Named(s.to_string())
    }
}

impl fmt::Display for DirectionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DirectionSpec::Angle(deg) | DirectionSpec::AngleMap { angle: deg } => {
                write!(f, "{:.1}deg", deg)
            }
            DirectionSpec::Named(name) => write!(f, "{}", name.replace([' ', '/'], "_")),
            DirectionSpec::Components(v) => {
                let parts: Vec<String> = v.iter().map(|x| format!("{:.2}", x)).collect();
                write!(f, "{}", parts.join(","))
            }
            DirectionSpec::Miller { h, k, l } => write!(f, "h{}_k{}_l{}", h, k, l),
        }
    }
}

fn in_plane(deg: f64) -> Vector3<f64> {
    let rad = deg.to_radians();
    Vector3::new(rad.cos(), rad.sin(), 0.0)
}

/// A set of sampled k-points.
#[derive(Debug, Clone, PartialEq)]
pub struct KPoints {
    /// |k| per point along a path (Å⁻¹). Empty for grids.
    pub magnitudes: Array1<f64>,
    /// Cartesian k-vectors, shape (n, 3) (Å⁻¹).
    pub vectors: Array2<f64>,
    /// (rows, cols) when the points form a planar grid.
    pub grid_shape: Option<(usize, usize)>,
}

impl KPoints {
    /// Arbitrary k-vectors with no path or grid structure.
    pub fn from_vectors(vectors: Array2<f64>) -> Self {
        Self {
            magnitudes: Array1::zeros(0),
            vectors,
            grid_shape: None,
        }
    }

    pub fn len(&self) -> usize {
        self.vectors.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Index of the path point whose magnitude is closest to `k`.
    pub fn nearest_magnitude_index(&self, k: f64) -> Option<usize> {
        crate::types::nearest_index(self.magnitudes.iter().copied(), k)
    }
}

/// An axis-aligned plane for k-grids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KPlane {
    Xy,
    Yz,
    Zx,
}

impl FromStr for KPlane {
    type Err = SedError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "xy" => Ok(KPlane::Xy),
            "yz" => Ok(KPlane::Yz),
            "zx" => Ok(KPlane::Zx),
            _ => Err(SedError::UnknownPlane(s.to_string())),
        }
    }
}

impl KPlane {
    /// Place the swept components (a, b) and the fixed component into a vector.
    ///
    /// The first range always sweeps the first letter of the plane name.
    fn compose(self, a: f64, b: f64, fixed: f64) -> [f64; 3] {
        match self {
            KPlane::Xy => [a, b, fixed],
            KPlane::Yz => [fixed, a, b],
            KPlane::Zx => [b, fixed, a],
        }
    }
}

/// `n` evenly spaced values on [start, end]; a single value yields `end`.
pub fn linspace(start: f64, end: f64, n: usize) -> Array1<f64> {
    match n {
        0 => Array1::zeros(0),
        1 => Array1::from_elem(1, end),
        _ => {
            let step = (end - start) / (n - 1) as f64;
            Array1::from_shape_fn(n, |i| if i == n - 1 { end } else { start + step * i as f64 })
        }
    }
}

/// Sample a straight k-path from Γ along `direction`.
///
/// # Arguments
/// * `lattice` - Primitive/reciprocal lattice of the system.
/// * `direction` - Direction of the path.
/// * `bz_coverage` - Multiple of the reciprocal extent to cover.
/// * `n_k` - Number of points (≥ 1).
/// * `lattice_parameter` - Characteristic length (Å). When absent or
///   negligible, the extent is the largest |b_i · k̂|.
pub fn k_path(
    lattice: &LatticeGeometry,
    direction: &DirectionSpec,
    bz_coverage: f64,
    n_k: usize,
    lattice_parameter: Option<f64>,
) -> Result<Outcome<KPoints>> {
    if n_k < 1 {
        return Err(SedError::InvalidKPointCount(n_k));
    }
    let unit = direction.unit_vector()?;
    let mut diagnostics = Diagnostics::new();

    let extent = match lattice_parameter.filter(|&lp| lp > MIN_LATTICE_PARAMETER) {
        Some(lp) => {
            let extent = 2.0 * PI / lp;
            log::info!(
                "Using provided lattice parameter ({:.3} Å -> {:.3} Å⁻¹) for k-path",
                lp,
                extent
            );
            extent
        }
        None => {
            let projections: Vec<f64> = lattice
                .reciprocal()
                .iter()
                .map(|b| b.dot(&unit).abs())
                .collect();
            let max_projection = projections.iter().copied().fold(0.0_f64, f64::max);
            if max_projection > MIN_PROJECTION {
                log::info!(
                    "Using directional reciprocal projection ({:.3} Å⁻¹) for k-path; |b·k̂| = {:.3?}",
                    max_projection,
                    projections
                );
                max_projection
            } else {
                let norm_a1 = lattice.primitive()[0].norm();
                if norm_a1 <= MIN_LATTICE_PARAMETER {
                    return Err(SedError::DegenerateCell(
                        "reciprocal projections and |a1| too small to derive a k-path extent".into(),
                    ));
                }
                let extent = 2.0 * PI / norm_a1;
                diagnostics.push(Diagnostic::ReciprocalFallback { extent });
                extent
            }
        }
    };

    let k_max = bz_coverage * extent;
    let magnitudes = linspace(0.0, k_max, n_k);
    let vectors = Array2::from_shape_fn((n_k, 3), |(i, c)| magnitudes[i] * unit[c]);

    Ok(diagnostics.finish(KPoints {
        magnitudes,
        vectors,
        grid_shape: None,
    }))
}

/// Sample a planar k-grid.
///
/// Returns `n_a * n_b` vectors in row-major order over (a, b) with grid
/// shape `(n_a, n_b)`. No magnitudes are produced.
pub fn k_grid(
    plane: KPlane,
    range_a: (f64, f64),
    range_b: (f64, f64),
    n_a: usize,
    n_b: usize,
    fixed_value: f64,
) -> Result<KPoints> {
    if n_a == 0 || n_b == 0 {
        return Err(SedError::InvalidGridCount { n_a, n_b });
    }
    let a_vals = linspace(range_a.0, range_a.1, n_a);
    let b_vals = linspace(range_b.0, range_b.1, n_b);

    let mut vectors = Array2::zeros((n_a * n_b, 3));
    for (i, &a) in a_vals.iter().enumerate() {
        for (j, &b) in b_vals.iter().enumerate() {
            let k = plane.compose(a, b, fixed_value);
            let row = i * n_b + j;
            for c in 0..3 {
                vectors[[row, c]] = k[c];
            }
        }
    }

    Ok(KPoints {
        magnitudes: Array1::zeros(0),
        vectors,
        grid_shape: Some((n_a, n_b)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SimulationCell;
    use approx::assert_abs_diff_eq;

    fn square_lattice() -> LatticeGeometry {
        LatticeGeometry::new(&SimulationCell::orthorhombic(40.0, 40.0, 5.0), 10, 10, 1).unwrap()
    }

    #[test]
    fn test_direction_shapes() {
        let v = DirectionSpec::Angle(90.0).unit_vector().unwrap();
        assert_abs_diff_eq!(v.y, 1.0, epsilon = 1e-12);
        let v = DirectionSpec::from("Z").unit_vector().unwrap();
        assert_eq!(v, Vector3::z());
        let v = DirectionSpec::from("45").unit_vector().unwrap();
        assert_abs_diff_eq!(v.x, v.y, epsilon = 1e-12);
        let v = DirectionSpec::from([3.0, 4.0, 0.0]).unit_vector().unwrap();
        assert_abs_diff_eq!(v.x, 0.6, epsilon = 1e-12);
        let v = DirectionSpec::Components(vec![180.0]).unit_vector().unwrap();
        assert_abs_diff_eq!(v.x, -1.0, epsilon = 1e-12);
        let v = DirectionSpec::Miller { h: 1.0, k: 1.0, l: 1.0 }.unit_vector().unwrap();
        assert_abs_diff_eq!(v.norm(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_direction_rejects_bad_shapes() {
        assert!(matches!(
            DirectionSpec::Components(vec![1.0, 2.0]).unit_vector(),
            Err(SedError::InvalidDirection(_))
        ));
        assert!(matches!(
            DirectionSpec::from("diagonal").unit_vector(),
            Err(SedError::InvalidDirection(_))
        ));
        assert!(matches!(
            DirectionSpec::from([0.0, 0.0, 0.0]).unit_vector(),
            Err(SedError::InvalidDirection(_))
        ));
    }

    #[test]
    fn test_k_path_auto_extent_along_x() {
        let lattice = square_lattice();
        let path = k_path(&lattice, &"x".into(), 1.0, 5, None).unwrap();
        assert!(path.diagnostics.is_empty());
        let kp = path.value;
        assert_eq!(kp.len(), 5);
        assert_eq!(kp.magnitudes[0], 0.0);
        assert_abs_diff_eq!(kp.magnitudes[4], 2.0 * PI / 4.0, epsilon = 1e-12);
        for i in 1..kp.len() {
            assert!(kp.magnitudes[i] >= kp.magnitudes[i - 1]);
        }
        assert_abs_diff_eq!(kp.vectors[[4, 0]], 2.0 * PI / 4.0, epsilon = 1e-12);
        assert_eq!(kp.vectors[[4, 1]], 0.0);
    }

    #[test]
    fn test_k_path_with_lattice_parameter_and_single_point() {
        let lattice = square_lattice();
        let kp = k_path(&lattice, &DirectionSpec::Angle(0.0), 2.0, 1, Some(2.0))
            .unwrap()
            .into_value();
        assert_eq!(kp.len(), 1);
        assert_abs_diff_eq!(kp.magnitudes[0], 2.0 * PI, epsilon = 1e-12);
    }

    #[test]
    fn test_k_path_rejects_zero_points() {
        let lattice = square_lattice();
        assert!(matches!(
            k_path(&lattice, &"x".into(), 1.0, 0, None),
            Err(SedError::InvalidKPointCount(0))
        ));
    }

    #[test]
    fn test_k_grid_xy_plane() {
        let grid = k_grid(KPlane::Xy, (-1.0, 1.0), (-1.0, 1.0), 3, 3, 0.0).unwrap();
        assert_eq!(grid.len(), 9);
        assert_eq!(grid.grid_shape, Some((3, 3)));
        assert!(grid.magnitudes.is_empty());
        for row in grid.vectors.rows() {
            assert_eq!(row[2], 0.0);
        }
        assert_eq!(grid.vectors.row(0).to_vec(), vec![-1.0, -1.0, 0.0]);
        assert_eq!(grid.vectors.row(1).to_vec(), vec![-1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_k_grid_zx_plane_ordering() {
        let grid = k_grid(KPlane::Zx, (0.0, 1.0), (2.0, 3.0), 2, 2, 7.0).unwrap();
        // first range sweeps z, second sweeps x
        assert_eq!(grid.vectors.row(1).to_vec(), vec![3.0, 7.0, 0.0]);
        assert_eq!(grid.vectors.row(2).to_vec(), vec![2.0, 7.0, 1.0]);
    }

    #[test]
    fn test_k_grid_validation() {
        assert!(matches!(
            k_grid(KPlane::Yz, (0.0, 1.0), (0.0, 1.0), 0, 3, 0.0),
            Err(SedError::InvalidGridCount { n_a: 0, n_b: 3 })
        ));
        assert!(matches!("xz".parse::<KPlane>(), Err(SedError::UnknownPlane(_))));
        assert_eq!("YZ".parse::<KPlane>().unwrap(), KPlane::Yz);
    }
}
