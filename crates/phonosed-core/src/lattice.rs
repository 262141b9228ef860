//! Primitive and reciprocal lattice of a supercell simulation box.
//!
//! The simulation cell is assumed to be an (nx × ny × nz) repetition of a
//! primitive cell. The primitive vectors are the cell edges divided by the
//! repeat counts, and the reciprocal vectors follow the usual construction
//!
//! $$\mathbf{b}_1 = 2\pi \frac{\mathbf{a}_2 \times \mathbf{a}_3}{V}, \quad
//!   V = \mathbf{a}_1 \cdot (\mathbf{a}_2 \times \mathbf{a}_3)$$
//!
//! and cyclic permutations, so that $\mathbf{b}_i \cdot \mathbf{a}_j = 2\pi\delta_{ij}$.

use std::f64::consts::PI;

use nalgebra::{Matrix3, Vector3};

use crate::error::{Result, SedError};
use crate::types::SimulationCell;

/// Minimum length of a primitive vector (Å).
const MIN_VECTOR_LENGTH: f64 = 1e-9;
/// Primitive cells with |V| at or below this are treated as degenerate (Å³).
const MIN_CELL_VOLUME: f64 = 1e-8;

/// Real-space primitive vectors and their reciprocal basis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatticeGeometry {
    a: [Vector3<f64>; 3],
    b: [Vector3<f64>; 3],
    volume: f64,
}

impl LatticeGeometry {
    /// Derive the primitive lattice from a cell and supercell repeat counts.
    pub fn new(cell: &SimulationCell, nx: usize, ny: usize, nz: usize) -> Result<Self> {
        if nx == 0 || ny == 0 || nz == 0 {
            return Err(SedError::InvalidSupercell { nx, ny, nz });
        }

        let a = [
            cell.edge(0) / nx as f64,
            cell.edge(1) / ny as f64,
            cell.edge(2) / nz as f64,
        ];
        if let Some(i) = a.iter().position(|v| v.norm() < MIN_VECTOR_LENGTH) {
            return Err(SedError::DegenerateCell(format!(
                "primitive vector a{} has near-zero length; check nx, ny, nz or the box matrix",
                i + 1
            )));
        }

        let volume = a[0].dot(&a[1].cross(&a[2]));
        if volume.abs() <= MIN_CELL_VOLUME {
            let rank = Matrix3::from_columns(&a).rank(MIN_VECTOR_LENGTH);
            return Err(SedError::DegenerateCell(format!(
                "primitive vectors are coplanar or collinear (volume {:.2e}, rank {})",
                volume, rank
            )));
        }

        let scale = 2.0 * PI / volume;
        let b = [
            a[1].cross(&a[2]) * scale,
            a[2].cross(&a[0]) * scale,
            a[0].cross(&a[1]) * scale,
        ];

        log::debug!(
            "Primitive cell volume {:.4} Å³; |b| = ({:.4}, {:.4}, {:.4}) Å⁻¹",
            volume.abs(),
            b[0].norm(),
            b[1].norm(),
            b[2].norm()
        );

        Ok(Self { a, b, volume })
    }

    /// Primitive vectors a1, a2, a3 (Å).
    pub fn primitive(&self) -> &[Vector3<f64>; 3] {
        &self.a
    }

    /// Reciprocal vectors b1, b2, b3 (Å⁻¹, including the 2π factor).
    pub fn reciprocal(&self) -> &[Vector3<f64>; 3] {
        &self.b
    }

    /// Unsigned primitive cell volume (Å³).
    pub fn volume(&self) -> f64 {
        self.volume.abs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn assert_dual_basis(geom: &LatticeGeometry) {
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 2.0 * PI } else { 0.0 };
                assert_abs_diff_eq!(
                    geom.reciprocal()[i].dot(&geom.primitive()[j]),
                    expected,
                    epsilon = 1e-10
                );
            }
        }
    }

    #[test]
    fn test_cubic_supercell() {
        let cell = SimulationCell::cubic(20.0);
        let geom = LatticeGeometry::new(&cell, 5, 4, 2).unwrap();
        assert_abs_diff_eq!(geom.primitive()[0].x, 4.0, epsilon = 1e-12);
        assert_abs_diff_eq!(geom.primitive()[1].y, 5.0, epsilon = 1e-12);
        assert_abs_diff_eq!(geom.primitive()[2].z, 10.0, epsilon = 1e-12);
        assert_abs_diff_eq!(geom.reciprocal()[0].x, 2.0 * PI / 4.0, epsilon = 1e-12);
        assert_abs_diff_eq!(geom.volume(), 200.0, epsilon = 1e-9);
        assert_dual_basis(&geom);
    }

    #[test]
    fn test_triclinic_dual_basis() {
        let cell = SimulationCell::from_edges([6.0, 0.0, 0.0], [2.5, 5.2, 0.0], [-1.0, 0.7, 7.3]);
        let geom = LatticeGeometry::new(&cell, 3, 2, 1).unwrap();
        assert_dual_basis(&geom);
    }

    #[test]
    fn test_left_handed_cell_keeps_dual_basis() {
        let cell = SimulationCell::from_edges([0.0, 3.0, 0.0], [3.0, 0.0, 0.0], [0.0, 0.0, 3.0]);
        let geom = LatticeGeometry::new(&cell, 1, 1, 1).unwrap();
        assert_dual_basis(&geom);
    }

    #[test]
    fn test_rejects_zero_supercell() {
        let cell = SimulationCell::cubic(10.0);
        let err = LatticeGeometry::new(&cell, 1, 0, 1).unwrap_err();
        assert!(matches!(err, SedError::InvalidSupercell { ny: 0, .. }));
    }

    #[test]
    fn test_rejects_zero_length_vector() {
        let cell = SimulationCell::orthorhombic(10.0, 0.0, 10.0);
        let err = LatticeGeometry::new(&cell, 1, 1, 1).unwrap_err();
        assert!(matches!(err, SedError::DegenerateCell(_)));
    }

    #[test]
    fn test_rejects_coplanar_vectors() {
        let cell = SimulationCell::from_edges([1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [1.0, 1.0, 0.0]);
        let err = LatticeGeometry::new(&cell, 1, 1, 1).unwrap_err();
        match err {
            SedError::DegenerateCell(msg) => assert!(msg.contains("coplanar")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
