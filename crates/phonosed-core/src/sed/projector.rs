//! Spatial projection of per-atom time series onto plane waves.
//!
//! For a group of atoms and a batch of k-vectors the projector forms
//!
//! $$A_\alpha(t, \mathbf{k}) = \sum_j q_{j\alpha}(t)\, e^{i \mathbf{k} \cdot \bar{\mathbf{r}}_j}$$
//!
//! where $q$ is the displacement or velocity and $\bar{\mathbf{r}}_j$ the
//! time-averaged position. The sum is evaluated as two real matrix products
//! against an atoms × k phase matrix.

use ndarray::{s, Array2, Array3, ArrayView2, Zip};
use num_complex::Complex64;

use super::grouping::AtomGroup;
use crate::types::{Quantity, Trajectory};

/// Projects a trajectory quantity onto plane waves at fixed mean positions.
#[derive(Debug, Clone, Copy)]
pub struct SpaceTimeProjector<'a> {
    trajectory: &'a Trajectory,
    mean_positions: &'a Array2<f64>,
    quantity: Quantity,
}

impl<'a> SpaceTimeProjector<'a> {
    pub fn new(
        trajectory: &'a Trajectory,
        mean_positions: &'a Array2<f64>,
        quantity: Quantity,
    ) -> Self {
        Self {
            trajectory,
            mean_positions,
            quantity,
        }
    }

    /// Project one atom group onto the rows of `k_vectors` (n_k, 3).
    ///
    /// Returns complex amplitudes of shape (frames, n_k, 3). An empty group
    /// gives zeros.
    pub fn project(&self, group: &AtomGroup, k_vectors: ArrayView2<f64>) -> Array3<Complex64> {
        let n_t = self.trajectory.n_frames();
        let n_k = k_vectors.nrows();
        let idx = group.indices();
        let mut out = Array3::zeros((n_t, n_k, 3));
        if idx.is_empty() || n_k == 0 || n_t == 0 {
            return out;
        }

        let mean = self.mean_positions;
        let arg = Array2::from_shape_fn((idx.len(), n_k), |(j, q)| {
            (0..3).map(|c| k_vectors[[q, c]] * mean[[idx[j], c]]).sum::<f64>()
        });
        let cos = arg.mapv(f64::cos);
        let sin = arg.mapv(f64::sin);

        let source = match self.quantity {
            Quantity::Displacement => self.trajectory.positions(),
            Quantity::Velocity => self.trajectory.velocities(),
        };

        for axis in 0..3 {
            let series = Array2::from_shape_fn((n_t, idx.len()), |(t, j)| {
                let v = source[[t, idx[j], axis]];
                match self.quantity {
                    Quantity::Displacement => v - mean[[idx[j], axis]],
                    Quantity::Velocity => v,
                }
            });
            let re = series.dot(&cos);
            let im = series.dot(&sin);
            Zip::from(out.slice_mut(s![.., .., axis]))
                .and(&re)
                .and(&im)
                .for_each(|o, &r, &i| *o = Complex64::new(r, i));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SimulationCell;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use std::f64::consts::PI;

    fn two_atom_trajectory() -> Trajectory {
        let n_t = 4;
        let positions = Array3::from_shape_fn((n_t, 2, 3), |(t, a, c)| {
            let base = if a == 0 { 0.0 } else { 2.5 };
            if c == 0 {
                base + 0.1 * (t as f64 - 1.5)
            } else {
                0.0
            }
        });
        let velocities = Array3::from_shape_fn((n_t, 2, 3), |(t, a, c)| {
            if c == 1 {
                (t + a) as f64
            } else {
                0.0
            }
        });
        Trajectory::new(positions, velocities, vec![1, 2], SimulationCell::cubic(10.0), 1.0)
            .unwrap()
    }

    #[test]
    fn test_velocity_projection_matches_direct_sum() {
        let traj = two_atom_trajectory();
        let mean = traj.mean_positions();
        let projector = SpaceTimeProjector::new(&traj, &mean, Quantity::Velocity);
        let k = array![[0.0, 0.0, 0.0], [PI / 2.5, 0.0, 0.0]];
        let out = projector.project(&AtomGroup::all(2), k.view());
        assert_eq!(out.dim(), (4, 2, 3));

        for t in 0..4 {
            // at k = 0 the phases are all one
            assert_abs_diff_eq!(out[[t, 0, 1]].re, (2 * t + 1) as f64, epsilon = 1e-12);
            // atom 1 sits half a wavelength away, so its phase is -1
            assert_abs_diff_eq!(out[[t, 1, 1]].re, t as f64 - (t + 1) as f64, epsilon = 1e-12);
            assert_abs_diff_eq!(out[[t, 1, 1]].im, 0.0, epsilon = 1e-12);
            assert_eq!(out[[t, 1, 0]], Complex64::new(0.0, 0.0));
        }
    }

    #[test]
    fn test_displacement_projection_subtracts_mean() {
        let traj = two_atom_trajectory();
        let mean = traj.mean_positions();
        let projector = SpaceTimeProjector::new(&traj, &mean, Quantity::Displacement);
        let k = array![[0.0, 0.0, 0.0]];
        let out = projector.project(&AtomGroup::from_indices(vec![0]), k.view());
        assert_abs_diff_eq!(out[[0, 0, 0]].re, -0.15, epsilon = 1e-12);
        assert_abs_diff_eq!(out[[3, 0, 0]].re, 0.15, epsilon = 1e-12);
    }

    #[test]
    fn test_empty_group_projects_to_zero() {
        let traj = two_atom_trajectory();
        let mean = traj.mean_positions();
        let projector = SpaceTimeProjector::new(&traj, &mean, Quantity::Velocity);
        let k = array![[1.0, 0.0, 0.0]];
        let out = projector.project(&AtomGroup::default(), k.view());
        assert_eq!(out.dim(), (4, 1, 3));
        assert!(out.iter().all(|z| z.norm() == 0.0));
    }
}
