//! Integration tests: trajectory → k-points → SED.
//!
//! Trajectories are synthesised in memory so that the expected spectra can be
//! written down analytically.

use std::f64::consts::PI;

use approx::{assert_abs_diff_eq, assert_relative_eq};
use ndarray::{Array2, Array3};

use phonosed_core::chiral::{chiral_phase, ChiralMode};
use phonosed_core::kspace::{k_grid, KPlane};
use phonosed_core::{
    AtomSelector, Diagnostic, DirectionSpec, Quantity, SedCalculator, SimulationCell,
    SummationMode, Trajectory,
};

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Two atoms in a 10 Å cube: atom 0 at rest, atom 1 oscillating along x as
/// `amplitude * cos(2π f0 t)`.
fn oscillator_trajectory(n_frames: usize, dt: f64, f0: f64, amplitude: f64) -> Trajectory {
    let rest = [2.0, 2.0, 2.0];
    let centre = [6.0, 5.0, 5.0];
    let mut positions = Array3::zeros((n_frames, 2, 3));
    let mut velocities = Array3::zeros((n_frames, 2, 3));
    for t in 0..n_frames {
        let w = 2.0 * PI * f0;
        let time = t as f64 * dt;
        for c in 0..3 {
            positions[[t, 0, c]] = rest[c];
            positions[[t, 1, c]] = centre[c];
        }
        positions[[t, 1, 0]] += amplitude * (w * time).cos();
        velocities[[t, 1, 0]] = -amplitude * w * (w * time).sin();
    }
    Trajectory::new(positions, velocities, vec![1, 2], SimulationCell::cubic(10.0), dt).unwrap()
}

/// A six-atom chain with incommensurate motion on all three axes.
fn chain_trajectory() -> Trajectory {
    let n_frames = 24;
    let n_atoms = 6;
    let spacing = 2.5;
    let positions = Array3::from_shape_fn((n_frames, n_atoms, 3), |(t, a, c)| {
        let base = if c == 0 { a as f64 * spacing } else { 1.0 };
        let phase = 0.9 * t as f64 + 1.3 * a as f64 + 0.7 * c as f64;
        base + 0.04 * phase.sin() + 0.02 * (2.1 * phase).cos()
    });
    let velocities = Array3::from_shape_fn((n_frames, n_atoms, 3), |(t, a, c)| {
        (0.45 * t as f64 + 0.8 * a as f64 - 0.3 * c as f64).sin()
    });
    let types = vec![1, 2, 1, 2, 1, 2];
    let cell = SimulationCell::orthorhombic(spacing * n_atoms as f64, 8.0, 8.0);
    Trajectory::new(positions, velocities, types, cell, 0.002).unwrap()
}

fn assert_arrays_close(a: &Array2<f64>, b: &Array2<f64>, eps: f64) {
    assert_eq!(a.dim(), b.dim());
    for (x, y) in a.iter().zip(b.iter()) {
        assert_abs_diff_eq!(*x, *y, epsilon = eps);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// End-to-end spectrum
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_single_oscillator_peaks_at_drive_frequency() {
    let amplitude = 0.3;
    let f0 = 1.0 / 8.0;
    let traj = oscillator_trajectory(8, 1.0, f0, amplitude);
    let calc = SedCalculator::new(&traj, 1, 1, 1, Quantity::Displacement).unwrap();

    let path = calc.k_path(&"x".into(), 1.0, 4, None).unwrap();
    assert!(path.diagnostics.is_empty());
    let kp = path.value;
    assert_abs_diff_eq!(kp.magnitudes[3], 2.0 * PI / 10.0, epsilon = 1e-12);

    let out = calc
        .calculate(&kp, &AtomSelector::all(), SummationMode::Coherent, 64)
        .unwrap();
    assert!(out.diagnostics.is_empty());
    let sed = out.value;
    assert!(sed.is_complex());
    assert_eq!(sed.frequencies().len(), 8);

    let bin = sed.nearest_frequency_index(f0).unwrap();
    let neg_bin = sed.nearest_frequency_index(-f0).unwrap();
    assert_eq!((bin, neg_bin), (1, 7));

    let x = sed.polarization(0).unwrap();
    for k in 0..4 {
        assert_relative_eq!(x[[bin, k]].norm(), amplitude / 2.0, epsilon = 1e-12);
        assert_relative_eq!(x[[neg_bin, k]].norm(), amplitude / 2.0, epsilon = 1e-12);
        for w in (0..8).filter(|&w| w != bin && w != neg_bin) {
            assert_abs_diff_eq!(x[[w, k]].norm(), 0.0, epsilon = 1e-12);
        }
    }

    let intensity = sed.intensity();
    let (w_peak, _, peak) = sed.peak().unwrap();
    assert!(w_peak == bin || w_peak == neg_bin);
    assert_relative_eq!(peak, (amplitude / 2.0).powi(2), epsilon = 1e-12);
    assert_abs_diff_eq!(intensity[[0, 2]], 0.0, epsilon = 1e-12);
}

#[test]
fn test_velocity_spectrum_scales_with_angular_frequency() {
    let amplitude = 0.3;
    let f0 = 1.0 / 8.0;
    let traj = oscillator_trajectory(8, 1.0, f0, amplitude);
    let calc = SedCalculator::new(&traj, 1, 1, 1, Quantity::Velocity).unwrap();
    let kp = calc.k_path(&"x".into(), 1.0, 2, None).unwrap().into_value();
    let sed = calc
        .calculate(&kp, &AtomSelector::all(), SummationMode::Coherent, 1)
        .unwrap()
        .into_value();
    let x = sed.polarization(0).unwrap();
    let expected = amplitude * 2.0 * PI * f0 / 2.0;
    assert_relative_eq!(x[[1, 0]].norm(), expected, epsilon = 1e-12);
}

// ─────────────────────────────────────────────────────────────────────────────
// Chunking and summation
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_result_independent_of_chunk_size() {
    let traj = chain_trajectory();
    let calc = SedCalculator::new(&traj, 6, 1, 1, Quantity::Velocity).unwrap();
    let kp = calc.k_path(&DirectionSpec::Angle(30.0), 1.5, 13, None).unwrap().into_value();

    let reference = calc
        .calculate(&kp, &AtomSelector::all(), SummationMode::Coherent, kp.len())
        .unwrap()
        .into_value();
    for chunk in [1, 7] {
        let other = calc
            .calculate(&kp, &AtomSelector::all(), SummationMode::Coherent, chunk)
            .unwrap()
            .into_value();
        for axis in 0..3 {
            let a = reference.polarization(axis).unwrap();
            let b = other.polarization(axis).unwrap();
            for (x, y) in a.iter().zip(b.iter()) {
                assert_abs_diff_eq!(x.re, y.re, epsilon = 1e-12);
                assert_abs_diff_eq!(x.im, y.im, epsilon = 1e-12);
            }
        }
    }
}

#[test]
fn test_single_group_coherent_matches_incoherent() {
    let traj = chain_trajectory();
    let calc = SedCalculator::new(&traj, 6, 1, 1, Quantity::Displacement).unwrap();
    let kp = calc.k_path(&"x".into(), 1.0, 5, None).unwrap().into_value();

    let coherent = calc
        .calculate(&kp, &AtomSelector::all(), SummationMode::Coherent, 2)
        .unwrap()
        .into_value();
    let incoherent = calc
        .calculate(&kp, &AtomSelector::all(), SummationMode::Incoherent, 3)
        .unwrap()
        .into_value();
    assert_arrays_close(&coherent.intensity(), &incoherent.intensity(), 1e-14);
}

#[test]
fn test_disjoint_groups_add_incoherently() {
    let traj = chain_trajectory();
    let calc = SedCalculator::new(&traj, 6, 1, 1, Quantity::Velocity).unwrap();
    let kp = calc.k_path(&"x".into(), 1.0, 6, None).unwrap().into_value();

    let per_type = calc
        .calculate(&kp, &AtomSelector::types(vec![1, 2]), SummationMode::Incoherent, 4)
        .unwrap()
        .into_value();
    assert!(!per_type.is_complex());

    let type1 = calc
        .calculate(&kp, &AtomSelector::types(vec![1]), SummationMode::Coherent, 4)
        .unwrap()
        .into_value();
    let type2 = calc
        .calculate(&kp, &AtomSelector::index_groups(vec![vec![1, 3, 5]]), SummationMode::Coherent, 4)
        .unwrap()
        .into_value();
    let expected = type1.intensity() + type2.intensity();
    assert_arrays_close(&per_type.intensity(), &expected, 1e-12);

    // the same two types summed coherently interfere
    let both = calc
        .calculate(&kp, &AtomSelector::types(vec![1, 2]), SummationMode::Coherent, 4)
        .unwrap()
        .into_value();
    assert!(both.is_complex());
    let diff: f64 = (&both.intensity() - &expected).iter().map(|v| v.abs()).sum();
    assert!(diff > 1e-8);
}

#[test]
fn test_missing_type_falls_back_with_diagnostics() {
    let traj = chain_trajectory();
    let calc = SedCalculator::new(&traj, 6, 1, 1, Quantity::Velocity).unwrap();
    let kp = calc.k_path(&"x".into(), 1.0, 3, None).unwrap().into_value();
    let out = calc
        .calculate(&kp, &AtomSelector::types(vec![5]), SummationMode::Incoherent, 4)
        .unwrap();
    assert!(out.has(|d| matches!(d, Diagnostic::EmptyGroup { .. })));
    assert!(out.has(|d| *d == Diagnostic::AllGroupsEmpty));

    let all = calc
        .calculate(&kp, &AtomSelector::all(), SummationMode::Coherent, 4)
        .unwrap()
        .into_value();
    assert_arrays_close(&out.value.intensity(), &all.intensity(), 1e-14);
}

// ─────────────────────────────────────────────────────────────────────────────
// k-grids and chiral phase
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_k_grid_sed_keeps_grid_shape() {
    let traj = chain_trajectory();
    let calc = SedCalculator::new(&traj, 6, 1, 1, Quantity::Velocity).unwrap();
    let grid = k_grid(KPlane::Xy, (-1.0, 1.0), (-1.0, 1.0), 3, 3, 0.0).unwrap();
    assert_eq!(grid.len(), 9);
    assert!(grid.vectors.column(2).iter().all(|&z| z == 0.0));

    let sed = calc
        .calculate(&grid, &AtomSelector::all(), SummationMode::Coherent, 4)
        .unwrap()
        .into_value();
    assert_eq!(sed.grid_shape(), Some((3, 3)));
    assert!(sed.k_magnitudes().is_empty());
    assert_eq!(sed.intensity().dim(), (24, 9));
}

#[test]
fn test_chiral_phase_of_coherent_result() {
    let traj = chain_trajectory();
    let calc = SedCalculator::new(&traj, 6, 1, 1, Quantity::Velocity).unwrap();
    let kp = calc.k_path(&"x".into(), 1.0, 8, None).unwrap().into_value();
    let sed = calc
        .calculate(&kp, &AtomSelector::all(), SummationMode::Coherent, 8)
        .unwrap()
        .into_value();

    let x = sed.polarization(0).unwrap();
    let y = sed.polarization(1).unwrap();
    let same = chiral_phase(x, x, &ChiralMode::C).unwrap().value;
    assert!(same.iter().all(|&v| v.abs() < 1e-12));

    let phase = chiral_phase(x, y, &ChiralMode::C).unwrap().value;
    assert!(phase.iter().all(|&v| v > -PI / 2.0 && v <= PI / 2.0));

    let with_phase = sed.with_phase(phase.clone()).unwrap();
    assert_eq!(with_phase.phase(), Some(&phase));
    assert!(sed.phase().is_none());

    let incoherent = calc
        .calculate(&kp, &AtomSelector::types(vec![1, 2]), SummationMode::Incoherent, 8)
        .unwrap()
        .into_value();
    assert!(incoherent.polarization(0).is_err());
}
