//! Analysis runner: ties together trajectory loading, SED jobs and output.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ndarray::{Array3, Axis};
use serde::Serialize;

use phonosed_core::chiral::chiral_phase;
use phonosed_core::filter::{band_filter, rescale_rms};
use phonosed_core::ised::{reconstruct, IsedResult};
use phonosed_core::{SedCalculator, SedData, SedResult, SimulationCell, SummationMode, Trajectory};
use phonosed_io::{read_trajectory, write_dump_file};

use crate::config::{ChiralConfig, FilterConfig, JobConfig};

/// One computed SED, labelled with the job that produced it.
pub struct NamedSed {
    pub name: String,
    pub result: SedResult,
}

/// Results from an analysis run.
pub struct AnalysisOutput {
    /// Path jobs first, in file order, then grid jobs.
    pub spectra: Vec<NamedSed>,
    /// How many leading entries of `spectra` are path jobs.
    pub n_paths: usize,
    pub ised: Option<IsedResult>,
    /// Band-filtered positions, shape (frames, atoms, 3).
    pub filtered: Option<Array3<f64>>,
    pub types: Vec<u32>,
    pub cell: SimulationCell,
}

/// A positive-frequency point of a dispersion map.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispersionPoint {
    pub kx: f64,
    pub ky: f64,
    pub kz: f64,
    pub freq_thz: f64,
    /// Σ|amplitude| over polarizations for coherent results, intensity otherwise.
    pub amplitude: f64,
}

/// A dispersion point tagged with the path job it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathPoint<'a> {
    pub path: &'a str,
    #[serde(flatten)]
    pub point: DispersionPoint,
}

/// Run every job in a parsed configuration.
pub fn run_analysis(job: &JobConfig) -> Result<AnalysisOutput> {
    let trajectory = read_trajectory(
        &job.trajectory.path,
        job.trajectory.dt_ps,
        Some(job.trajectory.format.as_str()),
    )
    .with_context(|| format!("Failed to load trajectory '{}'", job.trajectory.path))?;
    println!(
        "Trajectory: {} frames, {} atoms, dt = {} ps",
        trajectory.n_frames(),
        trajectory.n_atoms(),
        trajectory.dt_ps()
    );

    let lattice = &job.lattice;
    let calc = SedCalculator::new(
        &trajectory,
        lattice.nx,
        lattice.ny,
        lattice.nz,
        job.analysis.quantity,
    )
    .context("Failed to set up SED calculator")?;
    let analysis = &job.analysis;
    let recip = calc.lattice().reciprocal();
    println!(
        "Primitive cell: {:.4} Å³, |b1| = {:.4}, |b2| = {:.4}, |b3| = {:.4} Å⁻¹",
        calc.lattice().volume().abs(),
        recip[0].norm(),
        recip[1].norm(),
        recip[2].norm()
    );
    println!(
        "Quantity: {:?}, summation: {}, k-chunk size: {}",
        calc.quantity(),
        analysis.summation,
        analysis.k_chunk_size
    );

    let mut spectra = Vec::with_capacity(job.path.len() + job.grid.len());

    for p in &job.path {
        let kpoints = calc
            .k_path(&p.direction, p.bz_coverage, p.n_k, p.lattice_parameter)
            .with_context(|| format!("Path '{}'", p.name))?
            .value;
        println!(
            "  Path '{}': direction {}, {} k-points up to {:.4} Å⁻¹",
            p.name,
            p.direction,
            kpoints.len(),
            kpoints.magnitudes.iter().last().copied().unwrap_or(0.0)
        );
        let result = calc
            .calculate(&kpoints, &analysis.selector, analysis.summation, analysis.k_chunk_size)
            .with_context(|| format!("SED for path '{}'", p.name))?
            .value;
        let result = attach_chiral(result, job.chiral.as_ref(), &p.name)?;
        spectra.push(NamedSed {
            name: p.name.clone(),
            result,
        });
    }

    let n_paths = spectra.len();
    for g in &job.grid {
        let kpoints = calc
            .k_grid(
                g.plane,
                (g.range_a[0], g.range_a[1]),
                (g.range_b[0], g.range_b[1]),
                g.n_a,
                g.n_b,
                g.fixed,
            )
            .with_context(|| format!("Grid '{}'", g.name))?;
        println!(
            "  Grid '{}': {:?} plane, {}x{} k-points",
            g.name, g.plane, g.n_a, g.n_b
        );
        let result = calc
            .calculate(&kpoints, &analysis.selector, analysis.summation, analysis.k_chunk_size)
            .with_context(|| format!("SED for grid '{}'", g.name))?
            .value;
        let result = attach_chiral(result, job.chiral.as_ref(), &g.name)?;
        spectra.push(NamedSed {
            name: g.name.clone(),
            result,
        });
    }

    for named in &spectra {
        if let Some((i, j, peak)) = named.result.peak() {
            println!(
                "  '{}' peak: {:.3e} at {:.3} THz, k-index {}",
                named.name,
                peak,
                named.result.frequencies()[i],
                j
            );
        }
    }

    let ised = match &job.ised {
        Some(request) => {
            println!(
                "Reconstructing mode near k = {:.4} Å⁻¹, ω = {:.3} THz...",
                request.k_target, request.w_target
            );
            let result = reconstruct(&calc, request).context("iSED reconstruction failed")?.value;
            println!(
                "  Matched k = {:.4} Å⁻¹ (index {}), ω = {:.3} THz (index {})",
                result.k_matched, result.k_index, result.w_matched, result.w_index
            );
            Some(result)
        }
        None => None,
    };

    let filtered = match &job.filter {
        Some(filter) => Some(filtered_positions(&trajectory, filter)?),
        None => None,
    };

    Ok(AnalysisOutput {
        spectra,
        n_paths,
        ised,
        filtered,
        types: trajectory.types().to_vec(),
        cell: trajectory.cell().clone(),
    })
}

/// Add the configured chiral phase to a coherent result.
fn attach_chiral(result: SedResult, chiral: Option<&ChiralConfig>, name: &str) -> Result<SedResult> {
    let Some(chiral) = chiral else {
        return Ok(result);
    };
    if !result.is_complex() {
        log::warn!(
            "'{}' is an incoherent result; skipping chiral phase",
            name
        );
        return Ok(result);
    }
    let [a, b] = chiral.axes;
    let phase = chiral_phase(result.polarization(a)?, result.polarization(b)?, &chiral.mode)?.value;
    Ok(result.with_phase(phase)?)
}

/// Band-filter the trajectory and add the result back onto its reference
/// positions: the first frame for velocities, the mean positions for
/// displacements.
fn filtered_positions(trajectory: &Trajectory, filter: &FilterConfig) -> Result<Array3<f64>> {
    let (source, reference) = if filter.use_velocities {
        (
            trajectory.velocities().clone(),
            trajectory.positions().index_axis(Axis(0), 0).to_owned(),
        )
    } else {
        (trajectory.displacements(), trajectory.mean_positions())
    };
    println!(
        "Filtering {} between {:.3} and {:.3} THz",
        if filter.use_velocities { "velocities" } else { "displacements" },
        filter.w_min,
        filter.w_max
    );
    let mut data = band_filter(&source, trajectory.dt_ps(), filter.w_min, filter.w_max)
        .context("Band filter failed")?
        .value;
    if filter.amplitude != 1.0 {
        data = rescale_rms(&data, filter.amplitude);
    }
    for mut frame in data.outer_iter_mut() {
        frame += &reference;
    }
    Ok(data)
}

/// Write every output file requested by the configuration into `out_dir`.
pub fn write_outputs(output: &AnalysisOutput, out_dir: &Path, job: &JobConfig) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();

    for named in &output.spectra {
        if job.output.save_csv {
            let path = out_dir.join(format!("{}_sed.csv", named.name));
            write_sed_csv(&named.result, &path, &named.name, job)?;
            written.push(path);
        }
        if job.output.save_json {
            let path = out_dir.join(format!("{}_dispersion.json", named.name));
            write_dispersion_json(&named.result, &path)?;
            written.push(path);
        }
    }

    if job.output.save_json && output.n_paths > 0 {
        let path = out_dir.join("dispersion_3d.json");
        write_combined_dispersion_json(&output.spectra[..output.n_paths], &path)?;
        written.push(path);
    }

    if let Some(ised) = &output.ised {
        let dump = out_dir.join("ised.dump");
        write_dump_file(&dump, &ised.positions, &ised.types, &ised.cell)
            .with_context(|| format!("Failed to write {}", dump.display()))?;
        println!("iSED trajectory written to: {}", dump.display());
        written.push(dump);

        let spectrum = out_dir.join("ised_spectrum.csv");
        write_sed_csv(&ised.spectrum, &spectrum, "ised", job)?;
        written.push(spectrum);
    }

    if let Some(filtered) = &output.filtered {
        let dump = out_dir.join("filtered.dump");
        write_dump_file(&dump, filtered, &output.types, &output.cell)
            .with_context(|| format!("Failed to write {}", dump.display()))?;
        println!("Filtered trajectory written to: {}", dump.display());
        written.push(dump);
    }

    Ok(written)
}

/// Write an SED result to a CSV file, one row per (frequency, k) pair.
pub fn write_sed_csv(sed: &SedResult, path: &Path, name: &str, job: &JobConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);
    writeln!(file, "# phonosed spectral energy density: {}", name)?;
    writeln!(file, "# trajectory: {}", job.trajectory.path)?;
    writeln!(
        file,
        "# dt = {} ps, supercell = {}x{}x{}",
        job.trajectory.dt_ps, job.lattice.nx, job.lattice.ny, job.lattice.nz
    )?;
    writeln!(
        file,
        "# quantity = {:?}, summation = {}",
        job.analysis.quantity,
        if sed.is_complex() { SummationMode::Coherent } else { SummationMode::Incoherent }
    )?;
    if let Some((n_a, n_b)) = sed.grid_shape() {
        writeln!(file, "# grid = {}x{}", n_a, n_b)?;
    }
    writeln!(file, "#")?;

    let phase = sed.phase();
    if phase.is_some() {
        writeln!(file, "freq_thz,k_index,k_mag,kx,ky,kz,intensity,phase")?;
    } else {
        writeln!(file, "freq_thz,k_index,k_mag,kx,ky,kz,intensity")?;
    }

    let intensity = sed.intensity();
    let vectors = sed.k_vectors();
    let magnitudes = sed.k_magnitudes();
    for (i, &freq) in sed.frequencies().iter().enumerate() {
        for j in 0..vectors.nrows() {
            let k = vectors.row(j);
            let k_mag = magnitudes
                .get(j)
                .copied()
                .unwrap_or_else(|| k.dot(&k).sqrt());
            write!(
                file,
                "{:.6},{},{:.6},{:.6},{:.6},{:.6},{:.6e}",
                freq, j, k_mag, k[0], k[1], k[2], intensity[[i, j]]
            )?;
            match phase {
                Some(p) => writeln!(file, ",{:.6}", p[[i, j]])?,
                None => writeln!(file)?,
            }
        }
    }
    file.flush()?;

    println!("SED written to: {}", path.display());
    Ok(())
}

/// Collect the non-negative-frequency points of a result as (k, ω, amplitude).
pub fn dispersion_points(sed: &SedResult) -> Vec<DispersionPoint> {
    let amplitude = match sed.data() {
        SedData::Coherent(a) => a.mapv(|z| z.norm()).sum_axis(Axis(2)),
        SedData::Incoherent(a) => a.clone(),
    };
    let vectors = sed.k_vectors();
    let mut points = Vec::new();
    for (i, &freq) in sed.frequencies().iter().enumerate() {
        if freq < 0.0 {
            continue;
        }
        for j in 0..vectors.nrows() {
            points.push(DispersionPoint {
                kx: vectors[[j, 0]],
                ky: vectors[[j, 1]],
                kz: vectors[[j, 2]],
                freq_thz: freq,
                amplitude: amplitude[[i, j]],
            });
        }
    }
    points
}

/// Write the positive-frequency dispersion points of a result as JSON.
pub fn write_dispersion_json(sed: &SedResult, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(&dispersion_points(sed))
        .map_err(|e| anyhow::anyhow!("JSON serialisation error: {}", e))?;
    std::fs::write(path, json)?;

    println!("Dispersion (JSON) written to: {}", path.display());
    Ok(())
}

/// Merge the dispersion points of several path results into one JSON file,
/// so that all directions can be plotted together in (kx, ky, ω).
pub fn write_combined_dispersion_json(spectra: &[NamedSed], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let points: Vec<PathPoint> = spectra
        .iter()
        .flat_map(|named| {
            dispersion_points(&named.result)
                .into_iter()
                .map(move |point| PathPoint {
                    path: &named.name,
                    point,
                })
        })
        .collect();
    let json = serde_json::to_string_pretty(&points)
        .map_err(|e| anyhow::anyhow!("JSON serialisation error: {}", e))?;
    std::fs::write(path, json)?;

    println!(
        "Combined dispersion ({} paths, {} points) written to: {}",
        spectra.len(),
        points.len(),
        path.display()
    );
    Ok(())
}

/// Print a summary of a trajectory file.
pub fn describe_trajectory(trajectory: &Trajectory) {
    let cell = trajectory.cell();
    let n_frames = trajectory.n_frames();
    let dt = trajectory.dt_ps();
    println!("Frames:   {}", n_frames);
    println!("Atoms:    {}", trajectory.n_atoms());
    println!("Timestep: {} ps", dt);
    if n_frames > 0 {
        println!(
            "Frequency resolution: {:.4} THz, Nyquist: {:.3} THz",
            1.0 / (n_frames as f64 * dt),
            0.5 / dt
        );
    }
    println!("Types:");
    for (t, count) in trajectory.type_counts() {
        println!("  {:>4}: {} atoms", t, count);
    }
    println!("Cell edge vectors (Å):");
    for (i, label) in ["a", "b", "c"].iter().enumerate() {
        let e = cell.edge(i);
        println!("  {} = [{:10.4} {:10.4} {:10.4}]", label, e[0], e[1], e[2]);
    }
    println!(
        "Origin: [{:.4}, {:.4}, {:.4}], volume: {:.4} Å³",
        cell.origin[0],
        cell.origin[1],
        cell.origin[2],
        cell.volume()
    );
}
