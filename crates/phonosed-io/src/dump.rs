//! LAMMPS text dump writer for reconstructed and filtered trajectories.
//!
//! Every frame is written with a triclinic `BOX BOUNDS xy xz yz pp pp pp`
//! header so that tilted cells round-trip through visualisation tools.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use ndarray::Array3;
use phonosed_core::SimulationCell;

/// LAMMPS bounding-box rows `[lo_bound, hi_bound, tilt]` for a cell.
pub fn bounds_from_cell(cell: &SimulationCell) -> [[f64; 3]; 3] {
    let [lx, ly, lz] = cell.lengths();
    let [xy, xz, yz] = cell.tilts();
    let [xlo, ylo, zlo] = cell.origin;
    [
        [
            xlo + 0.0_f64.min(xy).min(xz).min(xy + xz),
            xlo + lx + 0.0_f64.max(xy).max(xz).max(xy + xz),
            xy,
        ],
        [ylo + 0.0_f64.min(yz), ylo + ly + 0.0_f64.max(yz), xz],
        [zlo, zlo + lz, yz],
    ]
}

/// Write positions (frames, atoms, 3) as a LAMMPS text dump.
///
/// Atom ids are 1-based in array order and the timestep is the frame index.
pub fn write_dump<W: Write>(
    writer: &mut W,
    positions: &Array3<f64>,
    types: &[u32],
    cell: &SimulationCell,
) -> io::Result<()> {
    let (n_frames, n_atoms, n_dim) = positions.dim();
    if n_dim != 3 || types.len() != n_atoms {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "positions shape {:?} does not match {} type labels",
                positions.dim(),
                types.len()
            ),
        ));
    }
    let bounds = bounds_from_cell(cell);

    for frame in 0..n_frames {
        writeln!(writer, "ITEM: TIMESTEP")?;
        writeln!(writer, "{}", frame)?;
        writeln!(writer, "ITEM: NUMBER OF ATOMS")?;
        writeln!(writer, "{}", n_atoms)?;
        writeln!(writer, "ITEM: BOX BOUNDS xy xz yz pp pp pp")?;
        for row in &bounds {
            writeln!(writer, "{:.6} {:.6} {:.6}", row[0], row[1], row[2])?;
        }
        writeln!(writer, "ITEM: ATOMS id type x y z")?;
        for (atom, atom_type) in types.iter().enumerate() {
            writeln!(
                writer,
                "{} {} {:.6} {:.6} {:.6}",
                atom + 1,
                atom_type,
                positions[[frame, atom, 0]],
                positions[[frame, atom, 1]],
                positions[[frame, atom, 2]]
            )?;
        }
    }
    Ok(())
}

/// Write a dump to `path`, creating parent directories as needed.
pub fn write_dump_file(
    path: impl AsRef<Path>,
    positions: &Array3<f64>,
    types: &[u32],
    cell: &SimulationCell,
) -> io::Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(path)?);
    write_dump(&mut writer, positions, types, cell)?;
    writer.flush()?;
    log::info!("Wrote {} frames to {}", positions.dim().0, path.display());
    Ok(())
}
