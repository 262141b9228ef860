//! Parser for LAMMPS text dump files.
//!
//! A dump is a sequence of frames, each of the form
//! ```text
//! ITEM: TIMESTEP
//! <step>
//! ITEM: NUMBER OF ATOMS
//! <n>
//! ITEM: BOX BOUNDS [xy xz yz] pp pp pp
//! <xlo> <xhi> [<xy>]
//! <ylo> <yhi> [<xz>]
//! <zlo> <zhi> [<yz>]
//! ITEM: ATOMS id type xu yu zu vx vy vz
//! <n rows>
//! ```
//!
//! Triclinic bounds are bounding-box bounds and are converted back to the
//! cell edges. Unwrapped coordinates (`xu yu zu`) are preferred; wrapped
//! (`x y z`) or scaled (`xs ys zs`) coordinates are unwrapped frame to frame.

use std::fs;
use std::path::Path;
use std::str::FromStr;

use nalgebra::Vector3;
use ndarray::Array3;
use phonosed_core::{SimulationCell, Trajectory};

use super::ParseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Coordinates {
    Unwrapped,
    Wrapped,
    Scaled,
}

/// Column positions within an `ITEM: ATOMS` row.
#[derive(Debug, Clone)]
struct Columns {
    id: usize,
    atom_type: usize,
    position: [usize; 3],
    velocity: [usize; 3],
    kind: Coordinates,
    width: usize,
}

impl Columns {
    fn from_header(names: &str, line: usize) -> Result<Self, ParseError> {
        let names: Vec<&str> = names.split_whitespace().collect();
        let find = |name: &str| names.iter().position(|n| *n == name);
        let require = |name: &str| {
            find(name).ok_or_else(|| ParseError::FormatError {
                line,
                message: format!("missing required column '{}'", name),
            })
        };
        let triple = |a: &str, b: &str, c: &str| match (find(a), find(b), find(c)) {
            (Some(i), Some(j), Some(k)) => Some([i, j, k]),
            _ => None,
        };

        let (position, kind) = if let Some(p) = triple("xu", "yu", "zu") {
            (p, Coordinates::Unwrapped)
        } else if let Some(p) = triple("x", "y", "z") {
            (p, Coordinates::Wrapped)
        } else if let Some(p) = triple("xs", "ys", "zs") {
            (p, Coordinates::Scaled)
        } else {
            return Err(ParseError::FormatError {
                line,
                message: "no position columns (xu yu zu, x y z or xs ys zs)".into(),
            });
        };

        Ok(Self {
            id: require("id")?,
            atom_type: require("type")?,
            position,
            velocity: [require("vx")?, require("vy")?, require("vz")?],
            kind,
            width: names.len(),
        })
    }
}

/// One frame with atoms sorted by id.
struct Frame {
    ids: Vec<u64>,
    types: Vec<u32>,
    positions: Vec<[f64; 3]>,
    velocities: Vec<[f64; 3]>,
    cell: SimulationCell,
    kind: Coordinates,
}

/// Line cursor that keeps 1-based line numbers for error messages.
struct Lines<'a> {
    inner: std::iter::Enumerate<std::str::Lines<'a>>,
    last: usize,
}

impl<'a> Lines<'a> {
    fn new(content: &'a str) -> Self {
        Self {
            inner: content.lines().enumerate(),
            last: 0,
        }
    }

    fn next_nonblank(&mut self) -> Option<(usize, &'a str)> {
        for (i, line) in self.inner.by_ref() {
            self.last = i + 1;
            let line = line.trim();
            if !line.is_empty() {
                return Some((i + 1, line));
            }
        }
        None
    }

    fn expect(&mut self, what: &str) -> Result<(usize, &'a str), ParseError> {
        self.next_nonblank().ok_or_else(|| ParseError::FormatError {
            line: self.last + 1,
            message: format!("unexpected end of file, expected {}", what),
        })
    }

    fn expect_item(&mut self, item: &str) -> Result<(usize, &'a str), ParseError> {
        let (line, text) = self.expect(item)?;
        match text.strip_prefix(item) {
            Some(rest) => Ok((line, rest)),
            None => Err(ParseError::FormatError {
                line,
                message: format!("expected '{}', got '{}'", item, text),
            }),
        }
    }
}

fn parse_value<T: FromStr>(token: &str, line: usize, what: &str) -> Result<T, ParseError> {
    token.parse().map_err(|_| ParseError::FormatError {
        line,
        message: format!("invalid {}: '{}'", what, token),
    })
}

/// Convert LAMMPS box bounds (`lo hi tilt` per row) to a cell.
///
/// Triclinic `lo`/`hi` values are the bounds of the enclosing orthogonal
/// box, so the tilt extents are removed before forming the edges.
fn cell_from_bounds(bounds: &[[f64; 3]; 3]) -> SimulationCell {
    let (xy, xz, yz) = (bounds[0][2], bounds[1][2], bounds[2][2]);
    let xlo = bounds[0][0] - 0.0_f64.min(xy).min(xz).min(xy + xz);
    let xhi = bounds[0][1] - 0.0_f64.max(xy).max(xz).max(xy + xz);
    let ylo = bounds[1][0] - 0.0_f64.min(yz);
    let yhi = bounds[1][1] - 0.0_f64.max(yz);
    let (zlo, zhi) = (bounds[2][0], bounds[2][1]);
    SimulationCell::from_edges([xhi - xlo, 0.0, 0.0], [xy, yhi - ylo, 0.0], [xz, yz, zhi - zlo])
        .with_origin([xlo, ylo, zlo])
}

fn parse_frame(lines: &mut Lines<'_>) -> Result<Frame, ParseError> {
    let (ln, step) = lines.expect("timestep value")?;
    parse_value::<f64>(step, ln, "timestep")?;

    lines.expect_item("ITEM: NUMBER OF ATOMS")?;
    let (ln, count) = lines.expect("atom count")?;
    let n_atoms: usize = parse_value(count, ln, "atom count")?;

    let (_, box_header) = lines.expect_item("ITEM: BOX BOUNDS")?;
    let triclinic = box_header.split_whitespace().any(|t| t == "xy");
    let mut bounds = [[0.0; 3]; 3];
    for row in bounds.iter_mut() {
        let (ln, text) = lines.expect("box bounds")?;
        let values = text
            .split_whitespace()
            .map(|t| parse_value::<f64>(t, ln, "box bound"))
            .collect::<Result<Vec<_>, _>>()?;
        let needed = if triclinic { 3 } else { 2 };
        if values.len() < needed {
            return Err(ParseError::FormatError {
                line: ln,
                message: format!("expected {} box values, got {}", needed, values.len()),
            });
        }
        row[..needed].copy_from_slice(&values[..needed]);
    }
    let cell = cell_from_bounds(&bounds);

    let (ln, names) = lines.expect_item("ITEM: ATOMS")?;
    let columns = Columns::from_header(names, ln)?;

    let mut rows: Vec<(u64, u32, [f64; 3], [f64; 3])> = Vec::with_capacity(n_atoms);
    for _ in 0..n_atoms {
        let (ln, text) = lines.expect("atom row")?;
        let tokens: Vec<&str> = text.split_whitespace().collect();
        if tokens.len() < columns.width {
            return Err(ParseError::FormatError {
                line: ln,
                message: format!("expected {} columns, got {}", columns.width, tokens.len()),
            });
        }
        let id: u64 = parse_value(tokens[columns.id], ln, "atom id")?;
        let atom_type: u32 = parse_value(tokens[columns.atom_type], ln, "atom type")?;
        let mut position = [0.0; 3];
        let mut velocity = [0.0; 3];
        for c in 0..3 {
            position[c] = parse_value(tokens[columns.position[c]], ln, "coordinate")?;
            velocity[c] = parse_value(tokens[columns.velocity[c]], ln, "velocity")?;
        }
        rows.push((id, atom_type, position, velocity));
    }
    rows.sort_by_key(|r| r.0);
    if let Some(pair) = rows.windows(2).find(|w| w[0].0 == w[1].0) {
        return Err(ParseError::Inconsistent(format!("duplicate atom id {}", pair[0].0)));
    }

    let mut positions: Vec<[f64; 3]> = rows.iter().map(|r| r.2).collect();
    if columns.kind == Coordinates::Scaled {
        let origin = Vector3::from(cell.origin);
        for p in positions.iter_mut() {
            let r = origin + cell.matrix * Vector3::from(*p);
            *p = [r.x, r.y, r.z];
        }
    }

    Ok(Frame {
        ids: rows.iter().map(|r| r.0).collect(),
        types: rows.iter().map(|r| r.1).collect(),
        velocities: rows.iter().map(|r| r.3).collect(),
        positions,
        cell,
        kind: columns.kind,
    })
}

fn point(p: &Array3<f64>, f: usize, a: usize) -> Vector3<f64> {
    Vector3::new(p[[f, a, 0]], p[[f, a, 1]], p[[f, a, 2]])
}

/// Remove periodic jumps: each step's fractional displacement is reduced by
/// its nearest integer and accumulated.
fn unwrap_positions(positions: &mut Array3<f64>, cell: &SimulationCell) -> Result<(), ParseError> {
    let inverse = cell.inverse().ok_or_else(|| {
        ParseError::Inconsistent("cell matrix is singular; cannot unwrap coordinates".into())
    })?;
    let (n_frames, n_atoms, _) = positions.dim();
    if n_frames == 0 {
        return Ok(());
    }
    let mut previous: Vec<Vector3<f64>> = (0..n_atoms).map(|a| point(positions, 0, a)).collect();
    for f in 1..n_frames {
        for (a, prev) in previous.iter_mut().enumerate() {
            let raw = point(positions, f, a);
            let frac = (inverse * (raw - *prev)).map(|x| x - x.round());
            let step = cell.matrix * frac;
            for c in 0..3 {
                positions[[f, a, c]] = positions[[f - 1, a, c]] + step[c];
            }
            *prev = raw;
        }
    }
    Ok(())
}

/// Parse a LAMMPS text dump held in memory.
///
/// # Arguments
/// * `content` - Full dump text.
/// * `dt_ps` - Time between stored frames (ps).
pub fn parse_lammps_dump(content: &str, dt_ps: f64) -> Result<Trajectory, ParseError> {
    let mut lines = Lines::new(content);
    let mut frames: Vec<Frame> = Vec::new();

    while let Some((ln, text)) = lines.next_nonblank() {
        if !text.starts_with("ITEM: TIMESTEP") {
            return Err(ParseError::FormatError {
                line: ln,
                message: format!("expected 'ITEM: TIMESTEP', got '{}'", text),
            });
        }
        let frame = parse_frame(&mut lines)?;
        if let Some(first) = frames.first() {
            let index = frames.len();
            if frame.ids.len() != first.ids.len() {
                return Err(ParseError::Inconsistent(format!(
                    "frame {} has {} atoms, frame 0 has {}",
                    index,
                    frame.ids.len(),
                    first.ids.len()
                )));
            }
            if frame.ids != first.ids {
                return Err(ParseError::Inconsistent(format!(
                    "frame {} has different atom ids than frame 0",
                    index
                )));
            }
            if frame.types != first.types {
                return Err(ParseError::Inconsistent(format!(
                    "frame {} changes atom type labels",
                    index
                )));
            }
        }
        frames.push(frame);
    }

    let first = frames.first().ok_or_else(|| ParseError::FormatError {
        line: 1,
        message: "no frames found".into(),
    })?;
    let n_frames = frames.len();
    let n_atoms = first.ids.len();
    let cell = first.cell.clone();
    let types = first.types.clone();
    let needs_unwrap = frames.iter().any(|f| f.kind != Coordinates::Unwrapped);

    let mut positions = Array3::from_shape_fn((n_frames, n_atoms, 3), |(f, a, c)| {
        frames[f].positions[a][c]
    });
    let velocities = Array3::from_shape_fn((n_frames, n_atoms, 3), |(f, a, c)| {
        frames[f].velocities[a][c]
    });
    if needs_unwrap {
        log::debug!("Unwrapping wrapped coordinates across {} frames", n_frames);
        unwrap_positions(&mut positions, &cell)?;
    }

    log::info!(
        "Read {} frames of {} atoms from LAMMPS dump (volume {:.3} Å³)",
        n_frames,
        n_atoms,
        cell.volume()
    );
    Ok(Trajectory::new(positions, velocities, types, cell, dt_ps)?)
}

/// Read a LAMMPS text dump from disk.
pub fn read_lammps_dump(path: impl AsRef<Path>, dt_ps: f64) -> Result<Trajectory, ParseError> {
    let content = fs::read_to_string(path.as_ref())?;
    parse_lammps_dump(&content, dt_ps)
}
