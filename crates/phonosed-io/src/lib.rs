//! # Phonosed IO
//!
//! Reading molecular-dynamics trajectories into [`phonosed_core::Trajectory`]
//! and writing reconstructed or filtered motion back out as LAMMPS dumps.
//!
//! ## Modules
//!
//! - [`parsers`]: Trajectory readers and the shared [`ParseError`].
//! - [`dump`]: LAMMPS text dump writer.

pub mod dump;
pub mod parsers;

pub use dump::{write_dump, write_dump_file};
pub use parsers::lammps::{parse_lammps_dump, read_lammps_dump};
pub use parsers::{read_trajectory, ParseError};
