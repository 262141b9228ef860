//! Phonosed command-line interface.
//!
//! Run SED analyses from TOML configuration files:
//! ```sh
//! phonosed run job.toml
//! phonosed validate job.toml
//! phonosed info run.lammpstrj --dt 0.005
//! ```

mod config;
mod runner;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "phonosed")]
#[command(about = "Phonosed: Phonon Spectral Energy Density Analysis")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an analysis from a TOML configuration file.
    Run {
        /// Path to the job configuration file.
        config: PathBuf,
        /// Output directory (overrides config file setting).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a configuration file without reading the trajectory.
    Validate {
        /// Path to the job configuration file.
        config: PathBuf,
    },
    /// Summarise a trajectory file.
    Info {
        /// Path to the trajectory file.
        trajectory: PathBuf,
        /// Time between stored frames in ps.
        #[arg(long, default_value_t = 1.0)]
        dt: f64,
        /// File format ("auto" picks from the extension).
        #[arg(long, default_value = "auto")]
        format: String,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, output } => {
            println!("Phonosed SED Analysis");
            println!("=====================");
            let job = config::load_config(&config)?;
            job.validate()?;
            println!("Configuration: {}", config.display());

            let result = runner::run_analysis(&job)?;

            let out_dir = output.unwrap_or_else(|| PathBuf::from(&job.output.directory));
            let written = runner::write_outputs(&result, &out_dir, &job)?;

            println!("Analysis complete: {} files written.", written.len());
            Ok(())
        }
        Commands::Validate { config } => {
            let job = config::load_config(&config)?;
            job.validate()?;
            println!("Configuration is valid: {}", config.display());
            Ok(())
        }
        Commands::Info {
            trajectory,
            dt,
            format,
        } => {
            let traj = phonosed_io::read_trajectory(&trajectory, dt, Some(format.as_str()))?;
            println!("Trajectory: {}", trajectory.display());
            runner::describe_trajectory(&traj);
            Ok(())
        }
    }
}
