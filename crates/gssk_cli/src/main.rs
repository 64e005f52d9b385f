//! # gssk
//!
//! Command-line runner for GSSK flow-network models.
//!
//! ```bash
//! gssk simulate model.json -o trajectory.csv
//! gssk ensemble model.json --runs 200 --perturbation 0.1 --seed 7 -o forecast.json
//! gssk calibrate model.json --observations obs.json --iterations 100
//! ```
//!
//! Logging goes to stderr and is filtered by `GSSK_LOG` (default `gssk=info`).

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "gssk")]
#[command(version, about = "General Systems Simulation Kernel", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the configured horizon and write the trajectory as CSV
    Simulate {
        /// Model description (JSON)
        model: PathBuf,

        /// Output file; stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Monte-Carlo forecast over perturbed edge coefficients
    Ensemble {
        /// Model description (JSON)
        model: PathBuf,

        #[arg(short, long, default_value_t = 100)]
        runs: usize,

        /// Relative perturbation applied to every coefficient
        #[arg(short, long, default_value_t = 0.1)]
        perturbation: f64,

        #[arg(short, long, default_value_t = 0)]
        seed: u64,

        /// Output file for the envelopes (JSON); stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Fit edge coefficients to observed node quantities
    Calibrate {
        /// Model description (JSON)
        model: PathBuf,

        /// Observation series (JSON)
        #[arg(long)]
        observations: PathBuf,

        #[arg(short, long, default_value_t = 100)]
        iterations: usize,

        #[arg(short, long, default_value_t = 0)]
        seed: u64,

        /// Also write the calibrated trajectory as CSV
        #[arg(long)]
        trajectory: Option<PathBuf>,
    },
}

fn main() {
    let filter = tracing_subscriber::EnvFilter::try_from_env("GSSK_LOG")
        .unwrap_or_else(|_| "gssk=info".into());

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    if let Err(e) = commands::execute(cli) {
        tracing::error!("Error: {:#}", e);
        std::process::exit(1);
    }
}
