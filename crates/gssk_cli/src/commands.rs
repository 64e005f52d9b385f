//! Subcommand implementations.

use crate::{Cli, Commands};
use anyhow::{Context, Result};
use gssk_core::{calibrate, run_ensemble, Instance, NodeObservations};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

pub fn execute(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Simulate { model, output } => cmd_simulate(&model, output.as_deref()),
        Commands::Ensemble {
            model,
            runs,
            perturbation,
            seed,
            output,
        } => cmd_ensemble(&model, runs, perturbation, seed, output.as_deref()),
        Commands::Calibrate {
            model,
            observations,
            iterations,
            seed,
            trajectory,
        } => cmd_calibrate(&model, &observations, iterations, seed, trajectory),
    }
}

fn load_instance(path: &Path) -> Result<Instance> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("failed to read model {}", path.display()))?;
    let instance = Instance::from_json(&json)
        .with_context(|| format!("invalid model {}", path.display()))?;
    info!(
        nodes = instance.node_count(),
        edges = instance.edge_count(),
        method = ?instance.method(),
        "model loaded"
    );
    Ok(instance)
}

pub(crate) fn parse_observations(json: &str) -> Result<Vec<NodeObservations>> {
    serde_json::from_str(json).context("observations must be a list of {node_id, samples}")
}

/// Opens `path` for writing, or stdout when no path is given.
fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    match path {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            Ok(Box::new(BufWriter::new(file)))
        }
        None => Ok(Box::new(io::stdout().lock())),
    }
}

fn cmd_simulate(model: &Path, output: Option<&Path>) -> Result<()> {
    let mut instance = load_instance(model)?;
    let trajectory = instance.simulate();
    if let Some(t) = trajectory.diverged_at {
        tracing::warn!(time = t, "trajectory truncated at divergence");
    }
    trajectory
        .write_csv(open_output(output)?)
        .context("failed to write trajectory")?;
    info!(rows = trajectory.len(), "simulation complete");
    Ok(())
}

fn cmd_ensemble(
    model: &Path,
    runs: usize,
    perturbation: f64,
    seed: u64,
    output: Option<&Path>,
) -> Result<()> {
    let mut instance = load_instance(model)?;
    let mut rng = StdRng::seed_from_u64(seed);
    let result = run_ensemble(&mut instance, runs, perturbation, &mut rng)?;
    info!(
        runs = result.runs,
        diverged = result.diverged_runs,
        "ensemble complete"
    );

    let mut out = open_output(output)?;
    serde_json::to_writer_pretty(&mut out, &result).context("failed to write ensemble")?;
    writeln!(out)?;
    Ok(())
}

fn cmd_calibrate(
    model: &Path,
    observations: &Path,
    iterations: usize,
    seed: u64,
    trajectory: Option<PathBuf>,
) -> Result<()> {
    let mut instance = load_instance(model)?;
    let json = fs::read_to_string(observations)
        .with_context(|| format!("failed to read observations {}", observations.display()))?;
    let observations = parse_observations(&json)?;

    let mut rng = StdRng::seed_from_u64(seed);
    let report = calibrate(&mut instance, &observations, iterations, &mut rng)?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    serde_json::to_writer_pretty(&mut out, &report).context("failed to write report")?;
    writeln!(out)?;

    if let Some(path) = trajectory {
        instance
            .simulate()
            .write_csv(open_output(Some(&path))?)
            .context("failed to write calibrated trajectory")?;
    }
    Ok(())
}
