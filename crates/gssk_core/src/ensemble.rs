//! Monte-Carlo ensemble forecasting over perturbed edge coefficients.

use crate::error::{zeroed, GsskError, Result};
use crate::instance::Instance;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Per (step, node) envelopes across all runs, row-major by step then node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleResult {
    pub node_count: usize,
    pub step_count: usize,
    pub runs: usize,
    pub diverged_runs: usize,
    pub min_envelope: Vec<f64>,
    pub max_envelope: Vec<f64>,
    /// Averaged over the runs that reached each cell rather than over `runs`,
    /// so divergent runs do not drag it below `min_envelope`. NaN where no run did.
    pub mean_envelope: Vec<f64>,
}

impl EnsembleResult {
    fn cell(&self, step: usize, node: usize) -> Option<usize> {
        (step < self.step_count && node < self.node_count).then(|| step * self.node_count + node)
    }

    pub fn min(&self, step: usize, node: usize) -> Option<f64> {
        self.cell(step, node).map(|i| self.min_envelope[i])
    }

    pub fn max(&self, step: usize, node: usize) -> Option<f64> {
        self.cell(step, node).map(|i| self.max_envelope[i])
    }

    pub fn mean(&self, step: usize, node: usize) -> Option<f64> {
        self.cell(step, node).map(|i| self.mean_envelope[i])
    }
}

/// Runs `runs` full-horizon simulations, each with every edge coefficient
/// scaled by an independent factor drawn from `[1 - perturbation, 1 + perturbation]`.
///
/// The instance is observably unchanged afterwards. A run that diverges stops
/// contributing from the divergent step on; the mean of each cell is taken
/// over the runs that reached it, and cells no run reached are NaN.
pub fn run_ensemble<R: Rng + ?Sized>(
    instance: &mut Instance,
    runs: usize,
    perturbation: f64,
    rng: &mut R,
) -> Result<EnsembleResult> {
    if runs == 0 {
        return Err(GsskError::InvalidArgument(
            "ensemble requires at least one run".into(),
        ));
    }
    // The sampling range is [1 - p, 1 + p]; its width must stay finite.
    if !(2.0 * perturbation).is_finite() || perturbation < 0.0 {
        return Err(GsskError::InvalidArgument(format!(
            "perturbation must be a non-negative finite fraction, got {}",
            perturbation
        )));
    }

    let node_count = instance.node_count();
    let step_count = instance.step_count();
    let dt = instance.dt();
    let cells = node_count
        .checked_mul(step_count)
        .ok_or(GsskError::Allocation {
            requested: usize::MAX,
            purpose: "ensemble envelopes",
        })?;

    let mut min_envelope = zeroed(cells, f64::INFINITY, "ensemble min envelope")?;
    let mut max_envelope = zeroed(cells, f64::NEG_INFINITY, "ensemble max envelope")?;
    let mut sum = zeroed(cells, 0.0, "ensemble sum")?;
    let mut samples = zeroed(cells, 0usize, "ensemble sample counts")?;
    let mut diverged_runs = 0usize;

    let mut scope = instance.checkpoint();
    let originals = scope.saved_coefficients().to_vec();
    let mut perturbed = originals.clone();

    for run in 0..runs {
        for (k, &original) in perturbed.iter_mut().zip(&originals) {
            *k = original * (1.0 + perturbation * rng.gen_range(-1.0..=1.0));
        }
        scope.set_coefficients(&perturbed)?;
        scope.reset();

        for step in 0..step_count {
            let row = step * node_count;
            for (node, &value) in scope.quantities().iter().enumerate() {
                let idx = row + node;
                if value < min_envelope[idx] {
                    min_envelope[idx] = value;
                }
                if value > max_envelope[idx] {
                    max_envelope[idx] = value;
                }
                sum[idx] += value;
                samples[idx] += 1;
            }

            match scope.step(dt) {
                Ok(()) => {}
                Err(err) if err.is_divergence() => {
                    debug!(run, step, error = %err, "ensemble run diverged");
                    diverged_runs += 1;
                    break;
                }
                Err(err) => return Err(err),
            }
        }
    }
    drop(scope);

    let mut mean_envelope = sum;
    for ((mean, &count), (lo, hi)) in mean_envelope
        .iter_mut()
        .zip(&samples)
        .zip(min_envelope.iter_mut().zip(max_envelope.iter_mut()))
    {
        if count == 0 {
            *mean = f64::NAN;
            *lo = f64::NAN;
            *hi = f64::NAN;
        } else {
            *mean /= count as f64;
        }
    }

    debug!(runs, diverged_runs, step_count, "ensemble forecast complete");

    Ok(EnsembleResult {
        node_count,
        step_count,
        runs,
        diverged_runs,
        min_envelope,
        max_envelope,
        mean_envelope,
    })
}
