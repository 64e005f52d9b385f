//! Edge-coefficient calibration by differential evolution (DE/rand/1/bin).

use crate::error::{GsskError, Result};
use crate::instance::Instance;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Interpolation windows narrower than this use the window's start value.
const DEGENERATE_WINDOW: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub time: f64,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeObservations {
    pub node_id: String,
    pub samples: Vec<Observation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSettings {
    pub population: usize,
    /// Differential weight F.
    pub weight: f64,
    /// Crossover probability CR.
    pub crossover: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self {
            population: 20,
            weight: 0.8,
            crossover: 0.9,
            lower_bound: 0.0,
            upper_bound: 10.0,
        }
    }
}

impl CalibrationSettings {
    fn validate(&self) -> Result<()> {
        if self.population < 4 {
            return Err(GsskError::InvalidArgument(format!(
                "population must hold at least 4 members, got {}",
                self.population
            )));
        }
        if !self.weight.is_finite() || self.weight <= 0.0 {
            return Err(GsskError::InvalidArgument(format!(
                "differential weight must be positive, got {}",
                self.weight
            )));
        }
        if !(0.0..=1.0).contains(&self.crossover) {
            return Err(GsskError::InvalidArgument(format!(
                "crossover probability must lie in [0, 1], got {}",
                self.crossover
            )));
        }
        if !self.lower_bound.is_finite()
            || !self.upper_bound.is_finite()
            || self.lower_bound > self.upper_bound
            || !(self.upper_bound - self.lower_bound).is_finite()
        {
            return Err(GsskError::InvalidArgument(format!(
                "invalid initialization bounds [{}, {}]",
                self.lower_bound, self.upper_bound
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationReport {
    /// Best coefficients found, one per edge; also written into the instance.
    pub coefficients: Vec<f64>,
    /// Mean squared error of the best coefficients.
    pub fitness: f64,
    pub generations: usize,
    pub evaluations: usize,
}

/// Observation series resolved to node indices.
struct Targets<'a> {
    series: Vec<(usize, &'a [Observation])>,
}

impl<'a> Targets<'a> {
    fn resolve(instance: &Instance, observations: &'a [NodeObservations]) -> Result<Self> {
        let series = observations
            .iter()
            .map(|obs| {
                instance
                    .find_node(&obs.node_id)
                    .map(|idx| (idx, obs.samples.as_slice()))
                    .ok_or_else(|| {
                        GsskError::Linkage(format!(
                            "observations reference non-existent node '{}'",
                            obs.node_id
                        ))
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { series })
    }
}

fn interpolate(t: f64, t1: f64, v1: f64, t2: f64, v2: f64) -> f64 {
    if (t2 - t1).abs() < DEGENERATE_WINDOW {
        return v1;
    }
    let alpha = (t - t1) / (t2 - t1);
    v1 + alpha * (v2 - v1)
}

/// Mean squared error between the simulated and observed trajectories for the
/// given coefficients, or `+inf` when no observation falls inside the horizon.
///
/// Leaves the candidate coefficients and the simulated end state in the
/// instance; callers restore through a checkpoint.
fn fitness(instance: &mut Instance, targets: &Targets<'_>, params: &[f64]) -> Result<f64> {
    instance.set_coefficients(params)?;
    instance.reset();

    let dt = instance.dt();
    let t_end = instance.t_end();
    let limit = instance.config().horizon_limit();

    let mut total = 0.0;
    let mut points = 0usize;
    let mut t = instance.t_start();
    let mut prev_t = t;
    let mut prev_state = instance.quantities().to_vec();

    while t <= limit {
        let state = instance.quantities();
        for &(node, samples) in &targets.series {
            for sample in samples {
                if sample.time > prev_t && sample.time <= t {
                    let simulated =
                        interpolate(sample.time, prev_t, prev_state[node], t, state[node]);
                    let diff = simulated - sample.value;
                    total += diff * diff;
                    points += 1;
                }
            }
        }

        if t >= t_end {
            break;
        }

        prev_state.copy_from_slice(state);
        prev_t = t;
        match instance.step(dt) {
            Ok(()) => {}
            Err(err) if err.is_divergence() => break,
            Err(err) => return Err(err),
        }
        t += dt;
    }

    Ok(if points > 0 {
        total / points as f64
    } else {
        f64::INFINITY
    })
}

/// Calibrates with [`CalibrationSettings::default`].
pub fn calibrate<R: Rng + ?Sized>(
    instance: &mut Instance,
    observations: &[NodeObservations],
    iterations: usize,
    rng: &mut R,
) -> Result<CalibrationReport> {
    calibrate_with(
        instance,
        observations,
        iterations,
        CalibrationSettings::default(),
        rng,
    )
}

/// Fits every edge coefficient to the observations and writes the best vector
/// found back into the instance, which is then reset.
pub fn calibrate_with<R: Rng + ?Sized>(
    instance: &mut Instance,
    observations: &[NodeObservations],
    iterations: usize,
    settings: CalibrationSettings,
    rng: &mut R,
) -> Result<CalibrationReport> {
    if observations.is_empty() {
        return Err(GsskError::InvalidArgument(
            "calibration requires at least one observation series".into(),
        ));
    }
    let dim = instance.edge_count();
    if dim == 0 {
        return Err(GsskError::InvalidArgument(
            "model has no edges to calibrate".into(),
        ));
    }
    settings.validate()?;
    let targets = Targets::resolve(instance, observations)?;

    let pop_size = settings.population;
    let mut population = vec![0.0; pop_size * dim];
    let mut scores = vec![f64::INFINITY; pop_size];
    let mut trial = vec![0.0; dim];
    let mut evaluations = 0usize;

    let (best, best_fitness) = {
        let mut scope = instance.checkpoint();

        for value in population.iter_mut() {
            *value = settings.lower_bound
                + (settings.upper_bound - settings.lower_bound) * rng.gen::<f64>();
        }
        let mut best = population[..dim].to_vec();
        let mut best_fitness = f64::INFINITY;
        for i in 0..pop_size {
            let member = &population[i * dim..(i + 1) * dim];
            scores[i] = fitness(&mut scope, &targets, member)?;
            evaluations += 1;
            if scores[i] < best_fitness {
                best_fitness = scores[i];
                best.copy_from_slice(member);
            }
        }

        for generation in 0..iterations {
            for i in 0..pop_size {
                let a = pick_distinct(rng, pop_size, &[i]);
                let b = pick_distinct(rng, pop_size, &[i, a]);
                let c = pick_distinct(rng, pop_size, &[i, a, b]);
                let forced = rng.gen_range(0..dim);

                for j in 0..dim {
                    trial[j] = if rng.gen::<f64>() < settings.crossover || j == forced {
                        let mutant = population[a * dim + j]
                            + settings.weight * (population[b * dim + j] - population[c * dim + j]);
                        mutant.max(0.0)
                    } else {
                        population[i * dim + j]
                    };
                }

                let trial_fitness = fitness(&mut scope, &targets, &trial)?;
                evaluations += 1;
                if trial_fitness <= scores[i] {
                    scores[i] = trial_fitness;
                    population[i * dim..(i + 1) * dim].copy_from_slice(&trial);
                    if trial_fitness < best_fitness {
                        best_fitness = trial_fitness;
                        best.copy_from_slice(&trial);
                    }
                }
            }
            debug!(generation, best_fitness, "calibration generation complete");
        }

        (best, best_fitness)
    };

    instance.set_coefficients(&best)?;
    instance.reset();

    info!(
        edges = dim,
        iterations,
        evaluations,
        fitness = best_fitness,
        "calibration finished"
    );

    Ok(CalibrationReport {
        coefficients: best,
        fitness: best_fitness,
        generations: iterations,
        evaluations,
    })
}

/// Uniformly draws a population index not contained in `exclude`.
fn pick_distinct<R: Rng + ?Sized>(rng: &mut R, pop_size: usize, exclude: &[usize]) -> usize {
    loop {
        let candidate = rng.gen_range(0..pop_size);
        if !exclude.contains(&candidate) {
            return candidate;
        }
    }
}
