//! Ensemble forecasting and calibration exposed to JavaScript.

use crate::system::{to_js_error, WasmInstance};
use gssk_core::{calibrate, run_ensemble, EnsembleResult, NodeObservations, Observation};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_wasm_bindgen::to_value;
use wasm_bindgen::prelude::*;

#[wasm_bindgen]
pub struct WasmEnsembleResult {
    inner: EnsembleResult,
}

#[wasm_bindgen]
impl WasmEnsembleResult {
    pub fn node_count(&self) -> usize {
        self.inner.node_count
    }

    pub fn step_count(&self) -> usize {
        self.inner.step_count
    }

    pub fn runs(&self) -> usize {
        self.inner.runs
    }

    pub fn diverged_runs(&self) -> usize {
        self.inner.diverged_runs
    }

    /// Row-major `step_count * node_count` envelope.
    pub fn min_envelope(&self) -> Vec<f64> {
        self.inner.min_envelope.clone()
    }

    pub fn max_envelope(&self) -> Vec<f64> {
        self.inner.max_envelope.clone()
    }

    pub fn mean_envelope(&self) -> Vec<f64> {
        self.inner.mean_envelope.clone()
    }

    pub fn to_object(&self) -> Result<JsValue, JsValue> {
        to_value(&self.inner).map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }
}

/// Regroups flat observation arrays into per-node series. `counts[i]` samples
/// are taken in order from `times`/`values` for `node_ids[i]`.
pub(crate) fn group_observations(
    node_ids: &[String],
    counts: &[u32],
    times: &[f64],
    values: &[f64],
) -> Result<Vec<NodeObservations>, String> {
    if node_ids.len() != counts.len() {
        return Err(format!(
            "node_ids ({}) and counts ({}) differ in length",
            node_ids.len(),
            counts.len()
        ));
    }
    if times.len() != values.len() {
        return Err(format!(
            "times ({}) and values ({}) differ in length",
            times.len(),
            values.len()
        ));
    }
    let total: usize = counts.iter().map(|&c| c as usize).sum();
    if total != times.len() {
        return Err(format!(
            "counts sum to {} but {} samples were given",
            total,
            times.len()
        ));
    }

    let mut offset = 0;
    let series = node_ids
        .iter()
        .zip(counts)
        .map(|(id, &count)| {
            let end = offset + count as usize;
            let samples = times[offset..end]
                .iter()
                .zip(&values[offset..end])
                .map(|(&time, &value)| Observation { time, value })
                .collect();
            offset = end;
            NodeObservations {
                node_id: id.clone(),
                samples,
            }
        })
        .collect();
    Ok(series)
}

#[wasm_bindgen]
impl WasmInstance {
    /// Monte-Carlo forecast over perturbed edge coefficients. The instance is
    /// left exactly as it was.
    pub fn ensemble_forecast(
        &mut self,
        runs: usize,
        perturbation: f64,
        seed: u64,
    ) -> Result<WasmEnsembleResult, JsValue> {
        let mut rng = StdRng::seed_from_u64(seed);
        let inner =
            run_ensemble(&mut self.instance, runs, perturbation, &mut rng).map_err(to_js_error)?;
        Ok(WasmEnsembleResult { inner })
    }

    /// Fits the edge coefficients to the observations and returns the best
    /// vector, which is also written back into the instance.
    pub fn calibrate(
        &mut self,
        node_ids: Vec<String>,
        counts: Vec<u32>,
        times: Vec<f64>,
        values: Vec<f64>,
        iterations: usize,
        seed: u64,
    ) -> Result<Vec<f64>, JsValue> {
        let observations = group_observations(&node_ids, &counts, &times, &values)
            .map_err(|e| JsValue::from_str(&e))?;
        let mut rng = StdRng::seed_from_u64(seed);
        let report = calibrate(&mut self.instance, &observations, iterations, &mut rng)
            .map_err(to_js_error)?;
        Ok(report.coefficients)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DECAY: &str = r#"{
        "nodes": [
            {"id": "Pool", "type": "storage", "value": 8.0},
            {"id": "Out", "type": "sink", "value": 0.0}
        ],
        "edges": [
            {"origin": "Pool", "target": "Out", "logic": "linear", "params": {"k": 0.5}}
        ],
        "config": {"t_start": 0, "t_end": 2, "dt": 0.5, "method": "rk4"}
    }"#;

    #[test]
    fn group_observations_splits_by_counts() {
        let ids = vec!["A".to_string(), "B".to_string()];
        let grouped = group_observations(&ids, &[2, 1], &[1.0, 2.0, 3.0], &[10.0, 20.0, 30.0])
            .expect("consistent input");
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0].node_id, "A");
        assert_eq!(
            grouped[0].samples,
            vec![
                Observation { time: 1.0, value: 10.0 },
                Observation { time: 2.0, value: 20.0 },
            ]
        );
        assert_eq!(grouped[1].samples, vec![Observation { time: 3.0, value: 30.0 }]);
    }

    #[test]
    fn group_observations_rejects_mismatched_lengths() {
        let ids = vec!["A".to_string()];
        let err = group_observations(&ids, &[1, 1], &[1.0], &[1.0]).unwrap_err();
        assert!(err.contains("counts"), "unexpected message: {}", err);
        let err = group_observations(&ids, &[2], &[1.0], &[1.0]).unwrap_err();
        assert!(err.contains("sum to 2"), "unexpected message: {}", err);
        let err = group_observations(&ids, &[1], &[1.0], &[]).unwrap_err();
        assert!(err.contains("values"), "unexpected message: {}", err);
    }

    #[test]
    fn ensemble_forecast_shapes_and_restores_instance() {
        let mut system = WasmInstance::new(DECAY).expect("instance should build");
        let before = system.get_state();
        let result = system
            .ensemble_forecast(8, 0.2, 42)
            .expect("ensemble should run");

        assert_eq!(result.node_count(), 2);
        assert_eq!(result.step_count(), 5);
        assert_eq!(result.runs(), 8);
        assert_eq!(result.diverged_runs(), 0);
        assert_eq!(result.mean_envelope().len(), 10);

        let (lo, hi) = (result.min_envelope(), result.max_envelope());
        assert!(lo.iter().zip(&hi).all(|(a, b)| a <= b));
        assert_eq!(system.get_state(), before);
        assert_eq!(system.get_edge_k(0), Some(0.5));
    }

    #[test]
    fn ensemble_forecast_is_seed_deterministic() {
        let mut system = WasmInstance::new(DECAY).expect("instance should build");
        let a = system.ensemble_forecast(4, 0.3, 7).expect("ensemble");
        let b = system.ensemble_forecast(4, 0.3, 7).expect("ensemble");
        assert_eq!(a.mean_envelope(), b.mean_envelope());
    }

    #[test]
    fn calibrate_writes_back_coefficients() {
        let mut system = WasmInstance::new(DECAY).expect("instance should build");
        // Pool(t) = 8 exp(-t), which RK4 at dt 0.5 tracks closely.
        let times = vec![0.5, 1.0, 1.5, 2.0];
        let values: Vec<f64> = times.iter().map(|t: &f64| 8.0 * (-t).exp()).collect();
        let best = system
            .calibrate(vec!["Pool".into()], vec![4], times, values, 60, 11)
            .expect("calibration should run");

        assert_eq!(best.len(), 1);
        assert!((best[0] - 1.0).abs() < 0.05, "fitted k = {}", best[0]);
        assert_eq!(system.get_edge_k(0), Some(best[0]));
        assert_eq!(system.get_state(), vec![8.0, 0.0]);
    }

    #[test]
    #[cfg(target_arch = "wasm32")]
    fn calibrate_rejects_unknown_node() {
        let mut system = WasmInstance::new(DECAY).expect("instance should build");
        let result = system.calibrate(vec!["Ghost".into()], vec![1], vec![1.0], vec![1.0], 5, 1);
        assert!(result.is_err(), "unknown node must be rejected");
    }
}
