//! The live simulation state: a validated network, its run configuration and
//! the quantity vector the integrator advances.

use crate::description::ModelDescription;
use crate::error::{zeroed, GsskError, Result};
use crate::model::{Method, NodeId, RunConfig};
use crate::network::FlowNetwork;
use crate::solvers::Integrator;
use std::ops::{Deref, DerefMut};

/// A constructed model ready to be stepped.
///
/// Construction either yields a fully initialized instance or an error; the
/// instance owns every buffer it uses and releases them when dropped.
pub struct Instance {
    network: FlowNetwork,
    config: RunConfig,
    quantities: Vec<f64>,
    time: f64,
    diverged: bool,
    integrator: Integrator,
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("network", &self.network)
            .field("config", &self.config)
            .field("quantities", &self.quantities)
            .field("time", &self.time)
            .field("diverged", &self.diverged)
            .finish()
    }
}

impl Instance {
    pub fn new(network: FlowNetwork, config: RunConfig) -> Result<Self> {
        config.validate()?;
        let dim = network.node_count();
        let integrator = Integrator::build(config.method, dim)?;
        let mut quantities = zeroed(dim, 0.0, "quantity vector")?;
        for (q, initial) in quantities.iter_mut().zip(network.initial_values()) {
            *q = initial;
        }

        Ok(Self {
            network,
            time: config.t_start,
            config,
            quantities,
            diverged: false,
            integrator,
        })
    }

    pub fn from_description(description: &ModelDescription) -> Result<Self> {
        let network = FlowNetwork::from_description(description)?;
        let config = description.run_config()?;
        Self::new(network, config)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Self::from_description(&ModelDescription::from_json(json)?)
    }

    /// Advances the quantity vector by one step of size `dt`.
    ///
    /// A non-finite result aborts with [`GsskError::Divergence`] and leaves the
    /// updated (invalid) quantities in place; further steps are refused until
    /// [`Instance::reset`]. Otherwise negative quantities are clamped to zero.
    pub fn step(&mut self, dt: f64) -> Result<()> {
        if !(dt > 0.0) || !dt.is_finite() {
            return Err(GsskError::InvalidArgument(format!(
                "step size must be positive and finite, got {}",
                dt
            )));
        }
        if self.diverged {
            return Err(GsskError::InvalidArgument(
                "instance has diverged; reset before stepping".into(),
            ));
        }

        self.integrator
            .step(&self.network, &mut self.time, &mut self.quantities, dt);

        if let Some(idx) = self.quantities.iter().position(|q| !q.is_finite()) {
            self.diverged = true;
            return Err(GsskError::Divergence {
                node: self.network.nodes()[idx].id.to_string(),
                time: self.time,
            });
        }

        for q in &mut self.quantities {
            if *q < 0.0 {
                *q = 0.0;
            }
        }
        Ok(())
    }

    /// Steps by the configured `dt`.
    pub fn advance(&mut self) -> Result<()> {
        self.step(self.config.dt)
    }

    /// Restores every quantity to its initial value and rewinds time to
    /// `t_start`. Edge coefficients are left untouched.
    pub fn reset(&mut self) {
        for (q, initial) in self.quantities.iter_mut().zip(self.network.initial_values()) {
            *q = initial;
        }
        self.time = self.config.t_start;
        self.diverged = false;
    }

    pub fn quantities(&self) -> &[f64] {
        &self.quantities
    }

    pub fn node_id(&self, index: usize) -> Option<&NodeId> {
        self.network.nodes().get(index).map(|n| &n.id)
    }

    pub fn find_node(&self, id: &str) -> Option<usize> {
        self.network.find_node(id)
    }

    pub fn node_count(&self) -> usize {
        self.network.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.network.edge_count()
    }

    pub fn edge_k(&self, index: usize) -> Option<f64> {
        self.network.k(index)
    }

    pub fn set_edge_k(&mut self, index: usize, k: f64) -> Result<()> {
        self.network.set_k(index, k)
    }

    pub fn coefficients(&self) -> Vec<f64> {
        self.network.coefficients()
    }

    pub fn set_coefficients(&mut self, coefficients: &[f64]) -> Result<()> {
        if coefficients.len() != self.network.edge_count() {
            return Err(GsskError::InvalidArgument(format!(
                "expected {} coefficients, got {}",
                self.network.edge_count(),
                coefficients.len()
            )));
        }
        self.network.write_coefficients(coefficients);
        Ok(())
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn method(&self) -> Method {
        self.integrator.method()
    }

    pub fn t_start(&self) -> f64 {
        self.config.t_start
    }

    pub fn t_end(&self) -> f64 {
        self.config.t_end
    }

    pub fn dt(&self) -> f64 {
        self.config.dt
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn step_count(&self) -> usize {
        self.config.step_count()
    }

    pub fn is_diverged(&self) -> bool {
        self.diverged
    }

    /// Opens a scope that restores coefficients, quantities and time when it
    /// is dropped.
    pub fn checkpoint(&mut self) -> Checkpoint<'_> {
        Checkpoint {
            coefficients: self.network.coefficients(),
            quantities: self.quantities.clone(),
            time: self.time,
            diverged: self.diverged,
            instance: self,
        }
    }
}

/// Saved instance state, restored on drop.
///
/// Dereferences to the wrapped [`Instance`] so it can be stepped and mutated
/// freely inside the scope.
pub struct Checkpoint<'a> {
    instance: &'a mut Instance,
    coefficients: Vec<f64>,
    quantities: Vec<f64>,
    time: f64,
    diverged: bool,
}

impl Checkpoint<'_> {
    /// Coefficients as they were when the checkpoint was taken.
    pub fn saved_coefficients(&self) -> &[f64] {
        &self.coefficients
    }
}

impl Deref for Checkpoint<'_> {
    type Target = Instance;

    fn deref(&self) -> &Instance {
        self.instance
    }
}

impl DerefMut for Checkpoint<'_> {
    fn deref_mut(&mut self) -> &mut Instance {
        self.instance
    }
}

impl Drop for Checkpoint<'_> {
    fn drop(&mut self) {
        self.instance.network.write_coefficients(&self.coefficients);
        self.instance.quantities.copy_from_slice(&self.quantities);
        self.instance.time = self.time;
        self.instance.diverged = self.diverged;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    const TRANSFER: &str = r#"{
        "nodes": [
            {"id": "A", "type": "storage", "value": 10.0},
            {"id": "B", "type": "storage", "value": 0.0}
        ],
        "edges": [
            {"origin": "A", "target": "B", "logic": "linear", "params": {"k": 0.3}}
        ],
        "config": {"t_start": 0, "t_end": 5, "dt": 0.125, "method": "rk4"}
    }"#;

    fn transfer() -> Instance {
        Instance::from_json(TRANSFER).expect("transfer model should build")
    }

    #[test]
    fn construction_initializes_state_and_metadata() {
        let inst = transfer();
        assert_eq!(inst.quantities(), &[10.0, 0.0]);
        assert_eq!(inst.node_id(1).map(NodeId::as_str), Some("B"));
        assert!(inst.node_id(2).is_none());
        assert_eq!(inst.find_node("A"), Some(0));
        assert_eq!(inst.edge_count(), 1);
        assert_eq!(inst.method(), Method::Rk4);
        assert_eq!(inst.step_count(), 41);
        assert_eq!(inst.time(), 0.0);
    }

    #[test]
    fn construction_rejects_schema_violations_with_distinct_kinds() {
        let duplicate = r#"{"nodes": [
            {"id": "A", "type": "storage", "value": 1},
            {"id": "A", "type": "storage", "value": 2}
        ]}"#;
        let unknown = r#"{"nodes": [{"id": "A", "type": "storage", "value": 1}],
            "edges": [{"origin": "A", "target": "Nope", "logic": "linear", "params": {"k": 1}}]}"#;
        let no_control = r#"{"nodes": [
            {"id": "A", "type": "storage", "value": 1},
            {"id": "B", "type": "storage", "value": 1}
        ], "edges": [{"origin": "A", "target": "B", "logic": "interaction", "params": {"k": 1}}]}"#;
        let bad_config = r#"{"nodes": [{"id": "A", "type": "storage", "value": 1}],
            "config": {"t_start": 10, "t_end": 1}}"#;

        let kinds: Vec<ErrorKind> = [duplicate, unknown, no_control, bad_config]
            .iter()
            .map(|json| Instance::from_json(json).expect_err("must fail").kind())
            .collect();
        assert_eq!(
            kinds,
            vec![
                ErrorKind::Structural,
                ErrorKind::Linkage,
                ErrorKind::Logic,
                ErrorKind::Config
            ]
        );
    }

    #[test]
    fn construction_rejects_horizon_beyond_step_limit() {
        let err = Instance::from_json(
            r#"{"nodes": [{"id": "A", "type": "storage", "value": 1}],
                "config": {"t_end": 1e20, "dt": 1}}"#,
        )
        .expect_err("horizon is too long to record");
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    /// Storage `A` drained into a sink by a linear edge, so `A(t) = e^{-t}`.
    fn drained_stock_at_one(method: &str, dt: f64) -> f64 {
        let json = format!(
            r#"{{
                "nodes": [
                    {{"id": "A", "type": "storage", "value": 1.0}},
                    {{"id": "Z", "type": "sink", "value": 0.0}}
                ],
                "edges": [{{"origin": "A", "target": "Z", "logic": "linear", "params": {{"k": 1.0}}}}],
                "config": {{"t_end": 1, "dt": {dt}, "method": "{method}"}}
            }}"#
        );
        let mut inst = Instance::from_json(&json).expect("decay model should build");
        for _ in 0..(1.0 / dt).round() as usize {
            inst.advance().expect("decay is stable");
        }
        inst.quantities()[0]
    }

    #[test]
    fn rk4_model_error_shrinks_faster_than_euler() {
        let exact = (-1.0_f64).exp();
        let mut previous: Option<(f64, f64)> = None;
        for dt in [0.1, 0.05, 0.025] {
            let euler_err = (drained_stock_at_one("euler", dt) - exact).abs();
            let rk4_err = (drained_stock_at_one("rk4", dt) - exact).abs();
            assert!(rk4_err < euler_err, "dt={dt}: rk4 {rk4_err} vs euler {euler_err}");
            if let Some((prev_euler, prev_rk4)) = previous {
                assert!(prev_euler / euler_err > 1.8, "euler ratio {}", prev_euler / euler_err);
                assert!(prev_rk4 / rk4_err > 12.0, "rk4 ratio {}", prev_rk4 / rk4_err);
            }
            previous = Some((euler_err, rk4_err));
        }
    }

    #[test]
    fn reset_restores_initial_quantities_and_time() {
        let mut inst = transfer();
        for _ in 0..10 {
            inst.advance().expect("stable step");
        }
        assert!(inst.quantities()[1] > 0.0);
        inst.set_edge_k(0, 0.9).expect("edge exists");
        inst.reset();
        assert_eq!(inst.quantities(), &[10.0, 0.0]);
        assert_eq!(inst.time(), 0.0);
        assert_eq!(inst.edge_k(0), Some(0.9));
    }

    #[test]
    fn step_conserves_total_quantity() {
        for method in ["euler", "rk4"] {
            let json = TRANSFER.replace("\"rk4\"", &format!("\"{method}\""));
            let mut inst = Instance::from_json(&json).expect("model");
            for _ in 0..50 {
                inst.advance().expect("stable step");
                let total: f64 = inst.quantities().iter().sum();
                assert!((total - 10.0).abs() < 1e-9, "{method}: total {total}");
            }
        }
    }

    #[test]
    fn step_clamps_negative_quantities_to_zero() {
        let mut inst = Instance::from_json(
            r#"{
                "nodes": [
                    {"id": "A", "type": "storage", "value": 1.0},
                    {"id": "B", "type": "sink", "value": 0.0}
                ],
                "edges": [{"origin": "A", "target": "B", "logic": "constant", "params": {"k": 5.0}}],
                "config": {"t_end": 2, "dt": 1}
            }"#,
        )
        .expect("model");
        inst.advance().expect("clamping is not an error");
        assert_eq!(inst.quantities(), &[0.0, 5.0]);
        assert!(!inst.is_diverged());
    }

    #[test]
    fn step_detects_divergence_and_requires_reset() {
        let mut inst = Instance::from_json(
            r#"{
                "nodes": [
                    {"id": "X", "type": "storage", "value": 10.0},
                    {"id": "Z", "type": "sink", "value": 0.0}
                ],
                "edges": [
                    {"origin": "X", "target": "Z", "logic": "interaction", "params": {"k": -1.0, "control_node": "X"}}
                ],
                "config": {"t_end": 1000, "dt": 10}
            }"#,
        )
        .expect("model");

        let mut failure = None;
        for _ in 0..100 {
            if let Err(err) = inst.advance() {
                failure = Some(err);
                break;
            }
        }
        let err = failure.expect("unstable model must diverge");
        assert_eq!(err.kind(), ErrorKind::Divergence);
        assert!(inst.is_diverged());
        assert_eq!(
            inst.advance().expect_err("diverged instance refuses steps").kind(),
            ErrorKind::InvalidArgument
        );

        inst.reset();
        assert!(!inst.is_diverged());
        assert_eq!(inst.quantities(), &[10.0, 0.0]);
    }

    #[test]
    fn step_rejects_invalid_dt() {
        let mut inst = transfer();
        for dt in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert_eq!(
                inst.step(dt).expect_err("invalid dt").kind(),
                ErrorKind::InvalidArgument
            );
        }
    }

    #[test]
    fn set_coefficients_checks_length() {
        let mut inst = transfer();
        inst.set_coefficients(&[0.7]).expect("one edge");
        assert_eq!(inst.coefficients(), vec![0.7]);
        assert!(inst.set_coefficients(&[0.7, 0.1]).is_err());
    }

    #[test]
    fn checkpoint_restores_state_on_drop() {
        let mut inst = transfer();
        inst.advance().expect("step");
        let before_q = inst.quantities().to_vec();
        let before_t = inst.time();
        {
            let mut scope = inst.checkpoint();
            scope.set_edge_k(0, 4.0).expect("edge");
            scope.reset();
            scope.advance().expect("step");
            assert_eq!(scope.saved_coefficients(), &[0.3]);
        }
        assert_eq!(inst.edge_k(0), Some(0.3));
        assert_eq!(inst.quantities(), before_q.as_slice());
        assert_eq!(inst.time(), before_t);
    }
}
