//! Core WASM instance wrapper.

use gssk_core::{GsskError, Instance};
use serde_wasm_bindgen::to_value;
use wasm_bindgen::prelude::*;

#[wasm_bindgen]
pub struct WasmInstance {
    pub(crate) instance: Instance,
}

pub(crate) fn to_js_error(err: GsskError) -> JsValue {
    JsValue::from_str(&err.to_string())
}

#[wasm_bindgen]
impl WasmInstance {
    /// Builds an instance from a JSON model description. The rejection
    /// message names the failing node or edge.
    #[wasm_bindgen(constructor)]
    pub fn new(model_json: &str) -> Result<WasmInstance, JsValue> {
        console_error_panic_hook::set_once();

        let instance = Instance::from_json(model_json).map_err(to_js_error)?;
        Ok(WasmInstance { instance })
    }

    pub fn step(&mut self, dt: f64) -> Result<(), JsValue> {
        self.instance.step(dt).map_err(to_js_error)
    }

    pub fn advance(&mut self) -> Result<(), JsValue> {
        self.instance.advance().map_err(to_js_error)
    }

    pub fn reset(&mut self) {
        self.instance.reset();
    }

    pub fn get_state(&self) -> Vec<f64> {
        self.instance.quantities().to_vec()
    }

    pub fn state_size(&self) -> usize {
        self.instance.node_count()
    }

    pub fn node_id(&self, index: usize) -> Option<String> {
        self.instance.node_id(index).map(|id| id.to_string())
    }

    pub fn find_node(&self, id: &str) -> Option<u32> {
        self.instance.find_node(id).map(|idx| idx as u32)
    }

    pub fn get_t(&self) -> f64 {
        self.instance.time()
    }

    pub fn t_start(&self) -> f64 {
        self.instance.t_start()
    }

    pub fn t_end(&self) -> f64 {
        self.instance.t_end()
    }

    pub fn dt(&self) -> f64 {
        self.instance.dt()
    }

    pub fn step_count(&self) -> usize {
        self.instance.step_count()
    }

    pub fn is_diverged(&self) -> bool {
        self.instance.is_diverged()
    }

    pub fn edge_count(&self) -> usize {
        self.instance.edge_count()
    }

    pub fn get_edge_k(&self, index: usize) -> Option<f64> {
        self.instance.edge_k(index)
    }

    pub fn set_edge_k(&mut self, index: usize, k: f64) -> Result<(), JsValue> {
        self.instance.set_edge_k(index, k).map_err(to_js_error)
    }

    /// Runs the full configured horizon from the initial state and returns the
    /// recorded trajectory as a plain object.
    pub fn simulate(&mut self) -> Result<JsValue, JsValue> {
        let trajectory = self.instance.simulate();
        to_value(&trajectory).map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }

    /// Renders the full-horizon trajectory in the tabular CSV layout.
    pub fn simulate_csv(&mut self) -> Result<String, JsValue> {
        let trajectory = self.instance.simulate();
        let mut buffer = Vec::new();
        trajectory
            .write_csv(&mut buffer)
            .map_err(|e| JsValue::from_str(&format!("CSV error: {}", e)))?;
        String::from_utf8(buffer).map_err(|e| JsValue::from_str(&format!("CSV error: {}", e)))
    }
}
