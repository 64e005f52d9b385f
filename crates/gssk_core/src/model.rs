//! Typed model tables: nodes, edges and the run configuration.

use crate::error::{GsskError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a node. Limited to [`NodeId::MAX_LEN`] bytes; longer or empty
/// identifiers are rejected rather than truncated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeId(String);

impl NodeId {
    pub const MAX_LEN: usize = 63;

    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(GsskError::Structural("node ID must not be empty".into()));
        }
        if id.len() > Self::MAX_LEN {
            return Err(GsskError::Structural(format!(
                "node ID '{}' is {} bytes long (maximum {})",
                id,
                id.len(),
                Self::MAX_LEN
            )));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for NodeId {
    type Error = GsskError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<NodeId> for String {
    fn from(value: NodeId) -> Self {
        value.0
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Accumulates flow; integrated.
    Storage,
    /// Exogenous supply; derivative held at zero.
    Source,
    /// Storage that typically only loses flow.
    Sink,
    /// Exogenous fixed quantity; derivative held at zero.
    Constant,
}

impl NodeKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "storage" => Some(NodeKind::Storage),
            "source" => Some(NodeKind::Source),
            "sink" => Some(NodeKind::Sink),
            "constant" => Some(NodeKind::Constant),
            _ => None,
        }
    }

    /// Boundary kinds are not state variables: their quantity never changes
    /// through integration.
    pub fn is_boundary(self) -> bool {
        matches!(self, NodeKind::Source | NodeKind::Constant)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicKind {
    /// Fixed flow rate `k`.
    Constant,
    /// Proportional to origin: `k * Q(origin)`.
    Linear,
    /// Multiplier flow: `k * Q(origin) * Q(control)`.
    Interaction,
    /// Saturating flow: `k * Q(origin) / (1 + Q(origin) / Q(control))`.
    Limit,
    /// Switch: `k` while `Q(origin) > threshold`.
    Threshold,
}

impl LogicKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "constant" => Some(LogicKind::Constant),
            "linear" => Some(LogicKind::Linear),
            "interaction" => Some(LogicKind::Interaction),
            "limit" => Some(LogicKind::Limit),
            "threshold" => Some(LogicKind::Threshold),
            _ => None,
        }
    }

    pub fn requires_control(self) -> bool {
        matches!(self, LogicKind::Interaction | LogicKind::Limit)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub initial_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub origin: usize,
    pub target: usize,
    pub control: Option<usize>,
    pub logic: LogicKind,
    pub k: f64,
    pub threshold: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    #[default]
    Euler,
    Rk4,
}

impl Method {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "euler" => Some(Method::Euler),
            "rk4" => Some(Method::Rk4),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub t_start: f64,
    pub t_end: f64,
    pub dt: f64,
    pub method: Method,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            t_start: 0.0,
            t_end: 100.0,
            dt: 0.1,
            method: Method::Euler,
        }
    }
}

impl RunConfig {
    /// Largest horizon, in steps, a configuration may span.
    pub const MAX_STEPS: f64 = 1.0e9;

    pub fn validate(&self) -> Result<()> {
        if !(self.t_end > self.t_start) {
            return Err(GsskError::Config(format!(
                "t_end ({:.2}) must be greater than t_start ({:.2})",
                self.t_end, self.t_start
            )));
        }
        if !(self.dt > 0.0) || !self.dt.is_finite() {
            return Err(GsskError::Config(format!(
                "dt ({:.4}) must be positive",
                self.dt
            )));
        }
        let steps = (self.t_end - self.t_start) / self.dt;
        if !(steps < Self::MAX_STEPS) {
            return Err(GsskError::Config(format!(
                "horizon [{}, {}] at dt {} spans more than {} steps",
                self.t_start,
                self.t_end,
                self.dt,
                Self::MAX_STEPS
            )));
        }
        Ok(())
    }

    /// Number of recorded step indices over the horizon, including the initial one.
    pub fn step_count(&self) -> usize {
        (((self.t_end - self.t_start) / self.dt) as usize).saturating_add(1)
    }

    /// Upper time bound used by full-horizon loops; tolerates accumulated
    /// rounding in `t += dt`.
    pub(crate) fn horizon_limit(&self) -> f64 {
        self.t_end + self.dt * 0.01
    }
}
