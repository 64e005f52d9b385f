//! Structured model description as handed over by a front end.
//!
//! Every field is optional at the type level: the description only mirrors the
//! shape of the input, and [`crate::network::FlowNetwork::from_description`]
//! decides which absences are errors and which take defaults.

use crate::error::{GsskError, Result};
use crate::model::{Method, RunConfig};
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelDescription {
    #[serde(default)]
    pub nodes: Option<Vec<NodeDescription>>,
    #[serde(default)]
    pub edges: Option<Vec<EdgeDescription>>,
    #[serde(default)]
    pub config: Option<ConfigDescription>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeDescription {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub value: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EdgeDescription {
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub logic: Option<String>,
    #[serde(default)]
    pub params: Option<EdgeParams>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EdgeParams {
    #[serde(default)]
    pub k: Option<f64>,
    #[serde(default)]
    pub control_node: Option<String>,
    #[serde(default)]
    pub threshold: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigDescription {
    #[serde(default)]
    pub t_start: Option<f64>,
    #[serde(default)]
    pub t_end: Option<f64>,
    #[serde(default)]
    pub dt: Option<f64>,
    #[serde(default)]
    pub method: Option<String>,
}

impl ModelDescription {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|err| GsskError::Parse(err.to_string()))
    }

    /// Resolves the run configuration: present fields override the defaults,
    /// then the horizon and step are validated.
    pub fn run_config(&self) -> Result<RunConfig> {
        let defaults = RunConfig::default();
        let Some(config) = &self.config else {
            return Ok(defaults);
        };

        let method = match config.method.as_deref() {
            None => defaults.method,
            Some(name) => Method::parse(name).unwrap_or_else(|| {
                warn!(method = name, "unknown integration method, falling back to euler");
                Method::Euler
            }),
        };

        let resolved = RunConfig {
            t_start: config.t_start.unwrap_or(defaults.t_start),
            t_end: config.t_end.unwrap_or(defaults.t_end),
            dt: config.dt.unwrap_or(defaults.dt),
            method,
        };
        resolved.validate()?;
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn from_json_ignores_unknown_fields() {
        let description = ModelDescription::from_json(
            r#"{
                "nodes": [{"id": "A", "type": "source", "value": 1.0, "label": "x"}],
                "edges": [{"id": "e0", "origin": "A", "target": "A", "logic": "constant", "params": {"k": 2}}]
            }"#,
        )
        .expect("description should parse");
        let nodes = description.nodes.expect("nodes present");
        assert_eq!(nodes[0].kind.as_deref(), Some("source"));
        let edges = description.edges.expect("edges present");
        assert_eq!(edges[0].params.as_ref().and_then(|p| p.k), Some(2.0));
    }

    #[test]
    fn from_json_reports_syntax_errors_as_parse() {
        let err = ModelDescription::from_json("{\"nodes\": [").expect_err("expected parse error");
        assert!(matches!(err, GsskError::Parse(_)));
        assert_eq!(err.kind(), ErrorKind::Structural);
    }

    #[test]
    fn run_config_applies_defaults_and_overrides() {
        let description = ModelDescription::default();
        assert_eq!(description.run_config().expect("defaults"), RunConfig::default());

        let description = ModelDescription {
            config: Some(ConfigDescription {
                t_end: Some(10.0),
                method: Some("rk4".into()),
                ..ConfigDescription::default()
            }),
            ..ModelDescription::default()
        };
        let config = description.run_config().expect("partial config");
        assert_eq!(config.t_start, 0.0);
        assert_eq!(config.t_end, 10.0);
        assert_eq!(config.dt, 0.1);
        assert_eq!(config.method, Method::Rk4);
    }

    #[test]
    fn run_config_falls_back_to_euler_for_unknown_method() {
        let description = ModelDescription {
            config: Some(ConfigDescription {
                method: Some("leapfrog".into()),
                ..ConfigDescription::default()
            }),
            ..ModelDescription::default()
        };
        assert_eq!(description.run_config().expect("config").method, Method::Euler);
    }

    #[test]
    fn run_config_rejects_negative_dt() {
        let description = ModelDescription {
            config: Some(ConfigDescription {
                dt: Some(-0.5),
                ..ConfigDescription::default()
            }),
            ..ModelDescription::default()
        };
        let err = description.run_config().expect_err("expected config error");
        assert_eq!(err.kind(), ErrorKind::Config);
    }
}
