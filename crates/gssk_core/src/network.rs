//! Flow-network topology and the derivative evaluator.

use crate::description::{EdgeDescription, ModelDescription, NodeDescription};
use crate::error::{GsskError, Result};
use crate::model::{Edge, LogicKind, Node, NodeId, NodeKind};
use crate::traits::{DynamicalSystem, Scalar};
use std::collections::HashMap;
use tracing::warn;

/// Below this control quantity a limit edge carries no flow.
pub const LIMIT_CONTROL_EPSILON: f64 = 1e-9;

/// Validated node and edge tables plus the id lookup built from them.
///
/// Topology is fixed once built; only edge coefficients can change, through
/// [`FlowNetwork::set_k`].
#[derive(Debug, Clone)]
pub struct FlowNetwork {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    index: HashMap<String, usize>,
}

impl FlowNetwork {
    pub fn new(nodes: Vec<Node>, edges: Vec<Edge>) -> Result<Self> {
        let mut index = HashMap::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            if let Some(&first) = index.get(node.id.as_str()) {
                return Err(GsskError::DuplicateNode {
                    id: node.id.to_string(),
                    index: i,
                    first,
                });
            }
            index.insert(node.id.to_string(), i);
        }

        let count = nodes.len();
        for (i, edge) in edges.iter().enumerate() {
            let endpoints = [
                ("origin", Some(edge.origin)),
                ("target", Some(edge.target)),
                ("control", edge.control),
            ];
            for (role, idx) in endpoints {
                if let Some(idx) = idx {
                    if idx >= count {
                        return Err(GsskError::Linkage(format!(
                            "edge {} references {} index {} but the model has {} nodes",
                            i, role, idx, count
                        )));
                    }
                }
            }
            if edge.logic.requires_control() && edge.control.is_none() {
                return Err(GsskError::Logic(format!(
                    "edge {} ({:?}) requires a control node",
                    i, edge.logic
                )));
            }
        }

        Ok(Self {
            nodes,
            edges,
            index,
        })
    }

    /// Builds the network from a description, validating nodes first and then
    /// edges in input order; the first failure is reported.
    pub fn from_description(description: &ModelDescription) -> Result<Self> {
        let node_descriptions = description
            .nodes
            .as_ref()
            .ok_or_else(|| GsskError::Structural("'nodes' must be an array".into()))?;

        let mut nodes = Vec::with_capacity(node_descriptions.len());
        let mut index = HashMap::with_capacity(node_descriptions.len());
        for (i, raw) in node_descriptions.iter().enumerate() {
            let node = parse_node(i, raw)?;
            if let Some(&first) = index.get(node.id.as_str()) {
                return Err(GsskError::DuplicateNode {
                    id: node.id.to_string(),
                    index: i,
                    first,
                });
            }
            index.insert(node.id.to_string(), i);
            nodes.push(node);
        }

        let edge_descriptions = description.edges.as_deref().unwrap_or_default();
        let mut edges = Vec::with_capacity(edge_descriptions.len());
        for (i, raw) in edge_descriptions.iter().enumerate() {
            edges.push(parse_edge(i, raw, &index)?);
        }

        Ok(Self {
            nodes,
            edges,
            index,
        })
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn find_node(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn k(&self, edge: usize) -> Option<f64> {
        self.edges.get(edge).map(|e| e.k)
    }

    pub fn set_k(&mut self, edge: usize, k: f64) -> Result<()> {
        let count = self.edges.len();
        let slot = self.edges.get_mut(edge).ok_or_else(|| {
            GsskError::InvalidArgument(format!(
                "edge index {} out of range (model has {} edges)",
                edge, count
            ))
        })?;
        slot.k = k;
        Ok(())
    }

    pub fn coefficients(&self) -> Vec<f64> {
        self.edges.iter().map(|e| e.k).collect()
    }

    pub(crate) fn write_coefficients(&mut self, coefficients: &[f64]) {
        for (edge, &k) in self.edges.iter_mut().zip(coefficients) {
            edge.k = k;
        }
    }

    pub fn initial_values(&self) -> impl Iterator<Item = f64> + '_ {
        self.nodes.iter().map(|n| n.initial_value)
    }
}

fn parse_node(i: usize, raw: &NodeDescription) -> Result<Node> {
    let (Some(id), Some(kind), Some(value)) = (&raw.id, &raw.kind, raw.value) else {
        return Err(GsskError::Structural(format!(
            "node at index {} is missing required fields (id, type, value)",
            i
        )));
    };
    let id = NodeId::new(id.as_str())?;
    let kind = NodeKind::parse(kind).unwrap_or_else(|| {
        warn!(node = %id, kind = kind.as_str(), "unknown node type, treating as storage");
        NodeKind::Storage
    });
    Ok(Node {
        id,
        kind,
        initial_value: value,
    })
}

fn parse_edge(i: usize, raw: &EdgeDescription, index: &HashMap<String, usize>) -> Result<Edge> {
    let (Some(origin), Some(target), Some(logic), Some(params)) =
        (&raw.origin, &raw.target, &raw.logic, &raw.params)
    else {
        return Err(GsskError::Structural(format!(
            "edge at index {} is missing required fields (origin, target, logic, params)",
            i
        )));
    };

    let resolve = |role: &str, name: &str| {
        index.get(name).copied().ok_or_else(|| {
            GsskError::Linkage(format!(
                "edge {} references non-existent {} node '{}'",
                i, role, name
            ))
        })
    };
    let origin = resolve("origin", origin)?;
    let target = resolve("target", target)?;

    let logic_kind = LogicKind::parse(logic).ok_or_else(|| {
        GsskError::Logic(format!("unknown logic type '{}' in edge {}", logic, i))
    })?;

    let k = params.k.ok_or_else(|| {
        GsskError::Structural(format!(
            "edge {} is missing required numeric parameter 'k'",
            i
        ))
    })?;

    let control = params
        .control_node
        .as_deref()
        .map(|name| resolve("control", name))
        .transpose()?;

    if logic_kind.requires_control() && control.is_none() {
        return Err(GsskError::Logic(format!(
            "edge {} ({}) requires 'control_node' in params",
            i, logic
        )));
    }

    Ok(Edge {
        origin,
        target,
        control,
        logic: logic_kind,
        k,
        threshold: params.threshold.unwrap_or(0.0),
    })
}

/// Instantaneous flow carried by one edge at the given state.
pub fn edge_flow<T: Scalar>(edge: &Edge, state: &[T]) -> T {
    let k = T::lit(edge.k);
    let q_origin = state[edge.origin];
    let control = edge.control.map(|c| state[c]);

    match edge.logic {
        LogicKind::Constant => k,
        LogicKind::Linear => k * q_origin,
        LogicKind::Interaction => match control {
            Some(c) => k * q_origin * c,
            None => T::zero(),
        },
        LogicKind::Limit => match control {
            Some(c) if c > T::lit(LIMIT_CONTROL_EPSILON) => {
                k * q_origin / (T::one() + q_origin / c)
            }
            _ => T::zero(),
        },
        LogicKind::Threshold => {
            if q_origin > T::lit(edge.threshold) {
                k
            } else {
                T::zero()
            }
        }
    }
}

impl<T: Scalar> DynamicalSystem<T> for FlowNetwork {
    fn dimension(&self) -> usize {
        self.nodes.len()
    }

    fn apply(&self, _t: T, x: &[T], out: &mut [T]) {
        for slot in out.iter_mut() {
            *slot = T::zero();
        }

        for edge in &self.edges {
            let flow = edge_flow(edge, x);
            out[edge.origin] = out[edge.origin] - flow;
            out[edge.target] = out[edge.target] + flow;
        }

        // Boundary conditions: exogenous nodes are held fixed.
        for (slot, node) in out.iter_mut().zip(&self.nodes) {
            if node.kind.is_boundary() {
                *slot = T::zero();
            }
        }
    }
}
