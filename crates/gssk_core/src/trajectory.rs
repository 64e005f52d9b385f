//! Full-horizon trajectory recording and its tabular form.

use crate::instance::Instance;
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use tracing::warn;

/// Rows reserved up front; longer runs grow the buffers as they record.
const PREALLOCATED_ROWS: usize = 4096;

/// Quantities recorded at every step of one run, row-major by step then node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    pub node_ids: Vec<String>,
    pub times: Vec<f64>,
    pub quantities: Vec<f64>,
    /// Time at which the run diverged, if it did. Rows stop at the last good step.
    pub diverged_at: Option<f64>,
}

impl Trajectory {
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn row(&self, step: usize) -> Option<&[f64]> {
        let width = self.node_ids.len();
        (step < self.times.len()).then(|| &self.quantities[step * width..(step + 1) * width])
    }

    /// Writes `time,<ids...>` followed by one row per recorded step, time with
    /// four decimals and quantities with six.
    pub fn write_csv<W: Write>(&self, mut out: W) -> io::Result<()> {
        write!(out, "time")?;
        for id in &self.node_ids {
            write!(out, ",{}", id)?;
        }
        writeln!(out)?;

        for (step, t) in self.times.iter().enumerate() {
            write!(out, "{:.4}", t)?;
            for value in self.row(step).unwrap_or_default() {
                write!(out, ",{:.6}", value)?;
            }
            writeln!(out)?;
        }
        out.flush()
    }
}

impl Instance {
    /// Resets and runs the configured horizon, recording the state before
    /// every step.
    pub fn simulate(&mut self) -> Trajectory {
        self.reset();
        let node_ids = (0..self.node_count())
            .filter_map(|i| self.node_id(i).map(|id| id.to_string()))
            .collect();

        let dt = self.dt();
        let limit = self.config().horizon_limit();
        let rows = self.step_count().min(PREALLOCATED_ROWS);
        let mut times = Vec::with_capacity(rows);
        let mut quantities = Vec::with_capacity(rows.saturating_mul(self.node_count()));
        let mut diverged_at = None;

        let mut t = self.t_start();
        while t <= limit {
            times.push(t);
            quantities.extend_from_slice(self.quantities());

            if let Err(err) = self.step(dt) {
                warn!(time = t, error = %err, "simulation stopped early");
                diverged_at = Some(t);
                break;
            }
            t += dt;
        }

        Trajectory {
            node_ids,
            times,
            quantities,
            diverged_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulate_records_every_step_including_initial() {
        let mut inst = Instance::from_json(
            r#"{
                "nodes": [
                    {"id": "A", "type": "source", "value": 10.0},
                    {"id": "B", "type": "storage", "value": 0.0}
                ],
                "edges": [{"origin": "A", "target": "B", "logic": "constant", "params": {"k": 2.0}}],
                "config": {"t_end": 1, "dt": 0.25}
            }"#,
        )
        .expect("model");
        let trajectory = inst.simulate();
        assert_eq!(trajectory.len(), 5);
        assert_eq!(trajectory.row(0), Some(&[10.0, 0.0][..]));
        assert_eq!(trajectory.row(4), Some(&[10.0, 2.0][..]));
        assert!(trajectory.row(5).is_none());
        assert!(trajectory.diverged_at.is_none());
    }

    #[test]
    fn write_csv_formats_header_and_rows() {
        let trajectory = Trajectory {
            node_ids: vec!["A".into(), "B".into()],
            times: vec![0.0, 0.1],
            quantities: vec![10.0, 0.0, 9.5, 0.5],
            diverged_at: None,
        };
        let mut buffer = Vec::new();
        trajectory.write_csv(&mut buffer).expect("write to memory");
        let text = String::from_utf8(buffer).expect("utf8");
        assert_eq!(
            text,
            "time,A,B\n0.0000,10.000000,0.000000\n0.1000,9.500000,0.500000\n"
        );
    }

    #[test]
    fn simulate_stops_at_divergence() {
        let mut inst = Instance::from_json(
            r#"{
                "nodes": [
                    {"id": "X", "type": "storage", "value": 10.0},
                    {"id": "Z", "type": "sink", "value": 0.0}
                ],
                "edges": [
                    {"origin": "X", "target": "Z", "logic": "interaction", "params": {"k": -1.0, "control_node": "X"}}
                ],
                "config": {"t_end": 500, "dt": 10}
            }"#,
        )
        .expect("model");
        let trajectory = inst.simulate();
        let diverged_at = trajectory.diverged_at.expect("run must diverge");
        assert!(trajectory.len() < 51);
        assert_eq!(trajectory.times.last().copied(), Some(diverged_at));
        assert!(trajectory.quantities.iter().all(|q| q.is_finite()));
    }
}
