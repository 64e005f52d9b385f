//! The `gssk_core` crate is the numerical kernel of GSSK, the General Systems
//! Simulation Kernel for Odum-style flow networks.
//!
//! Key components:
//! - **Model**: `NodeId`, `Node`, `Edge` and `RunConfig`, built and validated from a
//!   `ModelDescription` into a `FlowNetwork`.
//! - **Flow evaluator**: `FlowNetwork` implements `DynamicalSystem` with the five fixed
//!   logic kinds.
//! - **Solvers**: fixed-step Euler and RK4, driven by `Instance::step` with divergence
//!   detection and non-negativity clamping.
//! - **Ensemble**: Monte-Carlo forecasting over perturbed edge coefficients.
//! - **Calibration**: differential evolution fitting edge coefficients to observations.

pub mod calibration;
pub mod description;
pub mod ensemble;
pub mod error;
pub mod instance;
pub mod model;
pub mod network;
pub mod solvers;
pub mod traits;
pub mod trajectory;

pub use calibration::{
    calibrate, calibrate_with, CalibrationReport, CalibrationSettings, NodeObservations,
    Observation,
};
pub use description::ModelDescription;
pub use ensemble::{run_ensemble, EnsembleResult};
pub use error::{ErrorKind, GsskError, Result};
pub use instance::{Checkpoint, Instance};
pub use model::{LogicKind, Method, NodeId, NodeKind, RunConfig};
pub use network::FlowNetwork;
pub use trajectory::Trajectory;
