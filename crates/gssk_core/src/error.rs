//! Error taxonomy shared by every kernel operation.

use thiserror::Error;

pub type Result<T, E = GsskError> = std::result::Result<T, E>;

/// Coarse classification of a [`GsskError`], stable for callers that need to
/// branch on the failure cause rather than read the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Structural,
    Linkage,
    Logic,
    Config,
    Allocation,
    Divergence,
    InvalidArgument,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GsskError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Schema error: {0}")]
    Structural(String),

    #[error("Schema error: duplicate node ID '{id}' (at index {index}, first seen at index {first})")]
    DuplicateNode { id: String, index: usize, first: usize },

    #[error("Linkage error: {0}")]
    Linkage(String),

    #[error("Logic error: {0}")]
    Logic(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Allocation error: could not reserve {requested} values for {purpose}")]
    Allocation { requested: usize, purpose: &'static str },

    #[error("Numerical divergence: node '{node}' became non-finite at t={time:.4}")]
    Divergence { node: String, time: f64 },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl GsskError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GsskError::Parse(_) | GsskError::Structural(_) | GsskError::DuplicateNode { .. } => {
                ErrorKind::Structural
            }
            GsskError::Linkage(_) => ErrorKind::Linkage,
            GsskError::Logic(_) => ErrorKind::Logic,
            GsskError::Config(_) => ErrorKind::Config,
            GsskError::Allocation { .. } => ErrorKind::Allocation,
            GsskError::Divergence { .. } => ErrorKind::Divergence,
            GsskError::InvalidArgument(_) => ErrorKind::InvalidArgument,
        }
    }

    pub fn is_divergence(&self) -> bool {
        self.kind() == ErrorKind::Divergence
    }
}

/// Allocates a zeroed working buffer, reporting exhaustion instead of aborting.
pub(crate) fn zeroed<T: Clone>(len: usize, zero: T, purpose: &'static str) -> Result<Vec<T>> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(len)
        .map_err(|_| GsskError::Allocation {
            requested: len,
            purpose,
        })?;
    buffer.resize(len, zero);
    Ok(buffer)
}
