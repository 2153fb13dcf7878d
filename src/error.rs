//! Error taxonomy shared by every stage of the harness.
//!
//! Value mismatches are not errors; they are reported through
//! [`crate::compare::TestVerdict`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("invalid parameters for {op}: {reason}")]
    ParameterValidation { op: String, reason: String },
    #[error("golden computation failed for {op}: {reason}")]
    GoldenComputation { op: String, reason: String },
    #[error("execution failed for {op}: {reason}")]
    Execution { op: String, reason: String },
    #[error("shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
    #[error("invalid tensor: {0}")]
    InvalidTensor(String),
    #[error("input construction failed: {0}")]
    InputBuild(String),
    #[error("unsupported operation kind: {0}")]
    UnsupportedOperation(String),
    #[error("device {0} already has a live operation")]
    DeviceBusy(String),
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("invalid backend override: {0}")]
    InvalidBackendOverride(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("tensor load failed: {0}")]
    Load(String),
    #[error("statistics session {0} already finalized")]
    SessionFinalized(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type HarnessResult<T> = Result<T, HarnessError>;

impl HarnessError {
    pub fn param(op: impl Into<String>, reason: impl Into<String>) -> Self {
        HarnessError::ParameterValidation {
            op: op.into(),
            reason: reason.into(),
        }
    }

    pub fn golden(op: impl Into<String>, reason: impl Into<String>) -> Self {
        HarnessError::GoldenComputation {
            op: op.into(),
            reason: reason.into(),
        }
    }

    pub fn execution(op: impl Into<String>, reason: impl Into<String>) -> Self {
        HarnessError::Execution {
            op: op.into(),
            reason: reason.into(),
        }
    }
}
