//! Error types for the scaling engine.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

use yarnscale_core::{ConfigError, Direction, Metric};
use yarnscale_state::StateError;

/// Result type alias for scaling operations.
pub type ScaleResult<T> = Result<T, ScaleError>;

/// Errors that can occur while evaluating or applying a scaling action.
#[derive(Debug, Error)]
pub enum ScaleError {
    /// A window held too few samples to be trusted. Treated as no-op.
    #[error("insufficient data for {direction} {metric}: {actual} of {expected} expected samples")]
    InsufficientData {
        direction: Direction,
        metric: Metric,
        actual: usize,
        expected: u64,
    },

    #[error("remote call {operation} failed: {reason}")]
    RemoteCall {
        operation: &'static str,
        reason: String,
    },

    #[error("remote call {operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("state store error: {0}")]
    State(String),
}

impl ScaleError {
    pub fn is_insufficient_data(&self) -> bool {
        matches!(self, ScaleError::InsufficientData { .. })
    }
}

impl From<StateError> for ScaleError {
    fn from(e: StateError) -> Self {
        ScaleError::State(e.to_string())
    }
}

/// Run one remote collaborator call under a timeout.
pub(crate) async fn remote<T>(
    operation: &'static str,
    timeout: Duration,
    call: impl Future<Output = anyhow::Result<T>>,
) -> ScaleResult<T> {
    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(ScaleError::RemoteCall {
            operation,
            reason: format!("{e:#}"),
        }),
        Err(_) => Err(ScaleError::Timeout { operation, timeout }),
    }
}
