use std::time::Duration;

use thiserror::Error;

/// Boxed transport failure from whichever client produced it.
pub type TransportError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced by every `wait_for_*` operation.
#[derive(Debug, Error)]
pub enum WaitError {
    /// Connection refused, TLS failure, non-2xx other than 404, undecodable body.
    #[error("transport error: {0}")]
    Transport(#[source] TransportError),

    /// The wall-clock budget ran out, or the event stream ended first.
    #[error("timed out after {}s waiting for {awaiting} [{operation_id}]", budget.as_secs())]
    Timeout {
        operation_id: String,
        awaiting: String,
        budget: Duration,
    },

    /// The orchestrator reported an authoritative terminal failure.
    #[error("{operation_id} failed: {}", reasons.join("; "))]
    OperationFailed {
        operation_id: String,
        reasons: Vec<String>,
    },
}

impl WaitError {
    /// Wraps any transport-level error.
    pub fn transport<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Transport(Box::new(err))
    }

    /// Operation id carried by timeout and failure variants.
    pub fn operation_id(&self) -> Option<&str> {
        match self {
            Self::Transport(_) => None,
            Self::Timeout { operation_id, .. } | Self::OperationFailed { operation_id, .. } => {
                Some(operation_id)
            }
        }
    }

    /// True for [`WaitError::Timeout`].
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
