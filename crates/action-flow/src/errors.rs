//! Flow execution error types

use action_primitives::ExecutionResult;
use thiserror::Error;

/// Flow execution errors
///
/// Locator and timeout failures never show up here; they are recorded as
/// [`action_primitives::ErrorKind`] values on an [`ExecutionResult`].
#[derive(Debug, Error)]
pub enum FlowError {
    /// Every tier failed for a step
    #[error("Healing exhausted for step {step_id} after {} attempts", .attempts.len())]
    HealingExhausted {
        step_id: String,
        attempts: Vec<ExecutionResult>,
    },

    /// A step that cannot be healed failed
    #[error("Step {step_id} failed: {reason}")]
    StepFailed { step_id: String, reason: String },

    /// Browser session is gone; never retried
    #[error("Session lost: {0}")]
    SessionLost(String),

    /// Run cancellation token fired
    #[error("Run cancelled")]
    Cancelled,

    /// Healing configuration rejected
    #[error("Invalid healing config: {0}")]
    InvalidConfig(String),

    /// Plan failed validation before execution
    #[error("Invalid plan: {0}")]
    InvalidPlan(String),
}

impl FlowError {
    /// Check if the error aborts the run without further recovery
    pub fn is_fatal(&self) -> bool {
        matches!(self, FlowError::SessionLost(_) | FlowError::Cancelled)
    }

    /// Get error severity (0=low, 1=medium, 2=high, 3=critical)
    pub fn severity(&self) -> u8 {
        match self {
            FlowError::SessionLost(_) => 3,
            FlowError::HealingExhausted { .. } | FlowError::StepFailed { .. } => 2,
            FlowError::Cancelled => 1,
            FlowError::InvalidConfig(_) | FlowError::InvalidPlan(_) => 0,
        }
    }

    /// Step the error is attributed to, if any
    pub fn step_id(&self) -> Option<&str> {
        match self {
            FlowError::HealingExhausted { step_id, .. } | FlowError::StepFailed { step_id, .. } => {
                Some(step_id)
            }
            _ => None,
        }
    }
}

/// Errors reported by a [`crate::HealingProvider`]. They fail one healing
/// attempt and are never propagated out of the orchestrator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Healing provider timed out after {0}ms")]
    Timeout(u64),

    #[error("Healing provider unavailable: {0}")]
    Unavailable(String),

    #[error("Healing provider rejected the request: {0}")]
    Rejected(String),

    #[error("Healing provider returned an invalid response: {0}")]
    InvalidResponse(String),

    #[error("Operation not supported by healing provider: {0}")]
    Unsupported(String),
}

impl ProviderError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::Timeout(_)
                | ProviderError::Unavailable(_)
                | ProviderError::InvalidResponse(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use action_primitives::{ErrorKind, ExecutionResult};

    #[test]
    fn exhausted_message_counts_attempts() {
        let attempts = (1..=5)
            .map(|attempt| {
                ExecutionResult::failed("s1", attempt, None, ErrorKind::LocatorNotFound, "x", 1)
            })
            .collect();
        let err = FlowError::HealingExhausted {
            step_id: "s1".into(),
            attempts,
        };
        assert_eq!(err.to_string(), "Healing exhausted for step s1 after 5 attempts");
        assert_eq!(err.step_id(), Some("s1"));
        assert!(!err.is_fatal());
        assert!(FlowError::SessionLost("gone".into()).is_fatal());
    }
}
