//! Error types for taskflow.

use crate::task::Capability;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Task error: {0}")]
    Task(#[from] TaskError),

    #[error("Handler error: {0}")]
    Handler(#[from] HandlerError),

    #[error("Orchestration error: {0}")]
    Orchestration(#[from] OrchestrationError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("No handler registered for capability {capability}")]
    MissingHandler { capability: Capability },

    #[error("Handler for capability {capability} registered twice")]
    DuplicateHandler { capability: Capability },
}

/// Task lookup and validation errors.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("Task {id} not found")]
    NotFound { id: String },

    #[error("Invalid task input: {reason}")]
    InvalidInput { reason: String },

    #[error("Task {id} is already executing")]
    AlreadyRunning { id: String },
}

/// Failure reported by a step handler.
///
/// The display form is the bare message: it is copied verbatim into the
/// step's error, the task's error message and the ERROR event payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandlerError {
    #[error("{0}")]
    Failed(String),

    #[error("missing step input: {key}")]
    MissingInput { key: String },
}

/// Planning failures.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("{0}")]
    Failed(String),
}

/// A state change the task or step lifecycle does not allow.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Cannot transition {subject} from {from} to {to}")]
pub struct TransitionError {
    pub subject: String,
    pub from: String,
    pub to: String,
}

/// Failures outside any single step's retry loop.
#[derive(Debug, thiserror::Error)]
pub enum OrchestrationError {
    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Registry(#[from] TaskError),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("execution cancelled")]
    Cancelled,
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handler_error_displays_raw_message() {
        let err = HandlerError::Failed("index unavailable".to_string());
        assert_eq!(err.to_string(), "index unavailable");
    }

    #[test]
    fn plan_error_is_not_wrapped() {
        let err = OrchestrationError::from(PlanError::Failed("classifier down".to_string()));
        assert_eq!(err.to_string(), "classifier down");
    }

    #[test]
    fn top_level_conversion() {
        let err: Error = TaskError::NotFound {
            id: "does-not-exist".to_string(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "Task error: Task does-not-exist not found"
        );
    }
}
