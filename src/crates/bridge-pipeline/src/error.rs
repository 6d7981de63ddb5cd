//! Pipeline errors and the permanent-vs-transient classifier.

use thiserror::Error;

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors raised inside pipeline stages.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Tool arguments failed schema validation.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Tool name is not in the registry or not allowed for this role.
    #[error("Tool not allowed: {0}")]
    ToolNotAllowed(String),

    /// A referenced entity does not exist in the mirror.
    #[error("{0}")]
    Core(#[from] bridge_core::CoreError),

    /// Queue bookkeeping failure.
    #[error("Queue error: {0}")]
    Queue(#[from] bridge_queue::QueueError),

    /// Provider call failure.
    #[error("LLM error: {0}")]
    Llm(#[from] bridge_llm::LlmError),

    /// Anything else inside a stage.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Disposition for a failed task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Ack and drop; the agent gets a chat message instead of a retry.
    Permanent,

    /// Nack; the queue redelivers.
    Transient,
}

/// Decide whether an error is worth retrying.
///
/// Permanent markers follow the executor contract: validation failures,
/// disallowed tools, unresolvable references and malformed arguments will
/// fail identically on every retry, so they are dropped with feedback.
pub fn classify(error: &PipelineError) -> FailureClass {
    match error {
        PipelineError::Validation(_) | PipelineError::ToolNotAllowed(_) => FailureClass::Permanent,
        PipelineError::Core(_) => FailureClass::Permanent,
        PipelineError::Llm(e) if !e.is_retryable() => FailureClass::Permanent,
        _ => {
            let message = error.to_string();
            let lowered = message.to_lowercase();
            if lowered.contains("validation failed")
                || lowered.contains("tool not allowed")
                || lowered.contains("not found")
                || lowered.contains("invalid")
                || lowered.contains("missing required")
            {
                FailureClass::Permanent
            } else {
                FailureClass::Transient
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors_are_permanent() {
        let error = PipelineError::Validation("missing required field 'graph_id'".to_string());
        assert_eq!(classify(&error), FailureClass::Permanent);
    }

    #[test]
    fn test_unknown_tool_is_permanent() {
        let error = PipelineError::ToolNotAllowed("frobnicate".to_string());
        assert_eq!(classify(&error), FailureClass::Permanent);
    }

    #[test]
    fn test_missing_entity_is_permanent() {
        let error =
            PipelineError::Core(bridge_core::CoreError::GraphNotFound("nope".to_string()));
        assert_eq!(classify(&error), FailureClass::Permanent);
    }

    #[test]
    fn test_internal_errors_default_to_transient() {
        let error = PipelineError::Internal("queue hiccup".to_string());
        assert_eq!(classify(&error), FailureClass::Transient);
    }

    #[test]
    fn test_internal_errors_with_permanent_markers_are_dropped() {
        let error = PipelineError::Internal("upstream said: Invalid cursor".to_string());
        assert_eq!(classify(&error), FailureClass::Permanent);
    }

    #[test]
    fn test_rate_limit_is_transient() {
        let error =
            PipelineError::Llm(bridge_llm::LlmError::RateLimitExceeded("429".to_string()));
        assert_eq!(classify(&error), FailureClass::Transient);
    }
}
