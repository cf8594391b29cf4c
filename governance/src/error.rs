//! Governance error types
//!
//! Every failure path of the governance core surfaces as a [`GovernanceError`].
//! Callers branch on [`GovernanceError::kind`] rather than on message text, and
//! the API layer renders errors through [`StructuredError`] so a client knows
//! what to do next.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::config::ConfigError;
use crate::store::StoreError;
use crate::types::SessionStatus;

/// Result type alias for governance operations
pub type GovernanceResult<T> = Result<T, GovernanceError>;

/// Coarse error taxonomy used for retry and surfacing decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing agent or session. Surfaced, never retried.
    NotFound,
    /// Operation not allowed in the current lifecycle state.
    InvalidTransition,
    /// Input rejected before any mutation.
    Validation,
    /// Store or audit backend failure. Nothing was committed.
    Persistence,
    /// A bounded wait expired. Nothing was committed.
    Timeout,
    /// Configuration could not be loaded or failed validation.
    Configuration,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::InvalidTransition => write!(f, "invalid_transition"),
            Self::Validation => write!(f, "validation"),
            Self::Persistence => write!(f, "persistence"),
            Self::Timeout => write!(f, "timeout"),
            Self::Configuration => write!(f, "configuration"),
        }
    }
}

/// Errors that can occur during governance operations
#[derive(Error, Debug)]
pub enum GovernanceError {
    /// Agent is not present in the directory
    #[error("Agent not found: {agent_id}")]
    AgentNotFound { agent_id: String },

    /// Supervision session does not exist
    #[error("Supervision session not found: {session_id}")]
    SessionNotFound { session_id: String },

    /// Agent already holds a non-terminal supervision session
    #[error("Agent {agent_id} is already supervised by session {session_id}")]
    AgentAlreadySupervised { agent_id: String, session_id: String },

    /// Lifecycle transition not permitted from the current status
    #[error("Invalid transition for session {session_id}: cannot {action} a {from} session")]
    InvalidTransition {
        session_id: String,
        from: SessionStatus,
        action: String,
    },

    /// Input parameters rejected
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// A bounded wait expired before the operation could start
    #[error("Timed out after {waited_ms}ms waiting to {operation}")]
    Timeout { operation: String, waited_ms: u64 },

    /// Store failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration failure
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl GovernanceError {
    /// Create an agent not found error
    pub fn agent_not_found(agent_id: impl Into<String>) -> Self {
        Self::AgentNotFound {
            agent_id: agent_id.into(),
        }
    }

    /// Create a session not found error
    pub fn session_not_found(session_id: impl Into<String>) -> Self {
        Self::SessionNotFound {
            session_id: session_id.into(),
        }
    }

    /// Create an invalid transition error
    pub fn invalid_transition(
        session_id: impl Into<String>,
        from: SessionStatus,
        action: impl Into<String>,
    ) -> Self {
        Self::InvalidTransition {
            session_id: session_id.into(),
            from,
            action: action.into(),
        }
    }

    /// Create a validation error (for invalid input parameters)
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, waited_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            waited_ms,
        }
    }

    /// Classify this error into the coarse taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AgentNotFound { .. } | Self::SessionNotFound { .. } => ErrorKind::NotFound,
            Self::AgentAlreadySupervised { .. } | Self::InvalidTransition { .. } => {
                ErrorKind::InvalidTransition
            }
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Store(_) => ErrorKind::Persistence,
            Self::Config(_) => ErrorKind::Configuration,
        }
    }

    /// Check if this error is retryable (transient failure, nothing committed)
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Store(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            Self::AgentNotFound { .. } => "AGENT_NOT_FOUND",
            Self::SessionNotFound { .. } => "SESSION_NOT_FOUND",
            Self::AgentAlreadySupervised { .. } => "AGENT_ALREADY_SUPERVISED",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::Timeout { .. } => "TIMEOUT",
            Self::Store(StoreError::Conflict { .. }) => "STORE_CONFLICT",
            Self::Store(_) => "STORE_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
        }
    }

    /// Render as a structured error for the API layer
    pub fn to_structured(&self) -> StructuredError {
        let recovery = match self {
            Self::AgentNotFound { .. } => "Register the agent in the directory before routing it",
            Self::SessionNotFound { .. } => "List sessions for the workspace to find a valid id",
            Self::AgentAlreadySupervised { .. } => {
                "Complete or terminate the active session, then start a new one"
            }
            Self::InvalidTransition { .. } => {
                "The session is terminal. Do not retry; start a new session if needed"
            }
            Self::Validation { .. } => "Fix the request parameters and resubmit",
            Self::Timeout { .. } => "Another operation holds the session. Retry shortly",
            Self::Store(StoreError::Conflict { .. }) => {
                "Agent trust state changed concurrently. Re-read and retry"
            }
            Self::Store(_) => "The governance store is unavailable. Retry once it recovers",
            Self::Config(_) => "Fix the governance configuration and restart",
        };

        let mut structured =
            StructuredError::new(self.code(), self.to_string(), recovery).with_context(
                "kind",
                self.kind().to_string(),
            );

        match self {
            Self::AgentNotFound { agent_id } => {
                structured = structured.with_context("agent_id", agent_id.clone());
            }
            Self::SessionNotFound { session_id } => {
                structured = structured.with_context("session_id", session_id.clone());
            }
            Self::AgentAlreadySupervised {
                agent_id,
                session_id,
            } => {
                structured = structured
                    .with_context("agent_id", agent_id.clone())
                    .with_context("active_session_id", session_id.clone());
            }
            Self::InvalidTransition {
                session_id, from, ..
            } => {
                structured = structured
                    .with_context("session_id", session_id.clone())
                    .with_context("status", from.to_string());
            }
            _ => {}
        }

        if self.is_retryable() {
            structured = structured.retryable();
        }
        structured
    }
}

/// Structured error response that tells the client how to recover.
///
/// # Example Response
/// ```json
/// {
///   "code": "AGENT_ALREADY_SUPERVISED",
///   "message": "Agent agent-7 is already supervised by session 4f1c...",
///   "recovery_action": "Complete or terminate the active session, then start a new one",
///   "context": { "agent_id": "agent-7", "active_session_id": "4f1c..." }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    /// Machine-readable error code
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Actionable recovery instruction
    pub recovery_action: String,

    /// Relevant context for debugging and recovery
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,

    /// Whether this error is retryable (transient failure)
    #[serde(default)]
    pub retryable: bool,
}

impl StructuredError {
    /// Create a new structured error
    pub fn new(
        code: impl Into<String>,
        message: impl Into<String>,
        recovery_action: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            recovery_action: recovery_action.into(),
            context: HashMap::new(),
            retryable: false,
        }
    }

    /// Add context key-value pair
    pub fn with_context(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Mark as retryable
    pub fn retryable(mut self) -> Self {
        self.retryable = true;
        self
    }
}

impl std::fmt::Display for StructuredError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for StructuredError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            GovernanceError::agent_not_found("a").kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            GovernanceError::session_not_found("s").kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            GovernanceError::invalid_transition("s", SessionStatus::Completed, "complete").kind(),
            ErrorKind::InvalidTransition
        );
        assert_eq!(
            GovernanceError::validation("bad rating").kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            GovernanceError::Store(StoreError::Unavailable("down".into())).kind(),
            ErrorKind::Persistence
        );
    }

    #[test]
    fn test_retryable() {
        assert!(GovernanceError::timeout("intervene", 5000).is_retryable());
        assert!(GovernanceError::Store(StoreError::Unavailable("down".into())).is_retryable());
        assert!(!GovernanceError::invalid_transition(
            "s",
            SessionStatus::Interrupted,
            "intervene"
        )
        .is_retryable());
        assert!(!GovernanceError::validation("x").is_retryable());
    }

    #[test]
    fn test_structured_error_context() {
        let err = GovernanceError::AgentAlreadySupervised {
            agent_id: "agent-7".to_string(),
            session_id: "sess-1".to_string(),
        };
        let structured = err.to_structured();
        assert_eq!(structured.code, "AGENT_ALREADY_SUPERVISED");
        assert!(!structured.retryable);
        assert_eq!(
            structured.context.get("active_session_id"),
            Some(&serde_json::Value::String("sess-1".to_string()))
        );

        let json = serde_json::to_string(&structured).unwrap();
        assert!(json.contains("recovery_action"));
    }

    #[test]
    fn test_invalid_transition_message() {
        let err = GovernanceError::invalid_transition("sess-9", SessionStatus::Completed, "intervene on");
        assert_eq!(
            err.to_string(),
            "Invalid transition for session sess-9: cannot intervene on a completed session"
        );
    }
}
