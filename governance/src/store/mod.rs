//! Governance persistence
//!
//! A [`GovernanceStore`] is an [`AgentDirectory`] and an [`AuditLog`] that also
//! owns supervision sessions, and can commit a session change, an agent
//! update and their audit events as one all-or-nothing
//! [`GovernanceTransaction`].

pub mod memory;
pub mod snapshot;

pub use memory::MemoryGovernanceStore;
pub use snapshot::{load_snapshot, save_snapshot, StoreSnapshot};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::audit::{AuditEvent, AuditLog};
use crate::directory::{AgentDirectory, AgentUpdate};
use crate::types::{Agent, SessionFilter, SessionStatus, SupervisionSession};

/// Error type for store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Conflict on {entity} {id}: expected {expected}, found {actual}")]
    Conflict {
        entity: &'static str,
        id: String,
        expected: String,
        actual: String,
    },

    #[error("Agent missing from store: {0}")]
    AgentMissing(String),

    #[error("Session missing from store: {0}")]
    SessionMissing(String),

    #[error("Lock poisoned")]
    LockPoisoned,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Failures where a retry against fresh state may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Conflict { .. })
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Shared reference to a governance store
pub type SharedGovernanceStore = Arc<dyn GovernanceStore>;

/// Condition the stored session must meet for a write to apply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPrecondition {
    /// Insert: no session with this id, and no other non-terminal session for the agent
    Absent,
    /// Update: stored session currently has exactly this status
    Status(SessionStatus),
}

#[derive(Debug, Clone)]
pub struct SessionWrite {
    pub session: SupervisionSession,
    pub precondition: SessionPrecondition,
}

#[derive(Debug, Clone)]
pub struct AgentWrite {
    pub agent_id: String,
    pub update: AgentUpdate,
}

/// Unit of atomic change. Either every part lands or none does.
#[derive(Debug, Clone, Default)]
pub struct GovernanceTransaction {
    /// Short name used in logs
    pub label: &'static str,
    pub session: Option<SessionWrite>,
    pub agent: Option<AgentWrite>,
    pub audit: Vec<AuditEvent>,
}

impl GovernanceTransaction {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            ..Default::default()
        }
    }

    /// Insert a brand-new session
    pub fn insert_session(mut self, session: SupervisionSession) -> Self {
        self.session = Some(SessionWrite {
            session,
            precondition: SessionPrecondition::Absent,
        });
        self
    }

    /// Replace a session, provided it still has `expected` status
    pub fn update_session(mut self, session: SupervisionSession, expected: SessionStatus) -> Self {
        self.session = Some(SessionWrite {
            session,
            precondition: SessionPrecondition::Status(expected),
        });
        self
    }

    pub fn update_agent(mut self, agent_id: impl Into<String>, update: AgentUpdate) -> Self {
        self.agent = Some(AgentWrite {
            agent_id: agent_id.into(),
            update,
        });
        self
    }

    pub fn audit(mut self, event: AuditEvent) -> Self {
        self.audit.push(event);
        self
    }
}

/// What a successful commit produced
#[derive(Debug, Clone)]
pub struct CommitReceipt {
    pub committed_at: DateTime<Utc>,
    /// Sequence numbers assigned to the transaction's audit events, in order
    pub audit_sequences: Vec<u64>,
    /// Agent record after the update, when the transaction carried one
    pub agent: Option<Agent>,
}

/// Full persistence surface used by the session manager
#[async_trait]
pub trait GovernanceStore: AgentDirectory + AuditLog {
    async fn get_session(&self, session_id: &str) -> StoreResult<Option<SupervisionSession>>;

    /// Sessions matching the filter, oldest first
    async fn list_sessions(&self, filter: &SessionFilter) -> StoreResult<Vec<SupervisionSession>>;

    /// Apply a transaction atomically. Any failed precondition aborts the
    /// whole transaction with nothing applied.
    async fn commit(&self, tx: GovernanceTransaction) -> StoreResult<CommitReceipt>;
}
