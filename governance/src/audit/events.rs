//! Audit event types
//!
//! One variant per governance fact worth keeping forever. Serialized with an
//! internal `type` tag so JSON-lines logs stay greppable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{
    AgentId, Intervention, MaturityTier, RoutingDecision, SessionId, SessionStatus,
    SupervisionOutcome, TriggerContext, WorkspaceId,
};

/// All governance audit events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    /// The interceptor routed a triggered action
    RoutingDecided { decision: RoutingDecision },

    /// A supervision session was opened
    SessionStarted {
        session_id: SessionId,
        agent_id: AgentId,
        workspace_id: WorkspaceId,
        supervisor_id: String,
        trigger: TriggerContext,
        timestamp: DateTime<Utc>,
    },

    /// A supervisor intervened in a live session
    InterventionRecorded {
        session_id: SessionId,
        agent_id: AgentId,
        intervention: Intervention,
        status: SessionStatus,
        timestamp: DateTime<Utc>,
    },

    /// A session was terminated and will never be scored
    SessionInterrupted {
        session_id: SessionId,
        agent_id: AgentId,
        intervention_count: u32,
        timestamp: DateTime<Utc>,
    },

    /// A session was graded and the agent recalibrated
    SessionCompleted {
        outcome: SupervisionOutcome,
        timestamp: DateTime<Utc>,
    },

    /// An operator set trust state directly
    AgentOverridden {
        agent_id: AgentId,
        actor: String,
        reason: String,
        confidence_before: f64,
        confidence_after: f64,
        tier_before: MaturityTier,
        tier_after: MaturityTier,
        timestamp: DateTime<Utc>,
    },
}

impl AuditEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            AuditEvent::RoutingDecided { .. } => "routing_decided",
            AuditEvent::SessionStarted { .. } => "session_started",
            AuditEvent::InterventionRecorded { .. } => "intervention_recorded",
            AuditEvent::SessionInterrupted { .. } => "session_interrupted",
            AuditEvent::SessionCompleted { .. } => "session_completed",
            AuditEvent::AgentOverridden { .. } => "agent_overridden",
        }
    }

    /// Get the timestamp of this event
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            AuditEvent::RoutingDecided { decision } => decision.decided_at,
            AuditEvent::SessionStarted { timestamp, .. } => *timestamp,
            AuditEvent::InterventionRecorded { timestamp, .. } => *timestamp,
            AuditEvent::SessionInterrupted { timestamp, .. } => *timestamp,
            AuditEvent::SessionCompleted { timestamp, .. } => *timestamp,
            AuditEvent::AgentOverridden { timestamp, .. } => *timestamp,
        }
    }

    /// Get the session ID if this event is session-scoped
    pub fn session_id(&self) -> Option<&str> {
        match self {
            AuditEvent::SessionStarted { session_id, .. } => Some(session_id),
            AuditEvent::InterventionRecorded { session_id, .. } => Some(session_id),
            AuditEvent::SessionInterrupted { session_id, .. } => Some(session_id),
            AuditEvent::SessionCompleted { outcome, .. } => Some(&outcome.session_id),
            AuditEvent::RoutingDecided { .. } | AuditEvent::AgentOverridden { .. } => None,
        }
    }

    /// Agent the event concerns
    pub fn agent_id(&self) -> &str {
        match self {
            AuditEvent::RoutingDecided { decision } => &decision.agent_id,
            AuditEvent::SessionStarted { agent_id, .. } => agent_id,
            AuditEvent::InterventionRecorded { agent_id, .. } => agent_id,
            AuditEvent::SessionInterrupted { agent_id, .. } => agent_id,
            AuditEvent::SessionCompleted { outcome, .. } => &outcome.agent_id,
            AuditEvent::AgentOverridden { agent_id, .. } => agent_id,
        }
    }
}

/// An audit event once it has been durably appended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Monotonic position in the log, starting at 1
    pub sequence: u64,
    pub recorded_at: DateTime<Utc>,
    pub event: AuditEvent,
}

/// Acknowledgement returned by a successful append
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditAck {
    pub sequence: u64,
    pub recorded_at: DateTime<Utc>,
}

impl From<&AuditRecord> for AuditAck {
    fn from(record: &AuditRecord) -> Self {
        Self {
            sequence: record.sequence,
            recorded_at: record.recorded_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TriggerSource;

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = AuditEvent::SessionInterrupted {
            session_id: "s-1".to_string(),
            agent_id: "a-1".to_string(),
            intervention_count: 2,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "session_interrupted");
        assert_eq!(event.event_type(), "session_interrupted");
        assert_eq!(event.session_id(), Some("s-1"));
        assert_eq!(event.agent_id(), "a-1");
    }

    #[test]
    fn test_started_event_round_trips() {
        let event = AuditEvent::SessionStarted {
            session_id: "s-2".to_string(),
            agent_id: "a-2".to_string(),
            workspace_id: "ws".to_string(),
            supervisor_id: "sup".to_string(),
            trigger: TriggerContext::new("bulk_delete", TriggerSource::Api, "u-1"),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: AuditEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
