//! Core data model: agents, triggers, routing decisions, and supervision sessions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{GovernanceError, GovernanceResult};

/// Unique identifier for agents
pub type AgentId = String;

/// Unique identifier for supervision sessions
pub type SessionId = String;

/// Unique identifier for workspaces
pub type WorkspaceId = String;

// ============================================================================
// Maturity and routing
// ============================================================================

/// Discrete trust level gating unsupervised action.
///
/// Variants are declared from least to most trusted so `Ord` follows the
/// promotion ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MaturityTier {
    Student,
    Intern,
    Supervised,
    Autonomous,
}

impl MaturityTier {
    /// All tiers, least trusted first
    pub fn all() -> &'static [MaturityTier] {
        &[
            Self::Student,
            Self::Intern,
            Self::Supervised,
            Self::Autonomous,
        ]
    }
}

impl std::fmt::Display for MaturityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Student => write!(f, "student"),
            Self::Intern => write!(f, "intern"),
            Self::Supervised => write!(f, "supervised"),
            Self::Autonomous => write!(f, "autonomous"),
        }
    }
}

impl FromStr for MaturityTier {
    type Err = GovernanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "student" => Ok(Self::Student),
            "intern" => Ok(Self::Intern),
            "supervised" => Ok(Self::Supervised),
            "autonomous" => Ok(Self::Autonomous),
            other => Err(GovernanceError::validation(format!(
                "unknown maturity tier '{}'",
                other
            ))),
        }
    }
}

/// How a triggered action may proceed.
///
/// Declared from strictest to most permissive, so `min` of two routes is the
/// stricter one: `Blocked < Approval < Supervised < Direct`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Route {
    Blocked,
    Approval,
    Supervised,
    Direct,
}

/// Upper bound on routing granted by a tier
pub type RoutingCeiling = Route;

/// Upper bound on routing imposed by an action's risk class
pub type RiskCeiling = Route;

impl Route {
    /// Whether the caller may proceed with execution (possibly under supervision)
    pub fn permits_execution(&self) -> bool {
        matches!(self, Self::Direct | Self::Supervised)
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Blocked => write!(f, "blocked"),
            Self::Approval => write!(f, "approval"),
            Self::Supervised => write!(f, "supervised"),
            Self::Direct => write!(f, "direct"),
        }
    }
}

impl FromStr for Route {
    type Err = GovernanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "blocked" => Ok(Self::Blocked),
            "approval" => Ok(Self::Approval),
            "supervised" => Ok(Self::Supervised),
            "direct" => Ok(Self::Direct),
            other => Err(GovernanceError::validation(format!(
                "unknown routing ceiling '{}'",
                other
            ))),
        }
    }
}

// ============================================================================
// Agents and triggers
// ============================================================================

/// Trust state of a single agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub name: String,
    pub workspace_id: WorkspaceId,
    pub tier: MaturityTier,
    /// Continuous trust metric in [0, 1]
    pub confidence: f64,
    /// Revision counter, bumped on every committed update
    #[serde(default)]
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl Agent {
    /// Create a new agent record at version 0
    pub fn new(
        id: impl Into<AgentId>,
        name: impl Into<String>,
        workspace_id: impl Into<WorkspaceId>,
        tier: MaturityTier,
        confidence: f64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            workspace_id: workspace_id.into(),
            tier,
            confidence: crate::maturity::clamp(confidence),
            version: 0,
            updated_at: Utc::now(),
        }
    }
}

/// Where a trigger originated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    Scheduled,
    Webhook,
    Chat,
    #[serde(alias = "data-sync")]
    DataSync,
    Api,
}

impl TriggerSource {
    /// Sources that fire without a human in the loop
    pub fn is_automated(&self) -> bool {
        matches!(self, Self::Scheduled | Self::Webhook | Self::DataSync)
    }
}

impl std::fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scheduled => write!(f, "scheduled"),
            Self::Webhook => write!(f, "webhook"),
            Self::Chat => write!(f, "chat"),
            Self::DataSync => write!(f, "data_sync"),
            Self::Api => write!(f, "api"),
        }
    }
}

impl FromStr for TriggerSource {
    type Err = GovernanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "scheduled" => Ok(Self::Scheduled),
            "webhook" => Ok(Self::Webhook),
            "chat" => Ok(Self::Chat),
            "data_sync" => Ok(Self::DataSync),
            "api" => Ok(Self::Api),
            other => Err(GovernanceError::validation(format!(
                "unknown trigger source '{}'",
                other
            ))),
        }
    }
}

/// Input describing an attempted agent action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerContext {
    pub action_type: String,
    pub source: TriggerSource,
    /// Opaque to the governance core
    #[serde(default)]
    pub payload: serde_json::Value,
    pub requester_id: String,
}

impl TriggerContext {
    pub fn new(
        action_type: impl Into<String>,
        source: TriggerSource,
        requester_id: impl Into<String>,
    ) -> Self {
        Self {
            action_type: action_type.into(),
            source,
            payload: serde_json::Value::Null,
            requester_id: requester_id.into(),
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

/// The interceptor's verdict on how a triggered action may proceed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub agent_id: AgentId,
    pub action_type: String,
    pub source: TriggerSource,
    pub requester_id: String,
    /// True for `Direct` and `Supervised`
    pub execute: bool,
    pub routing_decision: Route,
    pub reason: String,
    /// Confidence snapshot at decision time
    pub confidence: f64,
    /// Tier snapshot at decision time
    pub tier: MaturityTier,
    pub decided_at: DateTime<Utc>,
    /// False when the audit append failed and the loss was alerted instead
    pub audit_recorded: bool,
}

// ============================================================================
// Supervision sessions
// ============================================================================

/// Status of a supervision session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Running,
    Paused,
    Completed,
    Interrupted,
}

impl SessionStatus {
    /// Terminal sessions accept no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Interrupted)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Paused => write!(f, "paused"),
            Self::Completed => write!(f, "completed"),
            Self::Interrupted => write!(f, "interrupted"),
        }
    }
}

impl FromStr for SessionStatus {
    type Err = GovernanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "running" => Ok(Self::Running),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            "interrupted" => Ok(Self::Interrupted),
            other => Err(GovernanceError::validation(format!(
                "unknown session status '{}'",
                other
            ))),
        }
    }
}

/// Human-issued control command against a live session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterventionKind {
    /// Halt execution at the next checkpoint
    Pause,
    /// Resume with recorded guidance for the executor
    Correct,
    /// Stop the session for good; it is never scored
    Terminate,
}

impl std::fmt::Display for InterventionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pause => write!(f, "pause"),
            Self::Correct => write!(f, "correct"),
            Self::Terminate => write!(f, "terminate"),
        }
    }
}

impl FromStr for InterventionKind {
    type Err = GovernanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pause" => Ok(Self::Pause),
            "correct" => Ok(Self::Correct),
            "terminate" => Ok(Self::Terminate),
            other => Err(GovernanceError::validation(format!(
                "unknown intervention type '{}'",
                other
            ))),
        }
    }
}

/// One entry of a session's append-only intervention record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intervention {
    /// 1-indexed position in the session's intervention list
    pub sequence: u32,
    #[serde(rename = "type")]
    pub kind: InterventionKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guidance: Option<String>,
    pub at: DateTime<Utc>,
    /// Session status right after this intervention applied
    pub status_after: SessionStatus,
}

/// A bounded, monitored execution window for an agent's action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupervisionSession {
    /// Unique session identifier (UUID v4)
    pub id: SessionId,
    pub agent_id: AgentId,
    pub workspace_id: WorkspaceId,
    pub supervisor_id: String,
    /// Trigger that opened this session
    pub trigger: TriggerContext,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub intervention_count: u32,
    #[serde(default)]
    pub interventions: Vec<Intervention>,
    /// Set only on COMPLETED sessions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<SupervisionOutcome>,
}

impl SupervisionSession {
    /// Create a new RUNNING session
    pub fn new(
        agent_id: impl Into<AgentId>,
        workspace_id: impl Into<WorkspaceId>,
        supervisor_id: impl Into<String>,
        trigger: TriggerContext,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            agent_id: agent_id.into(),
            workspace_id: workspace_id.into(),
            supervisor_id: supervisor_id.into(),
            trigger,
            status: SessionStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            intervention_count: 0,
            interventions: Vec::new(),
            outcome: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Wall-clock seconds between start and terminal transition (or `now`)
    pub fn duration_seconds(&self, now: DateTime<Utc>) -> i64 {
        let end = self.completed_at.unwrap_or(now);
        (end - self.started_at).num_seconds().max(0)
    }

    /// Apply an intervention to this session.
    ///
    /// Fails with `InvalidTransition` on terminal sessions, leaving the session
    /// untouched. On success the intervention is appended and counted.
    pub fn apply_intervention(
        &mut self,
        kind: InterventionKind,
        guidance: Option<String>,
        at: DateTime<Utc>,
    ) -> GovernanceResult<&Intervention> {
        if self.is_terminal() {
            return Err(GovernanceError::invalid_transition(
                &self.id,
                self.status,
                format!("apply '{}' to", kind),
            ));
        }

        self.status = match kind {
            InterventionKind::Pause => SessionStatus::Paused,
            InterventionKind::Correct => SessionStatus::Running,
            InterventionKind::Terminate => {
                self.completed_at = Some(at);
                SessionStatus::Interrupted
            }
        };

        self.intervention_count += 1;
        self.interventions.push(Intervention {
            sequence: self.intervention_count,
            kind,
            guidance,
            at,
            status_after: self.status,
        });

        // Just pushed
        Ok(&self.interventions[self.interventions.len() - 1])
    }

    /// Mark the session COMPLETED with its graded outcome
    pub fn complete(&mut self, outcome: SupervisionOutcome) -> GovernanceResult<()> {
        if self.is_terminal() {
            return Err(GovernanceError::invalid_transition(
                &self.id,
                self.status,
                "complete",
            ));
        }
        self.status = SessionStatus::Completed;
        self.completed_at = Some(outcome.completed_at);
        self.outcome = Some(outcome);
        Ok(())
    }
}

/// Result of a successful intervention
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterventionResult {
    pub session_id: SessionId,
    pub agent_id: AgentId,
    pub intervention: Intervention,
    pub status: SessionStatus,
    pub intervention_count: u32,
}

/// Graded result of a completed session, feeding back into confidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupervisionOutcome {
    pub session_id: SessionId,
    pub agent_id: AgentId,
    pub success: bool,
    /// Supervisor rating in [1, 5]
    pub supervisor_rating: u8,
    pub feedback: String,
    pub confidence_boost: f64,
    pub confidence_before: f64,
    pub confidence_after: f64,
    pub tier_before: MaturityTier,
    pub tier_after: MaturityTier,
    /// Tier moved up the ladder
    pub promoted: bool,
    pub intervention_count: u32,
    pub completed_at: DateTime<Utc>,
    pub duration_seconds: i64,
}

/// Session query filter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionFilter {
    pub workspace_id: Option<WorkspaceId>,
    pub agent_id: Option<AgentId>,
    pub status: Option<SessionStatus>,
}

impl SessionFilter {
    /// Create a new empty filter (matches all sessions)
    pub fn new() -> Self {
        Self::default()
    }

    pub fn workspace(mut self, workspace_id: impl Into<WorkspaceId>) -> Self {
        self.workspace_id = Some(workspace_id.into());
        self
    }

    pub fn agent(mut self, agent_id: impl Into<AgentId>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn status(mut self, status: SessionStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Check if a session matches this filter
    pub fn matches(&self, session: &SupervisionSession) -> bool {
        if let Some(ref ws) = self.workspace_id {
            if &session.workspace_id != ws {
                return false;
            }
        }
        if let Some(ref agent) = self.agent_id {
            if &session.agent_id != agent {
                return false;
            }
        }
        if let Some(status) = self.status {
            if session.status != status {
                return false;
            }
        }
        true
    }
}
