//! Agent Governance Library
//!
//! Decides how much autonomy an AI agent gets and keeps that decision honest
//! over time:
//! - Maturity tiers (STUDENT → INTERN → SUPERVISED → AUTONOMOUS) derived from a
//!   continuous confidence score
//! - Trigger interception that routes each action to DIRECT, SUPERVISED,
//!   APPROVAL or BLOCKED, capped by a per-action risk policy
//! - Supervised execution sessions with human pause / correct / terminate
//! - Confidence recalibration from supervisor ratings, with gated promotion
//!
//! # Components
//!
//! - [`maturity::MaturityModel`]: confidence → tier → capability ceiling
//! - [`risk::ActionRiskPolicy`]: action type → risk ceiling
//! - [`interceptor::TriggerInterceptor`]: the routing decision
//! - [`supervision::SupervisionSessionManager`]: session lifecycle and scoring
//! - [`store::GovernanceStore`]: atomic persistence of sessions, agents and audit
//! - [`signals::SignalBus`]: intervention delivery to external executors
//! - [`service::GovernanceService`]: one method per API endpoint
//!
//! # Usage
//!
//! ```rust,ignore
//! use agent_governance::{GovernanceConfig, GovernanceService};
//!
//! let config = GovernanceConfig::from_env()?;
//! let (service, store) = GovernanceService::in_memory(&config);
//! service.recover().await?;
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod audit;
pub mod config;
pub mod directory;
pub mod error;
pub mod interceptor;
pub mod maturity;
pub mod otel;
pub mod risk;
pub mod service;
pub mod signals;
pub mod store;
pub mod supervision;
pub mod types;

// Re-export key types
pub use audit::{AuditAck, AuditEvent, AuditLog, AuditRecord, AuditSink, JsonlAuditLog};
pub use config::{ConfigError, GovernanceConfig, ScoringConfig, SupervisionConfig};
pub use directory::{AgentDirectory, AgentUpdate};
pub use error::{ErrorKind, GovernanceError, GovernanceResult, StructuredError};
pub use interceptor::{decide, RouteVerdict, TriggerInterceptor};
pub use maturity::{clamp, MaturityModel, MaturityThresholds};
pub use risk::{ActionRiskPolicy, ActionRule, RiskClassification, RiskPolicyConfig};
pub use service::{
    ActionContext, CompleteRequest, GovernanceService, InterceptRequest, InterveneRequest,
    OverrideRequest, SessionQuery, StartSessionRequest,
};
pub use signals::{
    CheckpointDirective, FilteredReceiver, GovernanceSignal, SessionCheckpoint, SharedSignalBus,
    SignalBus, SignalError, SignalFilter,
};
pub use store::{
    load_snapshot, save_snapshot, CommitReceipt, GovernanceStore, GovernanceTransaction,
    MemoryGovernanceStore, SharedGovernanceStore, StoreError, StoreResult, StoreSnapshot,
};
pub use supervision::{ConfidenceScorer, Recalibration, SupervisionSessionManager};
pub use types::{
    Agent, AgentId, Intervention, InterventionKind, InterventionResult, MaturityTier,
    RiskCeiling, Route, RoutingCeiling, RoutingDecision, SessionFilter, SessionId,
    SessionStatus, SupervisionOutcome, SupervisionSession, TriggerContext, TriggerSource,
    WorkspaceId,
};
