//! Governance service facade
//!
//! One method per API endpoint. Request bodies are camelCase JSON so the HTTP
//! layer can deserialize straight into them.
//!
//! | Endpoint | Method |
//! |----------|--------|
//! | `POST intercept` | [`GovernanceService::intercept`] |
//! | `POST sessions` | [`GovernanceService::start_session`] |
//! | `POST sessions/{id}/intervene` | [`GovernanceService::intervene`] |
//! | `POST sessions/{id}/complete` | [`GovernanceService::complete`] |
//! | `GET sessions?workspaceId=&status=` | [`GovernanceService::list_sessions`] |
//! | `GET sessions/{id}` | [`GovernanceService::get_session`] |
//! | `GET agents/{id}/supervision-history` | [`GovernanceService::supervision_history`] |
//! | `POST agents/{id}/override` | [`GovernanceService::override_agent`] |

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::GovernanceConfig;
use crate::error::GovernanceResult;
use crate::interceptor::TriggerInterceptor;
use crate::risk::ActionRiskPolicy;
use crate::signals::{SharedSignalBus, SignalBus};
use crate::store::{GovernanceStore, MemoryGovernanceStore};
use crate::supervision::SupervisionSessionManager;
use crate::types::{
    Agent, InterventionKind, InterventionResult, MaturityTier, RoutingDecision, SessionFilter,
    SessionStatus, SupervisionOutcome, SupervisionSession, TriggerContext, TriggerSource,
};

/// What the agent is trying to do
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionContext {
    pub action_type: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterceptRequest {
    pub agent_id: String,
    pub source: TriggerSource,
    pub context: ActionContext,
    pub requester_id: String,
}

impl InterceptRequest {
    fn trigger(&self) -> TriggerContext {
        TriggerContext::new(&self.context.action_type, self.source, &self.requester_id)
            .with_payload(self.context.payload.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionRequest {
    pub agent_id: String,
    pub context: TriggerContext,
    pub workspace_id: String,
    pub supervisor_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterveneRequest {
    /// `pause`, `correct` or `terminate`
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub guidance: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteRequest {
    /// Supervisor rating; anything outside [1, 5] is rejected
    pub rating: i64,
    #[serde(default)]
    pub feedback: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionQuery {
    #[serde(default)]
    pub workspace_id: Option<String>,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl SessionQuery {
    fn filter(&self) -> GovernanceResult<SessionFilter> {
        let mut filter = SessionFilter::new();
        if let Some(ws) = &self.workspace_id {
            filter = filter.workspace(ws);
        }
        if let Some(agent) = &self.agent_id {
            filter = filter.agent(agent);
        }
        if let Some(status) = &self.status {
            filter = filter.status(status.parse::<SessionStatus>()?);
        }
        Ok(filter)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideRequest {
    #[serde(default)]
    pub tier: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    pub actor: String,
    #[serde(default)]
    pub reason: String,
}

/// Facade wiring the interceptor and session manager over one store
pub struct GovernanceService {
    interceptor: TriggerInterceptor,
    manager: SupervisionSessionManager,
    signals: SharedSignalBus,
}

impl GovernanceService {
    pub fn new<S>(store: Arc<S>, config: &GovernanceConfig) -> Self
    where
        S: GovernanceStore + 'static,
    {
        let signals = SignalBus::with_capacity(config.supervision.signal_capacity).shared();
        let interceptor = TriggerInterceptor::new(
            store.clone(),
            store.clone(),
            ActionRiskPolicy::from_config(&config.risk),
        )
        .with_signals(signals.clone());
        let manager = SupervisionSessionManager::with_signals(store, config, signals.clone());

        Self {
            interceptor,
            manager,
            signals,
        }
    }

    /// Service over a fresh in-memory store
    pub fn in_memory(config: &GovernanceConfig) -> (Self, Arc<MemoryGovernanceStore>) {
        let store = MemoryGovernanceStore::new().shared();
        (Self::new(store.clone(), config), store)
    }

    pub fn interceptor(&self) -> &TriggerInterceptor {
        &self.interceptor
    }

    pub fn manager(&self) -> &SupervisionSessionManager {
        &self.manager
    }

    pub fn signals(&self) -> &SharedSignalBus {
        &self.signals
    }

    /// Re-lease live sessions after a restart
    pub async fn recover(&self) -> GovernanceResult<usize> {
        self.manager.recover().await
    }

    pub async fn intercept(&self, req: InterceptRequest) -> GovernanceResult<RoutingDecision> {
        self.interceptor.intercept(&req.agent_id, &req.trigger()).await
    }

    pub async fn start_session(&self, req: StartSessionRequest) -> GovernanceResult<SupervisionSession> {
        self.manager
            .start_session(&req.agent_id, req.context, &req.workspace_id, &req.supervisor_id)
            .await
    }

    pub async fn intervene(
        &self,
        session_id: &str,
        req: InterveneRequest,
    ) -> GovernanceResult<InterventionResult> {
        let kind: InterventionKind = req.kind.parse()?;
        self.manager.intervene(session_id, kind, req.guidance).await
    }

    pub async fn complete(
        &self,
        session_id: &str,
        req: CompleteRequest,
    ) -> GovernanceResult<SupervisionOutcome> {
        self.manager
            .complete_supervision(session_id, req.rating, &req.feedback)
            .await
    }

    pub async fn get_session(&self, session_id: &str) -> GovernanceResult<SupervisionSession> {
        self.manager.get_session(session_id).await
    }

    pub async fn list_sessions(&self, query: SessionQuery) -> GovernanceResult<Vec<SupervisionSession>> {
        self.manager.list_sessions(&query.filter()?).await
    }

    pub async fn supervision_history(&self, agent_id: &str) -> GovernanceResult<Vec<SupervisionOutcome>> {
        self.manager.supervision_history(agent_id).await
    }

    pub async fn override_agent(&self, agent_id: &str, req: OverrideRequest) -> GovernanceResult<Agent> {
        let tier = req
            .tier
            .as_deref()
            .map(str::parse::<MaturityTier>)
            .transpose()?;
        self.manager
            .override_agent(agent_id, tier, req.confidence, &req.actor, &req.reason)
            .await
    }
}
