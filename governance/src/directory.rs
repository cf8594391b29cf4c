//! Agent directory: injected repository of agent trust state

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::store::StoreResult;
use crate::types::{Agent, MaturityTier};

/// Partial update of an agent's trust state.
///
/// `expected_version`, when set, makes the update conditional on the agent's
/// current `version`. A mismatch fails with `StoreError::Conflict`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<MaturityTier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_version: Option<u64>,
}

impl AgentUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tier(mut self, tier: MaturityTier) -> Self {
        self.tier = Some(tier);
        self
    }

    pub fn confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn expecting(mut self, version: u64) -> Self {
        self.expected_version = Some(version);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.tier.is_none() && self.confidence.is_none()
    }

    /// Apply to an agent record, clamping confidence and bumping the version
    pub fn apply_to(&self, agent: &mut Agent, at: chrono::DateTime<chrono::Utc>) {
        if let Some(tier) = self.tier {
            agent.tier = tier;
        }
        if let Some(confidence) = self.confidence {
            agent.confidence = crate::maturity::clamp(confidence);
        }
        agent.version += 1;
        agent.updated_at = at;
    }
}

/// Read/write access to agent trust state
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AgentDirectory: Send + Sync {
    /// Fresh read of one agent. `Ok(None)` when absent.
    async fn get_agent(&self, agent_id: &str) -> StoreResult<Option<Agent>>;

    /// Apply an update and return the new record
    async fn update_agent(&self, agent_id: &str, update: AgentUpdate) -> StoreResult<Agent>;
}
