//! Supervision session manager
//!
//! Owns the session lifecycle:
//!
//! ```text
//! RUNNING ⇄ PAUSED ──► COMPLETED   (complete_supervision, scored)
//!    │         │
//!    └─────────┴─────► INTERRUPTED (terminate, never scored)
//! ```
//!
//! Each mutation runs under the session's lock and lands through a single
//! store transaction carrying the session change, any agent update and the
//! matching audit events.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn, Instrument};

use super::lease::{AgentLeases, SessionLocks};
use super::scoring::ConfidenceScorer;
use crate::audit::AuditEvent;
use crate::config::GovernanceConfig;
use crate::directory::AgentUpdate;
use crate::error::{GovernanceError, GovernanceResult};
use crate::maturity::MaturityModel;
use crate::otel;
use crate::signals::{GovernanceSignal, SessionCheckpoint, SharedSignalBus, SignalBus};
use crate::store::{GovernanceTransaction, SharedGovernanceStore};
use crate::types::{
    Agent, InterventionKind, InterventionResult, MaturityTier, SessionFilter, SessionId,
    SupervisionOutcome, SupervisionSession, TriggerContext,
};

/// Manages supervision sessions and the confidence feedback loop
pub struct SupervisionSessionManager {
    store: SharedGovernanceStore,
    scorer: ConfidenceScorer,
    leases: AgentLeases,
    locks: SessionLocks,
    signals: SharedSignalBus,
}

impl SupervisionSessionManager {
    pub fn new(store: SharedGovernanceStore, config: &GovernanceConfig) -> Self {
        let signals = SignalBus::with_capacity(config.supervision.signal_capacity).shared();
        Self::with_signals(store, config, signals)
    }

    pub fn with_signals(
        store: SharedGovernanceStore,
        config: &GovernanceConfig,
        signals: SharedSignalBus,
    ) -> Self {
        Self {
            store,
            scorer: ConfidenceScorer::new(config.scoring, MaturityModel::new(config.maturity)),
            leases: AgentLeases::new(),
            locks: SessionLocks::new(config.supervision.lock_timeout()),
            signals,
        }
    }

    pub fn signals(&self) -> &SharedSignalBus {
        &self.signals
    }

    /// Executor-side checkpoint for a session
    pub fn checkpoint(&self, session_id: &str) -> SessionCheckpoint {
        self.signals.checkpoint(session_id)
    }

    /// Session currently holding the agent's lease, if any
    pub fn active_session_for(&self, agent_id: &str) -> GovernanceResult<Option<SessionId>> {
        self.leases.holder(agent_id)
    }

    /// Rebuild agent leases from the store after a restart.
    /// Returns how many live sessions were re-leased.
    pub async fn recover(&self) -> GovernanceResult<usize> {
        let sessions = self.store.list_sessions(&SessionFilter::new()).await?;
        let mut recovered = 0;
        for session in sessions.iter().filter(|s| !s.is_terminal()) {
            match self.leases.try_acquire(&session.agent_id, &session.id) {
                Ok(()) => recovered += 1,
                Err(GovernanceError::AgentAlreadySupervised { session_id, .. })
                    if session_id == session.id => {}
                Err(e) => {
                    warn!(
                        agent_id = %session.agent_id,
                        session_id = %session.id,
                        "Could not re-lease live session: {}",
                        e
                    );
                }
            }
        }
        info!(recovered, "Supervision leases recovered");
        Ok(recovered)
    }

    /// Open a RUNNING session for an agent.
    ///
    /// Fails immediately with `AgentAlreadySupervised` while the agent has a
    /// live session; there is no queueing.
    pub async fn start_session(
        &self,
        agent_id: &str,
        trigger: TriggerContext,
        workspace_id: &str,
        supervisor_id: &str,
    ) -> GovernanceResult<SupervisionSession> {
        if supervisor_id.trim().is_empty() {
            return Err(GovernanceError::validation("supervisor_id must not be empty"));
        }
        let span = otel::session_span(agent_id, &trigger.action_type);
        self.open_session(agent_id, trigger, workspace_id, supervisor_id)
            .instrument(span)
            .await
    }

    async fn open_session(
        &self,
        agent_id: &str,
        trigger: TriggerContext,
        workspace_id: &str,
        supervisor_id: &str,
    ) -> GovernanceResult<SupervisionSession> {
        self.store
            .get_agent(agent_id)
            .await?
            .ok_or_else(|| GovernanceError::agent_not_found(agent_id))?;

        let session = SupervisionSession::new(agent_id, workspace_id, supervisor_id, trigger);
        self.leases.try_acquire(agent_id, &session.id)?;

        if let Err(e) = self.persist_start(&session).await {
            self.leases.release(agent_id, &session.id)?;
            return Err(e);
        }

        otel::record_session_started(&tracing::Span::current(), &session.id);
        info!(
            session_id = %session.id,
            agent_id = %session.agent_id,
            action_type = %session.trigger.action_type,
            supervisor_id = %session.supervisor_id,
            "Supervision session started"
        );
        Ok(session)
    }

    async fn persist_start(&self, session: &SupervisionSession) -> GovernanceResult<()> {
        // Lease table may be cold (no recover() yet); the store is authoritative
        let live = self
            .store
            .list_sessions(&SessionFilter::new().agent(&session.agent_id))
            .await?
            .into_iter()
            .find(|s| !s.is_terminal());
        if let Some(existing) = live {
            return Err(GovernanceError::AgentAlreadySupervised {
                agent_id: session.agent_id.clone(),
                session_id: existing.id,
            });
        }

        let tx = GovernanceTransaction::new("start_session")
            .insert_session(session.clone())
            .audit(AuditEvent::SessionStarted {
                session_id: session.id.clone(),
                agent_id: session.agent_id.clone(),
                workspace_id: session.workspace_id.clone(),
                supervisor_id: session.supervisor_id.clone(),
                trigger: session.trigger.clone(),
                timestamp: session.started_at,
            });
        self.store.commit(tx).await?;
        Ok(())
    }

    /// Apply a pause, correct or terminate to a live session
    pub async fn intervene(
        &self,
        session_id: &str,
        kind: InterventionKind,
        guidance: Option<String>,
    ) -> GovernanceResult<InterventionResult> {
        let span = otel::intervention_span(session_id, &kind.to_string());
        self.record_intervention(session_id, kind, guidance)
            .instrument(span)
            .await
    }

    async fn record_intervention(
        &self,
        session_id: &str,
        kind: InterventionKind,
        guidance: Option<String>,
    ) -> GovernanceResult<InterventionResult> {
        let guard = self.locks.acquire(session_id, "intervene").await?;

        let mut session = match self.store.get_session(session_id).await? {
            Some(session) => session,
            None => {
                self.discard_lock(session_id, guard);
                return Err(GovernanceError::session_not_found(session_id));
            }
        };
        let prior = session.status;
        let now = Utc::now();
        let intervention = match session.apply_intervention(kind, guidance, now) {
            Ok(intervention) => intervention.clone(),
            Err(e) => {
                self.discard_lock(session_id, guard);
                return Err(e);
            }
        };

        let mut tx = GovernanceTransaction::new("intervene")
            .update_session(session.clone(), prior)
            .audit(AuditEvent::InterventionRecorded {
                session_id: session.id.clone(),
                agent_id: session.agent_id.clone(),
                intervention: intervention.clone(),
                status: session.status,
                timestamp: now,
            });
        if session.is_terminal() {
            tx = tx.audit(AuditEvent::SessionInterrupted {
                session_id: session.id.clone(),
                agent_id: session.agent_id.clone(),
                intervention_count: session.intervention_count,
                timestamp: now,
            });
        }
        self.store.commit(tx).await?;

        self.signals.publish(GovernanceSignal::Intervention {
            session_id: session.id.clone(),
            agent_id: session.agent_id.clone(),
            kind,
            guidance: intervention.guidance.clone(),
            sequence: intervention.sequence,
            status: session.status,
            timestamp: now,
        });
        if session.is_terminal() {
            self.close(&session, guard)?;
        }

        otel::record_intervention_result(&tracing::Span::current(), session.status);
        info!(
            session_id = %session.id,
            agent_id = %session.agent_id,
            kind = %kind,
            status = %session.status,
            intervention_count = session.intervention_count,
            "Intervention recorded"
        );
        Ok(InterventionResult {
            session_id: session.id,
            agent_id: session.agent_id,
            intervention,
            status: session.status,
            intervention_count: session.intervention_count,
        })
    }

    /// Grade a live session and recalibrate its agent.
    ///
    /// The session's COMPLETED transition and the agent update commit together.
    /// A session can be completed once; later calls fail with `InvalidTransition`.
    pub async fn complete_supervision(
        &self,
        session_id: &str,
        rating: i64,
        feedback: &str,
    ) -> GovernanceResult<SupervisionOutcome> {
        let span = otel::completion_span(session_id, rating);
        self.grade_session(session_id, rating, feedback)
            .instrument(span)
            .await
    }

    async fn grade_session(
        &self,
        session_id: &str,
        rating: i64,
        feedback: &str,
    ) -> GovernanceResult<SupervisionOutcome> {
        let rating = ConfidenceScorer::validate_rating(rating)?;
        let guard = self.locks.acquire(session_id, "complete").await?;

        let mut session = match self.store.get_session(session_id).await? {
            Some(session) if !session.is_terminal() => session,
            Some(session) => {
                self.discard_lock(session_id, guard);
                return Err(GovernanceError::invalid_transition(
                    &session.id,
                    session.status,
                    "complete",
                ));
            }
            None => {
                self.discard_lock(session_id, guard);
                return Err(GovernanceError::session_not_found(session_id));
            }
        };
        let agent = self
            .store
            .get_agent(&session.agent_id)
            .await?
            .ok_or_else(|| GovernanceError::agent_not_found(&session.agent_id))?;

        let r = self.scorer.recalibrate(
            agent.tier,
            agent.confidence,
            rating,
            session.intervention_count,
        );
        let now = Utc::now();
        let outcome = SupervisionOutcome {
            session_id: session.id.clone(),
            agent_id: agent.id.clone(),
            success: r.success,
            supervisor_rating: rating,
            feedback: feedback.to_string(),
            confidence_boost: r.boost,
            confidence_before: r.confidence_before,
            confidence_after: r.confidence_after,
            tier_before: r.tier_before,
            tier_after: r.tier_after,
            promoted: r.promoted,
            intervention_count: session.intervention_count,
            completed_at: now,
            duration_seconds: session.duration_seconds(now),
        };

        let prior = session.status;
        session.complete(outcome.clone())?;
        let tx = GovernanceTransaction::new("complete_supervision")
            .update_session(session.clone(), prior)
            .update_agent(
                &agent.id,
                AgentUpdate::new()
                    .confidence(r.confidence_after)
                    .tier(r.tier_after)
                    .expecting(agent.version),
            )
            .audit(AuditEvent::SessionCompleted {
                outcome: outcome.clone(),
                timestamp: now,
            });
        self.store.commit(tx).await?;
        self.close(&session, guard)?;

        otel::record_completion_result(
            &tracing::Span::current(),
            &agent.id,
            r.success,
            r.boost,
            r.confidence_after,
            r.tier_after,
            r.promoted,
        );
        info!(
            session_id = %session.id,
            agent_id = %agent.id,
            rating,
            boost = r.boost,
            confidence = r.confidence_after,
            tier = %r.tier_after,
            promoted = r.promoted,
            "Supervision completed"
        );
        Ok(outcome)
    }

    /// Release everything a terminal session held and tell the executor
    fn close(
        &self,
        session: &SupervisionSession,
        guard: tokio::sync::OwnedMutexGuard<()>,
    ) -> GovernanceResult<()> {
        self.leases.release(&session.agent_id, &session.id)?;
        self.discard_lock(&session.id, guard);
        self.signals.publish(GovernanceSignal::SessionClosed {
            session_id: session.id.clone(),
            agent_id: session.agent_id.clone(),
            status: session.status,
            timestamp: session.completed_at.unwrap_or_else(Utc::now),
        });
        debug!(session_id = %session.id, status = %session.status, "Session closed");
        Ok(())
    }

    /// Missing and terminal sessions never take another lock, so their entry goes
    fn discard_lock(&self, session_id: &str, guard: tokio::sync::OwnedMutexGuard<()>) {
        drop(guard);
        self.locks.forget(session_id);
    }

    /// Set an agent's trust state directly, bypassing scoring
    pub async fn override_agent(
        &self,
        agent_id: &str,
        tier: Option<MaturityTier>,
        confidence: Option<f64>,
        actor: &str,
        reason: &str,
    ) -> GovernanceResult<Agent> {
        if tier.is_none() && confidence.is_none() {
            return Err(GovernanceError::validation(
                "override needs a tier, a confidence, or both",
            ));
        }
        if let Some(c) = confidence {
            if !(0.0..=1.0).contains(&c) {
                return Err(GovernanceError::validation(format!(
                    "confidence override must lie in [0, 1], got {}",
                    c
                )));
            }
        }
        if actor.trim().is_empty() {
            return Err(GovernanceError::validation("override actor must not be empty"));
        }

        let agent = self
            .store
            .get_agent(agent_id)
            .await?
            .ok_or_else(|| GovernanceError::agent_not_found(agent_id))?;
        let confidence_after = confidence.unwrap_or(agent.confidence);
        let tier_after = tier.unwrap_or_else(|| self.scorer.model().tier_for(confidence_after));

        let now = Utc::now();
        let tx = GovernanceTransaction::new("override_agent")
            .update_agent(
                agent_id,
                AgentUpdate::new()
                    .confidence(confidence_after)
                    .tier(tier_after)
                    .expecting(agent.version),
            )
            .audit(AuditEvent::AgentOverridden {
                agent_id: agent_id.to_string(),
                actor: actor.to_string(),
                reason: reason.to_string(),
                confidence_before: agent.confidence,
                confidence_after,
                tier_before: agent.tier,
                tier_after,
                timestamp: now,
            });
        let receipt = self.store.commit(tx).await?;
        let updated = receipt
            .agent
            .ok_or_else(|| GovernanceError::agent_not_found(agent_id))?;

        warn!(
            agent_id,
            actor,
            reason,
            tier_before = %agent.tier,
            tier_after = %updated.tier,
            confidence_after = updated.confidence,
            "Agent trust state overridden"
        );
        Ok(updated)
    }

    pub async fn get_session(&self, session_id: &str) -> GovernanceResult<SupervisionSession> {
        self.store
            .get_session(session_id)
            .await?
            .ok_or_else(|| GovernanceError::session_not_found(session_id))
    }

    pub async fn list_sessions(
        &self,
        filter: &SessionFilter,
    ) -> GovernanceResult<Vec<SupervisionSession>> {
        Ok(self.store.list_sessions(filter).await?)
    }

    /// Graded outcomes for an agent, oldest first
    pub async fn supervision_history(
        &self,
        agent_id: &str,
    ) -> GovernanceResult<Vec<SupervisionOutcome>> {
        self.store
            .get_agent(agent_id)
            .await?
            .ok_or_else(|| GovernanceError::agent_not_found(agent_id))?;

        let mut outcomes: Vec<SupervisionOutcome> = self
            .store
            .list_sessions(&SessionFilter::new().agent(agent_id))
            .await?
            .into_iter()
            .filter_map(|s| s.outcome)
            .collect();
        outcomes.sort_by(|a, b| a.completed_at.cmp(&b.completed_at));
        Ok(outcomes)
    }
}

impl std::fmt::Debug for SupervisionSessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupervisionSessionManager")
            .field("active_leases", &self.leases.len())
            .field("lock_timeout", &self.locks.timeout())
            .finish()
    }
}

/// Build a manager over any concrete store
pub fn manager_for<S>(store: Arc<S>, config: &GovernanceConfig) -> SupervisionSessionManager
where
    S: crate::store::GovernanceStore + 'static,
{
    SupervisionSessionManager::new(store, config)
}
