//! In-process governance store
//!
//! State sits behind a `std::sync::RwLock`. Writes are serialized through an
//! async commit gate and run in three phases:
//!
//! 1. validate every precondition and stage the result under a read lock
//! 2. persist the staged audit records to the durable sink (if any)
//! 3. apply everything under a write lock
//!
//! A failure in phase 1 or 2 leaves the store untouched. A poisoned lock is
//! caught in phase 1, before anything reaches the sink. Once the sink has the
//! records phase 3 always applies them.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{
    CommitReceipt, GovernanceStore, GovernanceTransaction, SessionPrecondition, StoreError,
    StoreResult, StoreSnapshot,
};
use crate::audit::{AuditAck, AuditEvent, AuditLog, AuditRecord, AuditSink};
use crate::directory::{AgentDirectory, AgentUpdate};
use crate::types::{Agent, SessionFilter, SupervisionSession};

#[derive(Debug, Default)]
struct MemoryState {
    agents: HashMap<String, Agent>,
    sessions: HashMap<String, SupervisionSession>,
    audit: Vec<AuditRecord>,
    next_sequence: u64,
}

/// In-memory [`GovernanceStore`] with an optional durable audit mirror
pub struct MemoryGovernanceStore {
    state: RwLock<MemoryState>,
    commit_gate: Mutex<()>,
    sink: Option<Arc<dyn AuditSink>>,
}

impl Default for MemoryGovernanceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryGovernanceStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(MemoryState {
                next_sequence: 1,
                ..Default::default()
            }),
            commit_gate: Mutex::new(()),
            sink: None,
        }
    }

    /// Mirror every committed audit record to `sink` before applying it
    pub fn with_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Rebuild a store from a snapshot
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        let next_sequence = snapshot
            .audit
            .iter()
            .map(|r| r.sequence)
            .max()
            .map(|s| s + 1)
            .unwrap_or(1);
        Self {
            state: RwLock::new(MemoryState {
                agents: snapshot
                    .agents
                    .into_iter()
                    .map(|a| (a.id.clone(), a))
                    .collect(),
                sessions: snapshot
                    .sessions
                    .into_iter()
                    .map(|s| (s.id.clone(), s))
                    .collect(),
                audit: snapshot.audit,
                next_sequence,
            }),
            commit_gate: Mutex::new(()),
            sink: None,
        }
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, MemoryState>> {
        self.state.read().map_err(|_| StoreError::LockPoisoned)
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, MemoryState>> {
        self.state.write().map_err(|_| StoreError::LockPoisoned)
    }

    /// Register or replace an agent record
    pub async fn upsert_agent(&self, agent: Agent) -> StoreResult<()> {
        let _gate = self.commit_gate.lock().await;
        let mut state = self.write()?;
        debug!(agent_id = %agent.id, tier = %agent.tier, "Agent registered");
        state.agents.insert(agent.id.clone(), agent);
        Ok(())
    }

    /// Every agent record, ordered by id
    pub fn agents(&self) -> StoreResult<Vec<Agent>> {
        let state = self.read()?;
        let mut agents: Vec<Agent> = state.agents.values().cloned().collect();
        agents.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(agents)
    }

    /// Full audit trail in sequence order
    pub fn audit_records(&self) -> StoreResult<Vec<AuditRecord>> {
        Ok(self.read()?.audit.clone())
    }

    /// Audit trail of one session in sequence order
    pub fn audit_for_session(&self, session_id: &str) -> StoreResult<Vec<AuditRecord>> {
        Ok(self
            .read()?
            .audit
            .iter()
            .filter(|r| r.event.session_id() == Some(session_id))
            .cloned()
            .collect())
    }

    /// Point-in-time copy of the whole store
    pub fn snapshot(&self) -> StoreResult<StoreSnapshot> {
        let state = self.read()?;
        let mut sessions: Vec<SupervisionSession> = state.sessions.values().cloned().collect();
        sessions.sort_by(|a, b| a.started_at.cmp(&b.started_at).then(a.id.cmp(&b.id)));
        let mut agents: Vec<Agent> = state.agents.values().cloned().collect();
        agents.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(StoreSnapshot {
            taken_at: Utc::now(),
            agents,
            sessions,
            audit: state.audit.clone(),
        })
    }

    /// Phase 1: check preconditions and stage the outcome without mutating
    fn stage(
        state: &MemoryState,
        tx: &GovernanceTransaction,
        now: chrono::DateTime<Utc>,
    ) -> StoreResult<(Option<Agent>, Vec<AuditRecord>)> {
        if let Some(write) = &tx.session {
            let id = &write.session.id;
            match write.precondition {
                SessionPrecondition::Absent => {
                    if state.sessions.contains_key(id) {
                        return Err(StoreError::Conflict {
                            entity: "session",
                            id: id.clone(),
                            expected: "absent".to_string(),
                            actual: "present".to_string(),
                        });
                    }
                    if !write.session.is_terminal() {
                        if let Some(active) = state.sessions.values().find(|s| {
                            s.agent_id == write.session.agent_id && !s.is_terminal()
                        }) {
                            return Err(StoreError::Conflict {
                                entity: "agent lease",
                                id: write.session.agent_id.clone(),
                                expected: "no active session".to_string(),
                                actual: format!("active session {}", active.id),
                            });
                        }
                    }
                }
                SessionPrecondition::Status(expected) => {
                    let stored = state
                        .sessions
                        .get(id)
                        .ok_or_else(|| StoreError::SessionMissing(id.clone()))?;
                    if stored.status != expected {
                        return Err(StoreError::Conflict {
                            entity: "session",
                            id: id.clone(),
                            expected: expected.to_string(),
                            actual: stored.status.to_string(),
                        });
                    }
                }
            }
        }

        let agent_after = match &tx.agent {
            Some(write) => {
                let mut agent = state
                    .agents
                    .get(&write.agent_id)
                    .cloned()
                    .ok_or_else(|| StoreError::AgentMissing(write.agent_id.clone()))?;
                if let Some(expected) = write.update.expected_version {
                    if agent.version != expected {
                        return Err(StoreError::Conflict {
                            entity: "agent",
                            id: write.agent_id.clone(),
                            expected: format!("version {}", expected),
                            actual: format!("version {}", agent.version),
                        });
                    }
                }
                write.update.apply_to(&mut agent, now);
                Some(agent)
            }
            None => None,
        };

        let records = tx
            .audit
            .iter()
            .enumerate()
            .map(|(i, event)| AuditRecord {
                sequence: state.next_sequence + i as u64,
                recorded_at: now,
                event: event.clone(),
            })
            .collect();

        Ok((agent_after, records))
    }
}

#[async_trait]
impl AgentDirectory for MemoryGovernanceStore {
    async fn get_agent(&self, agent_id: &str) -> StoreResult<Option<Agent>> {
        Ok(self.read()?.agents.get(agent_id).cloned())
    }

    async fn update_agent(&self, agent_id: &str, update: AgentUpdate) -> StoreResult<Agent> {
        let receipt = self
            .commit(GovernanceTransaction::new("update_agent").update_agent(agent_id, update))
            .await?;
        receipt
            .agent
            .ok_or_else(|| StoreError::AgentMissing(agent_id.to_string()))
    }
}

#[async_trait]
impl AuditLog for MemoryGovernanceStore {
    async fn append(&self, event: AuditEvent) -> StoreResult<AuditAck> {
        let receipt = self
            .commit(GovernanceTransaction::new("audit_append").audit(event))
            .await?;
        let sequence = receipt
            .audit_sequences
            .first()
            .copied()
            .ok_or_else(|| StoreError::Unavailable("audit append produced no record".into()))?;
        Ok(AuditAck {
            sequence,
            recorded_at: receipt.committed_at,
        })
    }
}

#[async_trait]
impl GovernanceStore for MemoryGovernanceStore {
    async fn get_session(&self, session_id: &str) -> StoreResult<Option<SupervisionSession>> {
        Ok(self.read()?.sessions.get(session_id).cloned())
    }

    async fn list_sessions(&self, filter: &SessionFilter) -> StoreResult<Vec<SupervisionSession>> {
        let state = self.read()?;
        let mut sessions: Vec<SupervisionSession> = state
            .sessions
            .values()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect();
        sessions.sort_by(|a, b| a.started_at.cmp(&b.started_at).then(a.id.cmp(&b.id)));
        Ok(sessions)
    }

    async fn commit(&self, tx: GovernanceTransaction) -> StoreResult<CommitReceipt> {
        let _gate = self.commit_gate.lock().await;
        let now = Utc::now();

        let (agent_after, records) = {
            let state = self.read()?;
            Self::stage(&state, &tx, now).map_err(|e| {
                debug!(label = tx.label, "Commit rejected: {}", e);
                e
            })?
        };

        if let Some(sink) = &self.sink {
            if let Err(e) = sink.persist(&records).await {
                warn!(label = tx.label, "Audit sink failed, transaction aborted: {}", e);
                return Err(e);
            }
        }

        // Durable already: a poisoned lock must not orphan these records
        let mut state = self.state.write().unwrap_or_else(|poisoned| {
            warn!(label = tx.label, "Applying persisted commit over a poisoned lock");
            PoisonError::into_inner(poisoned)
        });
        let audit_sequences: Vec<u64> = records.iter().map(|r| r.sequence).collect();
        state.next_sequence += records.len() as u64;
        state.audit.extend(records);
        if let Some(agent) = &agent_after {
            state.agents.insert(agent.id.clone(), agent.clone());
        }
        if let Some(write) = tx.session {
            state.sessions.insert(write.session.id.clone(), write.session);
        }

        debug!(
            label = tx.label,
            audit_events = audit_sequences.len(),
            "Governance transaction committed"
        );
        Ok(CommitReceipt {
            committed_at: now,
            audit_sequences,
            agent: agent_after,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        InterventionKind, MaturityTier, SessionStatus, TriggerContext, TriggerSource,
    };

    fn session(agent_id: &str) -> SupervisionSession {
        SupervisionSession::new(
            agent_id,
            "ws-1",
            "sup-1",
            TriggerContext::new("bulk_delete", TriggerSource::Api, "user-1"),
        )
    }

    fn started(s: &SupervisionSession) -> AuditEvent {
        AuditEvent::SessionStarted {
            session_id: s.id.clone(),
            agent_id: s.agent_id.clone(),
            workspace_id: s.workspace_id.clone(),
            supervisor_id: s.supervisor_id.clone(),
            trigger: s.trigger.clone(),
            timestamp: s.started_at,
        }
    }

    async fn store_with_agent() -> MemoryGovernanceStore {
        let store = MemoryGovernanceStore::new();
        store
            .upsert_agent(Agent::new("agent-1", "Agent", "ws-1", MaturityTier::Intern, 0.6))
            .await
            .unwrap();
        store
    }

    struct FailingSink;

    #[async_trait]
    impl AuditSink for FailingSink {
        async fn persist(&self, _records: &[AuditRecord]) -> StoreResult<()> {
            Err(StoreError::Unavailable("disk full".into()))
        }
    }

    #[tokio::test]
    async fn test_update_agent_bumps_version() {
        let store = store_with_agent().await;
        let agent = store
            .update_agent("agent-1", AgentUpdate::new().confidence(0.75).expecting(0))
            .await
            .unwrap();
        assert_eq!(agent.version, 1);
        assert_eq!(agent.confidence, 0.75);

        let stale = store
            .update_agent("agent-1", AgentUpdate::new().confidence(0.1).expecting(0))
            .await;
        assert!(matches!(stale, Err(StoreError::Conflict { .. })));
        let current = store.get_agent("agent-1").await.unwrap().unwrap();
        assert_eq!(current.confidence, 0.75);
    }

    #[tokio::test]
    async fn test_insert_rejects_second_active_session() {
        let store = store_with_agent().await;
        let first = session("agent-1");
        store
            .commit(
                GovernanceTransaction::new("start")
                    .insert_session(first.clone())
                    .audit(started(&first)),
            )
            .await
            .unwrap();

        let second = session("agent-1");
        let err = store
            .commit(GovernanceTransaction::new("start").insert_session(second.clone()))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
        assert!(store.get_session(&second.id).await.unwrap().is_none());
        assert_eq!(store.audit_records().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_precondition_applies_nothing() {
        let store = store_with_agent().await;
        let s = session("agent-1");
        store
            .commit(GovernanceTransaction::new("start").insert_session(s.clone()))
            .await
            .unwrap();

        let mut updated = s.clone();
        updated
            .apply_intervention(InterventionKind::Pause, None, Utc::now())
            .unwrap();

        // Wrong expected status and a valid agent update in one transaction
        let err = store
            .commit(
                GovernanceTransaction::new("pause")
                    .update_session(updated, SessionStatus::Paused)
                    .update_agent("agent-1", AgentUpdate::new().confidence(0.99)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));

        let agent = store.get_agent("agent-1").await.unwrap().unwrap();
        assert_eq!(agent.confidence, 0.6);
        let stored = store.get_session(&s.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SessionStatus::Running);
    }

    #[tokio::test]
    async fn test_sink_failure_aborts_commit() {
        let store = MemoryGovernanceStore::new().with_sink(Arc::new(FailingSink));
        store
            .upsert_agent(Agent::new("agent-1", "Agent", "ws-1", MaturityTier::Intern, 0.6))
            .await
            .unwrap();
        let s = session("agent-1");

        let err = store
            .commit(
                GovernanceTransaction::new("start")
                    .insert_session(s.clone())
                    .audit(started(&s)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        assert!(store.get_session(&s.id).await.unwrap().is_none());
        assert!(store.audit_records().unwrap().is_empty());
    }

    /// Records what it persists and holds each batch until released
    #[derive(Default)]
    struct GatedSink {
        persisted: std::sync::Mutex<Vec<AuditRecord>>,
        entered: tokio::sync::Notify,
        release: tokio::sync::Notify,
    }

    #[async_trait]
    impl AuditSink for GatedSink {
        async fn persist(&self, records: &[AuditRecord]) -> StoreResult<()> {
            self.persisted.lock().unwrap().extend_from_slice(records);
            self.entered.notify_one();
            self.release.notified().await;
            Ok(())
        }
    }

    fn poison(store: &Arc<MemoryGovernanceStore>) {
        let cloned = store.clone();
        let result = std::thread::spawn(move || {
            let _state = cloned.state.write().unwrap();
            panic!("writer died holding the state lock");
        })
        .join();
        assert!(result.is_err());
        assert!(store.state.is_poisoned());
    }

    #[tokio::test]
    async fn test_poisoned_lock_rejected_before_sink() {
        let sink = Arc::new(GatedSink::default());
        let store = MemoryGovernanceStore::new().with_sink(sink.clone()).shared();
        poison(&store);

        let s = session("agent-1");
        let err = store
            .commit(
                GovernanceTransaction::new("start")
                    .insert_session(s.clone())
                    .audit(started(&s)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::LockPoisoned));
        assert!(sink.persisted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_persisted_commit_applies_despite_poison() {
        let sink = Arc::new(GatedSink::default());
        let store = MemoryGovernanceStore::new().with_sink(sink.clone()).shared();
        store
            .upsert_agent(Agent::new("agent-1", "Agent", "ws-1", MaturityTier::Intern, 0.6))
            .await
            .unwrap();

        let s = session("agent-1");
        let tx = GovernanceTransaction::new("start")
            .insert_session(s.clone())
            .audit(started(&s));
        let commit = tokio::spawn({
            let store = store.clone();
            async move { store.commit(tx).await }
        });

        // Poison while the batch sits in the sink
        sink.entered.notified().await;
        poison(&store);
        sink.release.notify_one();

        let receipt = commit.await.unwrap().unwrap();
        assert_eq!(receipt.audit_sequences, vec![1]);

        let state = store.state.read().unwrap_or_else(PoisonError::into_inner);
        assert!(state.sessions.contains_key(&s.id));
        let applied: Vec<u64> = state.audit.iter().map(|r| r.sequence).collect();
        let persisted: Vec<u64> = sink.persisted.lock().unwrap().iter().map(|r| r.sequence).collect();
        assert_eq!(applied, persisted);
    }

    #[tokio::test]
    async fn test_audit_sequences_are_contiguous() {
        let store = store_with_agent().await;
        let s = session("agent-1");
        let first = store.append(started(&s)).await.unwrap();
        let second = store.append(started(&s)).await.unwrap();
        assert_eq!(first.sequence, 1);
        assert_eq!(second.sequence, 2);
        assert_eq!(store.audit_for_session(&s.id).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_list_sessions_filters() {
        let store = store_with_agent().await;
        store
            .upsert_agent(Agent::new("agent-2", "Other", "ws-2", MaturityTier::Intern, 0.6))
            .await
            .unwrap();
        let a = session("agent-1");
        let mut b = session("agent-2");
        b.workspace_id = "ws-2".to_string();
        for s in [a.clone(), b.clone()] {
            store
                .commit(GovernanceTransaction::new("start").insert_session(s))
                .await
                .unwrap();
        }

        let ws1 = store
            .list_sessions(&SessionFilter::new().workspace("ws-1"))
            .await
            .unwrap();
        assert_eq!(ws1.len(), 1);
        assert_eq!(ws1[0].id, a.id);

        let running = store
            .list_sessions(&SessionFilter::new().status(SessionStatus::Running))
            .await
            .unwrap();
        assert_eq!(running.len(), 2);
    }

    #[tokio::test]
    async fn test_snapshot_round_trip() {
        let store = store_with_agent().await;
        let s = session("agent-1");
        store
            .commit(
                GovernanceTransaction::new("start")
                    .insert_session(s.clone())
                    .audit(started(&s)),
            )
            .await
            .unwrap();

        let restored = MemoryGovernanceStore::from_snapshot(store.snapshot().unwrap());
        assert!(restored.get_session(&s.id).await.unwrap().is_some());
        let ack = restored.append(started(&s)).await.unwrap();
        assert_eq!(ack.sequence, 2);
    }
}
