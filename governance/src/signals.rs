//! Governance signal bus
//!
//! Interventions reach the external executor as messages, never as direct
//! control flow. The session manager publishes on a Tokio broadcast channel;
//! the executor holds a [`SessionCheckpoint`] and polls it at points where it
//! is safe to pause, adjust or stop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::{debug, warn};

use crate::types::{AgentId, InterventionKind, SessionId, SessionStatus};

/// Default channel capacity for broadcast
pub const DEFAULT_SIGNAL_CAPACITY: usize = 256;

/// Error type for signal operations
#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    #[error("Signal channel closed")]
    Closed,

    #[error("Receiver lagged, {0} signals missed")]
    Lagged(u64),
}

impl From<RecvError> for SignalError {
    fn from(e: RecvError) -> Self {
        match e {
            RecvError::Closed => Self::Closed,
            RecvError::Lagged(n) => Self::Lagged(n),
        }
    }
}

/// Shared reference to SignalBus
pub type SharedSignalBus = Arc<SignalBus>;

/// Messages published by the governance core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GovernanceSignal {
    /// A supervisor intervened in a live session
    Intervention {
        session_id: SessionId,
        agent_id: AgentId,
        kind: InterventionKind,
        guidance: Option<String>,
        sequence: u32,
        status: SessionStatus,
        timestamp: DateTime<Utc>,
    },

    /// A session reached a terminal status
    SessionClosed {
        session_id: SessionId,
        agent_id: AgentId,
        status: SessionStatus,
        timestamp: DateTime<Utc>,
    },

    /// An audit event could not be recorded
    AuditDropped {
        agent_id: AgentId,
        event_type: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
}

impl GovernanceSignal {
    pub fn signal_type(&self) -> &'static str {
        match self {
            GovernanceSignal::Intervention { .. } => "intervention",
            GovernanceSignal::SessionClosed { .. } => "session_closed",
            GovernanceSignal::AuditDropped { .. } => "audit_dropped",
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        match self {
            GovernanceSignal::Intervention { session_id, .. } => Some(session_id),
            GovernanceSignal::SessionClosed { session_id, .. } => Some(session_id),
            GovernanceSignal::AuditDropped { .. } => None,
        }
    }

    pub fn agent_id(&self) -> &str {
        match self {
            GovernanceSignal::Intervention { agent_id, .. } => agent_id,
            GovernanceSignal::SessionClosed { agent_id, .. } => agent_id,
            GovernanceSignal::AuditDropped { agent_id, .. } => agent_id,
        }
    }
}

/// Broadcast bus for governance signals
pub struct SignalBus {
    sender: broadcast::Sender<GovernanceSignal>,
}

impl SignalBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_SIGNAL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Create a shared reference to this bus
    pub fn shared(self) -> SharedSignalBus {
        Arc::new(self)
    }

    /// Publish to all subscribers. Returns how many received it.
    pub fn publish(&self, signal: GovernanceSignal) -> usize {
        let signal_type = signal.signal_type();
        match self.sender.send(signal) {
            Ok(count) => {
                debug!(signal_type, receivers = count, "Signal published");
                count
            }
            Err(_) => {
                // No receivers is OK
                debug!(signal_type, "Signal published (no receivers)");
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GovernanceSignal> {
        self.sender.subscribe()
    }

    pub fn subscribe_filtered(&self, filter: SignalFilter) -> FilteredReceiver {
        FilteredReceiver::new(self.subscribe(), filter)
    }

    /// Checkpoint handle for an executor running `session_id`
    pub fn checkpoint(&self, session_id: impl Into<SessionId>) -> SessionCheckpoint {
        SessionCheckpoint::new(session_id, self.subscribe())
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for SignalBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Signal filter for selective subscription
#[derive(Debug, Clone, Default)]
pub struct SignalFilter {
    pub session_id: Option<SessionId>,
    pub agent_id: Option<AgentId>,
    pub signal_types: Option<Vec<String>>,
}

impl SignalFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session(mut self, session_id: &str) -> Self {
        self.session_id = Some(session_id.to_string());
        self
    }

    pub fn agent(mut self, agent_id: &str) -> Self {
        self.agent_id = Some(agent_id.to_string());
        self
    }

    pub fn types(mut self, signal_types: Vec<&str>) -> Self {
        self.signal_types = Some(signal_types.into_iter().map(String::from).collect());
        self
    }

    pub fn matches(&self, signal: &GovernanceSignal) -> bool {
        if let Some(ref sid) = self.session_id {
            if signal.session_id() != Some(sid.as_str()) {
                return false;
            }
        }
        if let Some(ref aid) = self.agent_id {
            if signal.agent_id() != aid {
                return false;
            }
        }
        if let Some(ref types) = self.signal_types {
            if !types.iter().any(|t| t == signal.signal_type()) {
                return false;
            }
        }
        true
    }
}

/// Receiver that only yields matching signals
pub struct FilteredReceiver {
    receiver: broadcast::Receiver<GovernanceSignal>,
    filter: SignalFilter,
}

impl FilteredReceiver {
    pub fn new(receiver: broadcast::Receiver<GovernanceSignal>, filter: SignalFilter) -> Self {
        Self { receiver, filter }
    }

    pub async fn recv(&mut self) -> Result<GovernanceSignal, SignalError> {
        loop {
            let signal = self.receiver.recv().await?;
            if self.filter.matches(&signal) {
                return Ok(signal);
            }
        }
    }
}

/// What an executor should do at a checkpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckpointDirective {
    Continue,
    Pause,
    /// Resume, applying the supervisor's guidance
    Adjust { guidance: String },
    Stop,
}

/// Executor-side view of one session's signals
pub struct SessionCheckpoint {
    session_id: SessionId,
    receiver: broadcast::Receiver<GovernanceSignal>,
    paused: bool,
    stopped: bool,
    guidance: Vec<String>,
    missed: u64,
}

impl SessionCheckpoint {
    pub fn new(
        session_id: impl Into<SessionId>,
        receiver: broadcast::Receiver<GovernanceSignal>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            receiver,
            paused: false,
            stopped: false,
            guidance: Vec::new(),
            missed: 0,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Signals dropped because this checkpoint fell behind the channel.
    /// When non-zero the executor should re-read the session status.
    pub fn missed_signals(&self) -> u64 {
        self.missed
    }

    fn apply(&mut self, signal: GovernanceSignal) {
        if signal.session_id() != Some(self.session_id.as_str()) {
            return;
        }
        match signal {
            GovernanceSignal::Intervention { kind, guidance, .. } => match kind {
                InterventionKind::Pause => self.paused = true,
                InterventionKind::Correct => {
                    self.paused = false;
                    if let Some(g) = guidance {
                        self.guidance.push(g);
                    }
                }
                InterventionKind::Terminate => self.stopped = true,
            },
            GovernanceSignal::SessionClosed { .. } => self.stopped = true,
            GovernanceSignal::AuditDropped { .. } => {}
        }
    }

    fn directive(&mut self) -> CheckpointDirective {
        if self.stopped {
            CheckpointDirective::Stop
        } else if self.paused {
            CheckpointDirective::Pause
        } else if !self.guidance.is_empty() {
            let guidance = std::mem::take(&mut self.guidance).join("\n");
            CheckpointDirective::Adjust { guidance }
        } else {
            CheckpointDirective::Continue
        }
    }

    /// Drain pending signals without waiting and report the directive
    pub fn poll(&mut self) -> CheckpointDirective {
        loop {
            match self.receiver.try_recv() {
                Ok(signal) => self.apply(signal),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Lagged(n)) => {
                    warn!(session_id = %self.session_id, missed = n, "Checkpoint lagged behind signal bus");
                    self.missed += n;
                }
                Err(TryRecvError::Closed) => break,
            }
        }
        self.directive()
    }

    /// Block while the session is paused. Returns the first non-pause directive.
    pub async fn wait_while_paused(&mut self) -> CheckpointDirective {
        loop {
            let directive = self.poll();
            if directive != CheckpointDirective::Pause {
                return directive;
            }
            match self.receiver.recv().await {
                Ok(signal) => self.apply(signal),
                Err(RecvError::Lagged(n)) => {
                    warn!(session_id = %self.session_id, missed = n, "Checkpoint lagged behind signal bus");
                    self.missed += n;
                }
                // Nobody left to resume us
                Err(RecvError::Closed) => return CheckpointDirective::Stop,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn intervention(session_id: &str, kind: InterventionKind, guidance: Option<&str>) -> GovernanceSignal {
        GovernanceSignal::Intervention {
            session_id: session_id.to_string(),
            agent_id: "agent-1".to_string(),
            kind,
            guidance: guidance.map(String::from),
            sequence: 1,
            status: SessionStatus::Running,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = SignalBus::new();
        let mut rx = bus.subscribe();
        assert_eq!(bus.publish(intervention("s-1", InterventionKind::Pause, None)), 1);
        let got = rx.recv().await.unwrap();
        assert_eq!(got.signal_type(), "intervention");
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = SignalBus::new();
        assert_eq!(bus.publish(intervention("s-1", InterventionKind::Pause, None)), 0);
    }

    #[test]
    fn test_filter() {
        let filter = SignalFilter::new().session("s-1").types(vec!["intervention"]);
        assert!(filter.matches(&intervention("s-1", InterventionKind::Pause, None)));
        assert!(!filter.matches(&intervention("s-2", InterventionKind::Pause, None)));
        let dropped = GovernanceSignal::AuditDropped {
            agent_id: "agent-1".to_string(),
            event_type: "routing_decided".to_string(),
            error: "disk full".to_string(),
            timestamp: Utc::now(),
        };
        assert!(!filter.matches(&dropped));
        assert!(SignalFilter::new().agent("agent-1").matches(&dropped));
    }

    #[tokio::test]
    async fn test_filtered_receiver() {
        let bus = SignalBus::new();
        let mut rx = bus.subscribe_filtered(SignalFilter::new().session("target"));
        bus.publish(intervention("other", InterventionKind::Pause, None));
        bus.publish(intervention("target", InterventionKind::Terminate, None));
        let got = rx.recv().await.unwrap();
        assert_eq!(got.session_id(), Some("target"));
    }

    #[test]
    fn test_checkpoint_directives() {
        let bus = SignalBus::new();
        let mut cp = bus.checkpoint("s-1");
        assert_eq!(cp.poll(), CheckpointDirective::Continue);

        bus.publish(intervention("s-1", InterventionKind::Pause, None));
        bus.publish(intervention("s-2", InterventionKind::Terminate, None));
        assert_eq!(cp.poll(), CheckpointDirective::Pause);
        assert_eq!(cp.poll(), CheckpointDirective::Pause);

        bus.publish(intervention("s-1", InterventionKind::Correct, Some("use the staging db")));
        assert_eq!(
            cp.poll(),
            CheckpointDirective::Adjust {
                guidance: "use the staging db".to_string()
            }
        );
        assert_eq!(cp.poll(), CheckpointDirective::Continue);

        bus.publish(intervention("s-1", InterventionKind::Terminate, None));
        assert_eq!(cp.poll(), CheckpointDirective::Stop);
    }

    #[test]
    fn test_checkpoint_counts_lag() {
        let bus = SignalBus::with_capacity(2);
        let mut cp = bus.checkpoint("s-1");
        for _ in 0..5 {
            bus.publish(intervention("s-1", InterventionKind::Pause, None));
        }
        assert_eq!(cp.poll(), CheckpointDirective::Pause);
        assert_eq!(cp.missed_signals(), 3);
    }

    #[tokio::test]
    async fn test_wait_while_paused_resumes_on_correct() {
        let bus = SignalBus::new().shared();
        let mut cp = bus.checkpoint("s-1");
        bus.publish(intervention("s-1", InterventionKind::Pause, None));

        let publisher = bus.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            publisher.publish(intervention("s-1", InterventionKind::Correct, Some("retry")));
        });

        let directive = tokio::time::timeout(Duration::from_secs(2), cp.wait_while_paused())
            .await
            .unwrap();
        assert_eq!(
            directive,
            CheckpointDirective::Adjust {
                guidance: "retry".to_string()
            }
        );
    }
}
