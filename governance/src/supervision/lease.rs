//! Exclusivity primitives for supervision
//!
//! [`AgentLeases`] gives each agent at most one live session.
//! [`SessionLocks`] serializes mutations of one session with a bounded wait.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::error::{GovernanceError, GovernanceResult};
use crate::store::StoreError;
use crate::types::{AgentId, SessionId};

/// Per-agent exclusive lease table
#[derive(Debug, Default)]
pub struct AgentLeases {
    holders: Mutex<HashMap<AgentId, SessionId>>,
}

impl AgentLeases {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lease for `agent_id`. Fails immediately with the current
    /// holder's session id when already leased.
    pub fn try_acquire(&self, agent_id: &str, session_id: &str) -> GovernanceResult<()> {
        let mut holders = self.holders.lock().map_err(|_| StoreError::LockPoisoned)?;
        if let Some(existing) = holders.get(agent_id) {
            return Err(GovernanceError::AgentAlreadySupervised {
                agent_id: agent_id.to_string(),
                session_id: existing.clone(),
            });
        }
        holders.insert(agent_id.to_string(), session_id.to_string());
        Ok(())
    }

    /// Release the lease, but only if `session_id` still holds it
    pub fn release(&self, agent_id: &str, session_id: &str) -> GovernanceResult<bool> {
        let mut holders = self.holders.lock().map_err(|_| StoreError::LockPoisoned)?;
        if holders.get(agent_id).map(String::as_str) == Some(session_id) {
            holders.remove(agent_id);
            return Ok(true);
        }
        Ok(false)
    }

    pub fn holder(&self, agent_id: &str) -> GovernanceResult<Option<SessionId>> {
        let holders = self.holders.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(holders.get(agent_id).cloned())
    }

    pub fn len(&self) -> usize {
        self.holders.lock().map(|h| h.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Per-session async locks with a bounded acquisition wait
#[derive(Debug)]
pub struct SessionLocks {
    locks: Mutex<HashMap<SessionId, Arc<AsyncMutex<()>>>>,
    timeout: Duration,
}

impl SessionLocks {
    pub fn new(timeout: Duration) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Wait up to the configured timeout for exclusive access to a session
    pub async fn acquire(&self, session_id: &str, operation: &str) -> GovernanceResult<OwnedMutexGuard<()>> {
        let lock = {
            let mut locks = self.locks.lock().map_err(|_| StoreError::LockPoisoned)?;
            locks
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        tokio::time::timeout(self.timeout, lock.lock_owned())
            .await
            .map_err(|_| GovernanceError::timeout(operation, self.timeout.as_millis() as u64))
    }

    /// Drop the lock entry of a session that can no longer change
    pub fn forget(&self, session_id: &str) {
        if let Ok(mut locks) = self.locks.lock() {
            locks.remove(session_id);
        }
    }

    /// Sessions with a lock entry
    pub fn len(&self) -> usize {
        self.locks.lock().map(|l| l.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
