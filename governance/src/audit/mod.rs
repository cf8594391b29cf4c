//! Append-only audit trail
//!
//! [`AuditLog`] is what producers append to. [`AuditSink`] is the durable
//! mirror a store writes whole transactions through before applying them.

pub mod events;
pub mod jsonl;

pub use events::{AuditAck, AuditEvent, AuditRecord};
pub use jsonl::JsonlAuditLog;

use async_trait::async_trait;

use crate::store::StoreResult;

/// Producer-facing audit log. An `Ok` ack means the event is durable.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn append(&self, event: AuditEvent) -> StoreResult<AuditAck>;
}

/// Durable mirror for already-sequenced records
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Persist a batch in order. All or nothing from the caller's view:
    /// an error means the batch must not be treated as committed.
    async fn persist(&self, records: &[AuditRecord]) -> StoreResult<()>;
}
