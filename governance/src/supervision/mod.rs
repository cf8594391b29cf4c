//! Supervised execution sessions and the confidence feedback loop

pub mod lease;
pub mod manager;
pub mod scoring;

pub use lease::{AgentLeases, SessionLocks};
pub use manager::{manager_for, SupervisionSessionManager};
pub use scoring::{ConfidenceScorer, Recalibration, MAX_RATING, MIN_RATING};
