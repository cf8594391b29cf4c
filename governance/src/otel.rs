//! OpenTelemetry-Compatible Span Helpers
//!
//! Structured `tracing` spans for the governance pipeline. Field names use
//! dot notation compatible with OpenTelemetry semantic conventions.
//!
//! # Span Hierarchy
//!
//! ```text
//! governance.intercept         (one per routing decision)
//! governance.session           (start_session)
//! governance.intervention      (one per intervene call)
//! governance.completion        (complete_supervision, incl. recalibration)
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use agent_governance::otel;
//!
//! let span = otel::intercept_span("agent-7", "bulk_delete", "webhook");
//! let _guard = span.enter();
//! // ... decide ...
//! otel::record_intercept_result(&span, Route::Supervised, MaturityTier::Autonomous, true);
//! ```

use tracing::Span;

use crate::types::{MaturityTier, Route, SessionStatus};

// ── Span Name Constants ──────────────────────────────────────────────

pub const SPAN_INTERCEPT: &str = "governance.intercept";
pub const SPAN_SESSION: &str = "governance.session";
pub const SPAN_INTERVENTION: &str = "governance.intervention";
pub const SPAN_COMPLETION: &str = "governance.completion";

// ── Field Name Constants ─────────────────────────────────────────────

pub const FIELD_AGENT_ID: &str = "governance.agent.id";
pub const FIELD_SESSION_ID: &str = "governance.session.id";
pub const FIELD_ACTION_TYPE: &str = "governance.action.type";
pub const FIELD_SOURCE: &str = "governance.trigger.source";
pub const FIELD_TIER: &str = "governance.tier";
pub const FIELD_DECISION: &str = "governance.decision";
pub const FIELD_AUDIT_RECORDED: &str = "governance.audit.recorded";
pub const FIELD_INTERVENTION_KIND: &str = "governance.intervention.kind";
pub const FIELD_STATUS: &str = "governance.session.status";
pub const FIELD_RATING: &str = "governance.rating";
pub const FIELD_BOOST: &str = "governance.confidence.boost";
pub const FIELD_CONFIDENCE: &str = "governance.confidence";
pub const FIELD_PROMOTED: &str = "governance.promoted";
pub const FIELD_SUCCESS: &str = "governance.success";

// ── Span Builders ────────────────────────────────────────────────────

/// Create a span for a routing decision.
///
/// Fields filled later via [`record_intercept_result`]: decision, tier, audit flag.
pub fn intercept_span(agent_id: &str, action_type: &str, source: &str) -> Span {
    tracing::info_span!(
        "governance.intercept",
        "governance.agent.id" = %agent_id,
        "governance.action.type" = %action_type,
        "governance.trigger.source" = %source,
        "governance.tier" = tracing::field::Empty,
        "governance.decision" = tracing::field::Empty,
        "governance.audit.recorded" = tracing::field::Empty,
    )
}

/// Record the outcome of a routing decision.
pub fn record_intercept_result(span: &Span, decision: Route, tier: MaturityTier, audit_recorded: bool) {
    span.record("governance.decision", tracing::field::display(decision));
    span.record("governance.tier", tracing::field::display(tier));
    span.record("governance.audit.recorded", audit_recorded);
}

/// Create a span for opening a supervision session.
///
/// `governance.session.id` is filled once the session exists.
pub fn session_span(agent_id: &str, action_type: &str) -> Span {
    tracing::info_span!(
        "governance.session",
        "governance.agent.id" = %agent_id,
        "governance.action.type" = %action_type,
        "governance.session.id" = tracing::field::Empty,
    )
}

pub fn record_session_started(span: &Span, session_id: &str) {
    span.record("governance.session.id", session_id);
}

/// Create a span for an intervention.
pub fn intervention_span(session_id: &str, kind: &str) -> Span {
    tracing::info_span!(
        "governance.intervention",
        "governance.session.id" = %session_id,
        "governance.intervention.kind" = %kind,
        "governance.session.status" = tracing::field::Empty,
    )
}

pub fn record_intervention_result(span: &Span, status: SessionStatus) {
    span.record("governance.session.status", tracing::field::display(status));
}

/// Create a span for session completion and recalibration.
///
/// Fields filled later via [`record_completion_result`]: boost, confidence, tier, promotion.
pub fn completion_span(session_id: &str, rating: i64) -> Span {
    tracing::info_span!(
        "governance.completion",
        "governance.session.id" = %session_id,
        "governance.rating" = rating,
        "governance.agent.id" = tracing::field::Empty,
        "governance.success" = tracing::field::Empty,
        "governance.confidence.boost" = tracing::field::Empty,
        "governance.confidence" = tracing::field::Empty,
        "governance.tier" = tracing::field::Empty,
        "governance.promoted" = tracing::field::Empty,
    )
}

pub fn record_completion_result(
    span: &Span,
    agent_id: &str,
    success: bool,
    boost: f64,
    confidence_after: f64,
    tier_after: MaturityTier,
    promoted: bool,
) {
    span.record("governance.agent.id", agent_id);
    span.record("governance.success", success);
    span.record("governance.confidence.boost", boost);
    span.record("governance.confidence", confidence_after);
    span.record("governance.tier", tracing::field::display(tier_after));
    span.record("governance.promoted", promoted);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Once;

    static INIT: Once = Once::new();

    fn init_test_subscriber() {
        INIT.call_once(|| {
            let _ = tracing_subscriber::fmt()
                .with_test_writer()
                .with_max_level(tracing::Level::TRACE)
                .try_init();
        });
    }

    #[test]
    fn test_intercept_span_creates_valid_span() {
        init_test_subscriber();
        let span = intercept_span("agent-7", "bulk_delete", "webhook");
        assert!(!span.is_disabled());
        record_intercept_result(&span, Route::Supervised, MaturityTier::Autonomous, true);
    }

    #[test]
    fn test_session_and_intervention_spans() {
        init_test_subscriber();
        let span = session_span("agent-7", "bulk_delete");
        assert!(!span.is_disabled());
        record_session_started(&span, "sess-1");

        let span = intervention_span("sess-1", "pause");
        assert!(!span.is_disabled());
        record_intervention_result(&span, SessionStatus::Paused);
    }

    #[test]
    fn test_completion_span_creates_valid_span() {
        init_test_subscriber();
        let span = completion_span("sess-1", 5);
        assert!(!span.is_disabled());
        record_completion_result(&span, "agent-7", true, 0.1, 0.99, MaturityTier::Autonomous, true);
    }

    #[test]
    fn test_span_names_use_governance_prefix() {
        for name in [SPAN_INTERCEPT, SPAN_SESSION, SPAN_INTERVENTION, SPAN_COMPLETION] {
            assert!(name.starts_with("governance."));
        }
        assert!(FIELD_DECISION.contains('.'));
    }
}
