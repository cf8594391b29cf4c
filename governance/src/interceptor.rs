//! Trigger interceptor
//!
//! Routes every triggered agent action to DIRECT, SUPERVISED, APPROVAL or
//! BLOCKED. The route is the stricter of the agent's capability ceiling
//! (from its maturity tier and the trigger source) and the action's risk
//! ceiling.
//!
//! Apart from audit emission the interceptor has no side effects. In
//! particular a SUPERVISED route does not open a session; the caller does
//! that through the session manager.

use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, Instrument};

use crate::audit::{AuditEvent, AuditLog};
use crate::directory::AgentDirectory;
use crate::error::{GovernanceError, GovernanceResult};
use crate::maturity::MaturityModel;
use crate::otel;
use crate::risk::{ActionRiskPolicy, RiskClassification};
use crate::signals::{GovernanceSignal, SharedSignalBus};
use crate::types::{Agent, MaturityTier, Route, RoutingDecision, TriggerContext, TriggerSource};

/// Route and reason for one trigger, before any I/O
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteVerdict {
    pub route: Route,
    pub reason: String,
}

/// Decide a route from a tier snapshot and a risk classification.
pub fn decide(tier: MaturityTier, source: TriggerSource, risk: &RiskClassification) -> RouteVerdict {
    let capability = MaturityModel::source_ceiling(tier, source);
    let route = capability.min(risk.ceiling);

    let rule = if risk.known {
        format!("risk rule '{}'", risk.action_type)
    } else {
        format!("default risk ceiling for unknown action '{}'", risk.action_type)
    };

    match route {
        Route::Blocked if capability == Route::Blocked => RouteVerdict {
            route,
            reason: format!(
                "{} agents may not act on {} triggers without a human in the loop",
                tier, source
            ),
        },
        Route::Blocked => RouteVerdict {
            route,
            reason: format!("action blocked by {}", rule),
        },
        Route::Approval if !risk.approval_path => RouteVerdict {
            route: Route::Blocked,
            reason: format!(
                "insufficient tier ({}) and no approval path for action type '{}'",
                tier, risk.action_type
            ),
        },
        _ if risk.ceiling < capability => RouteVerdict {
            route,
            reason: format!(
                "{} capped at {} by {} ({} agent would allow {})",
                risk.action_type, route, rule, tier, capability
            ),
        },
        _ => RouteVerdict {
            route,
            reason: format!("{} tier permits {} for '{}'", tier, route, risk.action_type),
        },
    }
}

/// Routes triggered actions and records every decision
pub struct TriggerInterceptor {
    directory: Arc<dyn AgentDirectory>,
    audit: Arc<dyn AuditLog>,
    policy: ActionRiskPolicy,
    signals: Option<SharedSignalBus>,
    dropped_audits: AtomicU64,
}

impl TriggerInterceptor {
    pub fn new(
        directory: Arc<dyn AgentDirectory>,
        audit: Arc<dyn AuditLog>,
        policy: ActionRiskPolicy,
    ) -> Self {
        Self {
            directory,
            audit,
            policy,
            signals: None,
            dropped_audits: AtomicU64::new(0),
        }
    }

    /// Broadcast `AuditDropped` alerts on this bus
    pub fn with_signals(mut self, signals: SharedSignalBus) -> Self {
        self.signals = Some(signals);
        self
    }

    pub fn policy(&self) -> &ActionRiskPolicy {
        &self.policy
    }

    /// Routing decisions whose audit append failed since startup
    pub fn dropped_audit_events(&self) -> u64 {
        self.dropped_audits.load(Ordering::Relaxed)
    }

    /// Route a triggered action for an agent.
    ///
    /// Fails only when the agent cannot be read. An audit failure is alerted
    /// and reflected in `audit_recorded`, never returned as an error.
    pub async fn intercept(
        &self,
        agent_id: &str,
        trigger: &TriggerContext,
    ) -> GovernanceResult<RoutingDecision> {
        let span = otel::intercept_span(agent_id, &trigger.action_type, &trigger.source.to_string());
        self.route_and_record(agent_id, trigger).instrument(span).await
    }

    async fn route_and_record(
        &self,
        agent_id: &str,
        trigger: &TriggerContext,
    ) -> GovernanceResult<RoutingDecision> {
        let agent = self
            .directory
            .get_agent(agent_id)
            .await?
            .ok_or_else(|| GovernanceError::agent_not_found(agent_id))?;

        let mut decision = self.route(&agent, trigger);
        // The audited copy claims success; only the returned one learns otherwise
        decision.audit_recorded = true;
        decision.audit_recorded = self.emit(&decision).await;

        otel::record_intercept_result(
            &tracing::Span::current(),
            decision.routing_decision,
            decision.tier,
            decision.audit_recorded,
        );
        info!(
            agent_id = %decision.agent_id,
            action_type = %decision.action_type,
            tier = %decision.tier,
            decision = %decision.routing_decision,
            execute = decision.execute,
            "Trigger routed"
        );
        Ok(decision)
    }

    fn route(&self, agent: &Agent, trigger: &TriggerContext) -> RoutingDecision {
        let risk = self.policy.rule_for(&trigger.action_type);
        let verdict = decide(agent.tier, trigger.source, &risk);
        debug!(
            agent_id = %agent.id,
            risk_ceiling = %risk.ceiling,
            known_action = risk.known,
            route = %verdict.route,
            "Route computed"
        );

        RoutingDecision {
            agent_id: agent.id.clone(),
            action_type: trigger.action_type.clone(),
            source: trigger.source,
            requester_id: trigger.requester_id.clone(),
            execute: verdict.route.permits_execution(),
            routing_decision: verdict.route,
            reason: verdict.reason,
            confidence: agent.confidence,
            tier: agent.tier,
            decided_at: Utc::now(),
            audit_recorded: false,
        }
    }

    /// Append the decision to the audit log. Returns whether it was recorded.
    async fn emit(&self, decision: &RoutingDecision) -> bool {
        let event = AuditEvent::RoutingDecided {
            decision: decision.clone(),
        };
        match self.audit.append(event).await {
            Ok(ack) => {
                debug!(sequence = ack.sequence, "Routing decision audited");
                true
            }
            Err(e) => {
                let dropped = self.dropped_audits.fetch_add(1, Ordering::Relaxed) + 1;
                error!(
                    agent_id = %decision.agent_id,
                    action_type = %decision.action_type,
                    decision = %decision.routing_decision,
                    dropped_total = dropped,
                    "Routing decision audit append failed: {}",
                    e
                );
                if let Some(signals) = &self.signals {
                    signals.publish(GovernanceSignal::AuditDropped {
                        agent_id: decision.agent_id.clone(),
                        event_type: "routing_decided".to_string(),
                        error: e.to_string(),
                        timestamp: Utc::now(),
                    });
                }
                false
            }
        }
    }
}
