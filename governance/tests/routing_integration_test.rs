//! Routing integration tests over the service facade
//!
//! Tests verify:
//! - Risk policy caps even AUTONOMOUS agents on destructive actions
//! - STUDENT agents never route DIRECT, and are blocked on automated triggers
//! - Every routing decision is audited
//! - Config-driven risk rules reach the interceptor
//! - A failed audit append still returns the decision and raises an alert

use async_trait::async_trait;
use std::sync::Arc;

use agent_governance::{
    ActionContext, ActionRiskPolicy, Agent, AgentDirectory, AgentUpdate, AuditAck, AuditEvent,
    AuditLog, GovernanceConfig, GovernanceService, GovernanceSignal, InterceptRequest,
    MaturityTier, MemoryGovernanceStore, Route, SignalBus, StoreError, StoreResult,
    TriggerContext, TriggerInterceptor, TriggerSource,
};

fn request(agent_id: &str, action: &str, source: TriggerSource) -> InterceptRequest {
    InterceptRequest {
        agent_id: agent_id.to_string(),
        source,
        context: ActionContext {
            action_type: action.to_string(),
            payload: serde_json::Value::Null,
        },
        requester_id: "requester-1".to_string(),
    }
}

async fn service_with(
    config: &GovernanceConfig,
    agents: &[(&str, MaturityTier, f64)],
) -> (GovernanceService, Arc<MemoryGovernanceStore>) {
    let (service, store) = GovernanceService::in_memory(config);
    for (id, tier, confidence) in agents {
        store
            .upsert_agent(Agent::new(*id, *id, "ws-1", *tier, *confidence))
            .await
            .unwrap();
    }
    (service, store)
}

#[tokio::test]
async fn destructive_action_never_direct_for_autonomous() {
    let (service, _store) = service_with(
        &GovernanceConfig::default(),
        &[("auto", MaturityTier::Autonomous, 0.97)],
    )
    .await;

    for action in ["delete_all_data", "drop_database", "bulk_delete", "send_mass_email"] {
        let decision = service
            .intercept(request("auto", action, TriggerSource::Api))
            .await
            .unwrap();
        assert!(
            matches!(decision.routing_decision, Route::Supervised | Route::Approval),
            "{action} routed {}",
            decision.routing_decision
        );
        assert!(decision.reason.contains(action));
    }

    let read = service
        .intercept(request("auto", "read_data", TriggerSource::Api))
        .await
        .unwrap();
    assert_eq!(read.routing_decision, Route::Direct);
    assert!(read.execute);
}

#[tokio::test]
async fn student_routing() {
    let (service, _store) = service_with(
        &GovernanceConfig::default(),
        &[("student", MaturityTier::Student, 0.2)],
    )
    .await;

    let chat = service
        .intercept(request("student", "read_data", TriggerSource::Chat))
        .await
        .unwrap();
    assert_eq!(chat.routing_decision, Route::Approval);
    assert!(!chat.execute);

    for source in [TriggerSource::Scheduled, TriggerSource::Webhook, TriggerSource::DataSync] {
        let decision = service
            .intercept(request("student", "read_data", source))
            .await
            .unwrap();
        assert_eq!(decision.routing_decision, Route::Blocked);
        assert!(!decision.execute);
    }
}

#[tokio::test]
async fn every_decision_is_audited() {
    let (service, store) = service_with(
        &GovernanceConfig::default(),
        &[("sup", MaturityTier::Supervised, 0.75)],
    )
    .await;

    let decision = service
        .intercept(request("sup", "summarize", TriggerSource::Chat))
        .await
        .unwrap();
    assert!(decision.audit_recorded);
    assert_eq!(decision.routing_decision, Route::Supervised);

    let records = store.audit_records().unwrap();
    assert_eq!(records.len(), 1);
    match &records[0].event {
        AuditEvent::RoutingDecided { decision: audited } => {
            assert_eq!(audited.agent_id, "sup");
            assert_eq!(audited.routing_decision, Route::Supervised);
        }
        other => panic!("unexpected audit event: {:?}", other),
    }
}

#[tokio::test]
async fn unknown_agent_is_not_found() {
    let (service, store) = service_with(&GovernanceConfig::default(), &[]).await;
    let err = service
        .intercept(request("ghost", "read_data", TriggerSource::Chat))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "AGENT_NOT_FOUND");
    assert!(store.audit_records().unwrap().is_empty());
}

#[tokio::test]
async fn configured_rules_reach_interceptor() {
    let config = GovernanceConfig::from_toml_str(
        r#"
        [risk.actions.export_customer_list]
        ceiling = "APPROVAL"
        approval_path = false

        [risk.actions.read_data]
        ceiling = "SUPERVISED"
        "#,
    )
    .unwrap();
    let (service, _store) =
        service_with(&config, &[("auto", MaturityTier::Autonomous, 0.95)]).await;

    let export = service
        .intercept(request("auto", "export_customer_list", TriggerSource::Chat))
        .await
        .unwrap();
    assert_eq!(export.routing_decision, Route::Blocked);
    assert!(export.reason.contains("no approval path"));

    let read = service
        .intercept(request("auto", "read_data", TriggerSource::Chat))
        .await
        .unwrap();
    assert_eq!(read.routing_decision, Route::Supervised);
}

#[tokio::test]
async fn decisions_reflect_latest_confidence() {
    let (service, _store) = service_with(
        &GovernanceConfig::default(),
        &[("agent", MaturityTier::Intern, 0.6)],
    )
    .await;

    let before = service
        .intercept(request("agent", "read_data", TriggerSource::Chat))
        .await
        .unwrap();
    assert_eq!(before.routing_decision, Route::Approval);

    service
        .manager()
        .override_agent("agent", None, Some(0.92), "ops", "certified")
        .await
        .unwrap();

    let after = service
        .intercept(request("agent", "read_data", TriggerSource::Chat))
        .await
        .unwrap();
    assert_eq!(after.routing_decision, Route::Direct);
    assert_eq!(after.tier, MaturityTier::Autonomous);
}

/// Read-only directory holding a single agent
struct Fixed(Agent);

#[async_trait]
impl AgentDirectory for Fixed {
    async fn get_agent(&self, agent_id: &str) -> StoreResult<Option<Agent>> {
        Ok((self.0.id == agent_id).then(|| self.0.clone()))
    }

    async fn update_agent(
        &self,
        agent_id: &str,
        _update: AgentUpdate,
    ) -> StoreResult<Agent> {
        Err(StoreError::AgentMissing(agent_id.to_string()))
    }
}

struct BrokenAudit;

#[async_trait]
impl AuditLog for BrokenAudit {
    async fn append(&self, _event: AuditEvent) -> StoreResult<AuditAck> {
        Err(StoreError::Unavailable("audit volume read-only".into()))
    }
}

#[tokio::test]
async fn audit_loss_is_alerted_not_silent() {
    let bus = SignalBus::new().shared();
    let mut alerts = bus.subscribe();
    let interceptor = TriggerInterceptor::new(
        Arc::new(Fixed(Agent::new(
            "auto",
            "auto",
            "ws-1",
            MaturityTier::Autonomous,
            0.95,
        ))),
        Arc::new(BrokenAudit),
        ActionRiskPolicy::builtin(),
    )
    .with_signals(bus.clone());

    let trigger = TriggerContext::new("search", TriggerSource::Scheduled, "cron");
    for _ in 0..2 {
        let decision = interceptor.intercept("auto", &trigger).await.unwrap();
        assert_eq!(decision.routing_decision, Route::Direct);
        assert!(!decision.audit_recorded);
    }
    assert_eq!(interceptor.dropped_audit_events(), 2);

    match alerts.recv().await.unwrap() {
        GovernanceSignal::AuditDropped {
            agent_id,
            event_type,
            error,
            ..
        } => {
            assert_eq!(agent_id, "auto");
            assert_eq!(event_type, "routing_decided");
            assert!(error.contains("read-only"));
        }
        other => panic!("unexpected signal: {:?}", other),
    }
}
