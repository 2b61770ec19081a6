use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio_test::{assert_err, assert_ok};
use uuid::Uuid;

use super::*;
use crate::clock::{Clock, ManualClock};
use crate::error::AppError;
use crate::models::{
    BaselineComparison, ChannelType, DeliveryStatus, DismissRequest, EntityType,
    FailureProbability, OnCallSchedule, RiskLevel, RiskStatus, Signal, SignalKind,
    TransactionFact, Trend, TrendDirection, TxStatus, User,
};
use crate::prediction::PredictionService;
use crate::store::{MemoryStore, Stores};

struct Harness {
    store: Arc<MemoryStore>,
    clock: Arc<ManualClock>,
    orchestrator: RiskOrchestrator,
    guard: User,
}

fn user(name: &str, email: Option<&str>, phone: Option<&str>, user_type: &str) -> User {
    User {
        id: Uuid::new_v4(),
        name: name.to_string(),
        email: email.map(str::to_string),
        phone: phone.map(str::to_string),
        slack_id: None,
        user_type: user_type.to_string(),
        active: true,
    }
}

fn harness_with(settings: OrchestratorSettings) -> Harness {
    let start = Utc::now();
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(start));

    let guard = user("Guard", Some("guard@example.com"), Some("+57 300 111 2222"), "YUNO");
    store.add_user(guard.clone());
    store.add_user(user("Bea", Some("bea@example.com"), None, "YUNO"));
    store.add_user(user("Carl", None, Some("3005556666"), "YUNO"));
    store.add_user(user("Merchant Admin", Some("admin@shop.com"), None, "MERCHANT"));

    store.add_schedule(OnCallSchedule {
        id: Uuid::new_v4(),
        user_id: guard.id,
        priority: 1,
        active: true,
        start_at: Some(start - Duration::days(1)),
        end_at: None,
        created_at: start - Duration::days(1),
    });

    let stores = Stores::memory(store.clone());
    let predictions = Arc::new(PredictionService::new(stores.clone(), clock.clone()));
    let orchestrator = RiskOrchestrator::new(stores, predictions, clock.clone(), settings);

    Harness { store, clock, orchestrator, guard }
}

fn harness() -> Harness {
    harness_with(OrchestratorSettings::default())
}

fn prediction(entity_type: EntityType, id: &str, level: RiskLevel, probability: f64) -> FailureProbability {
    FailureProbability {
        entity_type,
        entity_id: id.to_string(),
        entity_name: format!("{} {}", entity_type, id),
        probability,
        risk_level: level,
        signals: vec![Signal::new(SignalKind::ErrorRate, 0.4, 0.8, 0.35)],
        confidence: 1.0,
        sample_size: 120,
        baseline_comparison: BaselineComparison {
            current_error_rate: 0.4,
            baseline_error_rate: 0.1,
            deviation_percentage: 300.0,
        },
        trend: Trend { direction: TrendDirection::Degrading, rate_of_change: 0.3 },
        recommended_actions: vec!["Verify connectivity with the payment provider".to_string()],
        timestamp: Utc::now(),
    }
}

fn only_record(h: &Harness) -> crate::models::RiskNotification {
    let all = h.store.risk_notifications();
    assert_eq!(all.len(), 1, "expected exactly one risk notification");
    all.into_iter().next().unwrap()
}

#[tokio::test]
async fn test_detect_notifies_guard_on_each_channel() {
    let h = harness();
    let p = prediction(EntityType::Provider, "p1", RiskLevel::High, 0.6);

    let outcome = h.orchestrator.detect(&p).await.unwrap();
    let record = only_record(&h);
    assert_eq!(outcome, DetectOutcome::Created(record.id));
    assert_eq!(record.status, RiskStatus::GuardNotified);
    assert_eq!(record.guard_attempts, 1);
    assert_eq!(record.guard_user_id, Some(h.guard.id));
    assert_eq!(record.last_guard_notification, Some(h.clock.now()));
    assert!(record.metadata.is_some());

    assert_eq!(h.store.alerts().len(), 1);

    let deliveries = h.store.deliveries();
    assert_eq!(deliveries.len(), 2);
    assert_eq!(deliveries[0].notification.channel, ChannelType::Gmail);
    assert_eq!(deliveries[0].notification.payload.to, "guard@example.com");
    assert_eq!(deliveries[1].notification.payload.to, "whatsapp:+573001112222");
    assert!(deliveries.iter().all(|d| d.status == DeliveryStatus::Sent));
}

#[tokio::test]
async fn test_redetection_updates_in_place() {
    let h = harness();
    h.orchestrator
        .detect(&prediction(EntityType::Merchant, "m1", RiskLevel::Medium, 0.3))
        .await
        .unwrap();

    let outcome = h
        .orchestrator
        .detect(&prediction(EntityType::Merchant, "m1", RiskLevel::Critical, 0.9))
        .await
        .unwrap();

    let record = only_record(&h);
    assert_eq!(outcome, DetectOutcome::Updated(record.id));
    assert_eq!(record.risk_level, RiskLevel::Critical);
    assert_eq!(record.probability, 0.9);
    assert_eq!(record.guard_attempts, 1);
    assert_eq!(h.store.deliveries().len(), 2);
}

#[tokio::test]
async fn test_dismissal_suppresses_for_a_day() {
    let h = harness();
    let p = prediction(EntityType::Provider, "p1", RiskLevel::High, 0.6);
    h.orchestrator.detect(&p).await.unwrap();
    let id = only_record(&h).id;

    let dismissed = h
        .orchestrator
        .dismiss(id, DismissRequest { user_id: h.guard.id, reason: "False positive".to_string() })
        .await
        .unwrap();
    assert_eq!(dismissed.status, RiskStatus::Dismissed);
    assert!(dismissed.dismissed_by_guard);
    let dismissed_at = h.clock.now();

    h.clock.set(dismissed_at + Duration::hours(23));
    assert_eq!(h.orchestrator.detect(&p).await.unwrap(), DetectOutcome::Suppressed);
    assert_eq!(h.store.risk_notifications().len(), 1);

    h.clock.set(dismissed_at + Duration::hours(25));
    let outcome = h.orchestrator.detect(&p).await.unwrap();
    assert!(matches!(outcome, DetectOutcome::Created(new_id) if new_id != id));
    assert_eq!(h.store.risk_notifications().len(), 2);
}

#[tokio::test]
async fn test_unanswered_guard_is_escalated_on_fourth_evaluation() {
    let h = harness();
    h.orchestrator
        .detect(&prediction(EntityType::Provider, "p1", RiskLevel::Critical, 0.85))
        .await
        .unwrap();

    // not due yet
    h.clock.advance(Duration::minutes(5));
    let report = h.orchestrator.retry_sweep().await.unwrap();
    assert_eq!(report.reminded, 0);
    assert_eq!(only_record(&h).guard_attempts, 1);

    h.clock.advance(Duration::minutes(5));
    assert_eq!(h.orchestrator.retry_sweep().await.unwrap().reminded, 1);
    assert_eq!(only_record(&h).guard_attempts, 2);

    h.clock.advance(Duration::minutes(10));
    assert_eq!(h.orchestrator.retry_sweep().await.unwrap().reminded, 1);
    let record = only_record(&h);
    assert_eq!(record.guard_attempts, 3);
    assert_eq!(record.status, RiskStatus::GuardNotified);

    let titles: Vec<String> = h.store.alerts().into_iter().map(|a| a.title).collect();
    assert!(titles.contains(&"[REMINDER 3] Risk CRITICAL: provider p1".to_string()));

    h.clock.advance(Duration::minutes(10));
    let report = h.orchestrator.retry_sweep().await.unwrap();
    assert_eq!(report.escalated, 1);

    let record = only_record(&h);
    assert_eq!(record.status, RiskStatus::Escalated);
    assert!(record.escalated_to_all);
    assert_eq!(record.escalated_at, Some(h.clock.now()));
    assert_eq!(record.guard_attempts, 3);

    let escalation = h.store.alerts().pop().unwrap();
    assert_eq!(escalation.title, "[ESCALATED] CRITICAL Risk: provider p1");
    assert_eq!(escalation.severity, "critical");

    // guard: email + whatsapp, Bea: email, Carl: whatsapp; the merchant user is skipped
    let fan_out: Vec<_> = h
        .store
        .deliveries()
        .into_iter()
        .filter(|d| d.notification.alert_id == escalation.id)
        .collect();
    assert_eq!(fan_out.len(), 4);
    assert!(fan_out.iter().any(|d| d.notification.payload.to == "whatsapp:+3005556666"));
    assert!(fan_out.iter().all(|d| d.notification.payload.to != "admin@shop.com"));

    // escalated records are out of the retry cycle
    h.clock.advance(Duration::minutes(30));
    let report = h.orchestrator.retry_sweep().await.unwrap();
    assert_eq!(report.checked, 0);
}

#[tokio::test]
async fn test_missing_guard_escalates_directly() {
    let h = harness();
    h.store.clear_schedules();

    let outcome = h
        .orchestrator
        .detect(&prediction(EntityType::Merchant, "m7", RiskLevel::High, 0.6))
        .await
        .unwrap();

    let record = only_record(&h);
    assert_eq!(outcome, DetectOutcome::Escalated(record.id));
    assert_eq!(record.status, RiskStatus::Escalated);
    assert!(record.escalated_to_all);
    assert_eq!(record.guard_attempts, 0);
    assert_eq!(record.guard_user_id, None);
    assert_eq!(h.store.alerts()[0].merchant_id.as_deref(), Some("m7"));

    // escalated records are no longer tracked, so a still risky entity opens a new one
    h.clock.advance(Duration::minutes(1));
    let again = h
        .orchestrator
        .detect(&prediction(EntityType::Merchant, "m7", RiskLevel::High, 0.6))
        .await
        .unwrap();
    assert!(matches!(again, DetectOutcome::Escalated(new_id) if new_id != record.id));
    assert_eq!(h.store.risk_notifications().len(), 2);
    assert_eq!(h.store.alerts().len(), 2);
}

#[tokio::test]
async fn test_lower_priority_guard_is_used_when_primary_is_off() {
    let h = harness();
    h.store.clear_schedules();

    let backup = user("Backup", Some("backup@example.com"), None, "YUNO");
    h.store.add_user(backup.clone());
    h.store.add_schedule(OnCallSchedule {
        id: Uuid::new_v4(),
        user_id: backup.id,
        priority: 2,
        active: true,
        start_at: None,
        end_at: None,
        created_at: h.clock.now(),
    });

    h.orchestrator
        .detect(&prediction(EntityType::Provider, "p2", RiskLevel::High, 0.55))
        .await
        .unwrap();
    assert_eq!(only_record(&h).guard_user_id, Some(backup.id));
}

#[tokio::test]
async fn test_failed_dispatch_does_not_block_state_machine() {
    let h = harness();
    h.store.fail_channel(ChannelType::Gmail);

    let outcome = h
        .orchestrator
        .detect(&prediction(EntityType::Provider, "p1", RiskLevel::High, 0.6))
        .await
        .unwrap();
    assert!(matches!(outcome, DetectOutcome::Created(_)));

    let deliveries = h.store.deliveries();
    assert_eq!(deliveries[0].status, DeliveryStatus::Failed);
    assert_eq!(deliveries[1].status, DeliveryStatus::Sent);

    h.clock.advance(Duration::minutes(10));
    assert_eq!(h.orchestrator.retry_sweep().await.unwrap().reminded, 1);
    assert_eq!(only_record(&h).guard_attempts, 2);
}

#[tokio::test]
async fn test_unavailable_channels_are_skipped() {
    let h = harness();
    h.store.set_channels(vec![ChannelType::Whatsapp]);

    h.orchestrator
        .detect(&prediction(EntityType::Provider, "p1", RiskLevel::High, 0.6))
        .await
        .unwrap();

    let deliveries = h.store.deliveries();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].notification.channel, ChannelType::Whatsapp);
}

#[tokio::test]
async fn test_unknown_id_is_not_found() {
    let h = harness();
    let id = Uuid::new_v4();

    assert!(matches!(h.orchestrator.get(id).await, Err(AppError::NotFound(_))));
    assert!(matches!(h.orchestrator.resolve(id).await, Err(AppError::NotFound(_))));
    assert!(matches!(h.orchestrator.propagate(id).await, Err(AppError::NotFound(_))));
    assert!(matches!(
        h.orchestrator
            .dismiss(id, DismissRequest { user_id: Uuid::new_v4(), reason: "x".to_string() })
            .await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_propagate_and_resolve() {
    let h = harness();
    h.orchestrator
        .detect(&prediction(EntityType::Provider, "p1", RiskLevel::High, 0.6))
        .await
        .unwrap();
    let id = only_record(&h).id;

    let escalated = assert_ok!(h.orchestrator.propagate(id).await);
    assert_eq!(escalated.status, RiskStatus::Escalated);
    assert_eq!(escalated.guard_attempts, 1);

    let resolved = assert_ok!(h.orchestrator.resolve(id).await);
    assert!(resolved.resolved);
    assert_eq!(resolved.status, RiskStatus::Resolved);

    let err = assert_err!(
        h.orchestrator
            .dismiss(id, DismissRequest { user_id: h.guard.id, reason: "late".to_string() })
            .await
    );
    assert!(matches!(err, AppError::InvalidTransition(_)));
    assert!(matches!(h.orchestrator.propagate(id).await, Err(AppError::InvalidTransition(_))));
}

#[tokio::test]
async fn test_redetection_after_propagate_opens_new_record() {
    let h = harness();
    let p = prediction(EntityType::Provider, "p1", RiskLevel::High, 0.6);
    h.orchestrator.detect(&p).await.unwrap();
    let id = only_record(&h).id;

    assert_ok!(h.orchestrator.propagate(id).await);

    h.clock.advance(Duration::minutes(1));
    let outcome = h.orchestrator.detect(&p).await.unwrap();
    assert!(matches!(outcome, DetectOutcome::Created(new_id) if new_id != id));

    let records = h.store.risk_notifications();
    assert_eq!(records.len(), 2);
    assert_eq!(records.iter().filter(|r| r.status == RiskStatus::Escalated).count(), 1);
    assert_eq!(records.iter().filter(|r| r.status == RiskStatus::GuardNotified).count(), 1);
}

#[tokio::test]
async fn test_propagating_twice_does_not_fan_out_again() {
    let h = harness();
    h.orchestrator
        .detect(&prediction(EntityType::Provider, "p1", RiskLevel::High, 0.6))
        .await
        .unwrap();
    let id = only_record(&h).id;

    let first = assert_ok!(h.orchestrator.propagate(id).await);
    let alerts = h.store.alerts().len();
    let deliveries = h.store.deliveries().len();

    h.clock.advance(Duration::minutes(3));
    let second = assert_ok!(h.orchestrator.propagate(id).await);
    assert_eq!(second.status, RiskStatus::Escalated);
    assert_eq!(second.escalated_at, first.escalated_at);
    assert_eq!(second.updated_at, first.updated_at);
    assert_eq!(h.store.alerts().len(), alerts);
    assert_eq!(h.store.deliveries().len(), deliveries);
}

#[tokio::test]
async fn test_resolved_records_are_cleaned_after_retention() {
    let h = harness();
    h.orchestrator
        .detect(&prediction(EntityType::Provider, "p1", RiskLevel::High, 0.6))
        .await
        .unwrap();
    let id = only_record(&h).id;
    h.orchestrator.resolve(id).await.unwrap();

    h.clock.advance(Duration::days(6));
    assert_eq!(h.orchestrator.cleanup().await.unwrap(), 0);

    h.clock.advance(Duration::days(2));
    assert_eq!(h.orchestrator.cleanup().await.unwrap(), 1);
    assert!(h.store.risk_notifications().is_empty());
}

#[tokio::test]
async fn test_per_type_rules_override_defaults() {
    let mut settings = OrchestratorSettings::default();
    settings.policy.overrides.insert(
        EntityType::Provider,
        EscalationRules {
            retry_interval: Duration::minutes(2),
            max_attempts: 1,
            ..EscalationRules::default()
        },
    );
    let h = harness_with(settings);

    h.orchestrator
        .detect(&prediction(EntityType::Provider, "p1", RiskLevel::High, 0.6))
        .await
        .unwrap();
    h.orchestrator
        .detect(&prediction(EntityType::Merchant, "m1", RiskLevel::High, 0.6))
        .await
        .unwrap();

    h.clock.advance(Duration::minutes(2));
    let report = h.orchestrator.retry_sweep().await.unwrap();
    assert_eq!(report.escalated, 1);
    assert_eq!(report.reminded, 0);

    let pending = h.orchestrator.pending().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].entity_type, EntityType::Merchant);
}

#[tokio::test]
async fn test_concurrent_detection_opens_one_record() {
    let h = Arc::new(harness());
    let p = prediction(EntityType::Provider, "p1", RiskLevel::High, 0.6);

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let h = h.clone();
            let p = p.clone();
            tokio::spawn(async move { h.orchestrator.detect(&p).await })
        })
        .collect();

    for task in tasks {
        assert_ok!(task.await.unwrap());
    }
    assert_eq!(h.store.risk_notifications().len(), 1);
}

fn tx(merchant: &str, provider: &str, status: TxStatus, at: DateTime<Utc>) -> TransactionFact {
    TransactionFact {
        status,
        latency_ms: Some(8_000),
        merchant_id: merchant.to_string(),
        provider_id: provider.to_string(),
        method_id: "card".to_string(),
        country_code: "CO".to_string(),
        date: at,
    }
}

#[tokio::test]
async fn test_sweep_opens_records_for_risky_entities() {
    let h = harness();
    let recent = h.clock.now() - Duration::minutes(5);
    h.store
        .add_transactions((0..30).map(|i| {
            let status = if i % 3 == 0 { TxStatus::Declined } else { TxStatus::Error };
            tx("m1", "p1", status, recent)
        }));

    let report = h.orchestrator.check_and_notify_risks().await.unwrap();
    assert_eq!(report.evaluated, 2);
    assert_eq!(report.created, 2);
    assert_eq!(report.failed, 0);

    let kinds: Vec<EntityType> = h
        .store
        .risk_notifications()
        .into_iter()
        .map(|n| n.entity_type)
        .collect();
    assert!(kinds.contains(&EntityType::Merchant));
    assert!(kinds.contains(&EntityType::Provider));

    let again = h.orchestrator.check_and_notify_risks().await.unwrap();
    assert_eq!(again.created, 0);
    assert_eq!(again.updated, 2);
    assert_eq!(h.store.risk_notifications().len(), 2);
}

#[tokio::test]
async fn test_list_pages_by_status() {
    let h = harness();
    for i in 0..3 {
        h.orchestrator
            .detect(&prediction(EntityType::Provider, &format!("p{}", i), RiskLevel::High, 0.6))
            .await
            .unwrap();
        h.clock.advance(Duration::seconds(1));
    }
    let first = h.store.risk_notifications()[0].id;
    h.orchestrator.resolve(first).await.unwrap();

    let filter = crate::models::RiskNotificationFilter {
        status: Some(RiskStatus::GuardNotified),
        page: 1,
        limit: 1,
    };
    let page = h.orchestrator.list(&filter).await.unwrap();
    assert_eq!(page.total, 2);
    assert_eq!(page.pages, 2);
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].entity_name, "provider p2");
}
