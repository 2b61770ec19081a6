//! Risk notification orchestrator - detect, notify, retry, escalate
//!
//! Every read-modify-write of a record runs under the per-entity lock so a
//! sweep and a manual action on the same entity never interleave.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::channels::address_for;
use super::locks::EntityLocks;
use super::messages::{self, GuardContext, RenderedMessage};
use super::policy::{ChannelPolicy, EscalationPolicy};
use crate::clock::Clock;
use crate::error::{AppError, AppResult};
use crate::models::{
    merchant_of, AlertSeverity, ChannelType, DismissRequest, EntityType, FailureProbability,
    NewAlert, NewNotification, NotificationPayload, Page, PredictionQuery, RiskLevel,
    RiskNotification, RiskNotificationFilter, RiskNotificationSummary, RiskStatus, User,
};
use crate::prediction::PredictionService;
use crate::scheduler::SweepTarget;
use crate::store::Stores;

/// Priority of the primary on-call guard
const PRIMARY_GUARD_PRIORITY: i32 = 1;

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub policy: EscalationPolicy,
    pub channels: ChannelPolicy,
    /// Base of the dismiss/propagate links in guard messages
    pub backend_url: String,
    pub sweep_window_minutes: u32,
    pub sweep_entity_types: Vec<EntityType>,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            policy: EscalationPolicy::default(),
            channels: ChannelPolicy::default(),
            backend_url: "http://localhost:8080".to_string(),
            sweep_window_minutes: 60,
            sweep_entity_types: vec![EntityType::Merchant, EntityType::Provider],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectOutcome {
    /// Guard notified on a new record
    Created(Uuid),
    /// Already tracked; level/probability refreshed
    Updated(Uuid),
    /// Dismissed recently
    Suppressed,
    /// No guard available; escalated on creation
    Escalated(Uuid),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub evaluated: usize,
    pub created: usize,
    pub updated: usize,
    pub suppressed: usize,
    pub escalated: usize,
    pub failed: usize,
    pub cleaned: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RetryReport {
    pub checked: usize,
    pub reminded: usize,
    pub escalated: usize,
    pub failed: usize,
}

pub struct RiskOrchestrator {
    stores: Stores,
    predictions: Arc<PredictionService>,
    clock: Arc<dyn Clock>,
    settings: OrchestratorSettings,
    locks: EntityLocks,
}

impl RiskOrchestrator {
    pub fn new(
        stores: Stores,
        predictions: Arc<PredictionService>,
        clock: Arc<dyn Clock>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            stores,
            predictions,
            clock,
            settings,
            locks: EntityLocks::new(),
        }
    }

    // ========================================================================
    // SWEEPS
    // ========================================================================

    /// Score the configured entity types and open or refresh a record for
    /// every medium-or-worse prediction. Ends with the retention cleanup.
    pub async fn check_and_notify_risks(&self) -> AppResult<SweepReport> {
        tracing::info!("Starting risk sweep");
        let mut report = SweepReport::default();

        for &entity_type in &self.settings.sweep_entity_types {
            let query = PredictionQuery {
                time_window_minutes: Some(self.settings.sweep_window_minutes),
                ..PredictionQuery::for_entity(entity_type)
            };

            let summary = match self.predictions.get_predictions(&query, None).await {
                Ok(summary) => summary,
                Err(e) => {
                    tracing::error!("Risk sweep failed to score {} entities: {}", entity_type, e);
                    report.failed += 1;
                    continue;
                }
            };

            for prediction in summary
                .predictions
                .iter()
                .filter(|p| p.risk_level >= RiskLevel::Medium)
            {
                report.evaluated += 1;
                match self.detect(prediction).await {
                    Ok(DetectOutcome::Created(_)) => report.created += 1,
                    Ok(DetectOutcome::Updated(_)) => report.updated += 1,
                    Ok(DetectOutcome::Suppressed) => report.suppressed += 1,
                    Ok(DetectOutcome::Escalated(_)) => report.escalated += 1,
                    Err(e) => {
                        tracing::error!(
                            "Failed to process risky {} {}: {}",
                            prediction.entity_type,
                            prediction.entity_id,
                            e
                        );
                        report.failed += 1;
                    }
                }
            }
        }

        match self.cleanup().await {
            Ok(removed) => report.cleaned = removed,
            Err(e) => tracing::error!("Retention cleanup failed: {}", e),
        }

        tracing::info!(
            "Risk sweep completed: {} evaluated, {} created, {} updated, {} suppressed, {} escalated, {} failed",
            report.evaluated,
            report.created,
            report.updated,
            report.suppressed,
            report.escalated,
            report.failed
        );
        Ok(report)
    }

    /// Remind silent guards and escalate once the attempts are used up
    pub async fn retry_sweep(&self) -> AppResult<RetryReport> {
        let pending = self.stores.risk_notifications.find_awaiting_guard().await?;
        let mut report = RetryReport {
            checked: pending.len(),
            ..Default::default()
        };

        for record in pending {
            if !self.retry_due(&record, self.clock.now()) {
                continue;
            }

            match self.retry_one(record.entity_type, &record.entity_id, record.id).await {
                Ok(Some(RetryAction::Reminded)) => report.reminded += 1,
                Ok(Some(RetryAction::Escalated)) => report.escalated += 1,
                Ok(None) => {}
                Err(e) => {
                    tracing::error!("Guard retry for {} failed: {}", record.id, e);
                    report.failed += 1;
                }
            }
        }

        if report.reminded + report.escalated + report.failed > 0 {
            tracing::info!(
                "Retry sweep: {} reminded, {} escalated, {} failed",
                report.reminded,
                report.escalated,
                report.failed
            );
        }
        Ok(report)
    }

    pub async fn cleanup(&self) -> AppResult<u64> {
        let cutoff = self.clock.now() - self.settings.policy.retention;
        let removed = self
            .stores
            .risk_notifications
            .delete_resolved_before(cutoff)
            .await?;
        if removed > 0 {
            tracing::info!("Removed {} resolved risk notifications", removed);
        }
        Ok(removed)
    }

    // ========================================================================
    // TRANSITIONS
    // ========================================================================

    pub async fn detect(&self, prediction: &FailureProbability) -> AppResult<DetectOutcome> {
        let _guard = self
            .locks
            .acquire(prediction.entity_type, &prediction.entity_id)
            .await;
        let now = self.clock.now();
        let rules = self.settings.policy.rules_for(prediction.entity_type);
        let store = &self.stores.risk_notifications;

        if let Some(mut open) = store
            .find_open(prediction.entity_type, &prediction.entity_id)
            .await?
        {
            if open.risk_level != prediction.risk_level || open.probability != prediction.probability {
                tracing::info!(
                    "Risk changed for {}: {} -> {}",
                    open.entity_name,
                    open.risk_level,
                    prediction.risk_level
                );
                open.refresh_risk(prediction, now);
                store.save(&open).await?;
            }
            return Ok(DetectOutcome::Updated(open.id));
        }

        if store
            .find_dismissed_since(
                prediction.entity_type,
                &prediction.entity_id,
                now - rules.suppression_window,
            )
            .await?
            .is_some()
        {
            tracing::info!("{} was dismissed recently, not notifying", prediction.entity_name);
            return Ok(DetectOutcome::Suppressed);
        }

        tracing::info!(
            "New risky {} detected: {} ({})",
            prediction.entity_type,
            prediction.entity_name,
            prediction.risk_level
        );

        let mut record = RiskNotification::detected(prediction, now);

        let Some(guard) = self.find_guard(now).await? else {
            tracing::error!("No on-call guard available, escalating {} directly", record.entity_name);
            record.mark_escalated(now)?;
            store.insert(&record).await?;
            self.fan_out(&record).await?;
            return Ok(DetectOutcome::Escalated(record.id));
        };

        let alert = self
            .stores
            .alerts
            .create_alert(NewAlert {
                severity: AlertSeverity::from_risk(prediction.risk_level),
                title: format!(
                    "Risk {} detected: {}",
                    prediction.risk_level.as_str().to_uppercase(),
                    prediction.entity_name
                ),
                explanation: detection_explanation(prediction),
                merchant_id: merchant_of(prediction.entity_type, &prediction.entity_id),
            })
            .await?;

        record.record_guard_attempt(guard.id, now);
        store.insert(&record).await?;

        self.notify_guard(&record, &guard, alert.id).await;
        tracing::info!("Guard notified: {} for {}", guard.name, record.entity_name);

        Ok(DetectOutcome::Created(record.id))
    }

    pub async fn dismiss(&self, id: Uuid, request: DismissRequest) -> AppResult<RiskNotification> {
        self.transition(id, |record, now| {
            record.dismiss(request.user_id, request.reason, now)
        })
        .await
        .inspect(|record| tracing::info!("Risk notification dismissed by guard: {}", record.entity_name))
    }

    pub async fn resolve(&self, id: Uuid) -> AppResult<RiskNotification> {
        self.transition(id, |record, now| record.resolve(now))
            .await
            .inspect(|record| tracing::info!("Risk notification resolved: {}", record.entity_name))
    }

    /// Escalate now, regardless of the attempt count
    pub async fn propagate(&self, id: Uuid) -> AppResult<RiskNotification> {
        let record = self.get(id).await?;
        let _guard = self.locks.acquire(record.entity_type, &record.entity_id).await;

        let mut record = self.get(id).await?;
        if record.status == RiskStatus::Escalated {
            tracing::debug!("{} is already escalated", record.entity_name);
            return Ok(record);
        }
        tracing::info!("Guard propagated {} to the whole team", record.entity_name);
        self.escalate(&mut record).await?;
        Ok(record)
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    pub async fn get(&self, id: Uuid) -> AppResult<RiskNotification> {
        self.stores
            .risk_notifications
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Risk notification not found".to_string()))
    }

    pub async fn list(&self, filter: &RiskNotificationFilter) -> AppResult<Page<RiskNotificationSummary>> {
        self.stores.risk_notifications.list(filter).await
    }

    /// Records still waiting on the guard
    pub async fn pending(&self) -> AppResult<Vec<RiskNotification>> {
        self.stores.risk_notifications.find_awaiting_guard().await
    }

    // ========================================================================
    // INTERNALS
    // ========================================================================

    async fn transition<F>(&self, id: Uuid, apply: F) -> AppResult<RiskNotification>
    where
        F: FnOnce(&mut RiskNotification, DateTime<Utc>) -> AppResult<()>,
    {
        let record = self.get(id).await?;
        let _guard = self.locks.acquire(record.entity_type, &record.entity_id).await;

        let mut record = self.get(id).await?;
        apply(&mut record, self.clock.now())?;
        self.stores.risk_notifications.save(&record).await?;
        Ok(record)
    }

    fn retry_due(&self, record: &RiskNotification, now: DateTime<Utc>) -> bool {
        let interval = self.settings.policy.rules_for(record.entity_type).retry_interval;
        record
            .last_guard_notification
            .map_or(true, |last| now - last >= interval)
    }

    async fn retry_one(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        id: Uuid,
    ) -> AppResult<Option<RetryAction>> {
        let _guard = self.locks.acquire(entity_type, entity_id).await;
        let now = self.clock.now();

        // state may have moved while waiting for the lock
        let Some(mut record) = self.stores.risk_notifications.find_by_id(id).await? else {
            return Ok(None);
        };
        if !record.awaits_guard() || !self.retry_due(&record, now) {
            return Ok(None);
        }

        let rules = self.settings.policy.rules_for(record.entity_type);
        let guard_id = match record.guard_user_id {
            Some(guard_id) if record.guard_attempts < rules.max_attempts => guard_id,
            _ => {
                tracing::warn!(
                    "Guard did not respond after {} attempts, escalating {}",
                    record.guard_attempts,
                    record.entity_name
                );
                self.escalate(&mut record).await?;
                return Ok(Some(RetryAction::Escalated));
            }
        };

        record.record_guard_attempt(guard_id, now);
        self.stores.risk_notifications.save(&record).await?;

        let Some(guard) = self.stores.users.find_user(guard_id).await? else {
            tracing::warn!("Guard {} no longer exists, reminder for {} skipped", guard_id, record.entity_name);
            return Ok(Some(RetryAction::Reminded));
        };

        tracing::info!(
            "Reminder {}/{} for {}",
            record.guard_attempts,
            rules.max_attempts,
            record.entity_name
        );

        let alert = self
            .stores
            .alerts
            .create_alert(NewAlert {
                severity: AlertSeverity::from_risk(record.risk_level),
                title: format!(
                    "[REMINDER {}] Risk {}: {}",
                    record.guard_attempts,
                    record.risk_level.as_str().to_uppercase(),
                    record.entity_name
                ),
                explanation: format!(
                    "This is attempt {} of {}.\n\nIf no response is received, it will be escalated to the whole team.",
                    record.guard_attempts, rules.max_attempts
                ),
                merchant_id: None,
            })
            .await?;

        self.notify_guard(&record, &guard, alert.id).await;
        Ok(Some(RetryAction::Reminded))
    }

    /// Primary guard first, then whoever else is on call
    async fn find_guard(&self, now: DateTime<Utc>) -> AppResult<Option<User>> {
        let roster = &self.stores.roster;
        let assignment = match roster.find_by_priority(PRIMARY_GUARD_PRIORITY, now).await? {
            Some(assignment) => Some(assignment),
            None => roster.current(now).await?,
        };
        Ok(assignment.map(|a| a.user))
    }

    async fn escalate(&self, record: &mut RiskNotification) -> AppResult<()> {
        record.mark_escalated(self.clock.now())?;
        self.stores.risk_notifications.save(record).await?;
        self.fan_out(record).await
    }

    /// CRITICAL alert plus a message to every active internal user
    async fn fan_out(&self, record: &RiskNotification) -> AppResult<()> {
        let users = self.stores.users.active_internal_users().await?;
        tracing::info!("Escalating {} to {} team members", record.entity_name, users.len());

        let alert = self
            .stores
            .alerts
            .create_alert(NewAlert {
                severity: AlertSeverity::Critical,
                title: format!("[ESCALATED] CRITICAL Risk: {}", record.entity_name),
                explanation: format!(
                    "This alert was escalated after {} unanswered on-call guard attempts.\n\nImmediate attention from the entire team is required.",
                    record.guard_attempts
                ),
                merchant_id: merchant_of(record.entity_type, &record.entity_id),
            })
            .await?;

        let channels = self.usable(&self.settings.channels.escalation);
        if channels.is_empty() {
            tracing::error!("No notification channel available for escalation");
            return Ok(());
        }

        let mut sent = 0;
        for user in &users {
            for &channel in &channels {
                let Some(to) = address_for(user, channel) else {
                    tracing::warn!("User {} has no {} address", user.id, channel);
                    continue;
                };
                let message = messages::escalation_message(record, channel);
                if self.dispatch(alert.id, user.id, channel, to, message).await {
                    sent += 1;
                }
            }
        }

        tracing::info!("Escalation for {} delivered {} messages", record.entity_name, sent);
        Ok(())
    }

    async fn notify_guard(&self, record: &RiskNotification, guard: &User, alert_id: Uuid) {
        let rules = self.settings.policy.rules_for(record.entity_type);
        let ctx = GuardContext {
            backend_url: &self.settings.backend_url,
            max_attempts: rules.max_attempts,
            retry_minutes: rules.retry_interval.num_minutes(),
        };

        let channels = self.usable(&self.settings.channels.guard);
        if channels.is_empty() {
            tracing::warn!("No notification channel available for the guard");
            return;
        }

        for channel in channels {
            let Some(to) = address_for(guard, channel) else {
                tracing::warn!("Guard {} has no {} address", guard.id, channel);
                continue;
            };
            let message = messages::guard_message(record, guard, channel, &ctx);
            self.dispatch(alert_id, guard.id, channel, to, message).await;
        }
    }

    fn usable(&self, configured: &[ChannelType]) -> Vec<ChannelType> {
        ChannelPolicy::usable(configured, &self.stores.dispatch.available_channels())
    }

    /// Record then send. Failures are logged and never stop the caller.
    async fn dispatch(
        &self,
        alert_id: Uuid,
        user_id: Uuid,
        channel: ChannelType,
        to: String,
        message: RenderedMessage,
    ) -> bool {
        let payload = NotificationPayload {
            to,
            subject: message.subject,
            body: message.body,
            metadata: None,
        };

        let notification = NewNotification {
            alert_id,
            user_id,
            channel,
            payload: payload.clone(),
        };

        let id = match self.stores.dispatch.create_notification(notification).await {
            Ok(id) => id,
            Err(e) => {
                tracing::error!("Failed to record {} notification for {}: {}", channel, user_id, e);
                return false;
            }
        };

        let sent = self.stores.dispatch.send(id, channel, &payload).await;
        if !sent {
            tracing::warn!("{} notification {} to {} was not delivered", channel, id, payload.to);
        }
        sent
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RetryAction {
    Reminded,
    Escalated,
}

fn detection_explanation(p: &FailureProbability) -> String {
    format!(
        "Failure probability: {:.1}%\nCurrent error rate: {:.2}%\nBaseline error rate: {:.2}%\nTrend: {}\n\nRecommended actions:\n{}",
        p.probability * 100.0,
        p.baseline_comparison.current_error_rate * 100.0,
        p.baseline_comparison.baseline_error_rate * 100.0,
        p.trend.direction.as_str(),
        p.recommended_actions.join("\n")
    )
}

#[async_trait]
impl SweepTarget for RiskOrchestrator {
    async fn run_risk_sweep(&self) {
        if let Err(e) = self.check_and_notify_risks().await {
            tracing::error!("Risk sweep aborted: {}", e);
        }
    }

    async fn run_retry_sweep(&self) {
        if let Err(e) = self.retry_sweep().await {
            tracing::error!("Retry sweep aborted: {}", e);
        }
    }
}
