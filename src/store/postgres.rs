//! PostgreSQL implementation of the collaborator seams

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{
    AlertStore, EntityDirectory, OnCallAssignment, OnCallRoster, RiskNotificationStore,
    TransactionStore, UserDirectory,
};
use crate::error::AppResult;
use crate::models::{
    self, Alert, EntityType, NewAlert, OnCallSchedule, Page, RiskNotification,
    RiskNotificationFilter, RiskNotificationSummary, TransactionFact, TransactionFilter, User,
};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn assignment(&self, schedule: Option<OnCallSchedule>) -> AppResult<Option<OnCallAssignment>> {
        let Some(schedule) = schedule else {
            return Ok(None);
        };

        match User::find_by_id(&self.pool, schedule.user_id).await? {
            Some(user) => Ok(Some(OnCallAssignment { schedule, user })),
            None => {
                tracing::warn!("On-call schedule {} points to missing user {}", schedule.id, schedule.user_id);
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl TransactionStore for PgStore {
    async fn find_in_range(
        &self,
        filter: &TransactionFilter,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<Vec<TransactionFact>> {
        Ok(TransactionFact::find_in_range(&self.pool, filter, start, end).await?)
    }
}

#[async_trait]
impl EntityDirectory for PgStore {
    async fn names(
        &self,
        entity_type: EntityType,
        ids: &[String],
    ) -> AppResult<HashMap<String, String>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        Ok(models::find_names(&self.pool, entity_type, ids).await?)
    }
}

#[async_trait]
impl OnCallRoster for PgStore {
    async fn find_by_priority(
        &self,
        priority: i32,
        now: DateTime<Utc>,
    ) -> AppResult<Option<OnCallAssignment>> {
        let schedule = OnCallSchedule::find_by_priority(&self.pool, priority, now).await?;
        self.assignment(schedule).await
    }

    async fn current(&self, now: DateTime<Utc>) -> AppResult<Option<OnCallAssignment>> {
        let schedule = OnCallSchedule::current(&self.pool, now).await?;
        self.assignment(schedule).await
    }
}

#[async_trait]
impl UserDirectory for PgStore {
    async fn find_user(&self, id: Uuid) -> AppResult<Option<User>> {
        Ok(User::find_by_id(&self.pool, id).await?)
    }

    async fn active_internal_users(&self) -> AppResult<Vec<User>> {
        Ok(User::list_active_internal(&self.pool).await?)
    }
}

#[async_trait]
impl AlertStore for PgStore {
    async fn create_alert(&self, alert: NewAlert) -> AppResult<Alert> {
        Ok(Alert::create(&self.pool, alert).await?)
    }
}

#[async_trait]
impl RiskNotificationStore for PgStore {
    async fn insert(&self, notification: &RiskNotification) -> AppResult<()> {
        RiskNotification::insert(&self.pool, notification).await
    }

    async fn save(&self, notification: &RiskNotification) -> AppResult<()> {
        RiskNotification::save(&self.pool, notification).await
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<RiskNotification>> {
        RiskNotification::find_by_id(&self.pool, id).await
    }

    async fn find_open(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> AppResult<Option<RiskNotification>> {
        RiskNotification::find_open(&self.pool, entity_type, entity_id).await
    }

    async fn find_dismissed_since(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        since: DateTime<Utc>,
    ) -> AppResult<Option<RiskNotification>> {
        RiskNotification::find_dismissed_since(&self.pool, entity_type, entity_id, since).await
    }

    async fn find_awaiting_guard(&self) -> AppResult<Vec<RiskNotification>> {
        RiskNotification::find_awaiting_guard(&self.pool).await
    }

    async fn delete_resolved_before(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        RiskNotification::delete_resolved_before(&self.pool, cutoff).await
    }

    async fn list(&self, filter: &RiskNotificationFilter) -> AppResult<Page<RiskNotificationSummary>> {
        RiskNotification::list(&self.pool, filter).await
    }
}
