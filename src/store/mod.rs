//! Collaborator seams - everything the engine reads from or writes to

pub mod postgres;
pub mod relay;
pub mod memory;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{
    Alert, ChannelType, EntityType, NewAlert, NewNotification, NotificationPayload,
    OnCallSchedule, Page, RiskNotification, RiskNotificationFilter, RiskNotificationSummary,
    TransactionFact, TransactionFilter, User,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use relay::RelayDispatcher;

#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Transactions with `start <= date < end`
    async fn find_in_range(
        &self,
        filter: &TransactionFilter,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<Vec<TransactionFact>>;
}

#[async_trait]
pub trait EntityDirectory: Send + Sync {
    async fn names(
        &self,
        entity_type: EntityType,
        ids: &[String],
    ) -> AppResult<HashMap<String, String>>;
}

/// A valid on-call schedule joined with its user
#[derive(Debug, Clone)]
pub struct OnCallAssignment {
    pub schedule: OnCallSchedule,
    pub user: User,
}

#[async_trait]
pub trait OnCallRoster: Send + Sync {
    async fn find_by_priority(
        &self,
        priority: i32,
        now: DateTime<Utc>,
    ) -> AppResult<Option<OnCallAssignment>>;

    async fn current(&self, now: DateTime<Utc>) -> AppResult<Option<OnCallAssignment>>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_user(&self, id: Uuid) -> AppResult<Option<User>>;

    async fn active_internal_users(&self) -> AppResult<Vec<User>>;
}

#[async_trait]
pub trait AlertStore: Send + Sync {
    async fn create_alert(&self, alert: NewAlert) -> AppResult<Alert>;
}

#[async_trait]
pub trait NotificationDispatch: Send + Sync {
    /// Channels that currently have a working transport
    fn available_channels(&self) -> Vec<ChannelType>;

    /// Persist a pending notification record
    async fn create_notification(&self, notification: NewNotification) -> AppResult<Uuid>;

    /// Deliver and mark the record sent or failed
    async fn send(&self, id: Uuid, channel: ChannelType, payload: &NotificationPayload) -> bool;
}

#[async_trait]
pub trait RiskNotificationStore: Send + Sync {
    async fn insert(&self, notification: &RiskNotification) -> AppResult<()>;

    async fn save(&self, notification: &RiskNotification) -> AppResult<()>;

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<RiskNotification>>;

    /// The unresolved guard_notified record, if any
    async fn find_open(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> AppResult<Option<RiskNotification>>;

    async fn find_dismissed_since(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        since: DateTime<Utc>,
    ) -> AppResult<Option<RiskNotification>>;

    async fn find_awaiting_guard(&self) -> AppResult<Vec<RiskNotification>>;

    async fn delete_resolved_before(&self, cutoff: DateTime<Utc>) -> AppResult<u64>;

    async fn list(&self, filter: &RiskNotificationFilter) -> AppResult<Page<RiskNotificationSummary>>;
}

/// The full set of collaborators, shared by the services
#[derive(Clone)]
pub struct Stores {
    pub transactions: Arc<dyn TransactionStore>,
    pub directory: Arc<dyn EntityDirectory>,
    pub roster: Arc<dyn OnCallRoster>,
    pub users: Arc<dyn UserDirectory>,
    pub alerts: Arc<dyn AlertStore>,
    pub dispatch: Arc<dyn NotificationDispatch>,
    pub risk_notifications: Arc<dyn RiskNotificationStore>,
}

impl Stores {
    pub fn postgres(store: Arc<PgStore>, dispatch: Arc<dyn NotificationDispatch>) -> Self {
        Self {
            transactions: store.clone(),
            directory: store.clone(),
            roster: store.clone(),
            users: store.clone(),
            alerts: store.clone(),
            dispatch,
            risk_notifications: store,
        }
    }

    pub fn memory(store: Arc<MemoryStore>) -> Self {
        Self {
            transactions: store.clone(),
            directory: store.clone(),
            roster: store.clone(),
            users: store.clone(),
            alerts: store.clone(),
            dispatch: store.clone(),
            risk_notifications: store,
        }
    }
}
