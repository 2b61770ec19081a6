//! In-memory implementation of the collaborator seams

use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use super::{
    AlertStore, EntityDirectory, NotificationDispatch, OnCallAssignment, OnCallRoster,
    RiskNotificationStore, TransactionStore, UserDirectory,
};
use crate::error::AppResult;
use crate::models::{
    Alert, ChannelType, DeliveryStatus, EntityType, NewAlert, NewNotification,
    NotificationPayload, OnCallSchedule, Page, RiskNotification, RiskNotificationFilter,
    RiskNotificationSummary, TransactionFact, TransactionFilter, User,
};

/// A notification handed to the dispatcher
#[derive(Debug, Clone)]
pub struct Delivery {
    pub id: Uuid,
    pub notification: NewNotification,
    pub status: DeliveryStatus,
}

#[derive(Default)]
struct State {
    transactions: Vec<TransactionFact>,
    names: HashMap<(EntityType, String), String>,
    users: HashMap<Uuid, User>,
    schedules: Vec<OnCallSchedule>,
    alerts: Vec<Alert>,
    deliveries: Vec<Delivery>,
    failing_channels: HashSet<ChannelType>,
    risk_notifications: HashMap<Uuid, RiskNotification>,
}

pub struct MemoryStore {
    state: RwLock<State>,
    channels: RwLock<Vec<ChannelType>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
            channels: RwLock::new(vec![ChannelType::Gmail, ChannelType::Whatsapp]),
        }
    }

    pub fn add_transactions(&self, txs: impl IntoIterator<Item = TransactionFact>) {
        self.state.write().transactions.extend(txs);
    }

    pub fn set_name(&self, entity_type: EntityType, id: &str, name: &str) {
        self.state
            .write()
            .names
            .insert((entity_type, id.to_string()), name.to_string());
    }

    pub fn add_user(&self, user: User) {
        self.state.write().users.insert(user.id, user);
    }

    pub fn add_schedule(&self, schedule: OnCallSchedule) {
        self.state.write().schedules.push(schedule);
    }

    pub fn clear_schedules(&self) {
        self.state.write().schedules.clear();
    }

    pub fn set_channels(&self, channels: Vec<ChannelType>) {
        *self.channels.write() = channels;
    }

    /// Sends on this channel report failure
    pub fn fail_channel(&self, channel: ChannelType) {
        self.state.write().failing_channels.insert(channel);
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.state.read().alerts.clone()
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.state.read().deliveries.clone()
    }

    pub fn risk_notifications(&self) -> Vec<RiskNotification> {
        let mut all: Vec<_> = self.state.read().risk_notifications.values().cloned().collect();
        all.sort_by_key(|n| n.created_at);
        all
    }

    fn assignment(state: &State, schedule: Option<&OnCallSchedule>) -> Option<OnCallAssignment> {
        let schedule = schedule?;
        let user = state.users.get(&schedule.user_id)?;
        Some(OnCallAssignment {
            schedule: schedule.clone(),
            user: user.clone(),
        })
    }
}

/// Latest start first (unbounded last), then newest
fn schedule_order(s: &OnCallSchedule) -> (bool, Reverse<Option<DateTime<Utc>>>, Reverse<DateTime<Utc>>) {
    (s.start_at.is_none(), Reverse(s.start_at), Reverse(s.created_at))
}

#[async_trait]
impl TransactionStore for MemoryStore {
    async fn find_in_range(
        &self,
        filter: &TransactionFilter,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<Vec<TransactionFact>> {
        Ok(self
            .state
            .read()
            .transactions
            .iter()
            .filter(|tx| tx.date >= start && tx.date < end && filter.matches(tx))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl EntityDirectory for MemoryStore {
    async fn names(
        &self,
        entity_type: EntityType,
        ids: &[String],
    ) -> AppResult<HashMap<String, String>> {
        let state = self.state.read();
        Ok(ids
            .iter()
            .filter_map(|id| {
                state
                    .names
                    .get(&(entity_type, id.clone()))
                    .map(|name| (id.clone(), name.clone()))
            })
            .collect())
    }
}

#[async_trait]
impl OnCallRoster for MemoryStore {
    async fn find_by_priority(
        &self,
        priority: i32,
        now: DateTime<Utc>,
    ) -> AppResult<Option<OnCallAssignment>> {
        let state = self.state.read();
        let best = state
            .schedules
            .iter()
            .filter(|s| s.priority == priority && s.is_valid_at(now))
            .min_by_key(|s| schedule_order(s));
        Ok(Self::assignment(&state, best))
    }

    async fn current(&self, now: DateTime<Utc>) -> AppResult<Option<OnCallAssignment>> {
        let state = self.state.read();
        let best = state
            .schedules
            .iter()
            .filter(|s| s.is_valid_at(now))
            .min_by_key(|s| (s.priority, schedule_order(s)));
        Ok(Self::assignment(&state, best))
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn find_user(&self, id: Uuid) -> AppResult<Option<User>> {
        Ok(self.state.read().users.get(&id).cloned())
    }

    async fn active_internal_users(&self) -> AppResult<Vec<User>> {
        let mut users: Vec<User> = self
            .state
            .read()
            .users
            .values()
            .filter(|u| u.active && u.user_type == crate::models::INTERNAL_USER_TYPE)
            .cloned()
            .collect();
        users.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(users)
    }
}

#[async_trait]
impl AlertStore for MemoryStore {
    async fn create_alert(&self, alert: NewAlert) -> AppResult<Alert> {
        let created = Alert {
            id: Uuid::new_v4(),
            severity: alert.severity.as_str().to_string(),
            status: "open".to_string(),
            title: alert.title,
            explanation: Some(alert.explanation),
            merchant_id: alert.merchant_id,
            created_at: Utc::now(),
        };
        self.state.write().alerts.push(created.clone());
        Ok(created)
    }
}

#[async_trait]
impl NotificationDispatch for MemoryStore {
    fn available_channels(&self) -> Vec<ChannelType> {
        self.channels.read().clone()
    }

    async fn create_notification(&self, notification: NewNotification) -> AppResult<Uuid> {
        let id = Uuid::new_v4();
        self.state.write().deliveries.push(Delivery {
            id,
            notification,
            status: DeliveryStatus::Pending,
        });
        Ok(id)
    }

    async fn send(&self, id: Uuid, channel: ChannelType, _payload: &NotificationPayload) -> bool {
        let mut state = self.state.write();
        let ok = !state.failing_channels.contains(&channel);
        if let Some(delivery) = state.deliveries.iter_mut().find(|d| d.id == id) {
            delivery.status = if ok { DeliveryStatus::Sent } else { DeliveryStatus::Failed };
        }
        ok
    }
}

#[async_trait]
impl RiskNotificationStore for MemoryStore {
    async fn insert(&self, notification: &RiskNotification) -> AppResult<()> {
        self.state
            .write()
            .risk_notifications
            .insert(notification.id, notification.clone());
        Ok(())
    }

    async fn save(&self, notification: &RiskNotification) -> AppResult<()> {
        let mut state = self.state.write();
        match state.risk_notifications.get_mut(&notification.id) {
            Some(existing) => {
                *existing = notification.clone();
                Ok(())
            }
            None => Err(crate::error::AppError::NotFound(
                "Risk notification not found".to_string(),
            )),
        }
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<RiskNotification>> {
        Ok(self.state.read().risk_notifications.get(&id).cloned())
    }

    async fn find_open(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> AppResult<Option<RiskNotification>> {
        Ok(self
            .state
            .read()
            .risk_notifications
            .values()
            .filter(|n| n.entity_type == entity_type && n.entity_id == entity_id && n.is_open())
            .max_by_key(|n| n.created_at)
            .cloned())
    }

    async fn find_dismissed_since(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        since: DateTime<Utc>,
    ) -> AppResult<Option<RiskNotification>> {
        Ok(self
            .state
            .read()
            .risk_notifications
            .values()
            .filter(|n| {
                n.entity_type == entity_type
                    && n.entity_id == entity_id
                    && n.dismissed_by_guard
                    && n.dismissed_at.is_some_and(|at| at > since)
            })
            .max_by_key(|n| n.dismissed_at)
            .cloned())
    }

    async fn find_awaiting_guard(&self) -> AppResult<Vec<RiskNotification>> {
        let mut pending: Vec<_> = self
            .state
            .read()
            .risk_notifications
            .values()
            .filter(|n| n.awaits_guard())
            .cloned()
            .collect();
        pending.sort_by_key(|n| n.last_guard_notification);
        Ok(pending)
    }

    async fn delete_resolved_before(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        let mut state = self.state.write();
        let before = state.risk_notifications.len();
        state
            .risk_notifications
            .retain(|_, n| !(n.resolved && n.resolved_at.is_some_and(|at| at < cutoff)));
        Ok((before - state.risk_notifications.len()) as u64)
    }

    async fn list(&self, filter: &RiskNotificationFilter) -> AppResult<Page<RiskNotificationSummary>> {
        let state = self.state.read();
        let mut matching: Vec<&RiskNotification> = state
            .risk_notifications
            .values()
            .filter(|n| filter.status.map_or(true, |s| n.status == s))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let limit = filter.limit.max(1) as usize;
        let offset = (filter.page.max(1) as usize - 1) * limit;
        let items = matching
            .iter()
            .skip(offset)
            .take(limit)
            .map(|n| RiskNotificationSummary::from(*n))
            .collect();

        Ok(Page::new(filter.page, filter.limit, matching.len() as u64, items))
    }
}
