//! Risk notification model - the persisted escalation record

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Row};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use validator::Validate;

use super::{BaselineComparison, EntityType, FailureProbability, RiskLevel, Signal, Trend};
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskStatus {
    GuardNotified,
    Escalated,
    Dismissed,
    Resolved,
}

impl RiskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GuardNotified => "guard_notified",
            Self::Escalated => "escalated",
            Self::Dismissed => "dismissed",
            Self::Resolved => "resolved",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Dismissed | Self::Resolved)
    }
}

impl fmt::Display for RiskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "guard_notified" => Ok(Self::GuardNotified),
            "escalated" => Ok(Self::Escalated),
            "dismissed" => Ok(Self::Dismissed),
            "resolved" => Ok(Self::Resolved),
            other => Err(format!("unknown risk status: {}", other)),
        }
    }
}

/// Scoring context captured when the risk was detected
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskMetadata {
    pub signals: Vec<Signal>,
    pub baseline_comparison: BaselineComparison,
    pub trend: Trend,
    pub recommended_actions: Vec<String>,
}

impl From<&FailureProbability> for RiskMetadata {
    fn from(p: &FailureProbability) -> Self {
        Self {
            signals: p.signals.clone(),
            baseline_comparison: p.baseline_comparison.clone(),
            trend: p.trend.clone(),
            recommended_actions: p.recommended_actions.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskNotification {
    pub id: Uuid,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub entity_name: String,
    pub risk_level: RiskLevel,
    pub probability: f64,
    pub status: RiskStatus,
    pub guard_attempts: i32,
    pub last_guard_notification: Option<DateTime<Utc>>,
    pub guard_user_id: Option<Uuid>,
    pub escalated_to_all: bool,
    pub escalated_at: Option<DateTime<Utc>>,
    pub dismissed_by_guard: bool,
    pub dismissed_by_user_id: Option<Uuid>,
    pub dismissed_at: Option<DateTime<Utc>>,
    pub dismissal_reason: Option<String>,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub metadata: Option<RiskMetadata>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RiskNotification {
    /// Fresh record for a newly detected risk, before any dispatch
    pub fn detected(prediction: &FailureProbability, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            entity_type: prediction.entity_type,
            entity_id: prediction.entity_id.clone(),
            entity_name: prediction.entity_name.clone(),
            risk_level: prediction.risk_level,
            probability: prediction.probability,
            status: RiskStatus::GuardNotified,
            guard_attempts: 0,
            last_guard_notification: None,
            guard_user_id: None,
            escalated_to_all: false,
            escalated_at: None,
            dismissed_by_guard: false,
            dismissed_by_user_id: None,
            dismissed_at: None,
            dismissal_reason: None,
            resolved: false,
            resolved_at: None,
            metadata: Some(RiskMetadata::from(prediction)),
            created_at: now,
            updated_at: now,
        }
    }

    /// Still tracked: re-detection updates it instead of opening a new record.
    /// Escalated records are out of the guard cycle and do not count.
    pub fn is_open(&self) -> bool {
        self.status == RiskStatus::GuardNotified && !self.resolved
    }

    /// Waiting on the guard and eligible for retry/escalation
    pub fn awaits_guard(&self) -> bool {
        self.status == RiskStatus::GuardNotified
            && !self.escalated_to_all
            && !self.dismissed_by_guard
            && !self.resolved
    }

    pub fn refresh_risk(&mut self, prediction: &FailureProbability, now: DateTime<Utc>) {
        self.risk_level = prediction.risk_level;
        self.probability = prediction.probability;
        self.metadata = Some(RiskMetadata::from(prediction));
        self.updated_at = now;
    }

    pub fn record_guard_attempt(&mut self, guard_id: Uuid, now: DateTime<Utc>) {
        self.guard_user_id = Some(guard_id);
        self.guard_attempts += 1;
        self.last_guard_notification = Some(now);
        self.updated_at = now;
    }

    pub fn mark_escalated(&mut self, now: DateTime<Utc>) -> AppResult<()> {
        self.ensure_not_terminal("escalate")?;
        self.status = RiskStatus::Escalated;
        self.escalated_to_all = true;
        self.escalated_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    pub fn dismiss(&mut self, user_id: Uuid, reason: String, now: DateTime<Utc>) -> AppResult<()> {
        self.ensure_not_terminal("dismiss")?;
        self.status = RiskStatus::Dismissed;
        self.dismissed_by_guard = true;
        self.dismissed_by_user_id = Some(user_id);
        self.dismissed_at = Some(now);
        self.dismissal_reason = Some(reason);
        self.updated_at = now;
        Ok(())
    }

    pub fn resolve(&mut self, now: DateTime<Utc>) -> AppResult<()> {
        self.ensure_not_terminal("resolve")?;
        self.status = RiskStatus::Resolved;
        self.resolved = true;
        self.resolved_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    fn ensure_not_terminal(&self, action: &str) -> AppResult<()> {
        if self.status.is_terminal() {
            return Err(AppError::InvalidTransition(format!(
                "cannot {} a risk notification that is already {}",
                action, self.status
            )));
        }
        Ok(())
    }
}

/// Listing projection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskNotificationSummary {
    pub id: Uuid,
    pub entity_type: EntityType,
    pub entity_name: String,
    pub risk_level: RiskLevel,
    pub status: RiskStatus,
}

impl From<&RiskNotification> for RiskNotificationSummary {
    fn from(n: &RiskNotification) -> Self {
        Self {
            id: n.id,
            entity_type: n.entity_type,
            entity_name: n.entity_name.clone(),
            risk_level: n.risk_level,
            status: n.status,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub pages: u64,
    pub items: Vec<T>,
}

impl<T> Page<T> {
    pub fn new(page: u32, limit: u32, total: u64, items: Vec<T>) -> Self {
        let pages = if limit == 0 { 0 } else { total.div_ceil(limit as u64) };
        Self { page, limit, total, pages, items }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RiskNotificationFilter {
    pub status: Option<RiskStatus>,
    #[validate(range(min = 1))]
    #[serde(default = "default_page")]
    pub page: u32,
    #[validate(range(min = 1, max = 200))]
    #[serde(default = "default_limit")]
    pub limit: u32,
}

impl Default for RiskNotificationFilter {
    fn default() -> Self {
        Self {
            status: None,
            page: default_page(),
            limit: default_limit(),
        }
    }
}

fn default_page() -> u32 {
    1
}

fn default_limit() -> u32 {
    20
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct DismissRequest {
    pub user_id: Uuid,
    #[validate(length(min = 1, max = 2000))]
    pub reason: String,
}

// ============================================================================
// PERSISTENCE
// ============================================================================

#[derive(Debug, FromRow)]
struct RiskNotificationRow {
    id: Uuid,
    entity_type: String,
    entity_id: String,
    entity_name: String,
    risk_level: String,
    probability: f64,
    status: String,
    guard_attempts: i32,
    last_guard_notification: Option<DateTime<Utc>>,
    guard_user_id: Option<Uuid>,
    escalated_to_all: bool,
    escalated_at: Option<DateTime<Utc>>,
    dismissed_by_guard: bool,
    dismissed_by_user_id: Option<Uuid>,
    dismissed_at: Option<DateTime<Utc>>,
    dismissal_reason: Option<String>,
    resolved: bool,
    resolved_at: Option<DateTime<Utc>>,
    metadata: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<RiskNotificationRow> for RiskNotification {
    type Error = AppError;

    fn try_from(row: RiskNotificationRow) -> Result<Self, Self::Error> {
        let metadata = match row.metadata {
            Some(value) => Some(serde_json::from_value(value)?),
            None => None,
        };

        Ok(Self {
            id: row.id,
            entity_type: row.entity_type.parse().map_err(AppError::InternalError)?,
            entity_id: row.entity_id,
            entity_name: row.entity_name,
            risk_level: row.risk_level.parse().map_err(AppError::InternalError)?,
            probability: row.probability,
            status: row.status.parse().map_err(AppError::InternalError)?,
            guard_attempts: row.guard_attempts,
            last_guard_notification: row.last_guard_notification,
            guard_user_id: row.guard_user_id,
            escalated_to_all: row.escalated_to_all,
            escalated_at: row.escalated_at,
            dismissed_by_guard: row.dismissed_by_guard,
            dismissed_by_user_id: row.dismissed_by_user_id,
            dismissed_at: row.dismissed_at,
            dismissal_reason: row.dismissal_reason,
            resolved: row.resolved,
            resolved_at: row.resolved_at,
            metadata,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn convert_rows(rows: Vec<RiskNotificationRow>) -> AppResult<Vec<RiskNotification>> {
    rows.into_iter().map(RiskNotification::try_from).collect()
}

impl RiskNotification {
    pub async fn insert(pool: &PgPool, n: &RiskNotification) -> AppResult<()> {
        let metadata = n.metadata.as_ref().map(serde_json::to_value).transpose()?;

        sqlx::query(
            r#"
            INSERT INTO risk_notifications (
                id, entity_type, entity_id, entity_name, risk_level, probability, status,
                guard_attempts, last_guard_notification, guard_user_id, escalated_to_all,
                escalated_at, dismissed_by_guard, dismissed_by_user_id, dismissed_at,
                dismissal_reason, resolved, resolved_at, metadata, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21)
            "#
        )
        .bind(n.id)
        .bind(n.entity_type.as_str())
        .bind(&n.entity_id)
        .bind(&n.entity_name)
        .bind(n.risk_level.as_str())
        .bind(n.probability)
        .bind(n.status.as_str())
        .bind(n.guard_attempts)
        .bind(n.last_guard_notification)
        .bind(n.guard_user_id)
        .bind(n.escalated_to_all)
        .bind(n.escalated_at)
        .bind(n.dismissed_by_guard)
        .bind(n.dismissed_by_user_id)
        .bind(n.dismissed_at)
        .bind(&n.dismissal_reason)
        .bind(n.resolved)
        .bind(n.resolved_at)
        .bind(&metadata)
        .bind(n.created_at)
        .bind(n.updated_at)
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn save(pool: &PgPool, n: &RiskNotification) -> AppResult<()> {
        let metadata = n.metadata.as_ref().map(serde_json::to_value).transpose()?;

        let result = sqlx::query(
            r#"
            UPDATE risk_notifications SET
                entity_name = $2, risk_level = $3, probability = $4, status = $5,
                guard_attempts = $6, last_guard_notification = $7, guard_user_id = $8,
                escalated_to_all = $9, escalated_at = $10, dismissed_by_guard = $11,
                dismissed_by_user_id = $12, dismissed_at = $13, dismissal_reason = $14,
                resolved = $15, resolved_at = $16, metadata = $17, updated_at = $18
            WHERE id = $1
            "#
        )
        .bind(n.id)
        .bind(&n.entity_name)
        .bind(n.risk_level.as_str())
        .bind(n.probability)
        .bind(n.status.as_str())
        .bind(n.guard_attempts)
        .bind(n.last_guard_notification)
        .bind(n.guard_user_id)
        .bind(n.escalated_to_all)
        .bind(n.escalated_at)
        .bind(n.dismissed_by_guard)
        .bind(n.dismissed_by_user_id)
        .bind(n.dismissed_at)
        .bind(&n.dismissal_reason)
        .bind(n.resolved)
        .bind(n.resolved_at)
        .bind(&metadata)
        .bind(n.updated_at)
        .execute(pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Risk notification not found".to_string()));
        }
        Ok(())
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> AppResult<Option<Self>> {
        let row = sqlx::query_as::<_, RiskNotificationRow>(
            "SELECT * FROM risk_notifications WHERE id = $1"
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        row.map(RiskNotification::try_from).transpose()
    }

    pub async fn find_open(
        pool: &PgPool,
        entity_type: EntityType,
        entity_id: &str,
    ) -> AppResult<Option<Self>> {
        let row = sqlx::query_as::<_, RiskNotificationRow>(
            r#"
            SELECT * FROM risk_notifications
            WHERE entity_type = $1 AND entity_id = $2
              AND status = 'guard_notified' AND resolved = false
            ORDER BY created_at DESC
            LIMIT 1
            "#
        )
        .bind(entity_type.as_str())
        .bind(entity_id)
        .fetch_optional(pool)
        .await?;

        row.map(RiskNotification::try_from).transpose()
    }

    pub async fn find_dismissed_since(
        pool: &PgPool,
        entity_type: EntityType,
        entity_id: &str,
        since: DateTime<Utc>,
    ) -> AppResult<Option<Self>> {
        let row = sqlx::query_as::<_, RiskNotificationRow>(
            r#"
            SELECT * FROM risk_notifications
            WHERE entity_type = $1 AND entity_id = $2
              AND dismissed_by_guard = true AND dismissed_at > $3
            ORDER BY dismissed_at DESC
            LIMIT 1
            "#
        )
        .bind(entity_type.as_str())
        .bind(entity_id)
        .bind(since)
        .fetch_optional(pool)
        .await?;

        row.map(RiskNotification::try_from).transpose()
    }

    pub async fn find_awaiting_guard(pool: &PgPool) -> AppResult<Vec<Self>> {
        let rows = sqlx::query_as::<_, RiskNotificationRow>(
            r#"
            SELECT * FROM risk_notifications
            WHERE status = 'guard_notified'
              AND escalated_to_all = false
              AND dismissed_by_guard = false
              AND resolved = false
            ORDER BY last_guard_notification ASC NULLS FIRST
            "#
        )
        .fetch_all(pool)
        .await?;

        convert_rows(rows)
    }

    pub async fn delete_resolved_before(pool: &PgPool, cutoff: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query(
            "DELETE FROM risk_notifications WHERE resolved = true AND resolved_at < $1"
        )
        .bind(cutoff)
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn list(
        pool: &PgPool,
        filter: &RiskNotificationFilter,
    ) -> AppResult<Page<RiskNotificationSummary>> {
        let status = filter.status.map(|s| s.as_str());
        let limit = filter.limit.max(1) as i64;
        let offset = (filter.page.max(1) as i64 - 1) * limit;

        let total: i64 = sqlx::query(
            "SELECT COUNT(*) AS count FROM risk_notifications WHERE ($1::TEXT IS NULL OR status = $1)"
        )
        .bind(status)
        .fetch_one(pool)
        .await?
        .get("count");

        let rows = sqlx::query_as::<_, RiskNotificationRow>(
            r#"
            SELECT * FROM risk_notifications
            WHERE ($1::TEXT IS NULL OR status = $1)
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#
        )
        .bind(status)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

        let items = convert_rows(rows)?
            .iter()
            .map(RiskNotificationSummary::from)
            .collect();

        Ok(Page::new(filter.page, filter.limit, total.max(0) as u64, items))
    }
}
