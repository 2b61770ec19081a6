//! User and on-call schedule models

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;
use chrono::{DateTime, Utc};

/// Internal staff member who can be paged
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub slack_id: Option<String>,
    pub user_type: String,
    pub active: bool,
}

pub const INTERNAL_USER_TYPE: &str = "YUNO";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OnCallSchedule {
    pub id: Uuid,
    pub user_id: Uuid,
    pub priority: i32,
    pub active: bool,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl OnCallSchedule {
    /// Active and inside its optional validity window
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.active
            && self.start_at.map_or(true, |start| start <= now)
            && self.end_at.map_or(true, |end| end >= now)
    }

    pub async fn find_by_priority(
        pool: &PgPool,
        priority: i32,
        now: DateTime<Utc>,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, OnCallSchedule>(
            r#"
            SELECT * FROM on_call_schedule
            WHERE active = true
              AND priority = $1
              AND (start_at IS NULL OR start_at <= $2)
              AND (end_at IS NULL OR end_at >= $2)
            ORDER BY start_at DESC NULLS LAST, created_at DESC
            LIMIT 1
            "#
        )
        .bind(priority)
        .bind(now)
        .fetch_optional(pool)
        .await
    }

    pub async fn current(pool: &PgPool, now: DateTime<Utc>) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, OnCallSchedule>(
            r#"
            SELECT * FROM on_call_schedule
            WHERE active = true
              AND (start_at IS NULL OR start_at <= $1)
              AND (end_at IS NULL OR end_at >= $1)
            ORDER BY priority ASC, start_at DESC NULLS LAST, created_at DESC
            LIMIT 1
            "#
        )
        .bind(now)
        .fetch_optional(pool)
        .await
    }
}

impl User {
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list_active_internal(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE user_type = $1 AND active = true ORDER BY name ASC"
        )
        .bind(INTERNAL_USER_TYPE)
        .fetch_all(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn schedule(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> OnCallSchedule {
        OnCallSchedule {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            priority: 1,
            active: true,
            start_at: start,
            end_at: end,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_validity_window() {
        let now = Utc::now();
        assert!(schedule(None, None).is_valid_at(now));
        assert!(schedule(Some(now - Duration::hours(1)), Some(now + Duration::hours(1))).is_valid_at(now));
        assert!(!schedule(Some(now + Duration::hours(1)), None).is_valid_at(now));
        assert!(!schedule(None, Some(now - Duration::minutes(1))).is_valid_at(now));

        let mut inactive = schedule(None, None);
        inactive.active = false;
        assert!(!inactive.is_valid_at(now));
    }
}
