//! Alert model

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;
use chrono::{DateTime, Utc};

use super::RiskLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }

    pub fn from_risk(level: RiskLevel) -> Self {
        match level {
            RiskLevel::Critical => Self::Critical,
            RiskLevel::High | RiskLevel::Medium => Self::Warning,
            RiskLevel::Low => Self::Info,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Alert {
    pub id: Uuid,
    pub severity: String,
    pub status: String,
    pub title: String,
    pub explanation: Option<String>,
    pub merchant_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAlert {
    pub severity: AlertSeverity,
    pub title: String,
    pub explanation: String,
    pub merchant_id: Option<String>,
}

impl Alert {
    pub async fn create(pool: &PgPool, data: NewAlert) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Alert>(
            r#"
            INSERT INTO alerts (id, severity, title, explanation, merchant_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#
        )
        .bind(Uuid::new_v4())
        .bind(data.severity.as_str())
        .bind(&data.title)
        .bind(&data.explanation)
        .bind(&data.merchant_id)
        .fetch_one(pool)
        .await
    }
}
