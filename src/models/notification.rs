//! Notification model - one delivery attempt on one channel

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    Gmail,
    Slack,
    Whatsapp,
}

impl ChannelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gmail => "gmail",
            Self::Slack => "slack",
            Self::Whatsapp => "whatsapp",
        }
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gmail" | "email" => Ok(Self::Gmail),
            "slack" => Ok(Self::Slack),
            "whatsapp" => Ok(Self::Whatsapp),
            other => Err(format!("unknown channel: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub to: String,
    pub subject: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub alert_id: Uuid,
    pub user_id: Uuid,
    pub channel: ChannelType,
    pub payload: NotificationPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct NotificationRecord {
    pub id: Uuid,
    pub alert_id: Uuid,
    pub user_id: Uuid,
    pub channel: String,
    pub status: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl NotificationRecord {
    pub async fn create(pool: &PgPool, data: &NewNotification) -> Result<Self, sqlx::Error> {
        let payload = serde_json::to_value(&data.payload)
            .unwrap_or(serde_json::Value::Null);

        sqlx::query_as::<_, NotificationRecord>(
            r#"
            INSERT INTO notifications (id, alert_id, user_id, channel, status, payload)
            VALUES ($1, $2, $3, $4, 'pending', $5)
            RETURNING *
            "#
        )
        .bind(Uuid::new_v4())
        .bind(data.alert_id)
        .bind(data.user_id)
        .bind(data.channel.as_str())
        .bind(&payload)
        .fetch_one(pool)
        .await
    }

    pub async fn update_status(
        pool: &PgPool,
        id: Uuid,
        status: DeliveryStatus,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE notifications SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(pool)
            .await?;
        Ok(())
    }
}
