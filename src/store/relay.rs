//! Notification dispatch through HTTP relays
//!
//! Each channel (gmail, slack, whatsapp) is delivered by an external relay
//! service. A channel without a configured relay is unavailable. Every send
//! is recorded in `notifications` first (`pending`) and marked `sent` or
//! `failed` afterwards.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::NotificationDispatch;
use crate::error::{AppError, AppResult};
use crate::models::{ChannelType, DeliveryStatus, NewNotification, NotificationPayload, NotificationRecord};

const RELAY_TIMEOUT: Duration = Duration::from_secs(10);

pub struct RelayDispatcher {
    pool: PgPool,
    client: reqwest::Client,
    relays: HashMap<ChannelType, String>,
}

impl RelayDispatcher {
    pub fn new(pool: PgPool, relays: HashMap<ChannelType, String>) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(RELAY_TIMEOUT)
            .build()?;

        for (channel, url) in &relays {
            tracing::info!("Notification relay configured: {} -> {}", channel, url);
        }

        Ok(Self { pool, client, relays })
    }

    async fn deliver(&self, channel: ChannelType, payload: &NotificationPayload) -> AppResult<()> {
        let url = self.relays.get(&channel).ok_or_else(|| {
            AppError::ExternalServiceError(format!("channel {} has no relay", channel))
        })?;

        let body = serde_json::json!({
            "channel": channel.as_str(),
            "to": payload.to,
            "subject": payload.subject,
            "body": payload.body,
            "metadata": payload.metadata,
        });

        let response = self.client.post(url).json(&body).send().await?;

        if !response.status().is_success() {
            return Err(AppError::ExternalServiceError(format!(
                "relay for {} answered {}",
                channel,
                response.status()
            )));
        }
        Ok(())
    }

    async fn mark(&self, id: Uuid, status: DeliveryStatus) {
        if let Err(e) = NotificationRecord::update_status(&self.pool, id, status).await {
            tracing::error!("Failed to mark notification {} as {}: {}", id, status.as_str(), e);
        }
    }
}

#[async_trait]
impl NotificationDispatch for RelayDispatcher {
    fn available_channels(&self) -> Vec<ChannelType> {
        [ChannelType::Gmail, ChannelType::Whatsapp, ChannelType::Slack]
            .into_iter()
            .filter(|c| self.relays.contains_key(c))
            .collect()
    }

    async fn create_notification(&self, notification: NewNotification) -> AppResult<Uuid> {
        let record = NotificationRecord::create(&self.pool, &notification).await?;
        Ok(record.id)
    }

    async fn send(&self, id: Uuid, channel: ChannelType, payload: &NotificationPayload) -> bool {
        match self.deliver(channel, payload).await {
            Ok(()) => {
                tracing::info!("Notification {} sent via {} to {}", id, channel, payload.to);
                self.mark(id, DeliveryStatus::Sent).await;
                true
            }
            Err(e) => {
                tracing::error!("Notification {} via {} failed: {}", id, channel, e);
                self.mark(id, DeliveryStatus::Failed).await;
                false
            }
        }
    }
}
