use anyhow::{Context, Result};
use async_nats::Client;
use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use super::messages::{MediaMessage, NotificationMessage};
use super::{MediaForward, Notification, Notifier};
use crate::error::{ServiceError, ServiceResult};
use crate::host::Locale;

/// Publishes notifications for a downstream delivery worker
///
/// Subjects: `notify.user.{recipient}` and `notify.media.{recipient}`.
pub struct NatsNotifier {
    client: Client,
}

impl NatsNotifier {
    /// Connect to NATS server
    pub async fn connect(url: &str) -> Result<Self> {
        info!("Connecting to NATS at {}", url);

        let client = async_nats::connect(url)
            .await
            .context("Failed to connect to NATS")?;

        info!("Connected to NATS successfully");

        Ok(Self { client })
    }

    async fn publish<T: Serialize>(&self, subject: String, message: &T) -> Result<()> {
        let payload = serde_json::to_vec(message)?;

        self.client
            .publish(subject.clone(), payload.into())
            .await
            .context("Failed to publish notification")?;

        info!("Published notification to {}", subject);
        Ok(())
    }
}

/// Subject and payload of a user notification
fn user_message(
    recipient: &str,
    notification: &Notification,
    locale: Locale,
) -> (String, NotificationMessage) {
    let message = NotificationMessage {
        recipient: recipient.to_string(),
        locale: locale.as_str().to_string(),
        text: notification.render(locale),
        template: notification.template_kind().as_str().to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    };
    (format!("notify.user.{}", recipient), message)
}

/// Subject and payload of a media forward
fn media_message(recipient: &str, media: &MediaForward, locale: Locale) -> (String, MediaMessage) {
    let message = MediaMessage {
        recipient: recipient.to_string(),
        caption: media.caption.render(locale),
        photo_url: media.photo_url.clone(),
        video_url: media.video_url.clone(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    };
    (format!("notify.media.{}", recipient), message)
}

#[async_trait]
impl Notifier for NatsNotifier {
    async fn notify(
        &self,
        recipient: &str,
        notification: &Notification,
        locale: Locale,
    ) -> ServiceResult<()> {
        let (subject, message) = user_message(recipient, notification, locale);
        self.publish(subject, &message)
            .await
            .map_err(|e| ServiceError::Delivery(format!("{:#}", e)))
    }

    async fn forward_media(
        &self,
        recipient: &str,
        media: &MediaForward,
        locale: Locale,
    ) -> ServiceResult<()> {
        let (subject, message) = media_message(recipient, media, locale);
        self.publish(subject, &message)
            .await
            .map_err(|e| ServiceError::Delivery(format!("{:#}", e)))
    }
}
