//! Outbound notifications
//!
//! - `TelegramBot`: delivers directly through the Telegram Bot API
//! - `RelayNotifier`: posts to the `/api/notify` relay endpoint
//! - `NatsNotifier`: publishes for a downstream delivery worker

pub mod messages;
pub mod nats;
pub mod relay;
pub mod telegram;
pub mod templates;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ServiceResult;
use crate::host::Locale;

pub use messages::{MediaMessage, NotificationMessage, NotifyRequest, NotifyResponse};
pub use nats::NatsNotifier;
pub use relay::RelayNotifier;
pub use telegram::TelegramBot;
pub use templates::{substitute, Notification, TemplateKind};

/// Media references forwarded to a reviewer, photo first
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaForward {
    pub photo_url: Option<String>,
    pub video_url: Option<String>,
    pub caption: Notification,
}

/// Notification endpoint
///
/// Best-effort from the caller's point of view: failures are reported as
/// `ServiceError::Delivery` and never retried.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        recipient: &str,
        notification: &Notification,
        locale: Locale,
    ) -> ServiceResult<()>;

    async fn forward_media(
        &self,
        recipient: &str,
        media: &MediaForward,
        locale: Locale,
    ) -> ServiceResult<()>;
}

/// Notifier that only logs (used when no endpoint is configured)
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(
        &self,
        recipient: &str,
        notification: &Notification,
        locale: Locale,
    ) -> ServiceResult<()> {
        tracing::info!(
            "Notification for {} [{}]: {}",
            recipient,
            locale,
            notification.render(locale)
        );
        Ok(())
    }

    async fn forward_media(
        &self,
        recipient: &str,
        media: &MediaForward,
        locale: Locale,
    ) -> ServiceResult<()> {
        tracing::info!(
            "Media for {} [{}]: photo={:?} video={:?}",
            recipient,
            locale,
            media.photo_url,
            media.video_url
        );
        Ok(())
    }
}
