use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use super::{MediaForward, Notification, Notifier};
use crate::error::{ServiceError, ServiceResult};
use crate::host::Locale;

const TELEGRAM_API: &str = "https://api.telegram.org";

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
}

#[derive(Serialize)]
struct SendPhoto<'a> {
    chat_id: &'a str,
    photo: &'a str,
    caption: &'a str,
}

#[derive(Serialize)]
struct SendVideo<'a> {
    chat_id: &'a str,
    video: &'a str,
    caption: &'a str,
}

/// Telegram Bot API client
pub struct TelegramBot {
    client: reqwest::Client,
    base: String,
}

impl TelegramBot {
    pub fn new(token: &str) -> Self {
        Self::with_api_base(TELEGRAM_API, token)
    }

    /// Point the client at another Bot API server
    pub fn with_api_base(api_base: &str, token: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base: format!("{}/bot{}", api_base.trim_end_matches('/'), token),
        }
    }

    pub async fn send_message(&self, chat_id: &str, text: &str) -> Result<()> {
        self.call("sendMessage", &SendMessage { chat_id, text }).await
    }

    pub async fn send_photo(&self, chat_id: &str, photo: &str, caption: &str) -> Result<()> {
        self.call(
            "sendPhoto",
            &SendPhoto {
                chat_id,
                photo,
                caption,
            },
        )
        .await
    }

    pub async fn send_video(&self, chat_id: &str, video: &str, caption: &str) -> Result<()> {
        self.call(
            "sendVideo",
            &SendVideo {
                chat_id,
                video,
                caption,
            },
        )
        .await
    }

    async fn call<T: Serialize>(&self, method: &str, body: &T) -> Result<()> {
        let resp = self
            .client
            .post(format!("{}/{}", self.base, method))
            .json(body)
            .send()
            .await
            .with_context(|| format!("Failed to call Telegram {}", method))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            bail!("Telegram {} failed {}: {}", method, status, text);
        }

        info!("Telegram {} delivered", method);
        Ok(())
    }
}

#[async_trait]
impl Notifier for TelegramBot {
    async fn notify(
        &self,
        recipient: &str,
        notification: &Notification,
        locale: Locale,
    ) -> ServiceResult<()> {
        let text = notification.render(locale);
        self.send_message(recipient, &text)
            .await
            .map_err(|e| ServiceError::Delivery(format!("{:#}", e)))
    }

    async fn forward_media(
        &self,
        recipient: &str,
        media: &MediaForward,
        locale: Locale,
    ) -> ServiceResult<()> {
        let caption = media.caption.render(locale);

        if let Some(photo) = &media.photo_url {
            self.send_photo(recipient, photo, &caption)
                .await
                .map_err(|e| ServiceError::Delivery(format!("{:#}", e)))?;
        }
        if let Some(video) = &media.video_url {
            self.send_video(recipient, video, &caption)
                .await
                .map_err(|e| ServiceError::Delivery(format!("{:#}", e)))?;
        }
        Ok(())
    }
}
