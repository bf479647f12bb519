use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::messages::{NotifyRequest, NotifyResponse};
use super::{MediaForward, Notification, Notifier};
use crate::error::{ServiceError, ServiceResult};
use crate::host::Locale;

/// Client of the `/api/notify` relay endpoint
pub struct RelayNotifier {
    client: reqwest::Client,
    endpoint: String,
}

impl RelayNotifier {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    pub async fn send(&self, request: &NotifyRequest) -> Result<NotifyResponse> {
        let resp = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .context("Failed to reach notify relay")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            bail!("Notify relay returned {}: {}", status, text);
        }

        let body: NotifyResponse = resp.json().await.context("Invalid relay response")?;
        debug!("Relay accepted notification: {:?}", body.mode);
        Ok(body)
    }

    fn request_for(notification: &Notification, locale: Locale) -> NotifyRequest {
        NotifyRequest {
            language_code: Some(locale.as_str().to_string()),
            status: notification.status.map(|s| s.as_str().to_string()),
            text: notification.text.clone(),
            template: notification.template.map(|t| t.as_str().to_string()),
            variables: if notification.variables.is_empty() {
                None
            } else {
                Some(
                    notification
                        .variables
                        .iter()
                        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                        .collect(),
                )
            },
            ..NotifyRequest::default()
        }
    }
}

/// Chat ids go out as numbers when they look like numbers
fn chat_id_value(recipient: &str) -> Value {
    recipient
        .parse::<i64>()
        .map(Value::from)
        .unwrap_or_else(|_| Value::String(recipient.to_string()))
}

#[async_trait]
impl Notifier for RelayNotifier {
    async fn notify(
        &self,
        recipient: &str,
        notification: &Notification,
        locale: Locale,
    ) -> ServiceResult<()> {
        let mut request = Self::request_for(notification, locale);
        request.user_id = Some(chat_id_value(recipient));

        self.send(&request)
            .await
            .map(|_| ())
            .map_err(|e| ServiceError::Delivery(format!("{:#}", e)))
    }

    async fn forward_media(
        &self,
        recipient: &str,
        media: &MediaForward,
        locale: Locale,
    ) -> ServiceResult<()> {
        let mut request = Self::request_for(&media.caption, locale);
        request.send_media = true;
        request.admin_chat_id = Some(chat_id_value(recipient));
        request.photo_url = media.photo_url.clone();
        request.video_url = media.video_url.clone();

        self.send(&request)
            .await
            .map(|_| ())
            .map_err(|e| ServiceError::Delivery(format!("{:#}", e)))
    }
}
