use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::templates::{Notification, TemplateKind};
use crate::submission::SubmissionStatus;

/// Body of `POST /api/notify`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotifyRequest {
    /// Recipient of a user notification (number or string)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<BTreeMap<String, Value>>,
    #[serde(default)]
    pub send_media: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_chat_id: Option<Value>,
}

impl NotifyRequest {
    pub fn user_id(&self) -> Option<String> {
        self.user_id.as_ref().and_then(chat_id_string)
    }

    pub fn admin_chat_id(&self) -> Option<String> {
        self.admin_chat_id.as_ref().and_then(chat_id_string)
    }

    pub fn notification(&self) -> Notification {
        let variables = self
            .variables
            .iter()
            .flatten()
            .filter_map(|(k, v)| {
                let value = match v {
                    Value::Null => return None,
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                Some((k.clone(), value))
            })
            .collect();

        let status = match self.status.as_deref() {
            Some("submitted") => Some(SubmissionStatus::Submitted),
            Some(_) => Some(SubmissionStatus::Partial),
            None => None,
        };

        Notification {
            template: self
                .template
                .as_deref()
                .filter(|t| !t.trim().is_empty())
                .map(TemplateKind::parse),
            text: self.text.clone().filter(|t| !t.is_empty()),
            status,
            variables,
        }
    }
}

fn chat_id_string(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

/// Successful relay response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// User notification published over NATS
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationMessage {
    pub recipient: String,
    pub locale: String,
    pub text: String,
    pub template: String,
    pub timestamp: String, // RFC3339 timestamp
}

/// Media forward published over NATS
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaMessage {
    pub recipient: String,
    pub caption: String,
    pub photo_url: Option<String>,
    pub video_url: Option<String>,
    pub timestamp: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_numeric_and_string_chat_ids() {
        let req: NotifyRequest = serde_json::from_value(json!({
            "user_id": 123456789,
            "admin_chat_id": "-100500"
        }))
        .unwrap();

        assert_eq!(req.user_id(), Some("123456789".to_string()));
        assert_eq!(req.admin_chat_id(), Some("-100500".to_string()));
        assert!(!req.send_media);
    }

    #[test]
    fn test_notification_from_request() {
        let req: NotifyRequest = serde_json::from_value(json!({
            "user_id": 1,
            "status": "submitted",
            "variables": { "id": 7, "name": "Ada", "gone": null }
        }))
        .unwrap();

        let n = req.notification();
        assert_eq!(n.template_kind(), TemplateKind::Submitted);
        assert_eq!(n.variables.get("id"), Some(&"7".to_string()));
        assert!(!n.variables.contains_key("gone"));
    }

    #[test]
    fn test_blank_template_falls_through_to_status() {
        for template in ["", "   "] {
            let req: NotifyRequest = serde_json::from_value(json!({
                "user_id": 1,
                "status": "submitted",
                "template": template
            }))
            .unwrap();

            let n = req.notification();
            assert_eq!(n.template, None);
            assert_eq!(n.template_kind(), TemplateKind::Submitted);
        }
    }
}
