use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::host::Locale;
use crate::submission::SubmissionStatus;

/// Built-in message templates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateKind {
    Submitted,
    Pending,
    /// Renders the free-form `text` variable
    Custom,
}

impl TemplateKind {
    /// Unknown names fall back to `Pending`
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "submitted" => TemplateKind::Submitted,
            "custom" => TemplateKind::Custom,
            _ => TemplateKind::Pending,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateKind::Submitted => "submitted",
            TemplateKind::Pending => "pending",
            TemplateKind::Custom => "custom",
        }
    }

    pub fn text(&self, locale: Locale) -> &'static str {
        match (self, locale) {
            (TemplateKind::Submitted, Locale::Ru) => {
                "✅ Ваша заявка успешно отправлена на обработку."
            }
            (TemplateKind::Submitted, Locale::Uk) => {
                "✅ Вашу заявку успішно відправлено на обробку."
            }
            (TemplateKind::Submitted, Locale::En) => {
                "✅ Your application has been submitted for review."
            }
            (TemplateKind::Pending, Locale::Ru) => {
                "ℹ️ Ваша заявка получена и ожидает завершения."
            }
            (TemplateKind::Pending, Locale::Uk) => "ℹ️ Вашу заявку отримано, очікує завершення.",
            (TemplateKind::Pending, Locale::En) => {
                "ℹ️ Your application is received, pending completion."
            }
            (TemplateKind::Custom, _) => "{{text}}",
        }
    }
}

/// What to say to a recipient
///
/// Text selection: explicit `text`, else `template`, else derived from
/// `status` (`submitted` or `pending`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<TemplateKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<SubmissionStatus>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub variables: BTreeMap<String, String>,
}

impl Notification {
    pub fn submitted() -> Self {
        Self {
            template: Some(TemplateKind::Submitted),
            status: Some(SubmissionStatus::Submitted),
            ..Self::default()
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn with_variable(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }

    pub fn template_kind(&self) -> TemplateKind {
        self.template.unwrap_or(match self.status {
            Some(SubmissionStatus::Submitted) => TemplateKind::Submitted,
            _ => TemplateKind::Pending,
        })
    }

    pub fn render(&self, locale: Locale) -> String {
        let base = match &self.text {
            Some(text) if !text.is_empty() => text.as_str(),
            _ => self.template_kind().text(locale),
        };

        let mut vars = self.variables.clone();
        vars.insert("text".to_string(), self.text.clone().unwrap_or_default());
        substitute(base, &vars)
    }
}

/// Replace `{{ name }}` placeholders; unknown names render empty
pub fn substitute(template: &str, vars: &BTreeMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];

        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            return out;
        };

        let name = after[..end].trim();
        let is_word = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_');

        if is_word {
            if let Some(value) = vars.get(name) {
                out.push_str(value);
            }
        } else {
            out.push_str(&rest[start..start + 2 + end + 2]);
        }
        rest = &after[end + 2..];
    }

    out.push_str(rest);
    out
}
