//! Host-environment handoff
//!
//! The mini-app shell supplies the subject identity, a locale hint and an
//! opaque context blob once at session start. The shell is also asked to
//! end the session from the terminal step.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::info;

use crate::submission::SubjectIdentity;

/// Languages the notification templates exist in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    Ru,
    Uk,
    En,
}

impl Locale {
    /// Map a host language code onto a supported locale
    pub fn from_language_code(code: Option<&str>) -> Self {
        let code = code.unwrap_or("ru").trim().to_ascii_lowercase();
        match code.as_str() {
            "uk" => Locale::Uk,
            "en" => Locale::En,
            _ => Locale::Ru,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Locale::Ru => "ru",
            Locale::Uk => "uk",
            Locale::En => "en",
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the host hands over at session start
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostContext {
    pub subject: SubjectIdentity,
    #[serde(default)]
    pub locale_hint: Option<String>,
    /// Copied verbatim into the record metadata
    #[serde(default)]
    pub context: Value,
}

impl HostContext {
    pub fn new(subject: SubjectIdentity, context: Value) -> Self {
        Self {
            subject,
            locale_hint: None,
            context,
        }
    }

    pub fn locale(&self) -> Locale {
        let hint = self
            .locale_hint
            .as_deref()
            .or(self.subject.language_code.as_deref());
        Locale::from_language_code(hint)
    }

    /// Metadata written with the provisional record
    pub fn metadata_snapshot(&self) -> Value {
        let mut meta = match &self.context {
            Value::Object(map) => map.clone(),
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("context".to_string(), other.clone());
                map
            }
        };
        meta.insert("ts".to_string(), json!(Utc::now().to_rfc3339()));
        Value::Object(meta)
    }
}

/// The embedding shell
pub trait HostShell: Send + Sync {
    /// Ask the host to end the mini-app session
    fn request_close(&self);
}

/// Shell that only logs and counts close requests (demo binary, tests)
#[derive(Default)]
pub struct LoggingShell {
    close_requests: AtomicUsize,
}

impl LoggingShell {
    pub fn close_requests(&self) -> usize {
        self.close_requests.load(Ordering::SeqCst)
    }
}

impl HostShell for LoggingShell {
    fn request_close(&self) {
        self.close_requests.fetch_add(1, Ordering::SeqCst);
        info!("Host asked to close the session");
    }
}
