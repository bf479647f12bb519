use crate::host::Locale;
use crate::notify::Notifier;
use crate::remote::InMemoryService;
use crate::submission::SubmissionReader;
use std::sync::Arc;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Delivery backend of the notify relay; `None` when no bot token is set
    pub notifier: Option<Arc<dyn Notifier>>,

    /// Source of the review feed
    pub reader: Arc<dyn SubmissionReader>,

    /// Media recipient when a request names none
    pub admin_chat_id: Option<String>,

    /// Locale for requests without a language code
    pub default_locale: Locale,
}

impl AppState {
    pub fn new(notifier: Option<Arc<dyn Notifier>>, reader: Arc<dyn SubmissionReader>) -> Self {
        Self {
            notifier,
            reader,
            admin_chat_id: None,
            default_locale: Locale::default(),
        }
    }

    pub fn with_admin_chat_id(mut self, admin_chat_id: Option<String>) -> Self {
        self.admin_chat_id = admin_chat_id;
        self
    }

    pub fn with_default_locale(mut self, locale: Locale) -> Self {
        self.default_locale = locale;
        self
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(None, Arc::new(InMemoryService::new()))
    }
}
