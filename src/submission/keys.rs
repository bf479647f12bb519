use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};

/// Builds session-scoped upload keys
///
/// Keys combine the subject id, the capture time and a per-session attempt
/// counter, so a retried upload never lands on an earlier object.
pub struct UploadKeys {
    subject: String,
    attempts: AtomicU64,
}

impl UploadKeys {
    pub fn new(subject_id: Option<i64>) -> Self {
        Self {
            subject: subject_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "u".to_string()),
            attempts: AtomicU64::new(0),
        }
    }

    pub fn next(&self, captured_at: DateTime<Utc>, content_type: &str) -> String {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        format!(
            "public/{}_{}_{}.{}",
            self.subject,
            captured_at.timestamp_millis(),
            attempt,
            extension_for(content_type)
        )
    }
}

pub fn extension_for(content_type: &str) -> &'static str {
    let base = content_type.split(';').next().unwrap_or("").trim();
    match base {
        "video/webm" => "webm",
        "video/mp4" => "mp4",
        "image/png" => "png",
        "image/jpeg" => "jpg",
        _ => "bin",
    }
}
