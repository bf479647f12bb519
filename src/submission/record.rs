use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::warn;

/// Identifier assigned by the remote service on insert
pub type RecordId = String;

/// Submission progress; only ever moves `Partial → Submitted`
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    #[default]
    Partial,
    Submitted,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Partial => "partial",
            SubmissionStatus::Submitted => "submitted",
        }
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity handed over by the host environment at session start
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectIdentity {
    pub id: i64,
    pub first_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_premium: Option<bool>,
}

impl SubjectIdentity {
    pub fn display_name(&self) -> String {
        match &self.last_name {
            Some(last) if !last.is_empty() => format!("{} {}", self.first_name, last),
            _ => self.first_name.clone(),
        }
    }
}

/// Fields sent with `createRecord`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSubmission {
    pub subject: SubjectIdentity,
    pub subject_id: i64,
    pub video_url: Option<String>,
    pub document_url: Option<String>,
    pub status: SubmissionStatus,
    pub meta: Value,
}

impl NewSubmission {
    /// A provisional record: no media yet, status `partial`
    pub fn provisional(subject: &SubjectIdentity, meta: Value) -> Self {
        Self {
            subject: subject.clone(),
            subject_id: subject.id,
            video_url: None,
            document_url: None,
            status: SubmissionStatus::Partial,
            meta,
        }
    }
}

/// Partial update sent with `updateRecord`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<SubmissionStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl RecordPatch {
    pub fn video(url: impl Into<String>) -> Self {
        Self {
            video_url: Some(url.into()),
            ..Self::default()
        }
    }

    /// Document reference and final status in one update
    pub fn document_submitted(url: impl Into<String>) -> Self {
        Self {
            document_url: Some(url.into()),
            status: Some(SubmissionStatus::Submitted),
            ..Self::default()
        }
    }

    pub fn metadata(meta: Value) -> Self {
        Self {
            meta: Some(meta),
            ..Self::default()
        }
    }
}

/// A stored submission as the remote service holds it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub id: RecordId,
    pub subject: SubjectIdentity,
    pub subject_id: i64,
    pub video_url: Option<String>,
    pub document_url: Option<String>,
    pub status: SubmissionStatus,
    pub meta: Value,
    pub created_at: DateTime<Utc>,
}

impl SubmissionRecord {
    pub fn from_new(id: RecordId, new: NewSubmission, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            subject: new.subject,
            subject_id: new.subject_id,
            video_url: new.video_url,
            document_url: new.document_url,
            status: new.status,
            meta: new.meta,
            created_at,
        }
    }

    /// Apply an update; a status regression is ignored
    pub fn apply(&mut self, patch: &RecordPatch) {
        if let Some(url) = &patch.video_url {
            self.video_url = Some(url.clone());
        }
        if let Some(url) = &patch.document_url {
            self.document_url = Some(url.clone());
        }
        if let Some(status) = patch.status {
            if status < self.status {
                warn!(
                    "Ignoring status regression {} -> {} on record {}",
                    self.status, status, self.id
                );
            } else {
                self.status = status;
            }
        }
        if let Some(meta) = &patch.meta {
            self.meta = meta.clone();
        }
    }
}
