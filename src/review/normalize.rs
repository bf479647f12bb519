use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Subject key used when a row carries no recognizable subject id
pub const UNKNOWN_SUBJECT: &str = "unknown";

/// Status assumed when a row carries none
pub const DEFAULT_STATUS: &str = "partial";

/// A path into a row, e.g. `["meta", "video_url"]`
type FieldPath = &'static [&'static str];

/// Lookup order for each resolved field: canonical name, legacy aliases,
/// then the nested metadata fallback. New aliases go here and nowhere else.
const VIDEO_FIELDS: &[FieldPath] = &[&["video_url"], &["videoUrl"], &["meta", "video_url"]];

const DOCUMENT_FIELDS: &[FieldPath] = &[
    &["document_url"],
    &["documentUrl"],
    &["passport_url"],
    &["passportUrl"],
    &["meta", "document_url"],
    &["meta", "passport_url"],
];

const SUBJECT_FIELDS: &[FieldPath] = &[
    &["subject_id"],
    &["subject", "id"],
    &["telegram_user", "id"],
    &["user_id"],
    &["meta", "user_id"],
];

const STATUS_FIELDS: &[FieldPath] = &[&["status"], &["meta", "status"]];

/// A stored row with its resolved review fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRow {
    #[serde(rename = "_video")]
    pub video: Option<String>,
    #[serde(rename = "_document")]
    pub document: Option<String>,
    #[serde(rename = "_subjectId")]
    pub subject_id: String,
    #[serde(rename = "_status")]
    pub status: String,
    /// The row as stored
    pub row: Value,
}

fn lookup<'a>(row: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(row, |value, key| value.get(key))
}

/// First non-empty string among `paths`
fn first_string(row: &Value, paths: &[FieldPath]) -> Option<String> {
    paths.iter().find_map(|path| match lookup(row, path)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    })
}

/// First scalar among `paths`, stringified
fn first_scalar(row: &Value, paths: &[FieldPath]) -> Option<String> {
    paths.iter().find_map(|path| match lookup(row, path)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Resolve the review fields of a row
///
/// Total over any JSON value: non-objects and empty rows normalize to the
/// defaults.
pub fn normalize_row(row: &Value) -> NormalizedRow {
    NormalizedRow {
        video: first_string(row, VIDEO_FIELDS),
        document: first_string(row, DOCUMENT_FIELDS),
        subject_id: first_scalar(row, SUBJECT_FIELDS).unwrap_or_else(|| UNKNOWN_SUBJECT.to_string()),
        status: first_string(row, STATUS_FIELDS).unwrap_or_else(|| DEFAULT_STATUS.to_string()),
        row: row.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_fields() {
        let n = normalize_row(&json!({
            "subject_id": 42,
            "video_url": "v",
            "document_url": "d",
            "status": "submitted"
        }));
        assert_eq!(n.video.as_deref(), Some("v"));
        assert_eq!(n.document.as_deref(), Some("d"));
        assert_eq!(n.subject_id, "42");
        assert_eq!(n.status, "submitted");
    }

    #[test]
    fn test_canonical_wins_over_alias() {
        let n = normalize_row(&json!({ "video_url": "new", "videoUrl": "old" }));
        assert_eq!(n.video.as_deref(), Some("new"));
    }

    #[test]
    fn test_non_object_rows_get_defaults() {
        for row in [json!(null), json!(3), json!("x"), json!([]), json!({})] {
            let n = normalize_row(&row);
            assert_eq!(n.video, None);
            assert_eq!(n.document, None);
            assert_eq!(n.subject_id, UNKNOWN_SUBJECT);
            assert_eq!(n.status, DEFAULT_STATUS);
        }
    }

    #[test]
    fn test_serialized_field_names() {
        let json = serde_json::to_value(normalize_row(&json!({}))).unwrap();
        assert!(json.get("_video").is_some());
        assert!(json.get("_document").is_some());
        assert_eq!(json["_subjectId"], "unknown");
        assert_eq!(json["_status"], "partial");
    }
}
