//! Read-only review surface over stored submissions
//!
//! Rows written by older front ends use different field names; everything
//! here goes through `normalize_row` so the feed sees one shape.

pub mod normalize;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use normalize::{normalize_row, NormalizedRow, DEFAULT_STATUS, UNKNOWN_SUBJECT};

/// All submissions of one subject
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectGroup {
    pub subject_id: String,
    pub rows: Vec<NormalizedRow>,
}

/// Normalize and group rows by subject
///
/// Groups appear in order of their first row and rows keep their input
/// order, so newest-first input yields newest-first groups.
pub fn group_by_subject(rows: &[Value]) -> Vec<SubjectGroup> {
    let mut groups: Vec<SubjectGroup> = Vec::new();

    for row in rows.iter().map(normalize_row) {
        match groups.iter_mut().find(|g| g.subject_id == row.subject_id) {
            Some(group) => group.rows.push(row),
            None => groups.push(SubjectGroup {
                subject_id: row.subject_id.clone(),
                rows: vec![row],
            }),
        }
    }

    groups
}
