//! Submission record, remote service seams and the session orchestrator

pub mod keys;
pub mod orchestrator;
pub mod record;
pub mod service;

pub use keys::{extension_for, UploadKeys};
pub use orchestrator::{Collaborators, Step, SubmissionConfig, SubmissionOrchestrator, UploadPhase};
pub use record::{
    NewSubmission, RecordId, RecordPatch, SubjectIdentity, SubmissionRecord, SubmissionStatus,
};
pub use service::{resolve_durable_url, MediaStorage, SubmissionReader, SubmissionStore};
