//! Submission state store
//!
//! Per-student, per-assignment records: the remote submission snapshot, the
//! current grading summary, and the append-only grading history.

pub mod artifacts;
pub mod summary;

pub use artifacts::{
    append_history, load_current_summary, persist_summary, read_submission_record,
    AssignmentFiles,
};
pub use summary::{GradingSummary, SubmissionRecord};
