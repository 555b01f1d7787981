//! Staleness decisions
//!
//! Both engines compare timestamps recorded on disk and never write anything
//! themselves; callers act on the answer.

pub mod grade;
pub mod upload;

pub use grade::{should_grade, GradeCheck, GradeDecision, StaleReason};
pub use upload::{reconcile_from_cache, record_upload, should_upload, UploadCache};
