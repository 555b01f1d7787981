//! Grading outcomes
//!
//! Terminal states of a per-student attempt, the status codes they map to,
//! and the buckets the coordinator aggregates them into.

pub mod outcome;

pub use outcome::{GradeOutcome, StatusBucket};
