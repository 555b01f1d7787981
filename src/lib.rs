//! gradebox: incremental, sandboxed autograding and grade upload
//!
//! Grades each student's submission in a throwaway copy of their assignment
//! directory, skips work that is already current, and uploads only grades
//! newer than what was last uploaded for each team member.
//!
//! # Architecture
//!
//! ## State ([`store`], [`timestamp`])
//! - [`timestamp`]: Zulu/UTC normalization and chronological comparison
//! - [`store::summary`]: typed `GradingSummary` and `SubmissionRecord`
//! - [`store::artifacts`]: results artifact, state file, and append-only history
//!
//! ## Decisions ([`decision`])
//! - [`decision::grade`]: must-grade / already-graded / forced
//! - [`decision::upload`]: per team member upload staleness with a run-scoped cache
//!
//! ## Execution ([`sandbox`], [`fanout`])
//! - [`sandbox::workspace`]: `<student>_tmp` isolation, released on every path
//! - [`sandbox::command`]: external grader invocation with optional timeout
//! - [`sandbox::executor`]: per-student state machine producing a status code
//! - [`fanout`]: one task per student, status codes aggregated into buckets
//!
//! ## Outcomes ([`verdict`], [`rollup`])
//! - [`verdict::outcome`]: terminal outcomes, status codes, and buckets
//! - [`rollup`]: grades CSV export and serial uploads
//!
//! ## Ambient ([`config`], [`observability`], [`cli`])
//! - [`config`]: shared types and errors, JSON file defaults, validation
//! - [`observability::audit`]: JSON-lines audit log of every outcome
//! - [`cli`]: `grade`, `grade-all`, `record`, `clean-sandboxes`
//!
//! # Design Principles
//!
//! 1. **Failures stay per student** - every error becomes a status code at the executor boundary
//! 2. **Cleanup on all paths** - a sandbox never outlives its grading attempt
//! 3. **Re-runs are cheap** - graded and uploaded versions are watermarks, not flags
//! 4. **History is for audit** - current state lives in its own file

// State
pub mod store;
pub mod timestamp;

// Decisions
pub mod decision;

// Execution
pub mod fanout;
pub mod sandbox;

// Outcomes
pub mod rollup;
pub mod verdict;

// Configuration
pub mod config;

// Observability
pub mod observability;

// CLI entrypoint wiring for the gradebox binary
pub mod cli;

pub use config::types::{GradeConfig, GradeError, Result, RollupConfig};
pub use verdict::{GradeOutcome, StatusBucket};
