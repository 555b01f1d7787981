//! Sandboxed grading of a single student
//!
//! - `workspace`: isolated `<student>_tmp` copies and stale sandbox cleanup
//! - `command`: running the external grader with a timeout
//! - `executor`: the per-student state machine producing a `GradeOutcome`

pub mod command;
pub mod executor;
pub mod workspace;

pub use command::{CommandStatus, GraderCommand};
pub use executor::grade_student;
pub use workspace::{remove_stale_sandboxes, IsolationError, Sandbox};
