/// Terminal outcomes of a per-student grading attempt and their status codes
///
/// The status code is the only thing that crosses the fan-out boundary, so
/// the mapping here is the contract between a sandbox and the coordinator.
use crate::timestamp::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

pub const STATUS_GRADED: i32 = 0;
pub const STATUS_NO_SUBMISSION: i32 = 1;
pub const STATUS_OTHER: i32 = 2;
pub const STATUS_ALREADY_GRADED: i32 = 3;
pub const STATUS_FAILED: i32 = 4;

/// How one student's grading attempt ended
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum GradeOutcome {
    /// Graded and recorded
    Graded {
        graded_version: Option<Timestamp>,
        points_received: f64,
        points_possible: f64,
    },
    /// Recorded graded version is current; nothing ran
    AlreadyGraded { graded_version: Option<Timestamp> },
    /// No assignment directory and not configured to create one
    NoSubmission,
    /// The grader exited cleanly but its last line is not a summary
    CorruptSummary { details: String },
    /// The grader exited non-zero, died on a signal, or timed out
    CommandFailed {
        exit_code: Option<i32>,
        timed_out: bool,
    },
    /// A sandbox directory for this student already exists
    SandboxCollision { path: PathBuf },
    OtherError { details: String },
}

impl GradeOutcome {
    pub fn status_code(&self) -> i32 {
        match self {
            GradeOutcome::Graded { .. } => STATUS_GRADED,
            GradeOutcome::NoSubmission => STATUS_NO_SUBMISSION,
            GradeOutcome::CorruptSummary { .. } | GradeOutcome::OtherError { .. } => STATUS_OTHER,
            GradeOutcome::AlreadyGraded { .. } => STATUS_ALREADY_GRADED,
            GradeOutcome::CommandFailed { .. } | GradeOutcome::SandboxCollision { .. } => {
                STATUS_FAILED
            }
        }
    }

    pub fn is_failure(&self) -> bool {
        !matches!(
            self,
            GradeOutcome::Graded { .. } | GradeOutcome::AlreadyGraded { .. }
        )
    }
}

impl fmt::Display for GradeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GradeOutcome::Graded {
                graded_version,
                points_received,
                points_possible,
            } => write!(
                f,
                "graded {}/{} (version {})",
                points_received,
                points_possible,
                graded_version.as_ref().map(Timestamp::as_str).unwrap_or("N/A")
            ),
            GradeOutcome::AlreadyGraded { graded_version } => write!(
                f,
                "already graded (version {})",
                graded_version.as_ref().map(Timestamp::as_str).unwrap_or("N/A")
            ),
            GradeOutcome::NoSubmission => write!(f, "no submission found"),
            GradeOutcome::CorruptSummary { details } => {
                write!(f, "grader summary unreadable: {}", details)
            }
            GradeOutcome::CommandFailed {
                timed_out: true, ..
            } => write!(f, "grader timed out"),
            GradeOutcome::CommandFailed {
                exit_code: Some(code),
                ..
            } => write!(f, "grader exited with code {}", code),
            GradeOutcome::CommandFailed { exit_code: None, .. } => {
                write!(f, "grader terminated by signal")
            }
            GradeOutcome::SandboxCollision { path } => write!(
                f,
                "sandbox {} already exists (left over from an interrupted run?)",
                path.display()
            ),
            GradeOutcome::OtherError { details } => write!(f, "{}", details),
        }
    }
}

/// Aggregation buckets for fan-out reporting
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StatusBucket {
    Graded,
    NoSubmission,
    AlreadyGraded,
    Failed,
    Other,
    Unknown,
}

impl StatusBucket {
    pub const ALL: [StatusBucket; 6] = [
        StatusBucket::Graded,
        StatusBucket::NoSubmission,
        StatusBucket::AlreadyGraded,
        StatusBucket::Failed,
        StatusBucket::Other,
        StatusBucket::Unknown,
    ];

    /// Classify a child's exit code; `None` (killed by a signal, never started) is unknown.
    pub fn from_code(code: Option<i32>) -> Self {
        match code {
            Some(STATUS_GRADED) => StatusBucket::Graded,
            Some(STATUS_NO_SUBMISSION) => StatusBucket::NoSubmission,
            Some(STATUS_OTHER) => StatusBucket::Other,
            Some(STATUS_ALREADY_GRADED) => StatusBucket::AlreadyGraded,
            Some(STATUS_FAILED) => StatusBucket::Failed,
            _ => StatusBucket::Unknown,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            StatusBucket::Graded => "graded",
            StatusBucket::NoSubmission => "no submission",
            StatusBucket::AlreadyGraded => "already graded",
            StatusBucket::Failed => "failed",
            StatusBucket::Other => "other problem",
            StatusBucket::Unknown => "unknown status",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            GradeOutcome::Graded {
                graded_version: None,
                points_received: 1.0,
                points_possible: 1.0
            }
            .status_code(),
            0
        );
        assert_eq!(GradeOutcome::NoSubmission.status_code(), 1);
        assert_eq!(
            GradeOutcome::CorruptSummary { details: String::new() }.status_code(),
            2
        );
        assert_eq!(
            GradeOutcome::AlreadyGraded { graded_version: None }.status_code(),
            3
        );
        assert_eq!(
            GradeOutcome::CommandFailed {
                exit_code: Some(7),
                timed_out: false
            }
            .status_code(),
            4
        );
        assert_eq!(
            GradeOutcome::SandboxCollision { path: PathBuf::from("/x_tmp") }.status_code(),
            4
        );
    }

    #[test]
    fn test_every_code_round_trips_through_its_bucket() {
        for (code, bucket) in [
            (0, StatusBucket::Graded),
            (1, StatusBucket::NoSubmission),
            (2, StatusBucket::Other),
            (3, StatusBucket::AlreadyGraded),
            (4, StatusBucket::Failed),
        ] {
            assert_eq!(StatusBucket::from_code(Some(code)), bucket);
        }
        assert_eq!(StatusBucket::from_code(Some(5)), StatusBucket::Unknown);
        assert_eq!(StatusBucket::from_code(Some(-1)), StatusBucket::Unknown);
        assert_eq!(StatusBucket::from_code(None), StatusBucket::Unknown);
    }

    #[test]
    fn test_display_relays_exit_code() {
        let outcome = GradeOutcome::CommandFailed {
            exit_code: Some(42),
            timed_out: false,
        };
        assert_eq!(outcome.to_string(), "grader exited with code 42");
    }
}
