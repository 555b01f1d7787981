/// Grading decision: is the recorded grade stale relative to the submission?
///
/// Pure read of the submission record and the current summary; acting on the
/// decision is the caller's job.
use crate::store::artifacts::{load_current_summary, read_submission_record};
use crate::timestamp::Timestamp;
use log::warn;
use serde::Serialize;
use std::cmp::Ordering;
use std::path::Path;

/// Why a submission has to be (re)graded
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum StaleReason {
    NoSubmissionRecord,
    UnreadableSubmissionRecord,
    NoResults,
    CorruptSummary,
    NotGraded,
    NoSubmissionTime,
    NewerSubmission,
    UnreadableTimestamp,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum GradeDecision {
    MustGrade(StaleReason),
    AlreadyGraded,
    Forced,
}

/// Decision plus the two watermarks it was based on
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GradeCheck {
    pub decision: GradeDecision,
    /// Graded version recorded in the current summary
    pub graded_version: Option<Timestamp>,
    /// Submission time from the submission record
    pub submitted_at: Option<Timestamp>,
}

impl GradeCheck {
    pub fn needs_grading(&self) -> bool {
        !matches!(self.decision, GradeDecision::AlreadyGraded)
    }
}

/// Decide whether the submission at `submission_record` needs grading given
/// the results at `results`. `force` overrides every other outcome.
pub fn should_grade(submission_record: &Path, results: &Path, force: bool) -> GradeCheck {
    let mut check = evaluate(submission_record, results);
    if force {
        check.decision = GradeDecision::Forced;
    }
    check
}

fn must(
    reason: StaleReason,
    graded_version: Option<Timestamp>,
    submitted_at: Option<Timestamp>,
) -> GradeCheck {
    GradeCheck {
        decision: GradeDecision::MustGrade(reason),
        graded_version,
        submitted_at,
    }
}

fn evaluate(submission_record: &Path, results: &Path) -> GradeCheck {
    let submitted_at = match read_submission_record(submission_record) {
        Ok(Some(record)) => record.submitted_at,
        Ok(None) => return must(StaleReason::NoSubmissionRecord, None, None),
        Err(e) => {
            warn!(
                "Unreadable submission record {}: {}",
                submission_record.display(),
                e
            );
            return must(StaleReason::UnreadableSubmissionRecord, None, None);
        }
    };

    if !results.exists() {
        return must(StaleReason::NoResults, None, submitted_at);
    }

    let summary = match load_current_summary(results) {
        Ok(Some(summary)) => summary,
        Ok(None) => return must(StaleReason::CorruptSummary, None, submitted_at),
        Err(e) => {
            warn!("Treating {} as never graded: {}", results.display(), e);
            return must(StaleReason::CorruptSummary, None, submitted_at);
        }
    };

    let Some(graded) = summary.graded_version else {
        return must(StaleReason::NotGraded, None, submitted_at);
    };
    let Some(submitted) = submitted_at else {
        return must(StaleReason::NoSubmissionTime, Some(graded), None);
    };

    match graded.chrono_cmp(&submitted) {
        Ok(Ordering::Less) => must(StaleReason::NewerSubmission, Some(graded), Some(submitted)),
        Ok(_) => GradeCheck {
            decision: GradeDecision::AlreadyGraded,
            graded_version: Some(graded),
            submitted_at: Some(submitted),
        },
        Err(e) => {
            warn!("Cannot order graded version against submission: {}", e);
            must(StaleReason::UnreadableTimestamp, Some(graded), Some(submitted))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::AssignmentFiles;
    use std::fs;

    const SUBMITTED: &str = "2016-02-01T12:00:00Z";

    fn setup(submitted_at: Option<&str>, results_line: Option<&str>) -> (tempfile::TempDir, AssignmentFiles) {
        let dir = tempfile::tempdir().unwrap();
        let files = AssignmentFiles::new(dir.path());
        if let Some(ts) = submitted_at {
            fs::write(files.submission(), format!(r#"{{"submitted_at": "{}"}}"#, ts)).unwrap();
        }
        if let Some(line) = results_line {
            fs::write(files.results(), format!("grader chatter\n{}\n", line)).unwrap();
        }
        (dir, files)
    }

    fn graded_line(version: &str) -> String {
        format!(
            r#"{{"points_possible": 100, "points_received": 87, "team_login_ids": ["abc123"], "graded_version": "{}"}}"#,
            version
        )
    }

    fn decide(files: &AssignmentFiles) -> GradeCheck {
        should_grade(&files.submission(), &files.results(), false)
    }

    #[test]
    fn test_no_submission_record() {
        let (_dir, files) = setup(None, Some(&graded_line(SUBMITTED)));
        assert_eq!(
            decide(&files).decision,
            GradeDecision::MustGrade(StaleReason::NoSubmissionRecord)
        );
    }

    #[test]
    fn test_no_results_regardless_of_record() {
        let (_dir, files) = setup(Some(SUBMITTED), None);
        let check = decide(&files);
        assert_eq!(check.decision, GradeDecision::MustGrade(StaleReason::NoResults));
        assert_eq!(check.submitted_at, Some(Timestamp::new(SUBMITTED)));
    }

    #[test]
    fn test_corrupt_last_line() {
        let (_dir, files) = setup(Some(SUBMITTED), Some("Traceback (most recent call last):"));
        assert_eq!(
            decide(&files).decision,
            GradeDecision::MustGrade(StaleReason::CorruptSummary)
        );
    }

    #[test]
    fn test_missing_and_sentinel_graded_version() {
        let (_dir, files) = setup(
            Some(SUBMITTED),
            Some(r#"{"points_possible": 100, "points_received": 87, "team_login_ids": ["abc123"]}"#),
        );
        assert_eq!(decide(&files).decision, GradeDecision::MustGrade(StaleReason::NotGraded));

        let (_dir, files) = setup(Some(SUBMITTED), Some(&graded_line("N/A")));
        assert_eq!(decide(&files).decision, GradeDecision::MustGrade(StaleReason::NotGraded));
    }

    #[test]
    fn test_equal_versions_are_already_graded() {
        let (_dir, files) = setup(Some(SUBMITTED), Some(&graded_line(SUBMITTED)));
        let check = decide(&files);
        assert_eq!(check.decision, GradeDecision::AlreadyGraded);
        assert!(!check.needs_grading());
    }

    #[test]
    fn test_zulu_vs_utc_token_is_already_graded() {
        let (_dir, files) = setup(Some(SUBMITTED), Some(&graded_line("2016-02-01T12:00:00UTC")));
        assert_eq!(decide(&files).decision, GradeDecision::AlreadyGraded);
    }

    #[test]
    fn test_older_graded_version_must_grade() {
        let (_dir, files) = setup(Some(SUBMITTED), Some(&graded_line("2016-02-01T11:59:59Z")));
        assert_eq!(
            decide(&files).decision,
            GradeDecision::MustGrade(StaleReason::NewerSubmission)
        );
    }

    #[test]
    fn test_newer_graded_version_is_already_graded() {
        let (_dir, files) = setup(Some(SUBMITTED), Some(&graded_line("2016-03-01T00:00:00Z")));
        assert_eq!(decide(&files).decision, GradeDecision::AlreadyGraded);
    }

    #[test]
    fn test_force_overrides() {
        let (_dir, files) = setup(Some(SUBMITTED), Some(&graded_line(SUBMITTED)));
        let check = should_grade(&files.submission(), &files.results(), true);
        assert_eq!(check.decision, GradeDecision::Forced);
        assert_eq!(check.graded_version, Some(Timestamp::new(SUBMITTED)));
        assert!(check.needs_grading());
    }

    #[test]
    fn test_record_without_submission_time() {
        let (_dir, files) = setup(None, Some(&graded_line(SUBMITTED)));
        fs::write(files.submission(), r#"{"submitted_at": null}"#).unwrap();
        assert_eq!(
            decide(&files).decision,
            GradeDecision::MustGrade(StaleReason::NoSubmissionTime)
        );
    }

    #[test]
    fn test_unparseable_graded_version() {
        let (_dir, files) = setup(Some(SUBMITTED), Some(&graded_line("last tuesday")));
        assert_eq!(
            decide(&files).decision,
            GradeDecision::MustGrade(StaleReason::UnreadableTimestamp)
        );
    }
}
