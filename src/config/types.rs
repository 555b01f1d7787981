/// Core types and structures for the gradebox system
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Grader output captured inside the sandbox and copied back on every attempt.
pub const RESULTS_FILE: &str = "autograder_results.txt";
/// Append-only JSON array of every summary ever recorded.
pub const HISTORY_FILE: &str = "autograder_history.json";
/// Snapshot of the remote submission written by the download step.
pub const SUBMISSION_FILE: &str = "submission.json";
/// Current grading state, separate from the audit history.
pub const SUMMARY_FILE: &str = "autograder_summary.json";

/// Suffix appended to a student id to name that student's sandbox directory.
pub const SANDBOX_SUFFIX: &str = "_tmp";
/// Sentinel stored as `graded_version` when there was no submission timestamp to copy.
pub const NOT_GRADED: &str = "N/A";

pub const DEFAULT_HOME_TOKEN: &str = "{home}";
pub const DEFAULT_FORCE_FLAG: &str = "--force";

/// Sandbox directory name for a student.
pub fn sandbox_dir_name(student: &str) -> String {
    format!("{}{}", student, SANDBOX_SUFFIX)
}

/// Strip the sandbox suffix from an identifier the grader derived from its working directory.
pub fn strip_sandbox_suffix(login_id: &str) -> &str {
    login_id.strip_suffix(SANDBOX_SUFFIX).unwrap_or(login_id)
}

/// Per-student grading configuration shared by every sandbox in a run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GradeConfig {
    /// Root containing `<student>/<assignment>/` directories
    pub submissions_dir: PathBuf,
    /// Assignment subdirectory name
    pub assignment: String,
    /// Autograder command string, run through `sh -c` inside the sandbox
    pub command: String,
    /// Grade even when the recorded graded version is current
    pub force: bool,
    /// Create a missing assignment directory instead of reporting no submission
    pub create_missing: bool,
    /// Kill the autograder after this long (no limit when unset)
    pub timeout: Option<Duration>,
    /// Token in `command` replaced by the invoking user's home directory
    pub home_token: String,
    /// Flag appended to `command` when forcing
    pub force_flag: String,
}

impl GradeConfig {
    pub fn new(submissions_dir: PathBuf, assignment: &str, command: &str) -> Self {
        Self {
            submissions_dir,
            assignment: assignment.to_string(),
            command: command.to_string(),
            force: false,
            create_missing: false,
            timeout: None,
            home_token: DEFAULT_HOME_TOKEN.to_string(),
            force_flag: DEFAULT_FORCE_FLAG.to_string(),
        }
    }

    /// Permanent assignment directory for a student
    pub fn assignment_dir(&self, student: &str) -> PathBuf {
        self.submissions_dir.join(student).join(&self.assignment)
    }

    /// Sandbox root for a student (sibling of the student's own directory)
    pub fn sandbox_root(&self, student: &str) -> PathBuf {
        self.submissions_dir.join(sandbox_dir_name(student))
    }
}

/// Roll-up configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RollupConfig {
    pub submissions_dir: PathBuf,
    pub assignment: String,
    /// Upload grades for students whose graded version is newer than the uploaded one
    pub upload: bool,
    /// Shell template used to push one grade (see `rollup::CommandUploader`)
    pub upload_command: Option<String>,
    /// Destination of the aggregate grade export
    pub grades_csv: PathBuf,
}

impl RollupConfig {
    pub fn new(submissions_dir: PathBuf, assignment: &str) -> Self {
        let grades_csv = default_grades_csv(&submissions_dir, assignment);
        Self {
            submissions_dir,
            assignment: assignment.to_string(),
            upload: false,
            upload_command: None,
            grades_csv,
        }
    }

    pub fn assignment_dir(&self, student: &str) -> PathBuf {
        self.submissions_dir.join(student).join(&self.assignment)
    }
}

/// `<submissions_dir>/../<assignment>_grades.csv`
pub fn default_grades_csv(submissions_dir: &Path, assignment: &str) -> PathBuf {
    submissions_dir
        .join("..")
        .join(format!("{}_grades.csv", assignment))
}

/// Error types for gradebox operations
#[derive(Error, Debug)]
pub enum GradeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Timestamp error: {0}")]
    Timestamp(String),

    #[error("Sandbox error: {0}")]
    Sandbox(String),

    #[error("Command error: {0}")]
    Command(String),

    #[error("Upload error: {0}")]
    Upload(String),
}

pub type Result<T> = std::result::Result<T, GradeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sandbox_suffix_round_trip() {
        assert_eq!(sandbox_dir_name("abc123"), "abc123_tmp");
        assert_eq!(strip_sandbox_suffix("abc123_tmp"), "abc123");
        assert_eq!(strip_sandbox_suffix("xyz789"), "xyz789");
    }

    #[test]
    fn test_paths() {
        let config = GradeConfig::new(PathBuf::from("/subs"), "proj4", "make grade");
        assert_eq!(config.assignment_dir("abc123"), PathBuf::from("/subs/abc123/proj4"));
        assert_eq!(config.sandbox_root("abc123"), PathBuf::from("/subs/abc123_tmp"));

        let rollup = RollupConfig::new(PathBuf::from("/subs"), "proj4");
        assert_eq!(rollup.grades_csv, PathBuf::from("/subs/../proj4_grades.csv"));
    }
}
