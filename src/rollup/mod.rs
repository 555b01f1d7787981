//! Roll-up: aggregate export and grade upload
//!
//! Walks every student directory, reads the current summary, exports one CSV
//! row per team member and, when an uploader is given, uploads each member's
//! grade that is newer than what was last uploaded for them. Uploads are
//! serial; the run-scoped `UploadCache` is threaded through the loop.

pub mod export;

pub use export::{write_grades_csv, GradeRow};

use crate::config::types::{GradeError, Result, RollupConfig};
use crate::decision::{reconcile_from_cache, record_upload, should_upload, UploadCache};
use crate::fanout::list_students;
use crate::observability::audit::{self, AuditEvent, AuditEventType};
use crate::store::{load_current_summary, persist_summary, AssignmentFiles, GradingSummary};
use export::format_points;
use log::{debug, info, warn};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

/// One grade to push to the grading platform
#[derive(Clone, Debug, PartialEq)]
pub struct UploadRequest<'a> {
    pub student: &'a str,
    pub assignment: &'a str,
    /// Percentage for the gradebook, e.g. `87.0%` (`N/A` without points possible)
    pub grade: String,
    /// Raw points received, e.g. `87`
    pub points: String,
    /// Results artifact, attached as the grading comment
    pub results_path: &'a Path,
}

pub trait Uploader {
    fn upload(&self, request: &UploadRequest<'_>) -> Result<()>;
}

/// Uploads by running a shell command template.
///
/// `{student}`, `{assignment}`, `{grade}`, `{points}` and `{results}` are
/// replaced by shell-quoted values. `{grade}` is the percentage string and
/// `{points}` the raw points received. Exit status 0 means the upload succeeded.
#[derive(Clone, Debug)]
pub struct CommandUploader {
    template: String,
}

impl CommandUploader {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn command_line(&self, request: &UploadRequest<'_>) -> String {
        self.template
            .replace("{student}", &shell_quote(request.student))
            .replace("{assignment}", &shell_quote(request.assignment))
            .replace("{grade}", &shell_quote(&request.grade))
            .replace("{points}", &shell_quote(&request.points))
            .replace(
                "{results}",
                &shell_quote(&request.results_path.to_string_lossy()),
            )
    }
}

impl Uploader for CommandUploader {
    fn upload(&self, request: &UploadRequest<'_>) -> Result<()> {
        let line = self.command_line(request);
        debug!("Uploading: {}", line);
        let output = Command::new("sh")
            .arg("-c")
            .arg(&line)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| GradeError::Upload(format!("Failed to start `{}`: {}", line, e)))?;

        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(GradeError::Upload(format!(
            "upload for {} exited with {}: {}",
            request.student,
            output.status,
            stderr.trim()
        )))
    }
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// One upload attempt, in the order it was made
#[derive(Clone, Debug, PartialEq)]
pub struct UploadAttempt {
    pub student: String,
    pub grade: String,
    /// `None` when the upload succeeded
    pub error: Option<String>,
}

impl UploadAttempt {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

impl fmt::Display for UploadAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error {
            None => write!(f, "{}: uploaded {}", self.student, self.grade),
            Some(e) => write!(f, "{}: upload of {} failed: {}", self.student, self.grade, e),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RollupReport {
    pub rows: usize,
    pub uploads: Vec<UploadAttempt>,
    pub uploaded: usize,
    pub already_uploaded: usize,
    pub upload_failed: usize,
    pub skipped_directories: usize,
    pub grades_csv: PathBuf,
    pub elapsed: Duration,
}

impl fmt::Display for RollupReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} rows written to {}; uploaded {}, already uploaded {}, upload failed {}, skipped directories {} ({:.1}s)",
            self.rows,
            self.grades_csv.display(),
            self.uploaded,
            self.already_uploaded,
            self.upload_failed,
            self.skipped_directories,
            self.elapsed.as_secs_f64()
        )
    }
}

/// Export every current summary and, with an uploader, upload stale grades.
pub fn run_rollup(config: &RollupConfig, uploader: Option<&dyn Uploader>) -> Result<RollupReport> {
    let started = Instant::now();
    let mut report = RollupReport {
        grades_csv: config.grades_csv.clone(),
        ..Default::default()
    };
    let mut cache = UploadCache::new();
    let mut rows = Vec::new();

    for student in list_students(&config.submissions_dir)? {
        let files = AssignmentFiles::new(config.assignment_dir(&student));
        let Some(mut summary) = current_summary(&student, &files) else {
            report.skipped_directories += 1;
            continue;
        };

        if let Some(uploader) = uploader {
            let changed =
                upload_team(config, uploader, &files, &mut summary, &mut cache, &mut report);
            if changed {
                if let Err(e) = persist_summary(&files.results(), &summary) {
                    warn!("{}: failed to record upload state: {}", student, e);
                }
            }
        }

        for member in &summary.team_login_ids {
            rows.push(GradeRow::new(member, &summary));
        }
    }

    report.rows = rows.len();
    write_grades_csv(&config.grades_csv, &rows)?;
    report.elapsed = started.elapsed();
    info!("{}", report);
    audit::record(
        AuditEvent::new(AuditEventType::RollupSummary, report.to_string())
            .with_assignment(&config.assignment),
    );
    Ok(report)
}

fn current_summary(student: &str, files: &AssignmentFiles) -> Option<GradingSummary> {
    if !files.dir().is_dir() {
        debug!("{}: no assignment directory", student);
        return None;
    }
    match load_current_summary(&files.results()) {
        Ok(Some(summary)) => Some(summary),
        Ok(None) => {
            debug!("{}: not graded yet", student);
            None
        }
        Err(e) => {
            warn!("{}: skipping unreadable summary: {}", student, e);
            None
        }
    }
}

/// Upload each team member's grade from one directory's summary.
/// Returns true when the summary's upload state changed.
fn upload_team(
    config: &RollupConfig,
    uploader: &dyn Uploader,
    files: &AssignmentFiles,
    summary: &mut GradingSummary,
    cache: &mut UploadCache,
    report: &mut RollupReport,
) -> bool {
    let mut changed = false;
    let results_path = files.results();

    for member in summary.team_login_ids.clone() {
        if !should_upload(&member, summary, cache) {
            report.already_uploaded += 1;
            changed |= reconcile_from_cache(&member, summary, cache);
            audit::record(
                AuditEvent::new(AuditEventType::UploadSkipped, "already uploaded")
                    .with_student(&member)
                    .with_assignment(&config.assignment),
            );
            continue;
        }

        let request = UploadRequest {
            student: &member,
            assignment: &config.assignment,
            grade: summary.percent_as_string(),
            points: format_points(summary.points_received),
            results_path: &results_path,
        };
        let result = uploader.upload(&request);
        report.uploads.push(UploadAttempt {
            student: member.clone(),
            grade: request.grade.clone(),
            error: result.as_ref().err().map(ToString::to_string),
        });
        match result {
            Ok(()) => {
                report.uploaded += 1;
                if record_upload(&member, summary, cache) {
                    changed = true;
                } else {
                    warn!(
                        "{}: uploaded a grade with no graded version; it will be uploaded again",
                        member
                    );
                }
                audit::record(
                    AuditEvent::new(
                        AuditEventType::UploadSuccess,
                        format!("uploaded {}", request.grade),
                    )
                    .with_student(&member)
                    .with_assignment(&config.assignment),
                );
            }
            Err(e) => {
                report.upload_failed += 1;
                warn!("{}: upload failed: {}", member, e);
                audit::record(
                    AuditEvent::new(AuditEventType::UploadFailure, e.to_string())
                        .with_student(&member)
                        .with_assignment(&config.assignment),
                );
            }
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::fs;

    #[derive(Default)]
    struct RecordingUploader {
        calls: RefCell<Vec<(String, String)>>,
        fail_for: Option<&'static str>,
    }

    impl Uploader for RecordingUploader {
        fn upload(&self, request: &UploadRequest<'_>) -> Result<()> {
            if self.fail_for == Some(request.student) {
                return Err(GradeError::Upload("gradebook refused".to_string()));
            }
            self.calls
                .borrow_mut()
                .push((request.student.to_string(), request.grade.clone()));
            Ok(())
        }
    }

    fn seed(root: &Path, student: &str, summary: &str) -> AssignmentFiles {
        let files = AssignmentFiles::new(root.join(student).join("proj4"));
        fs::create_dir_all(files.dir()).unwrap();
        fs::write(files.results(), format!("grader output\n{}\n", summary)).unwrap();
        files
    }

    fn config(root: &Path) -> RollupConfig {
        let mut config = RollupConfig::new(root.join("submissions"), "proj4");
        config.grades_csv = root.join("proj4_grades.csv");
        fs::create_dir_all(&config.submissions_dir).unwrap();
        config
    }

    const TEAM: &str = r#"{"points_possible": 100, "points_received": 87, "team_login_ids": ["abc123", "xyz789"], "submitter_login_id": "abc123", "graded_version": "2016-02-01T12:00:00Z"}"#;

    #[test]
    fn test_failed_upload_is_retried_next_run() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        seed(&config.submissions_dir, "abc123", TEAM);

        let uploader = RecordingUploader {
            fail_for: Some("xyz789"),
            ..Default::default()
        };
        let report = run_rollup(&config, Some(&uploader)).unwrap();
        assert_eq!(report.uploaded, 1);
        assert_eq!(report.upload_failed, 1);
        let lines: Vec<String> = report.uploads.iter().map(ToString::to_string).collect();
        assert_eq!(
            lines,
            [
                "abc123: uploaded 87.0%",
                "xyz789: upload of 87.0% failed: Upload error: gradebook refused",
            ]
        );
        assert!(report.uploads[0].succeeded());

        let uploader = RecordingUploader::default();
        let report = run_rollup(&config, Some(&uploader)).unwrap();
        assert_eq!(report.uploaded, 1);
        assert_eq!(report.already_uploaded, 1);
        assert_eq!(
            uploader.calls.into_inner(),
            vec![("xyz789".to_string(), "87.0%".to_string())]
        );
    }

    #[test]
    fn test_export_without_upload_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let files = seed(&config.submissions_dir, "abc123", TEAM);
        fs::create_dir_all(config.submissions_dir.join("nobody")).unwrap();

        let before = fs::read_to_string(files.results()).unwrap();
        let report = run_rollup(&config, None).unwrap();
        assert_eq!(report.rows, 2);
        assert_eq!(report.skipped_directories, 1);
        assert_eq!(report.uploaded, 0);
        assert_eq!(fs::read_to_string(files.results()).unwrap(), before);
        assert!(!files.summary().exists());

        let csv = fs::read_to_string(&config.grades_csv).unwrap();
        assert_eq!(csv.lines().count(), 3);
    }

    #[test]
    fn test_corrupt_summary_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        seed(&config.submissions_dir, "abc123", "Traceback (most recent call last)");
        let report = run_rollup(&config, Some(&RecordingUploader::default())).unwrap();
        assert_eq!(report.skipped_directories, 1);
        assert_eq!(report.rows, 0);
    }

    #[test]
    fn test_command_uploader() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("uploads.log");
        let uploader = CommandUploader::new(format!(
            "echo {{student}} {{assignment}} {{grade}} {{points}} >> {}",
            log.display()
        ));
        let results = dir.path().join("it's results.txt");
        let request = UploadRequest {
            student: "abc123",
            assignment: "proj4",
            grade: "87.0%".to_string(),
            points: "87".to_string(),
            results_path: &results,
        };
        uploader.upload(&request).unwrap();
        assert_eq!(fs::read_to_string(&log).unwrap(), "abc123 proj4 87.0% 87\n");

        assert!(CommandUploader::new("echo {results}")
            .command_line(&request)
            .ends_with(r"'\''s results.txt'"));
        assert!(CommandUploader::new("exit 3").upload(&request).is_err());
    }
}
