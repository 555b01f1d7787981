/// Per-student sandbox executor
///
/// Stages: Start -> DirectoryCheck -> Isolate -> Decide -> {Run, Skip} -> Finalize.
/// Every failure is converted into a `GradeOutcome` here; nothing unwinds past
/// `grade_student`. The sandbox is removed before `grade_student` returns on
/// every path.
use crate::config::types::{GradeConfig, GradeError};
use crate::decision::grade::{should_grade, GradeCheck};
use crate::observability::audit::{self, AuditEvent, AuditEventType};
use crate::sandbox::command::GraderCommand;
use crate::sandbox::workspace::{IsolationError, Sandbox};
use crate::store::artifacts::{
    append_history, load_current_summary, persist_summary, read_last_line, rewrite_last_line,
};
use crate::store::{AssignmentFiles, GradingSummary};
use crate::timestamp::Timestamp;
use crate::verdict::GradeOutcome;
use log::{debug, info, warn};
use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

/// Executor stages, used for diagnostics
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Start,
    DirectoryCheck,
    Isolate,
    Decide,
    Run,
    Skip,
    Finalize,
}

fn enter(student: &str, stage: Stage) {
    debug!("{}: {:?}", student, stage);
}

/// Grade one student's submission for `config.assignment`.
pub fn grade_student(config: &GradeConfig, student: &str) -> GradeOutcome {
    enter(student, Stage::Start);
    audit::record(
        AuditEvent::new(AuditEventType::GradeStart, format!("grading {}", student))
            .with_student(student)
            .with_assignment(&config.assignment),
    );

    let outcome = run_stages(config, student);

    let event = AuditEvent::new(AuditEventType::GradeOutcome, outcome.to_string())
        .with_student(student)
        .with_assignment(&config.assignment)
        .with_status_code(outcome.status_code());
    audit::record(if outcome.is_failure() {
        event.with_severity(audit::Severity::Warning)
    } else {
        event
    });
    outcome
}

fn run_stages(config: &GradeConfig, student: &str) -> GradeOutcome {
    enter(student, Stage::DirectoryCheck);
    let assignment_dir = config.assignment_dir(student);
    if !assignment_dir.is_dir() {
        if !config.create_missing {
            return GradeOutcome::NoSubmission;
        }
        info!("Creating missing {}", assignment_dir.display());
        if let Err(e) = fs::create_dir_all(&assignment_dir) {
            return GradeOutcome::OtherError {
                details: format!("cannot create {}: {}", assignment_dir.display(), e),
            };
        }
    }

    enter(student, Stage::Isolate);
    let mut sandbox = match Sandbox::isolate(config, student) {
        Ok(sandbox) => sandbox,
        Err(IsolationError::Collision(path)) => return GradeOutcome::SandboxCollision { path },
        Err(IsolationError::Io(e)) => {
            return GradeOutcome::OtherError {
                details: format!("cannot isolate submission: {}", e),
            }
        }
    };

    let outcome = grade_in_sandbox(config, student, &assignment_dir, &sandbox);

    match sandbox.cleanup() {
        Ok(()) => audit::record(
            AuditEvent::new(
                AuditEventType::SandboxCleanup,
                format!("removed {}", sandbox.root().display()),
            )
            .with_student(student)
            .with_severity(audit::Severity::Info),
        ),
        Err(e) => audit::record(
            AuditEvent::new(AuditEventType::SandboxCleanupFailure, e.to_string())
                .with_student(student)
                .with_assignment(&config.assignment),
        ),
    }
    outcome
}

fn grade_in_sandbox(
    config: &GradeConfig,
    student: &str,
    assignment_dir: &Path,
    sandbox: &Sandbox,
) -> GradeOutcome {
    let permanent = AssignmentFiles::new(assignment_dir);
    let isolated = AssignmentFiles::new(sandbox.workdir());

    enter(student, Stage::Decide);
    let check = should_grade(&permanent.submission(), &permanent.results(), config.force);
    if !check.needs_grading() {
        enter(student, Stage::Skip);
        return GradeOutcome::AlreadyGraded {
            graded_version: check.graded_version,
        };
    }
    debug!("{}: {:?}", student, check.decision);

    enter(student, Stage::Run);
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let command = GraderCommand::build(
        &config.command,
        &config.home_token,
        home.as_deref(),
        config.force.then_some(config.force_flag.as_str()),
    );
    info!("{}: running `{}`", student, command.line());

    let status = match command.run(sandbox.workdir(), &isolated.results(), config.timeout) {
        Ok(status) => status,
        Err(e) => {
            return GradeOutcome::OtherError {
                details: e.to_string(),
            }
        }
    };
    debug!("{}: grader finished in {:?}", student, status.elapsed);

    if !status.success() {
        copy_back(&isolated.results(), &permanent.results());
        return GradeOutcome::CommandFailed {
            exit_code: status.exit_code,
            timed_out: status.timed_out,
        };
    }

    enter(student, Stage::Finalize);
    finalize(student, &check, &isolated, &permanent)
}

fn finalize(
    student: &str,
    check: &GradeCheck,
    isolated: &AssignmentFiles,
    permanent: &AssignmentFiles,
) -> GradeOutcome {
    let parsed = read_last_line(&isolated.results()).and_then(|line| match line {
        Some(line) => GradingSummary::from_line(&line),
        None => Err(GradeError::Command(
            "grader printed nothing".to_string(),
        )),
    });
    let mut summary = match parsed {
        Ok(summary) => summary,
        Err(e) => {
            copy_back(&isolated.results(), &permanent.results());
            return GradeOutcome::CorruptSummary {
                details: e.to_string(),
            };
        }
    };

    summary.normalize_ids(student);
    if moves_backwards(check) {
        warn!(
            "{}: graded version moves backwards from {} to {}",
            student,
            check.graded_version.as_ref().map(Timestamp::as_str).unwrap_or("N/A"),
            check.submitted_at.as_ref().map(Timestamp::as_str).unwrap_or("N/A")
        );
    }
    summary.graded_version = check.submitted_at.clone();
    if let Ok(Some(previous)) = load_current_summary(&permanent.results()) {
        keep_upload_watermarks(&previous, &mut summary);
    }

    let recorded = summary.to_line().and_then(|line| {
        rewrite_last_line(&isolated.results(), &line)?;
        fs::copy(isolated.results(), permanent.results())?;
        if isolated.submission().exists() {
            fs::copy(isolated.submission(), permanent.submission())?;
        }
        append_history(&permanent.history(), &summary)?;
        persist_summary(&permanent.results(), &summary)
    });

    match recorded {
        Ok(()) => GradeOutcome::Graded {
            graded_version: summary.graded_version,
            points_received: summary.points_received,
            points_possible: summary.points_possible,
        },
        Err(e) => GradeOutcome::OtherError {
            details: format!("graded but could not record results: {}", e),
        },
    }
}

/// Forced re-grades may record an older submission than the one already graded
/// (e.g. remote clock skew). That is allowed but worth a warning.
fn moves_backwards(check: &GradeCheck) -> bool {
    match (&check.graded_version, &check.submitted_at) {
        (Some(graded), Some(submitted)) => {
            matches!(graded.chrono_cmp(submitted), Ok(Ordering::Greater))
        }
        _ => false,
    }
}

/// Upload watermarks are carried over only while the grade is unchanged, so a
/// re-grade of the same version with different points is uploaded again.
fn keep_upload_watermarks(previous: &GradingSummary, summary: &mut GradingSummary) -> bool {
    if previous.points_received != summary.points_received
        || previous.points_possible != summary.points_possible
    {
        debug!("Grade changed, dropping upload watermarks");
        return false;
    }
    summary.uploaded_version = previous.uploaded_version.clone();
    true
}

fn copy_back(from: &Path, to: &Path) {
    if !from.exists() {
        return;
    }
    if let Err(e) = fs::copy(from, to) {
        warn!(
            "Failed to copy {} back to {}: {}",
            from.display(),
            to.display(),
            e
        );
    }
}
