/// Persistent audit log for grading and upload outcomes
/// Every terminal outcome of a batch run is appended here as one JSON line so
/// the run can be reconstructed after the fact.
use crate::config::types::{GradeError, Result};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use std::time::SystemTime;
use uuid::Uuid;

/// Audit event severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// Types of events recorded in the audit log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditEventType {
    GradeStart,
    GradeOutcome,
    SandboxCleanup,
    SandboxCleanupFailure,
    StaleSandboxRemoved,
    FanoutSummary,
    UploadSuccess,
    UploadSkipped,
    UploadFailure,
    RollupSummary,
}

impl AuditEventType {
    pub fn default_severity(&self) -> Severity {
        match self {
            AuditEventType::SandboxCleanupFailure | AuditEventType::UploadFailure => {
                Severity::Error
            }
            AuditEventType::StaleSandboxRemoved => Severity::Warning,
            _ => Severity::Info,
        }
    }
}

/// One audit record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_type: AuditEventType,
    pub severity: Severity,
    pub timestamp: SystemTime,
    pub details: String,
    pub student: Option<String>,
    pub assignment: Option<String>,
    pub status_code: Option<i32>,
}

impl AuditEvent {
    pub fn new(event_type: AuditEventType, details: impl Into<String>) -> Self {
        Self {
            severity: event_type.default_severity(),
            event_type,
            timestamp: SystemTime::now(),
            details: details.into(),
            student: None,
            assignment: None,
            status_code: None,
        }
    }

    pub fn with_student(mut self, student: &str) -> Self {
        self.student = Some(student.to_string());
        self
    }

    pub fn with_assignment(mut self, assignment: &str) -> Self {
        self.assignment = Some(assignment.to_string());
        self
    }

    pub fn with_status_code(mut self, code: i32) -> Self {
        self.status_code = Some(code);
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }
}

/// Appends audit events to a JSON-lines file and mirrors them to `log`
pub struct AuditLogger {
    file: Mutex<File>,
    path: PathBuf,
    run_id: String,
}

impl AuditLogger {
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                GradeError::Config(format!(
                    "Failed to create audit log directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| {
                GradeError::Config(format!(
                    "Failed to open audit log {}: {}",
                    path.display(),
                    e
                ))
            })?;

        Ok(Self {
            file: Mutex::new(file),
            path: path.to_path_buf(),
            run_id: Uuid::new_v4().to_string(),
        })
    }

    /// Share a run id with a parent process so its children's events correlate.
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn record(&self, event: &AuditEvent) {
        let entry = serde_json::json!({
            "timestamp": event.timestamp
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            "event_type": event.event_type,
            "severity": event.severity,
            "details": event.details,
            "student": event.student,
            "assignment": event.assignment,
            "status_code": event.status_code,
            "process_id": std::process::id(),
            "run_id": self.run_id,
        });

        emit_to_log(event);

        match self.file.lock() {
            Ok(mut file) => {
                if let Err(e) = writeln!(file, "{}", entry) {
                    error!("Failed to write audit log {}: {}", self.path.display(), e);
                }
                if let Err(e) = file.flush() {
                    error!("Failed to flush audit log {}: {}", self.path.display(), e);
                }
            }
            Err(_) => error!("Audit log lock poisoned"),
        }
    }
}

fn emit_to_log(event: &AuditEvent) {
    let who = event.student.as_deref().unwrap_or("-");
    match event.severity {
        Severity::Error => error!("{:?} [{}]: {}", event.event_type, who, event.details),
        Severity::Warning => warn!("{:?} [{}]: {}", event.event_type, who, event.details),
        Severity::Info => info!("{:?} [{}]: {}", event.event_type, who, event.details),
    }
}

static AUDIT_LOGGER: OnceLock<AuditLogger> = OnceLock::new();

/// Initialize the process-wide audit log. A second call is ignored.
pub fn init_audit_log(path: &Path, run_id: Option<&str>) -> Result<()> {
    let mut logger = AuditLogger::new(path)?;
    if let Some(run_id) = run_id {
        logger = logger.with_run_id(run_id);
    }
    if AUDIT_LOGGER.set(logger).is_err() {
        warn!("Audit log already initialized; ignoring {}", path.display());
    }
    Ok(())
}

/// Run id of the process-wide audit log, once initialized
pub fn current_run_id() -> Option<&'static str> {
    AUDIT_LOGGER.get().map(AuditLogger::run_id)
}

/// Record an event; falls back to plain `log` output when no audit file is open.
pub fn record(event: AuditEvent) {
    match AUDIT_LOGGER.get() {
        Some(logger) => logger.record(&event),
        None => emit_to_log(&event),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_are_appended_as_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("autograder.log");
        let logger = AuditLogger::new(&path).unwrap();

        logger.record(
            &AuditEvent::new(AuditEventType::GradeOutcome, "graded")
                .with_student("abc123")
                .with_assignment("proj4")
                .with_status_code(0),
        );
        logger.record(&AuditEvent::new(AuditEventType::UploadFailure, "upload exited 4"));

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = contents
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["student"], "abc123");
        assert_eq!(lines[0]["status_code"], 0);
        assert_eq!(lines[0]["run_id"], logger.run_id());
        assert_eq!(lines[1]["severity"], "Error");
    }

    #[test]
    fn test_reopening_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("autograder.log");
        AuditLogger::new(&path)
            .unwrap()
            .record(&AuditEvent::new(AuditEventType::FanoutSummary, "first"));
        AuditLogger::new(&path)
            .unwrap()
            .record(&AuditEvent::new(AuditEventType::FanoutSummary, "second"));
        assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 2);
    }

    #[test]
    fn test_shared_run_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("autograder.log");
        let logger = AuditLogger::new(&path).unwrap().with_run_id("parent-run");
        logger.record(&AuditEvent::new(AuditEventType::GradeStart, "grading abc123"));
        let line: serde_json::Value =
            serde_json::from_str(std::fs::read_to_string(&path).unwrap().trim()).unwrap();
        assert_eq!(line["run_id"], "parent-run");
        assert_eq!(line["severity"], "Info");
    }
}
