// Startup validation
// Assembled configs are checked before any sandbox is created; errors are fatal,
// warnings are logged and the run continues.

use crate::config::types::{GradeConfig, GradeError, Result, RollupConfig, SANDBOX_SUFFIX};
use log::warn;
use std::path::{Component, Path};

/// Validation result with detailed errors
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, error: String) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Log warnings, and turn errors into a single config error.
    pub fn into_result(self) -> Result<Vec<String>> {
        for warning in &self.warnings {
            warn!("{}", warning);
        }
        if !self.is_valid() {
            return Err(GradeError::Config(format!(
                "Config validation failed:\n{}",
                self.errors.join("\n")
            )));
        }
        Ok(self.warnings)
    }
}

/// Validate a grading config
pub fn validate_grade_config(config: &GradeConfig) -> ValidationResult {
    let mut result = ValidationResult::new();
    validate_location(&config.submissions_dir, &config.assignment, &mut result);

    if config.command.trim().is_empty() {
        result.add_error("autograder command cannot be empty".to_string());
    }
    if let Some(timeout) = config.timeout {
        if timeout.is_zero() {
            result.add_error("timeout cannot be zero".to_string());
        }
    }
    if config.force && config.force_flag.trim().is_empty() {
        result.add_warning("forcing with an empty force flag; the grader will not be told".to_string());
    }
    result
}

/// Validate a roll-up config
pub fn validate_rollup_config(config: &RollupConfig) -> ValidationResult {
    let mut result = ValidationResult::new();
    validate_location(&config.submissions_dir, &config.assignment, &mut result);

    if config.upload {
        match config.upload_command.as_deref().map(str::trim) {
            None | Some("") => {
                result.add_error("--upload requires an upload command".to_string());
            }
            Some(_) => {}
        }
    } else if config.upload_command.is_some() {
        result.add_warning("upload command given without --upload; nothing will be uploaded".to_string());
    }

    match config.grades_csv.parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.exists() => {
            result.add_error(format!(
                "grades CSV parent directory does not exist: {:?}",
                parent
            ));
        }
        _ => {}
    }
    result
}

/// Validate a student id given on the command line
pub fn validate_student_id(student: &str) -> Result<()> {
    if !is_single_component(student) {
        return Err(GradeError::Config(format!(
            "student id must be a plain directory name: {:?}",
            student
        )));
    }
    if student.ends_with(SANDBOX_SUFFIX) {
        return Err(GradeError::Config(format!(
            "{:?} names a sandbox directory, not a student",
            student
        )));
    }
    Ok(())
}

fn validate_location(submissions_dir: &Path, assignment: &str, result: &mut ValidationResult) {
    if !submissions_dir.is_dir() {
        result.add_error(format!(
            "submissions directory does not exist: {:?}",
            submissions_dir
        ));
    }
    if !is_single_component(assignment) {
        result.add_error(format!(
            "assignment must be a single directory name: {:?}",
            assignment
        ));
    }
}

fn is_single_component(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}
