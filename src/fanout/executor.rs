/// Per-student task executors used by the fan-out
///
/// The only thing a task reports back is its status code. `None` means the
/// task ended without one (killed by a signal, failed to start, panicked).
use crate::config::types::GradeConfig;
use crate::sandbox::executor::grade_student;
use crate::verdict::outcome::STATUS_OTHER;
use log::{debug, warn};
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::{Mutex, PoisonError};

pub trait StudentExecutor: Send + Sync {
    /// Grade one student and return its status code.
    fn execute(&self, student: &str) -> Option<i32>;
}

/// Grades each student in a child process: `<program> <args..> --student <id>`.
///
/// The child's exit code is the status code, so a crash in one grader run
/// cannot take the coordinator down with it.
#[derive(Clone, Debug)]
pub struct ProcessExecutor {
    program: PathBuf,
    args: Vec<OsString>,
}

impl ProcessExecutor {
    pub fn new(program: impl Into<PathBuf>, args: Vec<OsString>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Re-execute the running binary with `args`.
    pub fn current_exe(args: Vec<OsString>) -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?, args))
    }
}

impl StudentExecutor for ProcessExecutor {
    fn execute(&self, student: &str) -> Option<i32> {
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg("--student")
            .arg(student)
            .stdin(Stdio::null())
            .status();

        match status {
            Ok(status) => {
                debug!("{}: child exited with {}", student, status);
                status.code()
            }
            Err(e) => {
                warn!(
                    "{}: failed to start {}: {}",
                    student,
                    self.program.display(),
                    e
                );
                Some(STATUS_OTHER)
            }
        }
    }
}

/// Grades each student on a coordinator thread, sharing one config.
///
/// Each outcome is printed as it completes, the same line `gradebox grade`
/// prints in a child process, and kept for `outcome_lines`.
#[derive(Debug)]
pub struct InProcessExecutor {
    config: GradeConfig,
    outcomes: Mutex<Vec<String>>,
}

impl InProcessExecutor {
    pub fn new(config: GradeConfig) -> Self {
        Self {
            config,
            outcomes: Mutex::new(Vec::new()),
        }
    }

    /// Printed outcome lines, in completion order.
    pub fn outcome_lines(&self) -> Vec<String> {
        self.outcomes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl StudentExecutor for InProcessExecutor {
    fn execute(&self, student: &str) -> Option<i32> {
        let outcome = grade_student(&self.config, student);
        let line = format!("{}: {}", student, outcome);
        println!("{}", line);
        self.outcomes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line);
        Some(outcome.status_code())
    }
}
