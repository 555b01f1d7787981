/// External autograder invocation
/// The grader is an opaque shell command run inside the sandbox. Its combined
/// stdout/stderr is appended to the sandbox copy of the results artifact; the
/// last line it prints is expected to be the JSON summary.
use crate::config::types::{GradeError, Result};
use log::{debug, warn};
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::fs::OpenOptions;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How the grader process ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandStatus {
    /// Exit code, `None` when terminated by a signal
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub elapsed: Duration,
}

impl CommandStatus {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// A fully expanded grader command line
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GraderCommand {
    line: String,
}

impl GraderCommand {
    /// Expand `template`: replace `home_token` with `home` and append `force_flag` when forcing.
    pub fn build(
        template: &str,
        home_token: &str,
        home: Option<&Path>,
        force_flag: Option<&str>,
    ) -> Self {
        let mut line = match home {
            Some(home) if !home_token.is_empty() => {
                template.replace(home_token, &home.to_string_lossy())
            }
            _ => template.to_string(),
        };
        if let Some(flag) = force_flag.filter(|f| !f.is_empty()) {
            line.push(' ');
            line.push_str(flag);
        }
        Self { line }
    }

    pub fn line(&self) -> &str {
        &self.line
    }

    /// Run through `sh -c` in `workdir`, appending combined output to `output`.
    pub fn run(&self, workdir: &Path, output: &Path, timeout: Option<Duration>) -> Result<CommandStatus> {
        let out = OpenOptions::new().create(true).append(true).open(output)?;
        let err = out.try_clone()?;

        let started = Instant::now();
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.line)
            .current_dir(workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(out))
            .stderr(Stdio::from(err))
            // Own process group so a timeout can take down everything the grader started.
            .process_group(0)
            .spawn()
            .map_err(|e| GradeError::Command(format!("Failed to start `{}`: {}", self.line, e)))?;
        debug!("Started grader pid {} in {}", child.id(), workdir.display());

        let (status, timed_out) = match timeout {
            None => (child.wait()?, false),
            Some(limit) => wait_with_timeout(&mut child, limit)?,
        };

        Ok(CommandStatus {
            exit_code: status.code(),
            timed_out,
            elapsed: started.elapsed(),
        })
    }
}

fn wait_with_timeout(child: &mut Child, limit: Duration) -> Result<(ExitStatus, bool)> {
    let deadline = Instant::now() + limit;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok((status, false));
        }
        if Instant::now() >= deadline {
            break;
        }
        thread::sleep(POLL_INTERVAL);
    }

    warn!("Grader pid {} exceeded {:?}; killing its process group", child.id(), limit);
    let pgid = Pid::from_raw(child.id() as i32);
    if let Err(e) = killpg(pgid, Signal::SIGKILL) {
        warn!("killpg({}) failed: {}; killing the shell only", pgid, e);
        let _ = child.kill();
    }
    Ok((child.wait()?, true))
}
