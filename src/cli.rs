use crate::config::validator::{validate_grade_config, validate_rollup_config, validate_student_id};
use crate::config::{FileConfig, GradeConfig, GradeOverrides, RollupOverrides};
use crate::fanout::{self, InProcessExecutor, ProcessExecutor, StudentExecutor};
use crate::observability::audit::{self, AuditEvent, AuditEventType};
use crate::rollup::{self, CommandUploader, Uploader};
use crate::sandbox::{grade_student, remove_stale_sandboxes};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::ffi::{OsStr, OsString};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_AUDIT_LOG: &str = "autograder.log";

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Root directory holding one `<student>/<assignment>/` directory per student
    #[arg(long, global = true)]
    submissions_dir: Option<PathBuf>,
    /// Assignment subdirectory name
    #[arg(long, global = true)]
    assignment: Option<String>,
    /// JSON file supplying defaults for any option
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Audit log (JSON lines, appended)
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
    /// Run id shared with the parent fan-out (hidden; set on re-exec)
    #[arg(long, hide = true, global = true)]
    run_id: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone, Debug, Default)]
struct GradingArgs {
    /// Autograder command, run through `sh -c` inside the sandbox
    #[arg(long = "command", value_name = "COMMAND")]
    grader_command: Option<String>,
    /// Grade even when the recorded graded version is current
    #[arg(long)]
    force: bool,
    /// Create a missing assignment directory instead of reporting no submission
    #[arg(long)]
    create_missing: bool,
    /// Kill the autograder after this many seconds
    #[arg(long)]
    timeout_secs: Option<u64>,
    /// Token in the command replaced by $HOME
    #[arg(long)]
    home_token: Option<String>,
    /// Flag appended to the command when forcing
    #[arg(long)]
    force_flag: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Grade one student; the exit code is the grading status code
    Grade {
        #[arg(long)]
        student: String,
        #[command(flatten)]
        grading: GradingArgs,
    },
    /// Grade every student under the submissions directory concurrently
    GradeAll {
        /// Grade on threads in this process instead of one process per student
        #[arg(long)]
        in_process: bool,
        #[command(flatten)]
        grading: GradingArgs,
    },
    /// Export the grades CSV and optionally upload new grades
    Record {
        /// Upload grades newer than the last uploaded version
        #[arg(long)]
        upload: bool,
        /// Upload command template ({student}, {assignment}, {grade} as a percentage, {points}, {results})
        #[arg(long)]
        upload_command: Option<String>,
        /// Grades CSV path (default: <submissions>/../<assignment>_grades.csv)
        #[arg(long)]
        grades_csv: Option<PathBuf>,
    },
    /// Remove sandbox directories left behind by interrupted runs
    CleanSandboxes {
        /// Only remove sandboxes untouched for at least this many seconds
        #[arg(long, default_value_t = 0)]
        min_age_secs: u64,
    },
}

impl GradingArgs {
    fn overrides(self, cli: &Cli) -> GradeOverrides {
        GradeOverrides {
            submissions_dir: cli.submissions_dir.clone(),
            assignment: cli.assignment.clone(),
            command: self.grader_command,
            force: self.force,
            create_missing: self.create_missing,
            timeout_secs: self.timeout_secs,
            home_token: self.home_token,
            force_flag: self.force_flag,
        }
    }
}

/// Parse arguments, run the subcommand, and return the process exit code.
pub fn run() -> Result<i32> {
    env_logger::init();

    let cli = Cli::parse();
    let file = FileConfig::load_optional(cli.config.as_deref())?;

    let log_file = cli
        .log_file
        .clone()
        .or_else(|| file.log_file.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_AUDIT_LOG));
    audit::init_audit_log(&log_file, cli.run_id.as_deref())
        .with_context(|| format!("Failed to initialize audit log {}", log_file.display()))?;

    match &cli.command {
        Commands::Grade { student, grading } => {
            validate_student_id(student)?;
            let config = file.grade_config(grading.clone().overrides(&cli))?;
            validate_grade_config(&config).into_result()?;

            let outcome = grade_student(&config, student);
            println!("{}: {}", student, outcome);
            Ok(outcome.status_code())
        }
        Commands::GradeAll {
            in_process,
            grading,
        } => {
            let config = file.grade_config(grading.clone().overrides(&cli))?;
            validate_grade_config(&config).into_result()?;
            grade_all(&config, *in_process, &log_file)
        }
        Commands::Record {
            upload,
            upload_command,
            grades_csv,
        } => {
            let config = file.rollup_config(RollupOverrides {
                submissions_dir: cli.submissions_dir.clone(),
                assignment: cli.assignment.clone(),
                upload: *upload,
                upload_command: upload_command.clone(),
                grades_csv: grades_csv.clone(),
            })?;
            validate_rollup_config(&config).into_result()?;

            let uploader = match (config.upload, config.upload_command.as_deref()) {
                (true, Some(template)) => Some(CommandUploader::new(template)),
                _ => None,
            };
            let report = rollup::run_rollup(
                &config,
                uploader.as_ref().map(|u| u as &dyn Uploader),
            )?;
            for attempt in &report.uploads {
                println!("{}", attempt);
            }
            println!("{}", report);
            Ok(if report.upload_failed > 0 { 1 } else { 0 })
        }
        Commands::CleanSandboxes { min_age_secs } => {
            let submissions_dir = file.submissions_dir(cli.submissions_dir.clone())?;
            let removed =
                remove_stale_sandboxes(&submissions_dir, Duration::from_secs(*min_age_secs))?;
            for path in &removed {
                audit::record(AuditEvent::new(
                    AuditEventType::StaleSandboxRemoved,
                    format!("removed {}", path.display()),
                ));
                println!("removed {}", path.display());
            }
            println!("{} stale sandboxes removed", removed.len());
            Ok(0)
        }
    }
}

fn grade_all(config: &GradeConfig, in_process: bool, log_file: &std::path::Path) -> Result<i32> {
    let students = fanout::list_students(&config.submissions_dir).with_context(|| {
        format!(
            "Failed to list students in {}",
            config.submissions_dir.display()
        )
    })?;

    let executor: Box<dyn StudentExecutor> = if in_process {
        Box::new(InProcessExecutor::new(config.clone()))
    } else {
        Box::new(
            ProcessExecutor::current_exe(child_args(config, log_file))
                .context("Failed to locate the gradebox executable")?,
        )
    };

    let report = fanout::run_all(executor.as_ref(), &students);
    print!("{}", report);
    for (student, bucket) in report.problems() {
        println!("  {}: {}", student, bucket.label());
    }
    Ok(0)
}

/// Arguments for `gradebox grade` reproducing `config` exactly, minus `--student`.
fn child_args(config: &GradeConfig, log_file: &std::path::Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "grade".into(),
        long_opt("submissions-dir", &config.submissions_dir),
        long_opt("assignment", &config.assignment),
        long_opt("command", &config.command),
        long_opt("home-token", &config.home_token),
        long_opt("force-flag", &config.force_flag),
        long_opt("log-file", log_file),
    ];
    if config.force {
        args.push("--force".into());
    }
    if config.create_missing {
        args.push("--create-missing".into());
    }
    if let Some(timeout) = config.timeout {
        args.push(long_opt("timeout-secs", timeout.as_secs().to_string()));
    }
    if let Some(run_id) = audit::current_run_id() {
        args.push(long_opt("run-id", run_id));
    }
    args
}

/// `--name=value`, so values starting with `-` (like the default force flag) stay values.
fn long_opt(name: &str, value: impl AsRef<OsStr>) -> OsString {
    let mut opt = OsString::from(format!("--{}=", name));
    opt.push(value);
    opt
}
