/// Reading and writing the per-assignment artifacts
///
/// Layout of `<submissions>/<student>/<assignment>/`:
/// - `submission.json`          remote snapshot, owned by the download step
/// - `autograder_results.txt`   grader output, one summary line per attempt, last line current
/// - `autograder_summary.json`  current summary, preferred over the results last line
/// - `autograder_history.json`  JSON array of every recorded summary, append-only
use crate::config::types::{
    GradeError, Result, HISTORY_FILE, RESULTS_FILE, SUBMISSION_FILE, SUMMARY_FILE,
};
use crate::store::summary::{GradingSummary, SubmissionRecord};
use log::{debug, warn};
use serde_json::Value;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Artifact paths for one (student, assignment) directory
#[derive(Clone, Debug)]
pub struct AssignmentFiles {
    dir: PathBuf,
}

impl AssignmentFiles {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn results(&self) -> PathBuf {
        self.dir.join(RESULTS_FILE)
    }

    pub fn history(&self) -> PathBuf {
        self.dir.join(HISTORY_FILE)
    }

    pub fn submission(&self) -> PathBuf {
        self.dir.join(SUBMISSION_FILE)
    }

    pub fn summary(&self) -> PathBuf {
        self.dir.join(SUMMARY_FILE)
    }
}

/// Current-state file that accompanies a results artifact.
pub fn summary_path_for(results_path: &Path) -> PathBuf {
    results_path.with_file_name(SUMMARY_FILE)
}

/// Read `submission.json`; `Ok(None)` when it does not exist.
pub fn read_submission_record(path: &Path) -> Result<Option<SubmissionRecord>> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Last non-blank line of a text file; `Ok(None)` when the file is missing or blank.
pub fn read_last_line(path: &Path) -> Result<Option<String>> {
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(contents
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .map(str::to_string))
}

/// Replace the last non-blank line of a file, keeping everything before it.
/// A missing or blank file ends up containing just `line`.
pub fn rewrite_last_line(path: &Path, line: &str) -> Result<()> {
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e.into()),
    };

    let mut lines: Vec<&str> = contents.lines().collect();
    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }
    lines.pop();

    let mut rewritten = String::with_capacity(contents.len() + line.len() + 1);
    for l in lines {
        rewritten.push_str(l);
        rewritten.push('\n');
    }
    rewritten.push_str(line);
    rewritten.push('\n');

    fs::write(path, rewritten)?;
    Ok(())
}

/// Parse the summary on the results artifact's last line.
pub fn read_results_summary(results_path: &Path) -> Result<Option<GradingSummary>> {
    match read_last_line(results_path)? {
        Some(line) => GradingSummary::from_line(&line).map(Some),
        None => Ok(None),
    }
}

/// Current summary for an assignment directory.
///
/// The state file wins; the results artifact's last line is the fallback for
/// directories graded before the state file existed, or whose state file is damaged.
/// Returns `Ok(None)` when neither holds anything, and an error when the
/// fallback line does not parse.
pub fn load_current_summary(results_path: &Path) -> Result<Option<GradingSummary>> {
    let state_path = summary_path_for(results_path);
    match fs::read_to_string(&state_path) {
        Ok(contents) => match serde_json::from_str::<GradingSummary>(&contents) {
            Ok(summary) => return Ok(Some(summary)),
            Err(e) => warn!(
                "Ignoring unreadable state file {}: {}",
                state_path.display(),
                e
            ),
        },
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    debug!(
        "No state file at {}, reading {}",
        state_path.display(),
        results_path.display()
    );
    read_results_summary(results_path)
}

/// Persist a summary as current state: the state file is rewritten and, when
/// the results artifact exists, its summary line is updated as well.
///
/// A results file whose last line is not a summary (a failed re-grade's
/// output) keeps that output; the summary line is appended after it.
pub fn persist_summary(results_path: &Path, summary: &GradingSummary) -> Result<()> {
    let state_path = summary_path_for(results_path);
    fs::write(&state_path, serde_json::to_string_pretty(summary)?)?;

    if !results_path.exists() {
        return Ok(());
    }
    let line = summary.to_line()?;
    match read_results_summary(results_path) {
        Ok(Some(_)) => rewrite_last_line(results_path, &line),
        Ok(None) | Err(GradeError::Json(_)) => append_line(results_path, &line),
        Err(e) => Err(e),
    }
}

fn append_line(path: &Path, line: &str) -> Result<()> {
    let mut contents = fs::read_to_string(path)?;
    if !contents.is_empty() && !contents.ends_with('\n') {
        contents.push('\n');
    }
    contents.push_str(line);
    contents.push('\n');
    fs::write(path, contents)?;
    Ok(())
}

/// Read the history array as raw entries; a missing file is an empty history.
///
/// Entries are not required to look like the current summary type, since
/// older graders and older releases wrote different fields.
pub fn read_history(path: &Path) -> Result<Vec<Value>> {
    match fs::read_to_string(path) {
        Ok(contents) if contents.trim().is_empty() => Ok(Vec::new()),
        Ok(contents) => Ok(serde_json::from_str(&contents)?),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

/// Append one summary to the history array.
///
/// Earlier entries are kept as the exact text already on disk; the new entry
/// is spliced in before the closing bracket. A file that is not a JSON array
/// is moved aside to `<name>.corrupt` and a new array is started, so a grading
/// run never fails on its audit trail.
pub fn append_history(path: &Path, summary: &GradingSummary) -> Result<usize> {
    let entry = serde_json::to_string_pretty(summary)?;
    let existing = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e.into()),
    };

    let text = existing.trim_end();
    let earlier = if text.is_empty() {
        0
    } else {
        match serde_json::from_str::<Vec<Value>>(text) {
            Ok(entries) => entries.len(),
            Err(e) => {
                let aside = path.with_extension("json.corrupt");
                warn!(
                    "History {} is not a JSON array ({}); moving it to {}",
                    path.display(),
                    e,
                    aside.display()
                );
                fs::rename(path, &aside)?;
                0
            }
        }
    };

    let contents = match text.strip_suffix(']') {
        Some(body) if earlier > 0 => format!("{},\n{}\n]\n", body.trim_end(), entry),
        _ => format!("[\n{}\n]\n", entry),
    };
    fs::write(path, contents)?;
    Ok(earlier + 1)
}
