/// Per-student sandbox directories
/// The grader only ever sees a copy of the student's assignment directory at
/// `<submissions>/<student>_tmp/<assignment>/`. The sandbox root is removed on
/// every exit path: explicitly via `cleanup()`, or on drop as a backstop.
use crate::config::types::{GradeConfig, GradeError, Result, SANDBOX_SUFFIX};
use log::{debug, info, warn};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Why a sandbox could not be set up
#[derive(Debug)]
pub enum IsolationError {
    /// The sandbox root already exists; it is not ours to touch
    Collision(PathBuf),
    Io(GradeError),
}

impl From<std::io::Error> for IsolationError {
    fn from(e: std::io::Error) -> Self {
        IsolationError::Io(e.into())
    }
}

/// An isolated copy of one student's assignment directory
#[derive(Debug)]
pub struct Sandbox {
    root: PathBuf,
    workdir: PathBuf,
    removed: bool,
}

impl Sandbox {
    /// Create the sandbox root and copy the student's assignment directory into it.
    pub fn isolate(config: &GradeConfig, student: &str) -> std::result::Result<Self, IsolationError> {
        let root = config.sandbox_root(student);
        match fs::create_dir(&root) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(IsolationError::Collision(root));
            }
            Err(e) => return Err(e.into()),
        }

        // From here on, dropping `sandbox` removes the root.
        let sandbox = Self {
            workdir: root.join(&config.assignment),
            root,
            removed: false,
        };

        copy_tree(&config.assignment_dir(student), &sandbox.workdir)?;
        debug!(
            "Isolated {} into {}",
            config.assignment_dir(student).display(),
            sandbox.workdir.display()
        );
        Ok(sandbox)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Working directory the grader runs in
    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Remove the sandbox root (idempotent)
    pub fn cleanup(&mut self) -> Result<()> {
        if self.removed {
            return Ok(());
        }
        match fs::remove_dir_all(&self.root) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(GradeError::Sandbox(format!(
                    "Failed to remove sandbox {}: {}",
                    self.root.display(),
                    e
                )))
            }
        }
        self.removed = true;
        debug!("Removed sandbox {}", self.root.display());
        Ok(())
    }
}

impl Drop for Sandbox {
    fn drop(&mut self) {
        if let Err(e) = self.cleanup() {
            warn!("{}", e);
        }
    }
}

/// Recursively copy `src` into `dst`, creating `dst`.
pub fn copy_tree(src: &Path, dst: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let target = dst.join(entry.file_name());

        if file_type.is_dir() {
            copy_tree(&entry.path(), &target)?;
        } else if file_type.is_symlink() {
            copy_symlink(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(fs::read_link(src)?, dst)
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dst: &Path) -> std::io::Result<()> {
    fs::copy(src, dst).map(|_| ())
}

/// Sandbox directories left under the submissions root by interrupted runs
pub fn find_stale_sandboxes(submissions_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut stale = Vec::new();
    for entry in fs::read_dir(submissions_dir)? {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("Failed to read directory entry: {}", e);
                continue;
            }
        };
        let is_sandbox = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.ends_with(SANDBOX_SUFFIX));
        if is_sandbox && entry.path().is_dir() {
            stale.push(entry.path());
        }
    }
    stale.sort();
    Ok(stale)
}

/// Remove stale sandboxes whose last modification is older than `min_age`.
/// Returns the directories actually removed.
pub fn remove_stale_sandboxes(submissions_dir: &Path, min_age: Duration) -> Result<Vec<PathBuf>> {
    let now = SystemTime::now();
    let mut removed = Vec::new();

    for path in find_stale_sandboxes(submissions_dir)? {
        let modified = match fs::metadata(&path).and_then(|m| m.modified()) {
            Ok(m) => m,
            Err(e) => {
                warn!("Failed to get modified time for {}: {}", path.display(), e);
                continue;
            }
        };
        // Future timestamps count as fresh.
        let age = now.duration_since(modified).unwrap_or_default();
        if age < min_age {
            debug!("Keeping recent sandbox {}", path.display());
            continue;
        }

        info!("Removing stale sandbox: {}", path.display());
        match fs::remove_dir_all(&path) {
            Ok(()) => removed.push(path),
            Err(e) => warn!("Failed to remove stale sandbox {}: {}", path.display(), e),
        }
    }

    Ok(removed)
}
