//! Fan-out coordinator
//!
//! Runs one executor task per student concurrently, collects each task's
//! status code, and aggregates them into buckets. Concurrency is unbounded:
//! every student gets its own thread (and, with `ProcessExecutor`, its own
//! process). One task failing or panicking never affects the others.

pub mod executor;

pub use executor::{InProcessExecutor, ProcessExecutor, StudentExecutor};

use crate::config::types::{Result, SANDBOX_SUFFIX};
use crate::observability::audit::{self, AuditEvent, AuditEventType};
use crate::verdict::StatusBucket;
use log::{info, warn};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

/// Aggregate result of one fan-out run
#[derive(Clone, Debug, Default)]
pub struct FanoutReport {
    /// Status code per student; `None` when the task ended without one
    pub results: BTreeMap<String, Option<i32>>,
    pub counts: BTreeMap<StatusBucket, usize>,
    pub elapsed: Duration,
}

impl FanoutReport {
    pub fn count(&self, bucket: StatusBucket) -> usize {
        self.counts.get(&bucket).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.results.len()
    }

    /// Students whose run did not end graded or already graded
    pub fn problems(&self) -> impl Iterator<Item = (&str, StatusBucket)> {
        self.results.iter().filter_map(|(student, code)| {
            let bucket = StatusBucket::from_code(*code);
            match bucket {
                StatusBucket::Graded | StatusBucket::AlreadyGraded => None,
                _ => Some((student.as_str(), bucket)),
            }
        })
    }
}

impl fmt::Display for FanoutReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} students in {:.1}s",
            self.total(),
            self.elapsed.as_secs_f64()
        )?;
        for bucket in StatusBucket::ALL {
            writeln!(f, "  {:<15} {}", bucket.label(), self.count(bucket))?;
        }
        Ok(())
    }
}

/// Student ids under `submissions_dir`, sorted. Sandbox leftovers are skipped.
pub fn list_students(submissions_dir: &Path) -> Result<Vec<String>> {
    let mut students = Vec::new();
    for entry in fs::read_dir(submissions_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            warn!("Skipping non UTF-8 entry {:?}", entry.file_name());
            continue;
        };
        if name.ends_with(SANDBOX_SUFFIX) {
            warn!(
                "Skipping {}: leftover sandbox from an interrupted run (see clean-sandboxes)",
                name
            );
            continue;
        }
        students.push(name);
    }
    students.sort();
    Ok(students)
}

/// Grade every student concurrently and aggregate the status codes.
pub fn run_all(executor: &dyn StudentExecutor, students: &[String]) -> FanoutReport {
    let started = Instant::now();
    let mut report = FanoutReport::default();
    let (tx, rx) = crossbeam_channel::unbounded::<(String, Option<i32>)>();

    thread::scope(|scope| {
        let handles: Vec<_> = students
            .iter()
            .map(|student| {
                let tx = tx.clone();
                let handle = scope.spawn(move || {
                    let code = executor.execute(student);
                    let _ = tx.send((student.clone(), code));
                    code
                });
                (student, handle)
            })
            .collect();
        drop(tx);

        // Progress as tasks finish, in completion order.
        for (student, code) in rx.iter() {
            info!(
                "{}: {}",
                student,
                StatusBucket::from_code(code).label()
            );
        }

        for (student, handle) in handles {
            let code = handle.join().unwrap_or_else(|_| {
                warn!("{}: grading task panicked", student);
                None
            });
            report.results.insert(student.clone(), code);
        }
    });

    for code in report.results.values() {
        *report
            .counts
            .entry(StatusBucket::from_code(*code))
            .or_insert(0) += 1;
    }
    report.elapsed = started.elapsed();

    audit::record(AuditEvent::new(
        AuditEventType::FanoutSummary,
        StatusBucket::ALL
            .iter()
            .map(|b| format!("{}={}", b.label(), report.count(*b)))
            .chain(std::iter::once(format!(
                "elapsed={:.1}s",
                report.elapsed.as_secs_f64()
            )))
            .collect::<Vec<_>>()
            .join(", "),
    ));
    report
}
