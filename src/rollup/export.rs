/// Aggregate grade export (CSV, RFC 4180 quoting)
use crate::config::types::{Result, NOT_GRADED};
use crate::store::GradingSummary;
use serde_json::Value;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

const FIXED_COLUMNS: [&str; 8] = [
    "student",
    "points_possible",
    "points_received",
    "percent_as_string",
    "submitter_login_id",
    "team_login_ids",
    "graded_version",
    "uploaded_version",
];

/// One exported row: a team member and the summary that graded them
#[derive(Clone, Debug)]
pub struct GradeRow {
    pub student: String,
    pub summary: GradingSummary,
}

impl GradeRow {
    pub fn new(student: &str, summary: &GradingSummary) -> Self {
        Self {
            student: student.to_string(),
            summary: summary.clone(),
        }
    }

    fn fields(&self, extra_columns: &[String]) -> Vec<String> {
        let s = &self.summary;
        let mut fields = vec![
            self.student.clone(),
            format_points(s.points_possible),
            format_points(s.points_received),
            s.percent_as_string(),
            s.submitter_login_id.clone().unwrap_or_default(),
            s.team_login_ids.join(";"),
            s.graded_version
                .as_ref()
                .map(|v| v.to_string())
                .unwrap_or_else(|| NOT_GRADED.to_string()),
            s.uploaded_version
                .iter()
                .map(|(student, version)| format!("{}={}", student, version))
                .collect::<Vec<_>>()
                .join(";"),
        ];
        fields.extend(extra_columns.iter().map(|key| match s.extra.get(key) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(v)) => v.clone(),
            Some(other) => other.to_string(),
        }));
        fields
    }
}

/// `87` rather than `87.0`; fractional points keep their digits.
pub fn format_points(points: f64) -> String {
    if points.fract() == 0.0 && points.abs() < 1e15 {
        format!("{}", points as i64)
    } else {
        points.to_string()
    }
}

/// Render rows to CSV text. Extra grader fields become trailing columns.
pub fn render_csv(rows: &[GradeRow]) -> String {
    let extra_columns: Vec<String> = rows
        .iter()
        .flat_map(|row| row.summary.extra.keys().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut out = String::new();
    let header = FIXED_COLUMNS
        .iter()
        .map(|c| c.to_string())
        .chain(extra_columns.iter().cloned());
    push_record(&mut out, header);
    for row in rows {
        push_record(&mut out, row.fields(&extra_columns).into_iter());
    }
    out
}

pub fn write_grades_csv(path: &Path, rows: &[GradeRow]) -> Result<()> {
    fs::write(path, render_csv(rows))?;
    Ok(())
}

fn push_record(out: &mut String, fields: impl Iterator<Item = String>) {
    for (i, field) in fields.enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&quote(&field));
    }
    out.push_str("\r\n");
}

fn quote(field: &str) -> String {
    if field.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
