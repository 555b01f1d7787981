/// On-disk record types: the downloaded submission snapshot and the grading summary
use crate::config::types::{strip_sandbox_suffix, Result, NOT_GRADED};
use crate::timestamp::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Snapshot of the remote submission (`submission.json`)
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    /// The platform's timestamp for this version of the student's work
    #[serde(default)]
    pub submitted_at: Option<Timestamp>,
    /// Everything else the platform returned
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Outcome of one grading run, as printed by the autograder and enriched by us
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GradingSummary {
    pub points_possible: f64,
    pub points_received: f64,
    pub team_login_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitter_login_id: Option<String>,
    /// Submission timestamp that was graded; `None` is stored as the `N/A` sentinel
    #[serde(default, with = "graded_version_sentinel")]
    pub graded_version: Option<Timestamp>,
    /// Last graded version uploaded per team member
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub uploaded_version: BTreeMap<String, Timestamp>,
    /// Extra fields emitted by the autograder, carried through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

mod graded_version_sentinel {
    use super::NOT_GRADED;
    use crate::timestamp::Timestamp;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Timestamp>,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        match value {
            Some(ts) => ts.serialize(serializer),
            None => serializer.serialize_str(NOT_GRADED),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Option<Timestamp>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw
            .filter(|r| r != NOT_GRADED && !r.trim().is_empty())
            .map(Timestamp::new))
    }
}

impl GradingSummary {
    /// Parse one results line.
    pub fn from_line(line: &str) -> Result<Self> {
        Ok(serde_json::from_str(line.trim())?)
    }

    /// Serialize to a single results line (no trailing newline).
    pub fn to_line(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Attribute the summary to real student ids.
    ///
    /// Graders that derive login ids from their working directory see the
    /// sandbox name, so the sandbox suffix is stripped everywhere. A missing
    /// submitter defaults to `student`, and an empty team becomes the submitter alone.
    pub fn normalize_ids(&mut self, student: &str) {
        let submitter = self
            .submitter_login_id
            .as_deref()
            .map(strip_sandbox_suffix)
            .unwrap_or(student)
            .to_string();

        let mut team: Vec<String> = Vec::with_capacity(self.team_login_ids.len());
        for id in &self.team_login_ids {
            let id = strip_sandbox_suffix(id.trim());
            if !id.is_empty() && !team.iter().any(|t| t == id) {
                team.push(id.to_string());
            }
        }
        if team.is_empty() {
            team.push(submitter.clone());
        }

        self.submitter_login_id = Some(submitter);
        self.team_login_ids = team;
    }

    /// Percentage of points received, if points possible is positive.
    pub fn percent(&self) -> Option<f64> {
        if self.points_possible > 0.0 {
            Some(self.points_received / self.points_possible * 100.0)
        } else {
            None
        }
    }

    /// e.g. `87.0%`, or the sentinel when no percentage can be computed
    pub fn percent_as_string(&self) -> String {
        match self.percent() {
            Some(p) => format!("{:.1}%", p),
            None => NOT_GRADED.to_string(),
        }
    }
}
