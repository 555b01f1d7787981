/// Configuration defaults loaded from a JSON file
///
/// Every field is optional; values given on the command line win over the file.
use crate::config::types::{
    GradeConfig, GradeError, Result, RollupConfig, DEFAULT_FORCE_FLAG, DEFAULT_HOME_TOKEN,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub submissions_dir: Option<PathBuf>,
    pub assignment: Option<String>,
    pub log_file: Option<PathBuf>,
    pub grading: GradingSection,
    pub rollup: RollupSection,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GradingSection {
    pub command: Option<String>,
    pub force: Option<bool>,
    pub create_missing: Option<bool>,
    pub timeout_secs: Option<u64>,
    pub home_token: Option<String>,
    pub force_flag: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RollupSection {
    pub upload: Option<bool>,
    pub upload_command: Option<String>,
    pub grades_csv: Option<PathBuf>,
}

/// Command-line values for grading, before defaults are applied
#[derive(Clone, Debug, Default)]
pub struct GradeOverrides {
    pub submissions_dir: Option<PathBuf>,
    pub assignment: Option<String>,
    pub command: Option<String>,
    pub force: bool,
    pub create_missing: bool,
    pub timeout_secs: Option<u64>,
    pub home_token: Option<String>,
    pub force_flag: Option<String>,
}

/// Command-line values for the roll-up, before defaults are applied
#[derive(Clone, Debug, Default)]
pub struct RollupOverrides {
    pub submissions_dir: Option<PathBuf>,
    pub assignment: Option<String>,
    pub upload: bool,
    pub upload_command: Option<String>,
    pub grades_csv: Option<PathBuf>,
}

impl FileConfig {
    /// Load from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            GradeError::Config(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        serde_json::from_str(&content)
            .map_err(|e| GradeError::Config(format!("Failed to parse config JSON: {}", e)))
    }

    /// Load when a path was given, otherwise use empty defaults.
    pub fn load_optional(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => Ok(Self::default()),
        }
    }

    fn location(
        &self,
        submissions_dir: Option<PathBuf>,
        assignment: Option<String>,
    ) -> Result<(PathBuf, String)> {
        let submissions_dir = submissions_dir
            .or_else(|| self.submissions_dir.clone())
            .ok_or_else(|| GradeError::Config("submissions directory is not set".to_string()))?;
        let assignment = assignment
            .or_else(|| self.assignment.clone())
            .ok_or_else(|| GradeError::Config("assignment is not set".to_string()))?;
        Ok((submissions_dir, assignment))
    }

    /// Merge command-line values over this file into a grading config.
    /// Boolean switches can only be turned on from the command line.
    pub fn grade_config(&self, cli: GradeOverrides) -> Result<GradeConfig> {
        let (submissions_dir, assignment) = self.location(cli.submissions_dir, cli.assignment)?;
        let grading = &self.grading;
        let command = cli
            .command
            .or_else(|| grading.command.clone())
            .ok_or_else(|| GradeError::Config("autograder command is not set".to_string()))?;

        let mut config = GradeConfig::new(submissions_dir, &assignment, &command);
        config.force = cli.force || grading.force.unwrap_or(false);
        config.create_missing = cli.create_missing || grading.create_missing.unwrap_or(false);
        config.timeout = cli
            .timeout_secs
            .or(grading.timeout_secs)
            .map(Duration::from_secs);
        config.home_token = cli
            .home_token
            .or_else(|| grading.home_token.clone())
            .unwrap_or_else(|| DEFAULT_HOME_TOKEN.to_string());
        config.force_flag = cli
            .force_flag
            .or_else(|| grading.force_flag.clone())
            .unwrap_or_else(|| DEFAULT_FORCE_FLAG.to_string());
        Ok(config)
    }

    pub fn rollup_config(&self, cli: RollupOverrides) -> Result<RollupConfig> {
        let (submissions_dir, assignment) = self.location(cli.submissions_dir, cli.assignment)?;
        let rollup = &self.rollup;

        let mut config = RollupConfig::new(submissions_dir, &assignment);
        config.upload = cli.upload || rollup.upload.unwrap_or(false);
        config.upload_command = cli.upload_command.or_else(|| rollup.upload_command.clone());
        if let Some(csv) = cli.grades_csv.or_else(|| rollup.grades_csv.clone()) {
            config.grades_csv = csv;
        }
        Ok(config)
    }

    pub fn submissions_dir(&self, cli: Option<PathBuf>) -> Result<PathBuf> {
        cli.or_else(|| self.submissions_dir.clone())
            .ok_or_else(|| GradeError::Config("submissions directory is not set".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "submissions_dir": "/srv/submissions",
        "assignment": "proj4",
        "grading": {
            "command": "python {home}/grader.py",
            "timeout_secs": 600,
            "force_flag": "--regrade"
        },
        "rollup": { "upload_command": "push {student} {grade}" }
    }"#;

    #[test]
    fn test_file_supplies_defaults() {
        let file: FileConfig = serde_json::from_str(SAMPLE).unwrap();
        let config = file.grade_config(GradeOverrides::default()).unwrap();
        assert_eq!(config.submissions_dir, PathBuf::from("/srv/submissions"));
        assert_eq!(config.assignment, "proj4");
        assert_eq!(config.command, "python {home}/grader.py");
        assert_eq!(config.timeout, Some(Duration::from_secs(600)));
        assert_eq!(config.force_flag, "--regrade");
        assert_eq!(config.home_token, DEFAULT_HOME_TOKEN);
        assert!(!config.force);
    }

    #[test]
    fn test_cli_wins() {
        let file: FileConfig = serde_json::from_str(SAMPLE).unwrap();
        let config = file
            .grade_config(GradeOverrides {
                assignment: Some("proj5".to_string()),
                command: Some("make grade".to_string()),
                force: true,
                timeout_secs: Some(30),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(config.assignment, "proj5");
        assert_eq!(config.command, "make grade");
        assert_eq!(config.timeout, Some(Duration::from_secs(30)));
        assert!(config.force);

        let rollup = file
            .rollup_config(RollupOverrides {
                upload: true,
                ..Default::default()
            })
            .unwrap();
        assert!(rollup.upload);
        assert_eq!(rollup.upload_command.as_deref(), Some("push {student} {grade}"));
        assert_eq!(
            rollup.grades_csv,
            PathBuf::from("/srv/submissions/../proj4_grades.csv")
        );
    }

    #[test]
    fn test_missing_required_values() {
        let err = FileConfig::default()
            .grade_config(GradeOverrides {
                submissions_dir: Some(PathBuf::from("/subs")),
                assignment: Some("proj4".to_string()),
                ..Default::default()
            })
            .unwrap_err();
        assert!(err.to_string().contains("command"));
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(serde_json::from_str::<FileConfig>(r#"{"asignment": "typo"}"#).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gradebox.json");
        std::fs::write(&path, SAMPLE).unwrap();
        let file = FileConfig::load_optional(Some(&path)).unwrap();
        assert_eq!(file.assignment.as_deref(), Some("proj4"));

        assert!(FileConfig::load_from_file(dir.path().join("missing.json")).is_err());
        assert_eq!(FileConfig::load_optional(None).unwrap(), FileConfig::default());
    }
}
