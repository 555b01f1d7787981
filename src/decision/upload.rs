/// Upload decision: has this student's gradebook entry seen the current graded version?
///
/// Each team member has their own gradebook entry, so upload state is tracked
/// per student even though the team shares one grading run.
use crate::store::summary::GradingSummary;
use crate::timestamp::Timestamp;
use log::warn;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Graded versions uploaded during the current roll-up, keyed by student.
///
/// Lives for one roll-up invocation and is threaded through it explicitly.
/// It covers students that appear in several directories' team lists before
/// any persisted `uploaded_version` has caught up.
#[derive(Clone, Debug, Default)]
pub struct UploadCache {
    uploaded: HashMap<String, Timestamp>,
}

impl UploadCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, student: &str) -> Option<&Timestamp> {
        self.uploaded.get(student)
    }

    pub fn record(&mut self, student: &str, version: Timestamp) {
        self.uploaded.insert(student.to_string(), version);
    }

    pub fn len(&self) -> usize {
        self.uploaded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uploaded.is_empty()
    }
}

/// Whether `student`'s grade from `summary` still needs uploading.
pub fn should_upload(student: &str, summary: &GradingSummary, cache: &UploadCache) -> bool {
    let last_uploaded = cache
        .get(student)
        .or_else(|| summary.uploaded_version.get(student));

    let Some(last_uploaded) = last_uploaded else {
        return true;
    };
    let Some(graded) = summary.graded_version.as_ref() else {
        return false;
    };
    if last_uploaded == graded {
        return false;
    }

    match last_uploaded.chrono_cmp(graded) {
        Ok(Ordering::Less) => true,
        Ok(_) => false,
        Err(e) => {
            warn!(
                "Cannot order uploaded version {} against graded version {} for {}: {}; uploading",
                last_uploaded, graded, student, e
            );
            true
        }
    }
}

/// Record a successful upload in both the run cache and the summary.
/// Returns false when there was no graded version to record.
pub fn record_upload(student: &str, summary: &mut GradingSummary, cache: &mut UploadCache) -> bool {
    let Some(graded) = summary.graded_version.clone() else {
        return false;
    };
    cache.record(student, graded.clone());
    summary.uploaded_version.insert(student.to_string(), graded);
    true
}

/// Copy an upload made earlier in this run (from another directory's team
/// list) into `summary`, so later runs see it regardless of listing order.
/// Returns true when the summary changed.
pub fn reconcile_from_cache(student: &str, summary: &mut GradingSummary, cache: &UploadCache) -> bool {
    let Some(cached) = cache.get(student) else {
        return false;
    };
    if summary.uploaded_version.get(student) == Some(cached) {
        return false;
    }
    summary
        .uploaded_version
        .insert(student.to_string(), cached.clone());
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(graded: Option<&str>) -> GradingSummary {
        let mut s = GradingSummary::from_line(
            r#"{"points_possible": 100, "points_received": 87, "team_login_ids": ["abc123", "xyz789"]}"#,
        )
        .unwrap();
        s.graded_version = graded.map(Timestamp::new);
        s
    }

    #[test]
    fn test_never_uploaded_must_upload() {
        let cache = UploadCache::new();
        assert!(should_upload("abc123", &summary(Some("2016-02-01T12:00:00Z")), &cache));
        assert!(should_upload("abc123", &summary(None), &cache));
    }

    #[test]
    fn test_nothing_graded_is_not_uploaded_again() {
        let mut s = summary(None);
        s.uploaded_version
            .insert("abc123".to_string(), Timestamp::new("2016-02-01T12:00:00Z"));
        assert!(!should_upload("abc123", &s, &UploadCache::new()));
    }

    #[test]
    fn test_idempotent_after_upload() {
        let mut cache = UploadCache::new();
        let mut s = summary(Some("2016-02-01T12:00:00Z"));

        assert!(should_upload("abc123", &s, &cache));
        assert!(record_upload("abc123", &mut s, &mut cache));
        assert!(!should_upload("abc123", &s, &cache));
        assert!(should_upload("xyz789", &s, &cache));

        // Persisted map alone is enough in a fresh run.
        assert!(!should_upload("abc123", &s, &UploadCache::new()));

        // A strictly newer graded version re-opens the upload.
        s.graded_version = Some(Timestamp::new("2016-02-02T08:00:00Z"));
        assert!(should_upload("abc123", &s, &cache));
    }

    #[test]
    fn test_cache_takes_precedence_over_persisted() {
        let mut s = summary(Some("2016-02-02T08:00:00Z"));
        s.uploaded_version
            .insert("abc123".to_string(), Timestamp::new("2016-02-01T12:00:00Z"));
        let mut cache = UploadCache::new();
        assert!(should_upload("abc123", &s, &cache));

        cache.record("abc123", Timestamp::new("2016-02-02T08:00:00Z"));
        assert!(!should_upload("abc123", &s, &cache));
    }

    #[test]
    fn test_newer_upload_than_graded_is_not_reuploaded() {
        let mut s = summary(Some("2016-02-01T12:00:00Z"));
        s.uploaded_version
            .insert("abc123".to_string(), Timestamp::new("2016-02-01T12:00:00UTC"));
        assert!(!should_upload("abc123", &s, &UploadCache::new()));
    }

    #[test]
    fn test_record_without_graded_version() {
        let mut s = summary(None);
        let mut cache = UploadCache::new();
        assert!(!record_upload("abc123", &mut s, &mut cache));
        assert!(cache.is_empty());
        assert!(s.uploaded_version.is_empty());
    }

    #[test]
    fn test_reconcile_from_cache() {
        let mut cache = UploadCache::new();
        cache.record("xyz789", Timestamp::new("2016-02-01T12:00:00Z"));
        let mut s = summary(Some("2016-02-01T12:00:00Z"));

        assert!(reconcile_from_cache("xyz789", &mut s, &cache));
        assert!(!reconcile_from_cache("xyz789", &mut s, &cache));
        assert!(!reconcile_from_cache("abc123", &mut s, &cache));
        assert_eq!(
            s.uploaded_version.get("xyz789"),
            Some(&Timestamp::new("2016-02-01T12:00:00Z"))
        );
    }
}
