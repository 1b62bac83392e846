//! Bucket artifacts by UTC calendar date and prune beyond configured
//! limits.
//!
//! Bucket classification is fixed to UTC rather than the host's local
//! timezone; see `DESIGN.md` for the rationale.

use chrono::{DateTime, Datelike, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::store::{ArtifactInfo, Kind};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Bucket {
    Monthly,
    Weekly,
    Daily,
    Full,
}

/// Classify `created_at`'s UTC calendar date: `monthly` if day-of-month is
/// 1, else `weekly` if the ISO weekday is Sunday, else `daily`.
#[must_use]
pub fn classify_date(created_at: DateTime<Utc>) -> Bucket {
    if created_at.day() == 1 {
        Bucket::Monthly
    } else if created_at.weekday() == Weekday::Sun {
        Bucket::Weekly
    } else {
        Bucket::Daily
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Limits {
    pub daily: usize,
    pub weekly: usize,
    pub monthly: usize,
    pub full: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            daily: 7,
            weekly: 4,
            monthly: 12,
            full: 3,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Plan {
    pub keep: Vec<String>,
    pub delete: Vec<String>,
}

/// Compute the retention plan for `artifacts` (sidecar-paired only;
/// legacy/unpaired payloads are never touched by retention).
#[must_use]
pub fn plan(artifacts: &[ArtifactInfo], limits: &Limits) -> Plan {
    let mut dated: Vec<(&ArtifactInfo, DateTime<Utc>, Bucket)> = artifacts
        .iter()
        .filter_map(|artifact| {
            let sidecar = artifact.sidecar.as_ref()?;
            Some((artifact, sidecar.created_at, classify_date(sidecar.created_at)))
        })
        .collect();
    dated.sort_by(|a, b| b.1.cmp(&a.1));

    let keep_in_date_bucket = |bucket: Bucket, limit: usize| -> Vec<&str> {
        dated
            .iter()
            .filter(|(_, _, b)| *b == bucket)
            .take(limit)
            .map(|(artifact, ..)| artifact.name.as_str())
            .collect()
    };
    let mut kept_names: std::collections::HashSet<&str> = std::collections::HashSet::new();
    kept_names.extend(keep_in_date_bucket(Bucket::Monthly, limits.monthly));
    kept_names.extend(keep_in_date_bucket(Bucket::Weekly, limits.weekly));
    kept_names.extend(keep_in_date_bucket(Bucket::Daily, limits.daily));

    // Full-kind artifacts belong to the `full` bucket in parallel; a full
    // artifact is kept if it survives either its date bucket OR the full
    // bucket (union semantics).
    let full_sorted: Vec<&str> = dated
        .iter()
        .filter(|(artifact, ..)| {
            artifact.sidecar.as_ref().map(|s| s.kind) == Some(Kind::Full)
        })
        .map(|(artifact, ..)| artifact.name.as_str())
        .collect();
    kept_names.extend(full_sorted.into_iter().take(limits.full));

    let mut keep = Vec::new();
    let mut delete = Vec::new();
    for (artifact, ..) in &dated {
        if kept_names.contains(artifact.name.as_str()) {
            keep.push(artifact.name.clone());
        } else {
            delete.push(artifact.name.clone());
        }
    }
    Plan { keep, delete }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Sidecar;
    use std::path::PathBuf;
    use std::time::SystemTime;

    fn artifact(name: &str, created_at: &str, kind: Kind) -> ArtifactInfo {
        ArtifactInfo {
            name: name.to_owned(),
            path: PathBuf::from(format!("{name}.sql")),
            mtime: SystemTime::now(),
            sidecar: Some(Sidecar {
                kind,
                created_at: created_at.parse().unwrap(),
                target_identity: "container:demo".to_owned(),
                byte_size: 1,
                tags: Vec::new(),
                version: None,
                branch: None,
                description: None,
                parent_version: None,
                extra: serde_json::Map::new(),
            }),
        }
    }

    #[test]
    fn classify_date_picks_monthly_on_first_of_month() {
        let date: DateTime<Utc> = "2026-07-01T00:00:00Z".parse().unwrap();
        assert_eq!(classify_date(date), Bucket::Monthly);
    }

    #[test]
    fn classify_date_picks_weekly_on_sunday() {
        let date: DateTime<Utc> = "2026-07-26T00:00:00Z".parse().unwrap(); // a Sunday
        assert_eq!(classify_date(date), Bucket::Weekly);
    }

    #[test]
    fn classify_date_picks_daily_otherwise() {
        let date: DateTime<Utc> = "2026-07-27T00:00:00Z".parse().unwrap(); // a Monday
        assert_eq!(classify_date(date), Bucket::Daily);
    }

    #[test]
    fn daily_limit_is_enforced_beyond_bound() {
        let artifacts = vec![
            artifact("d1", "2026-07-20T00:00:00Z", Kind::Incremental),
            artifact("d2", "2026-07-21T00:00:00Z", Kind::Incremental),
            artifact("d3", "2026-07-22T00:00:00Z", Kind::Incremental),
        ];
        let limits = Limits {
            daily: 2,
            weekly: 0,
            monthly: 0,
            full: 0,
        };
        let result = plan(&artifacts, &limits);
        assert_eq!(result.keep.len(), 2);
        assert_eq!(result.delete, vec!["d1".to_owned()]);
    }

    #[test]
    fn full_bucket_saves_old_full_backup_outside_daily_limit() {
        let artifacts = vec![
            artifact("old-full", "2026-06-15T00:00:00Z", Kind::Full),
            artifact("d1", "2026-07-26T00:00:00Z", Kind::Incremental),
            artifact("d2", "2026-07-25T00:00:00Z", Kind::Incremental),
        ];
        let limits = Limits {
            daily: 1,
            weekly: 0,
            monthly: 0,
            full: 3,
        };
        let result = plan(&artifacts, &limits);
        assert!(result.keep.contains(&"old-full".to_owned()));
    }

    #[test]
    fn dry_run_is_just_inspecting_the_plan_without_deleting() {
        let artifacts = vec![artifact("only", "2026-07-27T00:00:00Z", Kind::Incremental)];
        let limits = Limits::default();
        let result = plan(&artifacts, &limits);
        assert_eq!(result.keep, vec!["only".to_owned()]);
        assert!(result.delete.is_empty());
    }
}
