//! Semantic version ledger, tags, branches and rollback history. Entirely
//! optional: callers only touch this module when versioning is enabled for
//! a backup.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, miette::Diagnostic, Debug)]
pub enum VersionError {
    #[error("input/output error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("unknown branch {0:?}")]
    UnknownBranch(String),
    #[error("unknown version {0:?}")]
    UnknownVersion(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Increment {
    Major,
    Minor,
    Patch,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Triple {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Triple {
    #[must_use]
    pub fn apply(self, increment: Increment) -> Self {
        match increment {
            Increment::Major => Triple {
                major: self.major + 1,
                minor: 0,
                patch: 0,
            },
            Increment::Minor => Triple {
                major: self.major,
                minor: self.minor + 1,
                patch: 0,
            },
            Increment::Patch => Triple {
                major: self.major,
                minor: self.minor,
                patch: self.patch + 1,
            },
        }
    }
}

/// Format `M.m.p-branch.BUILD`, `BUILD` being `YYYYMMDD_HHMMSS` (UTC).
#[must_use]
pub fn format_version(triple: Triple, branch: &str, build_time: DateTime<Utc>) -> String {
    format!(
        "{}.{}.{}-{branch}.{}",
        triple.major,
        triple.minor,
        triple.patch,
        build_time.format("%Y%m%d_%H%M%S"),
    )
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VersionEntry {
    pub version_string: String,
    pub artifact_name: String,
    pub branch: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct VersionState {
    pub current: HashMap<String, Triple>,
    #[serde(default)]
    pub entries: Vec<VersionEntry>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Tags(pub HashMap<String, HashSet<String>>);

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BranchInfo {
    pub description: Option<String>,
    pub backup_count: u32,
    pub latest_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Branches(pub HashMap<String, BranchInfo>);

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RollbackEntry {
    pub timestamp: DateTime<Utc>,
    pub target_version: String,
    pub safety_backup_name: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RollbackHistory(pub Vec<RollbackEntry>);

fn load<T: Default + for<'de> Deserialize<'de>>(path: &Path) -> T {
    fs::read_to_string(path)
        .ok()
        .and_then(|contents| serde_json::from_str(&contents).ok())
        .unwrap_or_default()
}

fn save<T: Serialize>(path: &Path, value: &T) -> Result<(), VersionError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("json.tmp");
    let contents = serde_json::to_vec_pretty(value).expect("version ledger always serializes");
    {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(&contents)?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// The four ledgers that make up the optional versioning subsystem,
/// loaded together and saved together so a caller never has one without
/// the others.
pub struct Ledger {
    dir: std::path::PathBuf,
    pub state: VersionState,
    pub tags: Tags,
    pub branches: Branches,
    pub rollback_history: RollbackHistory,
}

impl Ledger {
    #[must_use]
    pub fn load(versions_dir: impl Into<std::path::PathBuf>) -> Self {
        let dir = versions_dir.into();
        Self {
            state: load(&dir.join("version_state.json")),
            tags: load(&dir.join("tags.json")),
            branches: load(&dir.join("branches.json")),
            rollback_history: load(&dir.join("rollback_history.json")),
            dir,
        }
    }

    pub fn save(&self) -> Result<(), VersionError> {
        save(&self.dir.join("version_state.json"), &self.state)?;
        save(&self.dir.join("tags.json"), &self.tags)?;
        save(&self.dir.join("branches.json"), &self.branches)?;
        save(&self.dir.join("rollback_history.json"), &self.rollback_history)?;
        Ok(())
    }

    /// Compute and record the next version on `branch`.
    pub fn record_version(
        &mut self,
        branch: &str,
        increment: Increment,
        artifact_name: String,
        created_at: DateTime<Utc>,
        tags: Vec<String>,
        description: Option<String>,
        parent: Option<String>,
    ) -> String {
        let current = self.state.current.entry(branch.to_owned()).or_default();
        let next = current.apply(increment);
        *current = next;
        let version_string = format_version(next, branch, created_at);

        for tag in &tags {
            self.tags
                .0
                .entry(tag.clone())
                .or_default()
                .insert(version_string.clone());
        }

        let branch_info = self.branches.0.entry(branch.to_owned()).or_default();
        branch_info.backup_count += 1;
        branch_info.latest_at = Some(created_at);
        if description.is_some() {
            branch_info.description.clone_from(&description);
        }

        self.state.entries.push(VersionEntry {
            version_string: version_string.clone(),
            artifact_name,
            branch: branch.to_owned(),
            created_at,
            tags,
            description,
            parent,
        });
        version_string
    }

    /// Record an explicitly-supplied version string (as opposed to one
    /// computed by [`Ledger::record_version`]) against `branch`, updating
    /// tags and the branch summary the same way. Does not touch the
    /// branch's `Triple` counter, since the caller's string need not follow
    /// the `M.m.p` scheme.
    pub fn record_explicit_version(
        &mut self,
        branch: &str,
        version_string: String,
        artifact_name: String,
        created_at: DateTime<Utc>,
        tags: Vec<String>,
        description: Option<String>,
        parent: Option<String>,
    ) {
        for tag in &tags {
            self.tags
                .0
                .entry(tag.clone())
                .or_default()
                .insert(version_string.clone());
        }

        let branch_info = self.branches.0.entry(branch.to_owned()).or_default();
        branch_info.backup_count += 1;
        branch_info.latest_at = Some(created_at);
        if description.is_some() {
            branch_info.description.clone_from(&description);
        }

        self.state.entries.push(VersionEntry {
            version_string,
            artifact_name,
            branch: branch.to_owned(),
            created_at,
            tags,
            description,
            parent,
        });
    }

    #[must_use]
    pub fn find(&self, version_string: &str) -> Option<&VersionEntry> {
        self.state
            .entries
            .iter()
            .find(|entry| entry.version_string == version_string)
    }

    /// The most recently recorded version on `branch`, if any — used as
    /// the `parent` reference for a new version entry.
    #[must_use]
    pub fn find_latest_on_branch(&self, branch: &str) -> Option<&str> {
        self.state
            .entries
            .iter()
            .rev()
            .find(|entry| entry.branch == branch)
            .map(|entry| entry.version_string.as_str())
    }

    /// Record a completed rollback.
    pub fn record_rollback(&mut self, timestamp: DateTime<Utc>, target_version: String, safety_backup_name: String) {
        self.rollback_history.0.push(RollbackEntry {
            timestamp,
            target_version,
            safety_backup_name,
        });
    }

    /// Versions to delete, keeping the newest `keep_per_branch` per
    /// branch and never dropping the most recent on its branch or any
    /// tagged version.
    #[must_use]
    pub fn cleanup_plan(&self, keep_per_branch: usize) -> Vec<String> {
        let tagged: HashSet<&str> = self
            .tags
            .0
            .values()
            .flat_map(|versions| versions.iter().map(String::as_str))
            .collect();

        let mut by_branch: HashMap<&str, Vec<&VersionEntry>> = HashMap::new();
        for entry in &self.state.entries {
            by_branch.entry(entry.branch.as_str()).or_default().push(entry);
        }

        let mut to_delete = Vec::new();
        for entries in by_branch.values_mut() {
            entries.sort_by_key(|entry| std::cmp::Reverse(entry.created_at));
            for (index, entry) in entries.iter().enumerate() {
                let is_newest = index == 0;
                let is_tagged = tagged.contains(entry.version_string.as_str());
                if index >= keep_per_branch && !is_newest && !is_tagged {
                    to_delete.push(entry.version_string.clone());
                }
            }
        }
        to_delete
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        "2026-07-27T12:00:00Z".parse().unwrap()
    }

    #[test]
    fn format_version_matches_expected_shape() {
        let version = format_version(Triple { major: 1, minor: 2, patch: 3 }, "main", now());
        assert_eq!(version, "1.2.3-main.20260727_120000");
    }

    #[test]
    fn triple_apply_major_resets_minor_and_patch() {
        let t = Triple { major: 1, minor: 4, patch: 9 };
        assert_eq!(t.apply(Increment::Major), Triple { major: 2, minor: 0, patch: 0 });
    }

    #[test]
    fn record_version_advances_branch_and_updates_branch_summary() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut ledger = Ledger::load(dir.path());
        let v1 = ledger.record_version(
            "main",
            Increment::Minor,
            "a1".to_owned(),
            now(),
            vec!["stable".to_owned()],
            Some("first cut".to_owned()),
            None,
        );
        assert_eq!(v1, "0.1.0-main.20260727_120000");
        assert_eq!(ledger.branches.0["main"].backup_count, 1);
        assert!(ledger.tags.0["stable"].contains(&v1));
    }

    #[test]
    fn record_explicit_version_is_found_and_updates_branch_summary() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut ledger = Ledger::load(dir.path());
        ledger.record_explicit_version(
            "main",
            "custom-1".to_owned(),
            "a1".to_owned(),
            now(),
            vec!["stable".to_owned()],
            None,
            None,
        );
        assert!(ledger.find("custom-1").is_some());
        assert_eq!(ledger.branches.0["main"].backup_count, 1);
        assert!(ledger.tags.0["stable"].contains("custom-1"));
    }

    #[test]
    fn cleanup_plan_keeps_newest_and_tagged_versions() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut ledger = Ledger::load(dir.path());
        for (i, tag) in [("v1", Some("release")), ("v2", None), ("v3", None)] {
            ledger.state.entries.push(VersionEntry {
                version_string: i.to_owned(),
                artifact_name: i.to_owned(),
                branch: "main".to_owned(),
                created_at: now() - chrono::Duration::days(i.len() as i64),
                tags: Vec::new(),
                description: None,
                parent: None,
            });
            if let Some(tag) = tag {
                ledger.tags.0.entry(tag.to_owned()).or_default().insert(i.to_owned());
            }
        }
        let to_delete = ledger.cleanup_plan(1);
        assert!(!to_delete.contains(&"v1".to_owned())); // tagged
    }

    #[test]
    fn rollback_history_records_entries() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut ledger = Ledger::load(dir.path());
        ledger.record_rollback(now(), "1.0.0-main.20260101_000000".to_owned(), "safety-1".to_owned());
        assert_eq!(ledger.rollback_history.0.len(), 1);
    }

    #[test]
    fn ledger_round_trips_through_disk() {
        let dir = tempfile::TempDir::new().unwrap();
        {
            let mut ledger = Ledger::load(dir.path());
            ledger.record_version("main", Increment::Patch, "a".to_owned(), now(), vec![], None, None);
            ledger.save().unwrap();
        }
        let reloaded = Ledger::load(dir.path());
        assert_eq!(reloaded.state.entries.len(), 1);
    }
}
