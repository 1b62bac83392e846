//! On-disk layout for artifacts and their sidecars.
//!
//! ```text
//! <backup_dir>/
//!   <name>.sql
//!   .metadata/
//!     backup_state.json
//!     <name>.json
//!     .versions/
//!       version_state.json
//!       tags.json
//!       branches.json
//!       rollback_history.json
//! ```

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(thiserror::Error, miette::Diagnostic, Debug)]
pub enum StoreError {
    #[error("input/output error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("malformed sidecar for {0}: {1}")]
    MalformedSidecar(String, serde_json::Error),
    #[error("invalid artifact name {0:?}: {1}")]
    InvalidName(String, &'static str),
    #[error("artifact {0} not found")]
    NotFound(String),
    #[error("artifact {0} is invalid: {1}")]
    Invalid(String, String),
}

/// Metadata recorded alongside every artifact payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Sidecar {
    pub kind: Kind,
    pub created_at: DateTime<Utc>,
    pub target_identity: String,
    pub byte_size: u64,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_version: Option<String>,
    /// Keys written by a newer version of this tool (or a future one);
    /// preserved byte-for-byte on read-modify-write.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Full,
    Incremental,
}

/// One entry from [`Store::list`]: a payload with its parsed sidecar, or
/// `None` when the payload is legacy/unpaired.
#[derive(Clone, Debug)]
pub struct ArtifactInfo {
    pub name: String,
    pub path: PathBuf,
    pub mtime: SystemTime,
    pub sidecar: Option<Sidecar>,
}

/// The result of [`Store::resolve`]: the path to write to, and whether the
/// requested name had to be renamed to avoid a collision.
#[derive(Clone, Debug)]
pub struct Resolved {
    pub name: String,
    pub path: PathBuf,
    pub renamed_from: Option<String>,
}

#[derive(Clone, Debug)]
pub struct Store {
    pub backup_dir: PathBuf,
}

const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

impl Store {
    #[must_use]
    pub fn new(backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            backup_dir: backup_dir.into(),
        }
    }

    #[must_use]
    pub fn metadata_dir(&self) -> PathBuf {
        self.backup_dir.join(".metadata")
    }

    #[must_use]
    pub fn versions_dir(&self) -> PathBuf {
        self.metadata_dir().join(".versions")
    }

    #[must_use]
    pub fn lock_path(&self) -> PathBuf {
        self.metadata_dir().join(".lock")
    }

    #[must_use]
    pub fn state_path(&self) -> PathBuf {
        self.metadata_dir().join("backup_state.json")
    }

    #[must_use]
    pub fn payload_path(&self, name: &str) -> PathBuf {
        self.backup_dir.join(format!("{name}.sql"))
    }

    #[must_use]
    pub fn sidecar_path(&self, name: &str) -> PathBuf {
        self.metadata_dir().join(format!("{name}.json"))
    }

    pub fn ensure_dirs(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.backup_dir)?;
        fs::create_dir_all(self.metadata_dir())?;
        Ok(())
    }

    /// Validate a candidate artifact name: `[A-Za-z0-9._-]{1,255}`, not
    /// dot-leading, not a reserved platform device name.
    pub fn validate_name(name: &str) -> Result<(), StoreError> {
        let pattern = Regex::new(r"^[A-Za-z0-9._-]{1,255}$").expect("valid regex");
        if !pattern.is_match(name) {
            return Err(StoreError::InvalidName(
                name.to_owned(),
                "must match [A-Za-z0-9._-]{1,255}",
            ));
        }
        if name.starts_with('.') {
            return Err(StoreError::InvalidName(name.to_owned(), "must not start with '.'"));
        }
        let stem = name.split('.').next().unwrap_or(name);
        if RESERVED_NAMES.iter().any(|reserved| reserved.eq_ignore_ascii_case(stem)) {
            return Err(StoreError::InvalidName(name.to_owned(), "is a reserved platform name"));
        }
        Ok(())
    }

    /// Resolve a requested name to a concrete payload path, appending
    /// `_1`, `_2`, … on collision unless `overwrite` is set.
    pub fn resolve(&self, name: &str, overwrite: bool) -> Result<Resolved, StoreError> {
        Self::validate_name(name)?;
        let path = self.payload_path(name);
        if overwrite || !path.exists() {
            return Ok(Resolved {
                name: name.to_owned(),
                path,
                renamed_from: None,
            });
        }
        for suffix in 1u32.. {
            let candidate = format!("{name}_{suffix}");
            let candidate_path = self.payload_path(&candidate);
            if !candidate_path.exists() {
                return Ok(Resolved {
                    name: candidate,
                    path: candidate_path,
                    renamed_from: Some(name.to_owned()),
                });
            }
        }
        unreachable!("u32 space exhausted before a free artifact name was found")
    }

    /// List all artifacts, sidecar-paired or legacy, sorted by payload
    /// mtime descending.
    pub fn list(&self) -> Result<Vec<ArtifactInfo>, StoreError> {
        let mut entries = Vec::new();
        if !self.backup_dir.exists() {
            return Ok(entries);
        }
        for entry in fs::read_dir(&self.backup_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("sql") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            let mtime = entry.metadata()?.modified()?;
            let sidecar = self.read_sidecar(name)?;
            entries.push(ArtifactInfo {
                name: name.to_owned(),
                path,
                mtime,
                sidecar,
            });
        }
        entries.sort_by(|a, b| b.mtime.cmp(&a.mtime));
        Ok(entries)
    }

    /// Write `record` to `<name>.json` atomically (write to `.tmp`, then
    /// rename) so a reader never observes a half-written sidecar.
    pub fn write_sidecar(&self, name: &str, record: &Sidecar) -> Result<(), StoreError> {
        fs::create_dir_all(self.metadata_dir())?;
        let final_path = self.sidecar_path(name);
        let tmp_path = final_path.with_extension("json.tmp");
        let contents = serde_json::to_vec_pretty(record)
            .map_err(|err| StoreError::MalformedSidecar(name.to_owned(), err))?;
        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(&contents)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &final_path)?;
        Ok(())
    }

    pub fn read_sidecar(&self, name: &str) -> Result<Option<Sidecar>, StoreError> {
        let path = self.sidecar_path(name);
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&path)?;
        match serde_json::from_str(&contents) {
            Ok(sidecar) => Ok(Some(sidecar)),
            Err(_) => Ok(None), // corrupt sidecar: treat as legacy/unpaired, per §3 "Lifecycle"
        }
    }

    /// Validate that `name`'s payload looks like a real PostgreSQL dump:
    /// non-empty, readable, and containing a dump header or a top-level DDL
    /// keyword within the first 64 KiB.
    pub fn validate(&self, name: &str) -> Result<(), StoreError> {
        let path = self.payload_path(name);
        let mut file = File::open(&path).map_err(|_| StoreError::NotFound(name.to_owned()))?;
        let metadata = file.metadata()?;
        if metadata.len() == 0 {
            return Err(StoreError::Invalid(name.to_owned(), "payload is empty".to_owned()));
        }
        let mut buf = vec![0u8; 64 * 1024];
        let read = file.read(&mut buf)?;
        buf.truncate(read);
        let head = String::from_utf8_lossy(&buf);
        let looks_like_dump = head.lines().any(|line| {
            let trimmed = line.trim_start();
            trimmed.contains("PostgreSQL database dump")
                || ["CREATE", "ALTER", "SET", "COPY", "INSERT"]
                    .iter()
                    .any(|keyword| trimmed.starts_with(keyword))
        });
        if !looks_like_dump {
            return Err(StoreError::Invalid(
                name.to_owned(),
                "no recognizable PostgreSQL dump markers in the first 64 KiB".to_owned(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sidecar() -> Sidecar {
        Sidecar {
            kind: Kind::Full,
            created_at: Utc::now(),
            target_identity: "container:demo".to_owned(),
            byte_size: 42,
            tags: Vec::new(),
            version: None,
            branch: None,
            description: None,
            parent_version: None,
            extra: Map::new(),
        }
    }

    #[test]
    fn rejects_dot_leading_names() {
        assert!(Store::validate_name(".hidden").is_err());
    }

    #[test]
    fn rejects_reserved_platform_names() {
        assert!(Store::validate_name("NUL").is_err());
        assert!(Store::validate_name("nul.sql").is_err());
    }

    #[test]
    fn accepts_ordinary_names() {
        assert!(Store::validate_name("2026-07-27_full").is_ok());
    }

    #[test]
    fn resolve_renames_on_collision() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path());
        store.ensure_dirs().unwrap();
        File::create(store.payload_path("daily")).unwrap();
        let resolved = store.resolve("daily", false).unwrap();
        assert_eq!(resolved.name, "daily_1");
        assert_eq!(resolved.renamed_from.as_deref(), Some("daily"));
    }

    #[test]
    fn resolve_overwrite_keeps_name() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path());
        store.ensure_dirs().unwrap();
        File::create(store.payload_path("daily")).unwrap();
        let resolved = store.resolve("daily", true).unwrap();
        assert_eq!(resolved.name, "daily");
        assert!(resolved.renamed_from.is_none());
    }

    #[test]
    fn sidecar_round_trips_and_preserves_unknown_keys() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path());
        store.ensure_dirs().unwrap();
        let mut record = sidecar();
        record.extra.insert("future_field".to_owned(), Value::Bool(true));
        store.write_sidecar("demo", &record).unwrap();
        let raw = fs::read_to_string(store.sidecar_path("demo")).unwrap();
        assert!(raw.contains("future_field"));
        let read = store.read_sidecar("demo").unwrap().unwrap();
        assert_eq!(read.extra.get("future_field"), Some(&Value::Bool(true)));
    }

    #[test]
    fn validate_accepts_dump_header() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path());
        store.ensure_dirs().unwrap();
        fs::write(
            store.payload_path("demo"),
            "-- PostgreSQL database dump\n\nCREATE TABLE t (id int);\n",
        )
        .unwrap();
        assert!(store.validate("demo").is_ok());
    }

    #[test]
    fn validate_rejects_empty_payload() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path());
        store.ensure_dirs().unwrap();
        File::create(store.payload_path("empty")).unwrap();
        assert!(store.validate("empty").is_err());
    }

    #[test]
    fn validate_rejects_non_dump_content() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path());
        store.ensure_dirs().unwrap();
        fs::write(store.payload_path("junk"), "not a dump at all\n").unwrap();
        assert!(store.validate("junk").is_err());
    }

    #[test]
    fn list_sorts_by_mtime_descending() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path());
        store.ensure_dirs().unwrap();
        fs::write(store.payload_path("first"), "-- PostgreSQL database dump\n").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(10));
        fs::write(store.payload_path("second"), "-- PostgreSQL database dump\n").unwrap();
        let listed = store.list().unwrap();
        assert_eq!(listed[0].name, "second");
        assert_eq!(listed[1].name, "first");
    }
}
