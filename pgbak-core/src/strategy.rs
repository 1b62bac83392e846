//! Decide full vs incremental, and persist the running state across
//! invocations.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::Kind;

const HISTORY_LIMIT: usize = 50;
const AUTO_FULL_AGE_DAYS: i64 = 7;
const AUTO_FULL_INCREMENTAL_COUNT: u32 = 5;

/// Default exec deadline for `pg_dump`.
pub const DUMP_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// What the caller asked for on the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Requested {
    Auto,
    Full,
    Incremental,
}

/// What the engine decided, and why, when it differs from what was asked.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Decision {
    pub kind: Kind,
    pub upgraded_reason: Option<&'static str>,
}

impl Decision {
    /// Lowercase label used when deriving a default artifact name.
    #[must_use]
    pub fn kind_str(&self) -> &'static str {
        match self.kind {
            Kind::Full => "full",
            Kind::Incremental => "incremental",
        }
    }
}

/// Persisted state at `<backup_dir>/.metadata/backup_state.json`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct State {
    pub last_full_at: Option<DateTime<Utc>>,
    pub incrementals_since_full: u32,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub name: String,
    pub kind: Kind,
    pub created_at: DateTime<Utc>,
    pub byte_size: u64,
}

impl State {
    /// Load state from disk, reinitializing empty on any parse failure —
    /// corruption here is non-fatal.
    pub fn load(path: &Path) -> Self {
        fs::read_to_string(path)
            .ok()
            .and_then(|contents| serde_json::from_str(&contents).ok())
            .unwrap_or_default()
    }

    /// Write state atomically (write to `.tmp`, then rename).
    pub fn save(&self, path: &Path) -> Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp_path = path.with_extension("json.tmp");
        let contents = serde_json::to_vec_pretty(self).expect("State always serializes");
        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(&contents)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, path)
    }

    /// Reconcile stale state against the sidecars actually on disk: if the
    /// newest sidecar's mtime is newer than this state file's mtime, the
    /// previous invocation crashed between payload completion and state
    /// update. Rebuild the counters from history.
    pub fn reconcile_if_stale(
        &mut self,
        state_path: &Path,
        newest_sidecar_mtime: Option<std::time::SystemTime>,
    ) {
        let state_mtime = fs::metadata(state_path).and_then(|meta| meta.modified()).ok();
        let stale = match (newest_sidecar_mtime, state_mtime) {
            (Some(sidecar), Some(state)) => sidecar > state,
            (Some(_), None) => true,
            _ => false,
        };
        if !stale {
            return;
        }
        if let Some(last_full) = self
            .history
            .iter()
            .rev()
            .find(|entry| entry.kind == Kind::Full)
        {
            let last_full_at = last_full.created_at;
            let incrementals_since_full = self
                .history
                .iter()
                .rev()
                .take_while(|entry| entry.created_at >= last_full_at)
                .filter(|entry| entry.kind == Kind::Incremental)
                .count() as u32;
            self.last_full_at = Some(last_full_at);
            self.incrementals_since_full = incrementals_since_full;
        }
    }

    /// Append a completed backup to history and update the running
    /// counters.
    pub fn record(&mut self, name: String, kind: Kind, created_at: DateTime<Utc>, byte_size: u64) {
        self.history.push(HistoryEntry {
            name,
            kind,
            created_at,
            byte_size,
        });
        if self.history.len() > HISTORY_LIMIT {
            let excess = self.history.len() - HISTORY_LIMIT;
            self.history.drain(0..excess);
        }
        match kind {
            Kind::Full => {
                self.last_full_at = Some(created_at);
                self.incrementals_since_full = 0;
            }
            Kind::Incremental => self.incrementals_since_full += 1,
        }
    }
}

/// Decide full vs incremental for this invocation.
#[must_use]
pub fn decide(state: &State, requested: Requested, now: DateTime<Utc>) -> Decision {
    match requested {
        Requested::Full => Decision {
            kind: Kind::Full,
            upgraded_reason: None,
        },
        Requested::Incremental if state.last_full_at.is_none() => Decision {
            kind: Kind::Full,
            upgraded_reason: Some("no prior full backup exists"),
        },
        Requested::Incremental => Decision {
            kind: Kind::Incremental,
            upgraded_reason: None,
        },
        Requested::Auto => match state.last_full_at {
            None => Decision {
                kind: Kind::Full,
                upgraded_reason: Some("no prior full backup exists"),
            },
            Some(last_full_at) if (now - last_full_at).num_days() >= AUTO_FULL_AGE_DAYS => {
                Decision {
                    kind: Kind::Full,
                    upgraded_reason: Some("last full backup is 7 or more days old"),
                }
            }
            Some(_) if state.incrementals_since_full >= AUTO_FULL_INCREMENTAL_COUNT => Decision {
                kind: Kind::Full,
                upgraded_reason: Some("5 or more incrementals since the last full backup"),
            },
            Some(_) => Decision {
                kind: Kind::Incremental,
                upgraded_reason: None,
            },
        },
    }
}

/// Build the `pg_dump` argument vector for `kind`. The credential travels
/// via the environment, never argv; see `crate::config::redact_command_line`.
#[must_use]
pub fn pg_dump_args(kind: Kind, user: &str, db: &str) -> Vec<OsString> {
    let mut args = vec![
        OsString::from(format!("--username={user}")),
        OsString::from(format!("--dbname={db}")),
    ];
    match kind {
        Kind::Full => {
            args.push(OsString::from("--clean"));
            args.push(OsString::from("--create"));
            args.push(OsString::from("--verbose"));
        }
        Kind::Incremental => {
            args.push(OsString::from("--verbose"));
            args.push(OsString::from("--no-owner"));
            args.push(OsString::from("--no-privileges"));
        }
    }
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn now() -> DateTime<Utc> {
        "2026-07-27T12:00:00Z".parse().unwrap()
    }

    #[test]
    fn explicit_full_is_always_full() {
        let state = State::default();
        let decision = decide(&state, Requested::Full, now());
        assert_eq!(decision.kind, Kind::Full);
        assert!(decision.upgraded_reason.is_none());
    }

    #[test]
    fn incremental_with_no_prior_full_upgrades() {
        let state = State::default();
        let decision = decide(&state, Requested::Incremental, now());
        assert_eq!(decision.kind, Kind::Full);
        assert!(decision.upgraded_reason.is_some());
    }

    #[test]
    fn auto_with_recent_full_and_few_incrementals_stays_incremental() {
        let mut state = State::default();
        state.last_full_at = Some(now() - ChronoDuration::days(1));
        state.incrementals_since_full = 2;
        let decision = decide(&state, Requested::Auto, now());
        assert_eq!(decision.kind, Kind::Incremental);
    }

    #[test]
    fn auto_upgrades_when_full_is_stale() {
        let mut state = State::default();
        state.last_full_at = Some(now() - ChronoDuration::days(8));
        let decision = decide(&state, Requested::Auto, now());
        assert_eq!(decision.kind, Kind::Full);
    }

    #[test]
    fn auto_upgrades_after_five_incrementals() {
        let mut state = State::default();
        state.last_full_at = Some(now() - ChronoDuration::days(1));
        state.incrementals_since_full = 5;
        let decision = decide(&state, Requested::Auto, now());
        assert_eq!(decision.kind, Kind::Full);
    }

    #[test]
    fn record_resets_incremental_counter_on_full() {
        let mut state = State::default();
        state.incrementals_since_full = 3;
        state.record("b".to_owned(), Kind::Full, now(), 10);
        assert_eq!(state.incrementals_since_full, 0);
        assert_eq!(state.last_full_at, Some(now()));
    }

    #[test]
    fn record_increments_counter_on_incremental() {
        let mut state = State::default();
        state.record("a".to_owned(), Kind::Full, now(), 10);
        state.record("b".to_owned(), Kind::Incremental, now(), 5);
        assert_eq!(state.incrementals_since_full, 1);
    }

    #[test]
    fn pg_dump_args_full_includes_clean_and_create() {
        let args = pg_dump_args(Kind::Full, "postgres", "pc_db");
        assert!(args.contains(&OsString::from("--clean")));
        assert!(args.contains(&OsString::from("--create")));
    }

    #[test]
    fn pg_dump_args_incremental_drops_owner_and_privileges() {
        let args = pg_dump_args(Kind::Incremental, "postgres", "pc_db");
        assert!(args.contains(&OsString::from("--no-owner")));
        assert!(!args.contains(&OsString::from("--clean")));
    }
}
