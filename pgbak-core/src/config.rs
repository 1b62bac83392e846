//! Resolve environment variables and overrides into a single [`Config`].
//!
//! Mirrors the CLI's own `#[clap(env = "...")]` defaults (see
//! `pgbak-cli/src/args.rs`) so that the library can be constructed and
//! tested without going through `clap` at all.

use std::path::PathBuf;

/// Database connection and backup-directory configuration.
///
/// `postgres_password` is deliberately excluded from `Debug` (see the
/// manual [`std::fmt::Debug`] impl below) so that it can never leak into a
/// log line via `{:?}` by accident.
#[derive(Clone)]
pub struct Config {
    pub postgres_user: String,
    pub postgres_password: String,
    pub postgres_db: String,
    pub backup_dir: PathBuf,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("postgres_user", &self.postgres_user)
            .field("postgres_password", &"<redacted>")
            .field("postgres_db", &self.postgres_db)
            .field("backup_dir", &self.backup_dir)
            .finish()
    }
}

impl Default for Config {
    /// `POSTGRES_USER=postgres`, `POSTGRES_PASSWORD=12345` (demo default;
    /// override in any real deployment), `POSTGRES_DB=pc_db`,
    /// `BACKUP_DIR=./backups`.
    fn default() -> Self {
        Self {
            postgres_user: "postgres".to_owned(),
            postgres_password: "12345".to_owned(),
            postgres_db: "pc_db".to_owned(),
            backup_dir: PathBuf::from("./backups"),
        }
    }
}

impl Config {
    /// Build a `Config` from the process environment, falling back to the
    /// documented defaults for any variable that is unset.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            postgres_user: std::env::var("POSTGRES_USER").unwrap_or(defaults.postgres_user),
            postgres_password: std::env::var("POSTGRES_PASSWORD")
                .unwrap_or(defaults.postgres_password),
            postgres_db: std::env::var("POSTGRES_DB").unwrap_or(defaults.postgres_db),
            backup_dir: std::env::var_os("BACKUP_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.backup_dir),
        }
    }
}

/// Redact `PGPASSWORD=...` and any value immediately following
/// `--password`/`--dbname`-style credential flags before a command line is
/// logged at verbose level.
#[must_use]
pub fn redact_command_line(parts: &[String]) -> String {
    let mut out = Vec::with_capacity(parts.len());
    let mut redact_next = false;
    for part in parts {
        if redact_next {
            out.push("<redacted>".to_owned());
            redact_next = false;
            continue;
        }
        if let Some((key, _value)) = part.split_once('=') {
            if key.eq_ignore_ascii_case("PGPASSWORD") || key == "--dbname" {
                out.push(format!("{key}=<redacted>"));
                continue;
            }
        }
        if part == "--password" || part == "--dbname" {
            redact_next = true;
        }
        out.push(part.clone());
    }
    out.join(" ")
}

#[cfg(test)]
mod tests {
    use super::redact_command_line;

    #[test]
    fn redacts_pgpassword_env_assignment() {
        let parts = vec!["PGPASSWORD=hunter2".to_owned(), "pg_dump".to_owned()];
        assert_eq!(redact_command_line(&parts), "PGPASSWORD=<redacted> pg_dump");
    }

    #[test]
    fn redacts_password_flag_value() {
        let parts = vec![
            "psql".to_owned(),
            "--password".to_owned(),
            "hunter2".to_owned(),
        ];
        assert_eq!(redact_command_line(&parts), "psql --password <redacted>");
    }

    #[test]
    fn redacts_dbname_flag_value() {
        let parts = vec![
            "psql".to_owned(),
            "--dbname".to_owned(),
            "pc_db".to_owned(),
        ];
        assert_eq!(redact_command_line(&parts), "psql --dbname <redacted>");
    }

    #[test]
    fn redacts_dbname_equals_assignment() {
        let parts = vec!["pg_dump".to_owned(), "--dbname=pc_db".to_owned()];
        assert_eq!(redact_command_line(&parts), "pg_dump --dbname=<redacted>");
    }

    #[test]
    fn leaves_unrelated_arguments_untouched() {
        let parts = vec!["pg_dump".to_owned(), "--verbose".to_owned()];
        assert_eq!(redact_command_line(&parts), "pg_dump --verbose");
    }
}
