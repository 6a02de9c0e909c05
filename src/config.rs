use std::path::PathBuf;

pub const DB_FILE: &str = "jobsearch.db";

/// Settings resolved once at startup and passed down explicitly.
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub log_level: String,
}

impl Config {
    /// `db` and `log_level` come from the command line (or their env vars);
    /// anything missing falls back to the defaults.
    pub fn resolve(db: Option<PathBuf>, log_level: Option<String>, verbose: bool) -> Self {
        let db_path = db.unwrap_or_else(default_db_path);
        let log_level = match (log_level, verbose) {
            (_, true) => "debug".to_string(),
            (Some(level), false) => level,
            (None, false) => "warn".to_string(),
        };
        Self { db_path, log_level }
    }
}

pub fn default_db_path() -> PathBuf {
    // Use XDG data directory or fallback
    if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "apptrack") {
        proj_dirs.data_dir().join(DB_FILE)
    } else {
        PathBuf::from(DB_FILE)
    }
}
