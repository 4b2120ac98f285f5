use dirs::home_dir;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Maximum rows fetched per table per query.
pub const DEFAULT_ROW_CAP: usize = 1000;

const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub row_cap: usize,
    /// sqlx SQLite URL of the row store, e.g. `sqlite://rows.db`
    pub database_url: Option<String>,
    /// JSON fixture for the in-memory store
    pub fixture_path: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { row_cap: DEFAULT_ROW_CAP, database_url: None, fixture_path: None }
    }
}

impl EngineConfig {
    /// `<data dir>/config.json` (if any) overlaid with `DOCQUERY_*` environment variables.
    pub fn load() -> Self {
        let mut config = Self::load_from(&get_data_dir());
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    pub fn load_from(dir: &Path) -> Self {
        let path = dir.join(CONFIG_FILE);
        if !path.exists() {
            return Self::default();
        }
        match fs::read_to_string(&path).map(|text| serde_json::from_str::<EngineConfig>(&text)) {
            Ok(Ok(config)) => {
                info!("Loaded config from {}", path.display());
                config
            }
            Ok(Err(e)) => {
                warn!("Ignoring malformed {}: {}", path.display(), e);
                Self::default()
            }
            Err(e) => {
                warn!("Cannot read {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Overrides from `lookup` (normally the process environment).
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(raw) = lookup("DOCQUERY_ROW_CAP") {
            match raw.trim().parse::<usize>() {
                Ok(cap) if cap > 0 => self.row_cap = cap,
                _ => warn!("DOCQUERY_ROW_CAP must be a positive integer, got '{}'", raw),
            }
        }
        if let Some(url) = lookup("DOCQUERY_DATABASE_URL").filter(|s| !s.is_empty()) {
            self.database_url = Some(url);
        }
        if let Some(path) = lookup("DOCQUERY_FIXTURE").filter(|s| !s.is_empty()) {
            self.fixture_path = Some(PathBuf::from(path));
        }
    }
}

pub fn get_data_dir() -> PathBuf {
    // Try to get custom data directory from environment variable first
    if let Ok(custom_dir) = std::env::var("DOCQUERY_DATA_DIR") {
        let path = PathBuf::from(custom_dir);
        if path.is_absolute() {
            return path;
        }
    }

    // Default to ~/.docquery
    if let Some(mut hd) = home_dir() {
        hd.push(".docquery");
        return hd;
    }
    PathBuf::from(".")
}
