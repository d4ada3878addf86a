use std::env;
use std::path::PathBuf;

use crate::error::{Result, SyncError};

pub const DEFAULT_TABLE: &str = "nfl";
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Process configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub store_url: String,
    pub store_key: String,
    pub table: String,
    pub batch_size: usize,
    /// Where backup and fallback CSV files go.
    pub artifact_dir: PathBuf,
}

impl Config {
    /// Reads the environment. The store URL and key are required; without
    /// them nothing runs.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| SyncError::config(format!("{} not set", name)))
        };

        let store_url = required("SUPABASE_URL")?;
        let store_key = required("SUPABASE_ANON_KEY")?;

        let batch_size = match lookup("SYNC_BATCH_SIZE") {
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .map_err(|_| SyncError::config(format!("SYNC_BATCH_SIZE is not a number: '{}'", raw)))?,
            None => DEFAULT_BATCH_SIZE,
        };

        let config = Self {
            store_url,
            store_key,
            table: lookup("NFL_TABLE").unwrap_or_else(|| DEFAULT_TABLE.to_string()),
            batch_size,
            artifact_dir: lookup("ARTIFACT_DIR").map(PathBuf::from).unwrap_or_else(|| PathBuf::from(".")),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(SyncError::config("batch size must be greater than zero"));
        }
        if self.table.trim().is_empty() {
            return Err(SyncError::config("table name is empty"));
        }
        Ok(())
    }
}
