// ⚙️ Configuration - TOML file + environment overrides
//
// Priority order:
// 1. Environment variable
// 2. TOML config file
// 3. Compiled default

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_DATABASE: &str = "SAM_SYNC_DATABASE";
pub const ENV_MAX_CONCURRENCY: &str = "SAM_SYNC_MAX_CONCURRENCY";
pub const ENV_LOCK_TTL_SECS: &str = "SAM_SYNC_LOCK_TTL_SECS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// SQLite file holding every silver/gold collection
    pub database_path: PathBuf,

    /// Lease length for gold-layer locks
    pub lock_ttl_secs: u64,

    /// First backoff delay when a lock is busy
    pub lock_retry_initial_ms: u64,

    /// Backoff ceiling
    pub lock_retry_max_ms: u64,

    /// Attempts before the unit gives up with LockContention
    pub lock_max_attempts: u32,

    /// Holding identifiers processed at the same time
    pub max_concurrent_units: usize,

    /// Source label stamped on silver party-role relationships
    pub source: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            database_path: PathBuf::from("sam-sync.db"),
            lock_ttl_secs: 60,
            lock_retry_initial_ms: 25,
            lock_retry_max_ms: 2000,
            lock_max_attempts: 8,
            max_concurrent_units: 4,
            source: "SAM".to_string(),
        }
    }
}

impl SyncConfig {
    /// Load from an optional TOML file, then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => SyncConfig::default(),
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: SyncConfig = toml::from_str(content)?;
        Ok(config)
    }

    /// Environment lookup is injected so tests never touch process state
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(db) = lookup(ENV_DATABASE) {
            self.database_path = PathBuf::from(db);
        }

        if let Some(raw) = lookup(ENV_MAX_CONCURRENCY) {
            self.max_concurrent_units = raw
                .trim()
                .parse()
                .with_context(|| format!("{} must be a positive integer, got '{}'", ENV_MAX_CONCURRENCY, raw))?;
        }

        if let Some(raw) = lookup(ENV_LOCK_TTL_SECS) {
            self.lock_ttl_secs = raw
                .trim()
                .parse()
                .with_context(|| format!("{} must be seconds, got '{}'", ENV_LOCK_TTL_SECS, raw))?;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_units == 0 {
            bail!("max_concurrent_units must be at least 1");
        }
        if self.lock_ttl_secs == 0 {
            bail!("lock_ttl_secs must be at least 1");
        }
        if self.lock_max_attempts == 0 {
            bail!("lock_max_attempts must be at least 1");
        }
        if self.lock_retry_initial_ms > self.lock_retry_max_ms {
            bail!(
                "lock_retry_initial_ms ({}) exceeds lock_retry_max_ms ({})",
                self.lock_retry_initial_ms,
                self.lock_retry_max_ms
            );
        }
        Ok(())
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = SyncConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.source, "SAM");
        assert_eq!(config.lock_ttl(), Duration::from_secs(60));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = SyncConfig::from_toml(
            r#"
            database_path = "/var/lib/sam/sync.db"
            max_concurrent_units = 8
            "#,
        )
        .unwrap();

        assert_eq!(config.database_path, PathBuf::from("/var/lib/sam/sync.db"));
        assert_eq!(config.max_concurrent_units, 8);
        assert_eq!(config.lock_max_attempts, 8);
    }

    #[test]
    fn test_env_overrides_file() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_DATABASE, "/tmp/override.db"),
            (ENV_MAX_CONCURRENCY, " 2 "),
        ]);

        let mut config = SyncConfig::default();
        config
            .apply_env(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.database_path, PathBuf::from("/tmp/override.db"));
        assert_eq!(config.max_concurrent_units, 2);
    }

    #[test]
    fn test_bad_env_value_is_rejected() {
        let mut config = SyncConfig::default();
        let result = config.apply_env(|k| {
            if k == ENV_LOCK_TTL_SECS {
                Some("soon".to_string())
            } else {
                None
            }
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_concurrency_is_invalid() {
        let config = SyncConfig {
            max_concurrent_units: 0,
            ..SyncConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
