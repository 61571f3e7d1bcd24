//! Configuration file management for pto.
//!
//! Provides a TOML-based config file at `~/.config/pto/config.toml` and a
//! resolution chain: CLI flag > env var > config file > default.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use pto_core::orchestrator::OrchestratorConfig;
use pto_db::config::DbConfig;

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigFile {
    pub database: DatabaseSection,
    #[serde(default)]
    pub orchestrator: OrchestratorSection,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DatabaseSection {
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OrchestratorSection {
    pub heartbeat_timeout_secs: u64,
    pub retry_max: u32,
    pub concurrency_cap: usize,
    pub cancel_grace_secs: u64,
    pub significance_threshold: f32,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        let d = OrchestratorConfig::default();
        Self {
            heartbeat_timeout_secs: d.heartbeat_timeout.as_secs(),
            retry_max: d.retry_max,
            concurrency_cap: d.concurrency_cap,
            cancel_grace_secs: d.cancel_grace.as_secs(),
            significance_threshold: d.significance_threshold,
        }
    }
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the pto config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/pto` or `~/.config/pto`. We
/// intentionally ignore the platform-specific `dirs::config_dir()` (which
/// returns `~/Library/Application Support` on macOS).
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("pto");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("pto")
}

/// Return the path to the pto config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file. Returns an error if it does not exist.
pub fn load_config() -> Result<ConfigFile> {
    let path = config_path();
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&contents).context("failed to parse config file")?;
    Ok(config)
}

/// Serialize and write the config file, creating parent dirs as needed.
pub fn save_config(config: &ConfigFile) -> Result<()> {
    let path = config_path();
    let dir = config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(&path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    Ok(())
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Fully resolved configuration, ready for use.
#[derive(Debug)]
pub struct PtoConfig {
    pub db_config: DbConfig,
    pub orchestrator: OrchestratorConfig,
}

impl PtoConfig {
    /// Resolve configuration using the chain: CLI flag > env var > config
    /// file > default.
    ///
    /// - DB URL: `cli_db_url` > `PTO_DATABASE_URL` env >
    ///   `config_file.database.url` > `DbConfig::DEFAULT_URL`.
    /// - Orchestrator tunables: env var > config file > compiled default.
    pub fn resolve(cli_db_url: Option<&str>) -> Result<Self> {
        let file_config = load_config().ok();

        let db_url = if let Some(url) = cli_db_url {
            url.to_string()
        } else if let Ok(url) = std::env::var("PTO_DATABASE_URL") {
            url
        } else if let Some(ref cfg) = file_config {
            cfg.database.url.clone()
        } else {
            DbConfig::DEFAULT_URL.to_string()
        };
        let db_config = DbConfig::new(db_url);

        let defaults = OrchestratorSection::default();
        let section = file_config.map(|c| c.orchestrator).unwrap_or(defaults);

        let heartbeat_timeout_secs = env_u64("PTO_HEARTBEAT_TIMEOUT_SECS")
            .unwrap_or(section.heartbeat_timeout_secs);
        let retry_max = env_u32("PTO_RETRY_MAX").unwrap_or(section.retry_max);
        let concurrency_cap =
            env_usize("PTO_CONCURRENCY_CAP").unwrap_or(section.concurrency_cap);
        let cancel_grace_secs =
            env_u64("PTO_CANCEL_GRACE_SECS").unwrap_or(section.cancel_grace_secs);
        let significance_threshold = env_f32("PTO_SIGNIFICANCE_THRESHOLD")
            .unwrap_or(section.significance_threshold);

        let orchestrator = OrchestratorConfig {
            heartbeat_timeout: Duration::from_secs(heartbeat_timeout_secs),
            retry_max,
            concurrency_cap,
            cancel_grace: Duration::from_secs(cancel_grace_secs),
            significance_threshold,
        };

        Ok(Self {
            db_config,
            orchestrator,
        })
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_u32(key: &str) -> Option<u32> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_f32(key: &str) -> Option<f32> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};

    fn lock_env() -> std::sync::MutexGuard<'static, ()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(())).lock().unwrap()
    }

    #[test]
    fn save_and_load_config_roundtrip() {
        let _lock = lock_env();
        let tmp = tempfile::TempDir::new().unwrap();
        let dir = tmp.path().join("pto");
        let path = dir.join("config.toml");

        let original = ConfigFile {
            database: DatabaseSection {
                url: "postgresql://testhost:5432/testdb".to_string(),
            },
            orchestrator: OrchestratorSection::default(),
        };

        std::fs::create_dir_all(&dir).unwrap();
        let contents = toml::to_string_pretty(&original).unwrap();
        std::fs::write(&path, &contents).unwrap();

        let loaded_contents = std::fs::read_to_string(&path).unwrap();
        let loaded: ConfigFile = toml::from_str(&loaded_contents).unwrap();

        assert_eq!(loaded.database.url, original.database.url);
        assert_eq!(
            loaded.orchestrator.retry_max,
            original.orchestrator.retry_max
        );
    }

    #[test]
    fn resolve_with_cli_flag_overrides_all() {
        let _lock = lock_env();
        unsafe { std::env::set_var("PTO_DATABASE_URL", "postgresql://env:5432/envdb") };

        let config = PtoConfig::resolve(Some("postgresql://cli:5432/clidb")).unwrap();
        assert_eq!(config.db_config.database_url, "postgresql://cli:5432/clidb");

        unsafe { std::env::remove_var("PTO_DATABASE_URL") };
    }

    #[test]
    fn resolve_with_env_var_overrides_default() {
        let _lock = lock_env();
        unsafe { std::env::set_var("PTO_DATABASE_URL", "postgresql://env:5432/envdb") };

        let config = PtoConfig::resolve(None).unwrap();
        assert_eq!(config.db_config.database_url, "postgresql://env:5432/envdb");

        unsafe { std::env::remove_var("PTO_DATABASE_URL") };
    }

    #[test]
    fn resolve_defaults_when_nothing_set() {
        let _lock = lock_env();
        unsafe { std::env::remove_var("PTO_DATABASE_URL") };

        let config = PtoConfig::resolve(None).unwrap();
        assert_eq!(config.db_config.database_url, DbConfig::DEFAULT_URL);
        assert_eq!(config.orchestrator.retry_max, 2);
    }

    #[test]
    fn config_path_ends_with_expected_filename() {
        let path = config_path();
        assert!(
            path.ends_with("pto/config.toml"),
            "unexpected config path: {}",
            path.display()
        );
    }
}
