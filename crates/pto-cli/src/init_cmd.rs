//! `pto init`: write a starter config file at `$XDG_CONFIG_HOME/pto/config.toml`.

use anyhow::{Context, Result, bail};

use crate::config::{ConfigFile, DatabaseSection, OrchestratorSection, config_path, save_config};
use pto_db::config::DbConfig;

pub fn run_init(db_url: Option<&str>, force: bool) -> Result<()> {
    let path = config_path();
    if path.exists() && !force {
        bail!(
            "config file already exists at {}; pass --force to overwrite",
            path.display()
        );
    }

    let config = ConfigFile {
        database: DatabaseSection {
            url: db_url.unwrap_or(DbConfig::DEFAULT_URL).to_string(),
        },
        orchestrator: OrchestratorSection::default(),
    };

    save_config(&config).context("failed to write config file")?;
    println!("Wrote config file to {}", config_path().display());
    Ok(())
}
