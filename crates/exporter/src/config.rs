//! Exporter service configuration
//!
//! Built-in defaults, then an optional settings file, then values given on
//! the command line or through their environment variables.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_SERVICE_ACCOUNT_FILE: &str = "~/.google-service-account.json";
pub const DEFAULT_INTERVAL_SECS: u64 = 60;

/// Exporter service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ExporterConfig {
    /// Metrics server listen address; empty disables the server
    #[serde(default)]
    pub listen: String,

    /// Seconds between data refreshes
    #[serde(default = "default_interval")]
    pub interval: u64,

    /// Path to the service account JSON file
    #[serde(default = "default_service_account_file")]
    pub service_account_file: String,
}

fn default_interval() -> u64 {
    DEFAULT_INTERVAL_SECS
}

fn default_service_account_file() -> String {
    DEFAULT_SERVICE_ACCOUNT_FILE.to_string()
}

/// Values given explicitly on the command line or in the environment
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub file: Option<PathBuf>,
    pub listen: Option<String>,
    pub interval: Option<u64>,
    pub service_account_file: Option<PathBuf>,
}

impl ExporterConfig {
    pub fn load(overrides: &ConfigOverrides) -> Result<Self> {
        let mut builder = config::Config::builder()
            .set_default("listen", "")?
            .set_default("interval", DEFAULT_INTERVAL_SECS)?
            .set_default("service_account_file", DEFAULT_SERVICE_ACCOUNT_FILE)?;

        if let Some(file) = &overrides.file {
            builder = builder.add_source(config::File::from(file.as_path()).required(true));
        }

        let config = builder
            .set_override_option("listen", overrides.listen.clone())?
            .set_override_option("interval", overrides.interval)?
            .set_override_option(
                "service_account_file",
                overrides
                    .service_account_file
                    .as_ref()
                    .map(|p| p.to_string_lossy().into_owned()),
            )?
            .build()
            .context("could not load configuration")?;

        let config: Self = config
            .try_deserialize()
            .context("invalid configuration")?;
        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.interval == 0 {
            bail!("interval must be at least one second");
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval)
    }

    /// Service account path with a leading `~` expanded
    pub fn service_account_path(&self) -> PathBuf {
        expand_home(&self.service_account_file)
    }
}

/// Expand a leading `~` to `$HOME`; other paths are returned unchanged
pub fn expand_home(path: &str) -> PathBuf {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    match (path, home) {
        ("~", Some(home)) => home,
        (p, Some(home)) if p.starts_with("~/") => home.join(&p[2..]),
        (p, _) => Path::new(p).to_path_buf(),
    }
}
