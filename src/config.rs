//! `provision.toml` loading
//!
//! Lookup order: `--config`, `PROVISION_CONFIG`, `<config_dir>/provision.toml`,
//! then built-in defaults. Every field is optional.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlbatch::RetryPolicy;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::paths;

/// Environment variable naming an explicit config file
pub const ENV_CONFIG: &str = "PROVISION_CONFIG";

const CONFIG_FILE: &str = "provision.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProvisionConfig {
    /// Directory holding the store file; defaults to the state dir
    pub state_dir: Option<String>,
    /// Store file name inside the state directory
    pub store_file: String,
    /// Prefix of generated run ids
    pub run_id_prefix: String,
    /// TOML file with secret values for redacted columns
    pub secrets_file: Option<String>,
    pub retry: RetryConfig,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            state_dir: None,
            store_file: "store.json".to_string(),
            run_id_prefix: "provision".to_string(),
            secrets_file: None,
            retry: RetryConfig::default(),
        }
    }
}

/// Bounded retry for batches against a locked database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    pub attempts: u32,
    pub delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            attempts: policy.max_attempts,
            delay_ms: policy.delay.as_millis() as u64,
        }
    }
}

impl ProvisionConfig {
    /// Load the config, returning it with the file it came from
    pub fn load(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        let Some(path) = Self::locate(explicit)? else {
            log::debug!("No config file, using defaults");
            return Ok((Self::default(), None));
        };
        let config = Self::load_from(&path)?;
        Ok((config, Some(path)))
    }

    fn locate(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            return Ok(Some(path.to_path_buf()));
        }
        if let Ok(path) = std::env::var(ENV_CONFIG) {
            return Ok(Some(paths::expand(&path)));
        }
        let default = paths::config_dir()?.join(CONFIG_FILE);
        Ok(default.exists().then_some(default))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        let config = toml::from_str(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn state_path(&self) -> Result<PathBuf> {
        match &self.state_dir {
            Some(dir) => Ok(paths::expand(dir)),
            None => paths::state_dir(),
        }
    }

    pub fn store_path(&self) -> Result<PathBuf> {
        Ok(self.state_path()?.join(&self.store_file))
    }

    pub fn secrets_path(&self) -> Option<PathBuf> {
        self.secrets_file.as_deref().map(paths::expand)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.attempts,
            Duration::from_millis(self.retry.delay_ms),
        )
    }

    /// Fresh run id, unique per second
    pub fn new_run_id(&self) -> String {
        format!(
            "{}-{}",
            self.run_id_prefix,
            chrono::Utc::now().format("%Y%m%dT%H%M%S")
        )
    }
}
