//! Centralized path resolution for provision
//!
//! # Environment Variables
//!
//! - `PROVISION_CONFIG_DIR` - Override config directory
//! - `PROVISION_STATE_DIR` - Override state directory (store file, plans)
//! - `PROVISION_CONFIG` - Explicit config file, see [`crate::config`]
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `PROVISION_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/provision` (if set)
//! 3. Platform default:
//!    - Windows: `%APPDATA%\provision`
//!    - macOS/Linux: `~/.config/provision`
//!
//! For state_dir():
//! 1. `PROVISION_STATE_DIR` environment variable
//! 2. `XDG_STATE_HOME/provision` (if set)
//! 3. Platform default:
//!    - Windows: `%LOCALAPPDATA%\provision`
//!    - macOS/Linux: `~/.local/state/provision`

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "PROVISION_CONFIG_DIR";

/// Environment variable for state directory override
pub const ENV_STATE_DIR: &str = "PROVISION_STATE_DIR";

const APP_DIR: &str = "provision";

/// Get the provision config directory path
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = expand(&dir);
        log::debug!(
            "Using config dir from {}: {}",
            ENV_CONFIG_DIR,
            path.display()
        );
        return Ok(path);
    }

    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg_config).join(APP_DIR);
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    #[cfg(windows)]
    {
        if let Some(app_data) = dirs::config_dir() {
            let path = app_data.join(APP_DIR);
            log::debug!("Using Windows config dir: {}", path.display());
            return Ok(path);
        }
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".config").join(APP_DIR);
    log::debug!("Using default config dir: {}", path.display());
    Ok(path)
}

/// Get the provision state directory path
pub fn state_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_STATE_DIR) {
        let path = expand(&dir);
        log::debug!("Using state dir from {}: {}", ENV_STATE_DIR, path.display());
        return Ok(path);
    }

    if let Ok(xdg_state) = std::env::var("XDG_STATE_HOME") {
        let path = PathBuf::from(xdg_state).join(APP_DIR);
        log::debug!("Using XDG_STATE_HOME: {}", path.display());
        return Ok(path);
    }

    #[cfg(windows)]
    {
        if let Some(local_app_data) = dirs::data_local_dir() {
            let path = local_app_data.join(APP_DIR);
            log::debug!("Using Windows state dir: {}", path.display());
            return Ok(path);
        }
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".local").join("state").join(APP_DIR);
    log::debug!("Using default state dir: {}", path.display());
    Ok(path)
}

/// Expand ~ and environment variables in a path string.
///
/// Unknown variables are left as written.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    /// Run `f` with `key` set to `value`, restoring the previous value after.
    ///
    /// # Safety
    /// Uses env::set_var/remove_var; only call from tests that own `key`.
    fn with_env_var<F, R>(key: &str, value: &str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let original = env::var(key).ok();
        // SAFETY: no other test reads this variable
        unsafe { env::set_var(key, value) };
        let result = f();
        match original {
            // SAFETY: as above
            Some(v) => unsafe { env::set_var(key, v) },
            None => unsafe { env::remove_var(key) },
        }
        result
    }

    #[test]
    fn test_config_dir_env_override() {
        with_env_var(ENV_CONFIG_DIR, "/custom/provision/config", || {
            assert_eq!(
                config_dir().unwrap(),
                PathBuf::from("/custom/provision/config")
            );
        });
    }

    #[test]
    fn test_state_dir_env_override_with_tilde() {
        let home = dirs::home_dir().unwrap();
        with_env_var(ENV_STATE_DIR, "~/provision-state-test", || {
            assert_eq!(state_dir().unwrap(), home.join("provision-state-test"));
        });
    }

    #[test]
    fn test_expand_tilde() {
        let home = dirs::home_dir().unwrap();
        assert_eq!(expand("~/plans"), home.join("plans"));
    }

    #[test]
    fn test_expand_plain_path_is_unchanged() {
        assert_eq!(expand("/var/lib/provision"), PathBuf::from("/var/lib/provision"));
    }

    #[test]
    fn test_expand_unknown_var_is_kept() {
        let path = expand("$PROVISION_SURELY_UNSET_VAR/x");
        assert_eq!(path, PathBuf::from("$PROVISION_SURELY_UNSET_VAR/x"));
    }
}
