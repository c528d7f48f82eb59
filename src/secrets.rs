//! Secret values for redacted snapshot columns
//!
//! Two sources, environment first:
//!
//! - `PROVISION_SECRET_<TABLE>_<ID>` (upper-cased, non-alphanumerics as `_`)
//! - a TOML file laid out as `[<table>.<column>]` with `<id> = "<value>"`

use anyhow::{Context, Result};
use declarative::SecretSource;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

const ENV_PREFIX: &str = "PROVISION_SECRET_";

type ColumnSecrets = HashMap<String, String>;

#[derive(Debug, Default)]
pub struct Secrets {
    file: HashMap<String, HashMap<String, ColumnSecrets>>,
}

impl Secrets {
    /// Environment only
    pub fn from_env() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read secrets file {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid secrets file {}", path.display()))
    }

    fn parse(content: &str) -> Result<Self> {
        let file = toml::from_str(content)?;
        Ok(Self { file })
    }

    fn file_value(&self, table: &str, column: &str, id: &str) -> Option<String> {
        self.file.get(table)?.get(column)?.get(id).cloned()
    }
}

/// `PROVISION_SECRET_<TABLE>_<ID>`
pub fn env_key(table: &str, id: &str) -> String {
    let mut key = String::from(ENV_PREFIX);
    for c in table.chars().chain(std::iter::once('_')).chain(id.chars()) {
        key.push(if c.is_ascii_alphanumeric() {
            c.to_ascii_uppercase()
        } else {
            '_'
        });
    }
    key
}

impl SecretSource for Secrets {
    fn resolve(&self, table: &str, column: &str, id: &str) -> anyhow::Result<Option<String>> {
        if let Ok(value) = std::env::var(env_key(table, id)) {
            log::debug!("Secret for {table}.{column} of {id} from environment");
            return Ok(Some(value));
        }
        Ok(self.file_value(table, column, id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_key_normalizes() {
        assert_eq!(env_key("user", "jane.doe"), "PROVISION_SECRET_USER_JANE_DOE");
        assert_eq!(env_key("sql_script", "a-b"), "PROVISION_SECRET_SQL_SCRIPT_A_B");
    }

    #[test]
    fn test_file_lookup() {
        let secrets = Secrets::parse(
            r#"
[user.password]
alice = "wonderland"
"#,
        )
        .unwrap();
        assert_eq!(
            secrets.resolve("user", "password", "alice").unwrap(),
            Some("wonderland".to_string())
        );
        assert_eq!(secrets.resolve("user", "password", "bob-file-only").unwrap(), None);
        assert_eq!(secrets.resolve("user", "pin", "alice").unwrap(), None);
    }

    #[test]
    fn test_env_wins_over_file() {
        let secrets = Secrets::parse("[user.password]\ncarol = \"from-file\"\n").unwrap();
        let key = env_key("user", "carol");
        // SAFETY: no other test reads this variable
        unsafe { std::env::set_var(&key, "from-env") };
        let value = secrets.resolve("user", "password", "carol").unwrap();
        // SAFETY: as above
        unsafe { std::env::remove_var(&key) };
        assert_eq!(value, Some("from-env".to_string()));
    }

    #[test]
    fn test_bad_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secrets.toml");
        fs::write(&path, "user = 3\n").unwrap();
        assert!(Secrets::load(&path).is_err());
    }
}
