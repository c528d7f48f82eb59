//! Install manifest: the declared entities, one TOML array per kind
//!
//! ```toml
//! [[setting]]
//! path = "editor/theme"
//! value = "dark"
//!
//! [[user]]
//! name = "alice"
//! full_name = "Alice Liddell"
//!
//! [[sql_script]]
//! name = "create-orders"
//! database = "shop"
//! install = "CREATE TABLE orders (id INT)\nGO"
//! uninstall = "DROP TABLE orders"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

fn default_component() -> String {
    "core".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub setting: Vec<SettingDecl>,
    #[serde(default)]
    pub user: Vec<UserDecl>,
    #[serde(default)]
    pub sql_script: Vec<SqlScriptDecl>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SettingDecl {
    /// Path below `settings/`
    pub path: String,
    pub value: String,
    #[serde(default = "default_component")]
    pub component: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserDecl {
    pub name: String,
    pub full_name: String,
    /// Only for throwaway setups; normally the password comes from secrets
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_component")]
    pub component: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SqlScriptDecl {
    pub name: String,
    pub database: String,
    pub install: String,
    #[serde(default)]
    pub uninstall: String,
    #[serde(default = "default_component")]
    pub component: String,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read manifest {}", path.display()))?;
        let manifest: Self = toml::from_str(&content)
            .with_context(|| format!("Invalid manifest {}", path.display()))?;
        manifest.validate()?;
        log::debug!(
            "Loaded manifest {}: {} settings, {} users, {} scripts",
            path.display(),
            manifest.setting.len(),
            manifest.user.len(),
            manifest.sql_script.len()
        );
        Ok(manifest)
    }

    fn validate(&self) -> Result<()> {
        check_unique("setting", self.setting.iter().map(|s| s.path.as_str()))?;
        check_unique("user", self.user.iter().map(|u| u.name.as_str()))?;
        check_unique("sql_script", self.sql_script.iter().map(|s| s.name.as_str()))?;
        for script in &self.sql_script {
            if script.name.contains('/') || script.database.contains('/') {
                anyhow::bail!("sql_script {}: names may not contain '/'", script.name);
            }
        }
        for user in &self.user {
            if user.name.contains('/') {
                anyhow::bail!("user {}: name may not contain '/'", user.name);
            }
        }
        Ok(())
    }
}

fn check_unique<'a>(kind: &str, keys: impl Iterator<Item = &'a str>) -> Result<()> {
    let mut seen = std::collections::HashSet::new();
    for key in keys {
        if key.is_empty() {
            anyhow::bail!("{kind}: empty key");
        }
        if !seen.insert(key) {
            anyhow::bail!("{kind} {key} is declared twice");
        }
    }
    Ok(())
}
