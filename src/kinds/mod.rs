//! Resource kinds the installer knows about
//!
//! Each kind reads its manifest section plus the store's current state
//! during PLAN, and writes under its own store subtree during APPLY.

pub mod setting;
pub mod sql_script;
pub mod user;

use declarative::{Applier, ConfigStore, CurrentState, Entity, Operation, Planner, SecretSource};

use crate::manifest::Manifest;

pub use setting::SettingKind;
pub use sql_script::SqlScriptKind;
pub use user::UserKind;

/// What PLAN reads from: the manifest and a read-only view of the store
pub struct Source<'a> {
    pub manifest: &'a Manifest,
    pub store: &'a dyn ConfigStore,
    pub operation: Operation,
}

impl Source<'_> {
    /// Entity with current state from `path` and the run's requested action
    pub fn entity<S>(&self, key: &str, component: &str, path: &str, spec: S) -> Entity<S> {
        Entity::new(key, component, spec)
            .with_current(CurrentState::from_exists(self.store.exists(path)))
            .with_requested(self.operation.requested())
    }
}

/// Every kind, in planning order
#[derive(Debug, Default)]
pub struct Kinds {
    pub setting: SettingKind,
    pub user: UserKind,
    pub sql_script: SqlScriptKind,
}

impl Kinds {
    pub const NAMES: [&'static str; 3] = ["setting", "user", "sql_script"];

    pub fn planner<'s>(&self) -> Planner<'_, Source<'s>> {
        let mut planner = Planner::new();
        planner
            .register(&self.setting)
            .register(&self.user)
            .register(&self.sql_script);
        planner
    }

    pub fn applier<'r>(&'r self, secrets: &'r dyn SecretSource) -> Applier<'r> {
        let mut applier = Applier::new();
        applier
            .register(&self.setting)
            .register(&self.user)
            .register(&self.sql_script)
            .with_secrets(secrets);
        applier
    }
}
