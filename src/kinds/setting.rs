//! `setting`: one value under `settings/<path>`.
//!
//! Work items carry the value themselves; no snapshot is needed.

use anyhow::Context;
use declarative::{
    ApplyContext, Change, Collaborator, Entity, Filter, Reader, ReconstructContext,
};
use wirekit::{WireBuffer, WireReader};

use super::Source;

pub const SUBTREE: &str = "settings";

#[derive(Debug, Default)]
pub struct SettingKind;

fn store_path(key: &str) -> String {
    format!("{SUBTREE}/{key}")
}

impl Collaborator for SettingKind {
    type Spec = String;

    fn kind(&self) -> &'static str {
        "setting"
    }

    fn subtree(&self) -> &str {
        SUBTREE
    }

    fn describe(&self, change: Change, entity: &Entity<String>) -> String {
        match change {
            Change::Install => format!("set {} = {}", entity.key, entity.spec),
            Change::Uninstall => format!("remove setting {}", entity.key),
        }
    }

    fn encode_spec(&self, value: &String, out: &mut WireBuffer) -> wirekit::Result<()> {
        out.append_text(value)
    }

    fn decode_spec(
        &self,
        _key: &str,
        reader: &mut WireReader<'_>,
        _ctx: &mut ReconstructContext<'_, '_>,
    ) -> anyhow::Result<String> {
        Ok(reader.read_text()?)
    }

    fn install(&self, ctx: &mut ApplyContext<'_>, entity: &Entity<String>) -> anyhow::Result<()> {
        ctx.store
            .set(&store_path(&entity.key), &entity.spec)
            .with_context(|| format!("Failed to write setting {}", entity.key))
    }

    fn uninstall(&self, ctx: &mut ApplyContext<'_>, entity: &Entity<String>) -> anyhow::Result<()> {
        let removed = ctx.store.delete(&store_path(&entity.key))?;
        if !removed {
            log::debug!("Setting {} was already gone", entity.key);
        }
        Ok(())
    }
}

impl Reader<Source<'_>> for SettingKind {
    fn read(&self, source: &Source<'_>, _filter: &Filter) -> anyhow::Result<Vec<Entity<String>>> {
        Ok(source
            .manifest
            .setting
            .iter()
            .map(|decl| {
                source.entity(
                    &decl.path,
                    &decl.component,
                    &store_path(&decl.path),
                    decl.value.clone(),
                )
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{Manifest, SettingDecl};
    use declarative::{ConfigStore, CurrentState, MemoryStore, Operation, RequestedAction};

    fn manifest() -> Manifest {
        Manifest {
            setting: vec![
                SettingDecl {
                    path: "editor/theme".to_string(),
                    value: "dark".to_string(),
                    component: "core".to_string(),
                },
                SettingDecl {
                    path: "editor/font".to_string(),
                    value: "mono".to_string(),
                    component: "core".to_string(),
                },
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_read_reports_current_state() {
        let manifest = manifest();
        let mut store = MemoryStore::new();
        store.set("settings/editor/font", "serif").unwrap();
        let source = Source {
            manifest: &manifest,
            store: &store,
            operation: Operation::Repair,
        };

        let entities = SettingKind.read(&source, &Filter::all()).unwrap();
        assert_eq!(entities[0].current, CurrentState::Absent);
        assert_eq!(entities[1].current, CurrentState::Present);
        assert!(entities.iter().all(|e| e.requested == RequestedAction::Reinstall));
        assert_eq!(entities[1].spec, "mono");
    }

    #[test]
    fn test_install_and_uninstall() {
        let mut store = MemoryStore::new();
        let entity = Entity::new("editor/theme", "core", "dark".to_string());
        {
            let mut ctx = ApplyContext::new(&mut store);
            SettingKind.install(&mut ctx, &entity).unwrap();
        }
        assert_eq!(store.get("settings/editor/theme"), Some("dark".to_string()));
        {
            let mut ctx = ApplyContext::new(&mut store);
            SettingKind.uninstall(&mut ctx, &entity).unwrap();
            // Removing twice is fine
            SettingKind.uninstall(&mut ctx, &entity).unwrap();
        }
        assert!(!store.exists("settings/editor/theme"));
    }

    #[test]
    fn test_describe() {
        let entity = Entity::new("editor/theme", "core", "dark".to_string());
        assert_eq!(
            SettingKind.describe(Change::Install, &entity),
            "set editor/theme = dark"
        );
        assert_eq!(
            SettingKind.describe(Change::Uninstall, &entity),
            "remove setting editor/theme"
        );
    }
}
