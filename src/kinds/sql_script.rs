//! `sql_script`: install/uninstall scripts run against a database modelled
//! in the store.
//!
//! Scripts travel in the `sql_script` snapshot and are split into batches
//! only at APPLY. Each executed batch is appended to
//! `databases/<db>/log/<n>`; an installed script is marked at
//! `databases/<db>/scripts/<name>` with its batch count. A database whose
//! `locked` entry is `"true"` answers busy, which the runner retries.

use anyhow::Context;
use declarative::{
    ApplyContext, Collaborator, ConfigStore, Entity, Filter, Reader, ReconstructContext, Table,
};
use sqlbatch::{BatchExecutor, run_script};
use wirekit::{SnapshotSpec, Value, WireBuffer, WireReader};

use super::Source;

pub const SUBTREE: &str = "databases";
pub const TABLE: &str = "sql_script";

const NAME: usize = 0;
const DATABASE: usize = 1;
const INSTALL: usize = 2;
const UNINSTALL: usize = 3;

#[derive(Debug, Default)]
pub struct SqlScriptKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    pub database: String,
    pub install_sql: String,
    pub uninstall_sql: String,
}

fn marker_path(database: &str, name: &str) -> String {
    format!("{SUBTREE}/{database}/scripts/{name}")
}

/// Batch executor that records each batch in the database's log
pub struct StoreBatchExecutor<'s> {
    store: &'s mut dyn ConfigStore,
    database: String,
}

impl<'s> StoreBatchExecutor<'s> {
    pub fn new(store: &'s mut dyn ConfigStore, database: &str) -> Self {
        Self {
            store,
            database: database.to_string(),
        }
    }

    fn log_path(&self) -> String {
        format!("{SUBTREE}/{}/log", self.database)
    }
}

impl BatchExecutor for StoreBatchExecutor<'_> {
    fn execute(&mut self, index: usize, batch: &str) -> sqlbatch::Result<()> {
        let lock = format!("{SUBTREE}/{}/locked", self.database);
        if self.store.get(&lock).as_deref() == Some("true") {
            return Err(sqlbatch::Error::Busy {
                message: format!("database {} is locked", self.database),
            });
        }

        let log = self.log_path();
        let seq = self.store.children(&log).len();
        self.store
            .set(&format!("{log}/{seq:06}"), batch)
            .map_err(|e| sqlbatch::Error::Execution {
                batch: index,
                message: format!("{e:#}"),
            })
    }
}

impl Collaborator for SqlScriptKind {
    type Spec = Script;

    fn kind(&self) -> &'static str {
        "sql_script"
    }

    fn subtree(&self) -> &str {
        SUBTREE
    }

    fn encode_spec(&self, _spec: &Script, _out: &mut WireBuffer) -> wirekit::Result<()> {
        Ok(())
    }

    fn decode_spec(
        &self,
        key: &str,
        _reader: &mut WireReader<'_>,
        ctx: &mut ReconstructContext<'_, '_>,
    ) -> anyhow::Result<Script> {
        let row = ctx.lookup(TABLE, NAME, &Value::from(key))?;
        Ok(Script {
            database: row.text(DATABASE)?.to_string(),
            install_sql: row.text(INSTALL)?.to_string(),
            uninstall_sql: row.text(UNINSTALL)?.to_string(),
        })
    }

    fn install(&self, ctx: &mut ApplyContext<'_>, entity: &Entity<Script>) -> anyhow::Result<()> {
        let script = &entity.spec;
        let retry = ctx.retry;
        let mut executor = StoreBatchExecutor::new(&mut *ctx.store, &script.database);
        let batches = run_script(&mut executor, &script.install_sql, &retry)?;
        log::debug!("Ran {batches} batches of {}", entity.key);
        ctx.store
            .set(&marker_path(&script.database, &entity.key), &batches.to_string())
            .with_context(|| format!("Failed to mark script {} installed", entity.key))
    }

    fn uninstall(&self, ctx: &mut ApplyContext<'_>, entity: &Entity<Script>) -> anyhow::Result<()> {
        let script = &entity.spec;
        let retry = ctx.retry;
        let mut executor = StoreBatchExecutor::new(&mut *ctx.store, &script.database);
        run_script(&mut executor, &script.uninstall_sql, &retry)?;
        ctx.store.delete(&marker_path(&script.database, &entity.key))?;
        Ok(())
    }

    /// One unit per batch of the install script
    fn cost(&self, entity: &Entity<Script>) -> u32 {
        let batches = sqlbatch::split(&entity.spec.install_sql).count();
        u32::try_from(batches).unwrap_or(u32::MAX).max(1)
    }
}

impl Reader<Source<'_>> for SqlScriptKind {
    fn read(&self, source: &Source<'_>, _filter: &Filter) -> anyhow::Result<Vec<Entity<Script>>> {
        Ok(source
            .manifest
            .sql_script
            .iter()
            .map(|decl| {
                let script = Script {
                    database: decl.database.clone(),
                    install_sql: decl.install.clone(),
                    uninstall_sql: decl.uninstall.clone(),
                };
                let marker = marker_path(&decl.database, &decl.name);
                source.entity(&decl.name, &decl.component, &marker, script)
            })
            .collect())
    }

    fn snapshot(
        &self,
        _source: &Source<'_>,
        entities: &[Entity<Script>],
    ) -> anyhow::Result<Option<Table>> {
        let mut table = Table::new(SnapshotSpec::new(TABLE, 4).lookup(NAME));
        for entity in entities {
            table.push(vec![
                Value::from(entity.key.as_str()),
                Value::from(entity.spec.database.as_str()),
                Value::from(entity.spec.install_sql.as_str()),
                Value::from(entity.spec.uninstall_sql.as_str()),
            ]);
        }
        Ok(Some(table))
    }
}
