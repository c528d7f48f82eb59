//! Contexts handed to collaborators and the provider traits around them
//!
//! These traits let the engine run without depending on a particular UI,
//! secret store or signal handler.

use crate::store::ConfigStore;
use sqlbatch::RetryPolicy;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use wirekit::{Row, SnapshotHandle, SnapshotSet, Value};

/// Cooperative stop flag, checked between kinds in PLAN and between items in
/// APPLY. Clones share the flag.
#[derive(Debug, Clone, Default)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Phases of PLAN, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanPhase {
    Init,
    ReadEntities,
    Resolve,
    Serialize,
    Done,
}

/// Phases of APPLY, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyPhase {
    Init,
    Unwrap,
    Reconstruct,
    Execute,
    Finalize,
}

impl fmt::Display for PlanPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Init => "init",
            Self::ReadEntities => "read entities",
            Self::Resolve => "resolve",
            Self::Serialize => "serialize",
            Self::Done => "done",
        };
        f.write_str(s)
    }
}

impl fmt::Display for ApplyPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Init => "init",
            Self::Unwrap => "unwrap",
            Self::Reconstruct => "reconstruct",
            Self::Execute => "execute",
            Self::Finalize => "finalize",
        };
        f.write_str(s)
    }
}

/// Progress callback for both phases
///
/// Every method has a no-op default so implementors pick what they show.
pub trait ProgressCallback {
    fn on_plan_phase(&mut self, _phase: PlanPhase) {}

    fn on_apply_phase(&mut self, _phase: ApplyPhase) {}

    /// Called once APPLY knows how many forward steps it has and what they
    /// weigh in total
    fn on_plan_loaded(&mut self, _steps: usize, _total_cost: u64) {}

    fn on_step_start(&mut self, _description: &str, _cost: u32) {}

    fn on_step_complete(&mut self, _description: &str, _cost: u32) {}
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {}

/// Resolves values of redacted snapshot columns on the apply side
pub trait SecretSource {
    /// Value for `column` of row `id` in `table`, if known
    fn resolve(&self, table: &str, column: &str, id: &str) -> anyhow::Result<Option<String>>;
}

/// Secret source that knows nothing
pub struct NoSecrets;

impl SecretSource for NoSecrets {
    fn resolve(&self, _table: &str, _column: &str, _id: &str) -> anyhow::Result<Option<String>> {
        Ok(None)
    }
}

/// Context passed to executing steps
pub struct ApplyContext<'a> {
    /// Target store
    pub store: &'a mut dyn ConfigStore,
    /// Bounded retry for steps that wait on a locked target
    pub retry: RetryPolicy,
}

impl<'a> ApplyContext<'a> {
    pub fn new(store: &'a mut dyn ConfigStore) -> Self {
        Self {
            store,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Context passed to collaborators while APPLY rebuilds steps from payloads
pub struct ReconstructContext<'s, 'a> {
    snapshots: &'s mut SnapshotSet<'a>,
    secrets: &'s dyn SecretSource,
}

impl<'s, 'a> ReconstructContext<'s, 'a> {
    pub fn new(snapshots: &'s mut SnapshotSet<'a>, secrets: &'s dyn SecretSource) -> Self {
        Self { snapshots, secrets }
    }

    /// Handle of the snapshot written under `tag`
    pub fn snapshot(&mut self, tag: &str) -> wirekit::Result<&mut SnapshotHandle<'a>> {
        self.snapshots.get_mut(tag)
    }

    /// First row of snapshot `tag` whose `column` equals `value`.
    ///
    /// Rewinds before scanning, so lookups may come in any order.
    pub fn lookup(&mut self, tag: &str, column: usize, value: &Value) -> wirekit::Result<Row> {
        let handle = self.snapshots.get_mut(tag)?;
        handle.reset();
        handle.require_where(column, value)
    }

    /// Resolve a secret if the source knows it
    pub fn find_secret(&self, table: &str, column: &str, id: &str) -> anyhow::Result<Option<String>> {
        self.secrets.resolve(table, column, id)
    }

    /// Resolve a secret or fail
    pub fn secret(&self, table: &str, column: &str, id: &str) -> anyhow::Result<String> {
        self.find_secret(table, column, id)?
            .ok_or_else(|| anyhow::anyhow!("no secret for {table}.{column} of {id}"))
    }

    /// Put the real value back into a redacted cell
    pub fn restore_secret(
        &self,
        row: &mut Row,
        column: usize,
        table: &str,
        column_name: &str,
        id: &str,
    ) -> anyhow::Result<()> {
        if row.is_redacted(column) {
            let value = self.secret(table, column_name, id)?;
            row.restore(column, Value::Text(value));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use wirekit::{SnapshotSpec, WireBuffer, wrap};

    struct MapSecrets(HashMap<String, String>);

    impl SecretSource for MapSecrets {
        fn resolve(&self, table: &str, column: &str, id: &str) -> anyhow::Result<Option<String>> {
            Ok(self.0.get(&format!("{table}.{column}.{id}")).cloned())
        }
    }

    #[test]
    fn test_stop_token_is_shared() {
        let token = StopToken::new();
        let clone = token.clone();
        assert!(!token.is_stop_requested());
        clone.request_stop();
        assert!(token.is_stop_requested());
    }

    #[test]
    fn test_lookup_rewinds_and_restores_secret() {
        let mut buf = WireBuffer::new();
        let spec = SnapshotSpec::new("user", 2).lookup(0).redact(1);
        let rows = vec![
            vec![Value::from("alice"), Value::from("pw-a")],
            vec![Value::from("bob"), Value::from("pw-b")],
        ];
        wrap(&mut buf, &spec, &rows).unwrap();

        let mut reader = buf.reader();
        let mut set = SnapshotSet::collect(&mut reader).unwrap();
        let secrets = MapSecrets(HashMap::from([(
            "user.password.alice".to_string(),
            "s3cret".to_string(),
        )]));
        let mut ctx = ReconstructContext::new(&mut set, &secrets);

        let bob = ctx.lookup("user", 0, &Value::from("bob")).unwrap();
        assert_eq!(bob.text(0).unwrap(), "bob");

        let mut alice = ctx.lookup("user", 0, &Value::from("alice")).unwrap();
        assert!(alice.is_redacted(1));
        ctx.restore_secret(&mut alice, 1, "user", "password", "alice").unwrap();
        assert_eq!(alice.text(1).unwrap(), "s3cret");

        let mut bob = bob;
        assert!(ctx.restore_secret(&mut bob, 1, "user", "password", "bob").is_err());
        assert!(ctx.lookup("missing", 0, &Value::from("x")).is_err());
    }
}
