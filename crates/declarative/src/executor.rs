//! APPLY phase - rebuilds steps from the plan buffer and runs them in order.
//!
//! Init → Unwrap → Reconstruct → Execute → Finalize. A rollback item is
//! armed when it is seen and becomes available only once the forward step
//! right after it succeeds. A successful `config.commit` retires every
//! rollback of its subtree, its abort included. On failure the caller gets
//! the available rollbacks in reverse order and runs them as its rollback
//! pass.

use crate::context::{
    ApplyContext, ApplyPhase, NoSecrets, ProgressCallback, ReconstructContext, SecretSource,
    StopToken,
};
use crate::error::{EngineError, Result};
use crate::queue::{WorkItem, decode_items, is_queue_start};
use crate::resource::{Collaborator, Prepared, Step, prepare};
use crate::todo::Change;
use crate::txn;
use crate::types::{ApplyOptions, ApplySummary, Role, StepRecord};
use std::fmt;
use wirekit::{SnapshotHandle, SnapshotSet, WireBuffer, is_snapshot_start};

/// Type-erased APPLY entry point of one kind
pub trait ApplyDriver {
    fn kind(&self) -> &'static str;

    /// Rebuild the step for one work item of this kind
    fn prepare(
        &self,
        change: Change,
        payload: &WireBuffer,
        ctx: &mut ReconstructContext<'_, '_>,
    ) -> anyhow::Result<Prepared<'_>>;
}

impl<C: Collaborator> ApplyDriver for C {
    fn kind(&self) -> &'static str {
        Collaborator::kind(self)
    }

    fn prepare(
        &self,
        change: Change,
        payload: &WireBuffer,
        ctx: &mut ReconstructContext<'_, '_>,
    ) -> anyhow::Result<Prepared<'_>> {
        prepare(self, change, payload, ctx)
    }
}

/// A work item turned back into something executable
pub struct PreparedStep<'c> {
    pub action: String,
    pub key: String,
    pub description: String,
    /// Subtree of the backup envelope around the step
    pub scope: String,
    pub role: Role,
    pub cost: u32,
    step: Box<dyn Step + 'c>,
}

impl PreparedStep<'_> {
    pub fn run(&self, ctx: &mut ApplyContext<'_>) -> anyhow::Result<()> {
        self.step.run(ctx)
    }

    pub fn record(&self) -> StepRecord {
        StepRecord {
            action: self.action.clone(),
            key: self.key.clone(),
            description: self.description.clone(),
            cost: self.cost,
        }
    }
}

impl fmt::Debug for PreparedStep<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreparedStep")
            .field("action", &self.action)
            .field("key", &self.key)
            .field("scope", &self.scope)
            .field("role", &self.role)
            .field("cost", &self.cost)
            .finish_non_exhaustive()
    }
}

/// Outcome of the installer's rollback pass
#[derive(Debug, Default)]
pub struct RollbackReport {
    /// Descriptions of the rollbacks that ran
    pub undone: Vec<String>,
    /// Rollbacks that failed, with the reason
    pub failed: Vec<(String, String)>,
}

impl RollbackReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// A failed APPLY
#[derive(Debug)]
pub struct ApplyFailure<'c> {
    pub error: EngineError,
    /// Rollback steps of every forward step that succeeded, newest first
    pub rollbacks: Vec<PreparedStep<'c>>,
    /// What ran before the failure
    pub summary: ApplySummary,
}

impl<'c> ApplyFailure<'c> {
    fn new(error: EngineError, mut available: Vec<PreparedStep<'c>>, summary: ApplySummary) -> Self {
        available.reverse();
        Self {
            error,
            rollbacks: available,
            summary,
        }
    }

    fn early(error: EngineError) -> Self {
        Self::new(error, Vec::new(), ApplySummary::default())
    }

    /// Run every available rollback, newest first.
    ///
    /// A failing rollback is reported and the pass continues with the next
    /// one.
    pub fn roll_back(&self, ctx: &mut ApplyContext<'_>) -> RollbackReport {
        let mut report = RollbackReport::default();
        for step in &self.rollbacks {
            log::debug!("Rolling back: {}", step.description);
            match step.run(ctx) {
                Ok(()) => report.undone.push(step.description.clone()),
                Err(e) => {
                    log::warn!("Rollback {} failed: {e:#}", step.description);
                    report.failed.push((step.description.clone(), format!("{e:#}")));
                }
            }
        }
        report
    }
}

impl fmt::Display for ApplyFailure<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl std::error::Error for ApplyFailure<'_> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// APPLY orchestrator over the registered kinds
pub struct Applier<'r> {
    drivers: Vec<&'r dyn ApplyDriver>,
    secrets: &'r dyn SecretSource,
}

impl Default for Applier<'_> {
    fn default() -> Self {
        Self {
            drivers: Vec::new(),
            secrets: &NoSecrets,
        }
    }
}

impl<'r> Applier<'r> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, driver: &'r dyn ApplyDriver) -> &mut Self {
        self.drivers.push(driver);
        self
    }

    /// Source for values of redacted snapshot columns
    pub fn with_secrets(&mut self, secrets: &'r dyn SecretSource) -> &mut Self {
        self.secrets = secrets;
        self
    }

    fn driver(&self, kind: &str) -> Option<&'r dyn ApplyDriver> {
        self.drivers.iter().copied().find(|d| d.kind() == kind)
    }

    /// Run APPLY over a plan buffer.
    ///
    /// The buffer is scrubbed in Finalize whatever the outcome.
    pub fn apply(
        &self,
        mut buffer: WireBuffer,
        ctx: &mut ApplyContext<'_>,
        options: ApplyOptions,
        stop: &StopToken,
        progress: &mut dyn ProgressCallback,
    ) -> std::result::Result<ApplySummary, ApplyFailure<'r>> {
        progress.on_apply_phase(ApplyPhase::Init);
        log::debug!("Applying plan of {} bytes", buffer.len());

        let result = self.run(&buffer, ctx, options, stop, progress);

        progress.on_apply_phase(ApplyPhase::Finalize);
        buffer.scrub();
        match &result {
            Ok(summary) => log::debug!("Applied {} steps", summary.executed()),
            Err(failure) => log::warn!(
                "Apply failed: {} ({} rollbacks available)",
                failure.error,
                failure.rollbacks.len()
            ),
        }
        result
    }

    fn run(
        &self,
        buffer: &WireBuffer,
        ctx: &mut ApplyContext<'_>,
        options: ApplyOptions,
        stop: &StopToken,
        progress: &mut dyn ProgressCallback,
    ) -> std::result::Result<ApplySummary, ApplyFailure<'r>> {
        progress.on_apply_phase(ApplyPhase::Unwrap);
        let (mut snapshots, items) = unwrap(buffer).map_err(ApplyFailure::early)?;
        log::debug!(
            "Unwrapped {} snapshots and {} work items",
            snapshots.len(),
            items.len()
        );

        progress.on_apply_phase(ApplyPhase::Reconstruct);
        let steps = self
            .reconstruct(items, &mut snapshots)
            .map_err(ApplyFailure::early)?;

        let forward: Vec<&PreparedStep<'r>> =
            steps.iter().filter(|s| s.role == Role::Forward).collect();
        let mut summary = ApplySummary {
            dry_run: options.dry_run,
            total_cost: forward.iter().map(|s| u64::from(s.cost)).sum(),
            ..Default::default()
        };
        progress.on_plan_loaded(forward.len(), summary.total_cost);

        if options.dry_run {
            summary.steps = forward.iter().map(|s| s.record()).collect();
            return Ok(summary);
        }

        progress.on_apply_phase(ApplyPhase::Execute);
        execute(steps, ctx, stop, progress, summary)
    }

    fn reconstruct(
        &self,
        items: Vec<WorkItem>,
        snapshots: &mut SnapshotSet<'_>,
    ) -> Result<Vec<PreparedStep<'r>>> {
        let mut ctx = ReconstructContext::new(snapshots, self.secrets);
        items
            .into_iter()
            .map(|item| self.prepare_item(item, &mut ctx))
            .collect()
    }

    fn prepare_item(
        &self,
        item: WorkItem,
        ctx: &mut ReconstructContext<'_, '_>,
    ) -> Result<PreparedStep<'r>> {
        let unknown = || EngineError::UnknownAction {
            action: item.action.clone(),
        };
        let (kind, suffix) = item.action.rsplit_once('.').ok_or_else(unknown)?;

        let prepared = if kind == txn::CONFIG_KIND {
            txn::prepare(suffix, &item.payload)?
        } else {
            let change = Change::from_suffix(suffix).ok_or_else(unknown)?;
            let driver = self.driver(kind).ok_or_else(unknown)?;
            driver
                .prepare(change, &item.payload, ctx)
                .map_err(|e| EngineError::from_prepare(&item.action, e))?
        };

        Ok(PreparedStep {
            key: prepared.key,
            description: prepared.description,
            scope: prepared.scope,
            step: prepared.step,
            role: item.role,
            cost: item.cost,
            action: item.action,
        })
    }
}

/// Index the snapshots and decode every queue section, in buffer order
fn unwrap(buffer: &WireBuffer) -> Result<(SnapshotSet<'_>, Vec<WorkItem>)> {
    let mut reader = buffer.reader();
    let mut snapshots = SnapshotSet::new();
    let mut items = Vec::new();
    let mut sections = 0;

    while !reader.is_at_end() {
        if is_snapshot_start(&reader) {
            snapshots.insert(SnapshotHandle::begin_unwrap(&mut reader)?)?;
        } else if is_queue_start(&reader) {
            items.extend(decode_items(&mut reader)?);
            sections += 1;
        } else {
            return Err(wirekit::Error::Malformed {
                offset: reader.position(),
                message: "expected a snapshot or a queue section".to_string(),
            }
            .into());
        }
    }
    if sections == 0 {
        return Err(wirekit::Error::Malformed {
            offset: reader.position(),
            message: "plan has no queue section".to_string(),
        }
        .into());
    }
    Ok((snapshots, items))
}

fn execute<'r>(
    steps: Vec<PreparedStep<'r>>,
    ctx: &mut ApplyContext<'_>,
    stop: &StopToken,
    progress: &mut dyn ProgressCallback,
    mut summary: ApplySummary,
) -> std::result::Result<ApplySummary, ApplyFailure<'r>> {
    let mut available = Vec::new();
    let mut armed: Option<PreparedStep<'r>> = None;

    for step in steps {
        if step.role == Role::Rollback {
            armed = Some(step);
            continue;
        }
        if stop.is_stop_requested() {
            log::warn!("Stop requested before {} {}", step.action, step.key);
            return Err(ApplyFailure::new(EngineError::Stopped, available, summary));
        }

        progress.on_step_start(&step.description, step.cost);
        log::debug!("Running {} for {}", step.action, step.key);
        if let Err(e) = step.run(ctx) {
            let error = EngineError::from_step(&step.action, &step.key, e);
            return Err(ApplyFailure::new(error, available, summary));
        }
        progress.on_step_complete(&step.description, step.cost);

        summary.completed_cost += u64::from(step.cost);
        summary.steps.push(step.record());
        if let Some(rollback) = armed.take() {
            available.push(rollback);
        }
        if step.action == txn::COMMIT_ACTION {
            available.retain(|r| r.scope != step.scope);
            log::debug!("Backup {} committed; its rollbacks are retired", step.key);
        }
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::NoProgress;
    use crate::planner::{PlanOptions, Planner};
    use crate::resource::{Reader, Table};
    use crate::store::{BackupState, ConfigStore, MemoryStore};
    use crate::types::{CurrentState, Entity, Filter, Operation};
    use std::cell::RefCell;
    use wirekit::{SnapshotSpec, Value, WireReader};

    /// Declared keys, all sharing one requested operation
    struct Manifest {
        keys: Vec<&'static str>,
        operation: Operation,
        present: Vec<&'static str>,
    }

    /// Writes `<subtree>/<key> = <label>`; fails on the keys in `fail_on`
    struct Labels {
        kind: &'static str,
        fail_on: Vec<&'static str>,
        log: RefCell<Vec<String>>,
    }

    impl Labels {
        fn new(kind: &'static str) -> Self {
            Self {
                kind,
                fail_on: Vec::new(),
                log: RefCell::new(Vec::new()),
            }
        }

        fn path(&self, key: &str) -> String {
            format!("{}/{key}", self.kind)
        }
    }

    impl Collaborator for Labels {
        type Spec = String;

        fn kind(&self) -> &'static str {
            self.kind
        }

        fn subtree(&self) -> &str {
            self.kind
        }

        fn encode_spec(&self, spec: &String, out: &mut WireBuffer) -> wirekit::Result<()> {
            out.append_text(spec)
        }

        fn decode_spec(
            &self,
            key: &str,
            reader: &mut WireReader<'_>,
            ctx: &mut ReconstructContext<'_, '_>,
        ) -> anyhow::Result<String> {
            let label = reader.read_text()?;
            let row = ctx.lookup(self.kind, 0, &Value::from(key))?;
            Ok(format!("{label}:{}", row.text(1)?))
        }

        fn install(&self, ctx: &mut ApplyContext<'_>, entity: &Entity<String>) -> anyhow::Result<()> {
            self.log.borrow_mut().push(format!("install {}", entity.key));
            if self.fail_on.contains(&entity.key.as_str()) {
                anyhow::bail!("refused");
            }
            ctx.store.set(&self.path(&entity.key), &entity.spec)
        }

        fn uninstall(&self, ctx: &mut ApplyContext<'_>, entity: &Entity<String>) -> anyhow::Result<()> {
            self.log.borrow_mut().push(format!("uninstall {}", entity.key));
            ctx.store.delete(&self.path(&entity.key))?;
            Ok(())
        }
    }

    impl Reader<Manifest> for Labels {
        fn read(&self, source: &Manifest, _filter: &Filter) -> anyhow::Result<Vec<Entity<String>>> {
            Ok(source
                .keys
                .iter()
                .map(|key| {
                    Entity::new(*key, "core", format!("label-{key}"))
                        .with_current(CurrentState::from_exists(source.present.contains(key)))
                        .with_requested(source.operation.requested())
                })
                .collect())
        }

        fn snapshot(&self, _source: &Manifest, entities: &[Entity<String>]) -> anyhow::Result<Option<Table>> {
            let mut table = Table::new(SnapshotSpec::new(self.kind, 2).lookup(0));
            for entity in entities {
                table.push(vec![
                    Value::from(entity.key.as_str()),
                    Value::from(entity.key.to_uppercase()),
                ]);
            }
            Ok(Some(table))
        }
    }

    fn plan(kind: &Labels, manifest: &Manifest) -> WireBuffer {
        let mut planner: Planner<'_, Manifest> = Planner::new();
        planner.register(kind);
        planner
            .plan_simple(manifest, &PlanOptions::new("run"))
            .unwrap()
            .buffer
    }

    fn install_manifest(keys: Vec<&'static str>) -> Manifest {
        Manifest {
            keys,
            operation: Operation::Install,
            present: Vec::new(),
        }
    }

    fn apply<'r>(
        applier: &Applier<'r>,
        buffer: WireBuffer,
        store: &mut MemoryStore,
        options: ApplyOptions,
    ) -> std::result::Result<ApplySummary, ApplyFailure<'r>> {
        let mut ctx = ApplyContext::new(store);
        applier.apply(buffer, &mut ctx, options, &StopToken::new(), &mut NoProgress)
    }

    #[test]
    fn test_plan_then_apply_installs_everything() {
        let kind = Labels::new("site");
        let buffer = plan(&kind, &install_manifest(vec!["a", "b"]));

        let mut applier = Applier::new();
        applier.register(&kind);
        let mut store = MemoryStore::new();
        let summary = apply(&applier, buffer, &mut store, ApplyOptions::default()).unwrap();

        assert_eq!(summary.executed(), 4);
        assert_eq!(summary.completed_cost, summary.total_cost);
        assert_eq!(store.get("site/a"), Some("label-a:A".to_string()));
        assert_eq!(store.get("site/b"), Some("label-b:B".to_string()));
        assert_eq!(store.backups().len(), 1);
        assert_eq!(store.in_flight().count(), 0);
    }

    #[test]
    fn test_failure_exposes_rollbacks_of_completed_items_only() {
        let mut kind = Labels::new("site");
        kind.fail_on = vec!["c"];
        let buffer = plan(&kind, &install_manifest(vec!["a", "b", "c", "d"]));

        let mut applier = Applier::new();
        applier.register(&kind);
        let mut store = MemoryStore::new();
        let failure = apply(&applier, buffer, &mut store, ApplyOptions::default()).unwrap_err();

        assert!(matches!(failure.error, EngineError::Store { .. }));
        assert_eq!(failure.error.to_string(), "site.install: c: refused");
        let rollbacks: Vec<(&str, &str)> = failure
            .rollbacks
            .iter()
            .map(|s| (s.action.as_str(), s.key.as_str()))
            .collect();
        assert_eq!(
            rollbacks,
            vec![
                ("site.uninstall", "b"),
                ("site.uninstall", "a"),
                ("config.abort", "run:site"),
            ]
        );
        assert!(!kind.log.borrow().contains(&"install d".to_string()));
    }

    #[test]
    fn test_commit_never_runs_after_failure_and_abort_restores() {
        let mut kind = Labels::new("site");
        kind.fail_on = vec!["b"];
        let mut store = MemoryStore::new();
        store.set("site/existing", "keep").unwrap();
        let buffer = plan(&kind, &install_manifest(vec!["a", "b"]));

        let mut applier = Applier::new();
        applier.register(&kind);
        let failure = apply(&applier, buffer, &mut store, ApplyOptions::default()).unwrap_err();
        assert_eq!(store.in_flight().count(), 1);
        assert!(!failure.summary.steps.iter().any(|s| s.action == txn::COMMIT_ACTION));

        let mut ctx = ApplyContext::new(&mut store);
        let report = failure.roll_back(&mut ctx);
        assert!(report.is_clean());
        assert_eq!(report.undone.len(), 2);

        assert_eq!(store.in_flight().count(), 0);
        assert!(!store.exists("site/a"));
        assert_eq!(store.get("site/existing"), Some("keep".to_string()));
    }

    #[test]
    fn test_repair_uninstalls_before_installing() {
        let kind = Labels::new("site");
        let manifest = Manifest {
            keys: vec!["a", "b"],
            operation: Operation::Repair,
            present: vec!["a"],
        };
        let buffer = plan(&kind, &manifest);

        let mut applier = Applier::new();
        applier.register(&kind);
        let mut store = MemoryStore::new();
        store.set("site/a", "old").unwrap();
        apply(&applier, buffer, &mut store, ApplyOptions::default()).unwrap();

        assert_eq!(*kind.log.borrow(), vec!["uninstall a", "install a"]);
        assert_eq!(store.get("site/a"), Some("label-a:A".to_string()));
        assert!(!store.exists("site/b"));
    }

    #[test]
    fn test_dry_run_lists_steps_without_executing() {
        let kind = Labels::new("site");
        let buffer = plan(&kind, &install_manifest(vec!["a"]));

        let mut applier = Applier::new();
        applier.register(&kind);
        let mut store = MemoryStore::new();
        let summary = apply(&applier, buffer, &mut store, ApplyOptions { dry_run: true }).unwrap();

        let actions: Vec<_> = summary.steps.iter().map(|s| s.action.as_str()).collect();
        assert_eq!(actions, vec!["config.begin", "site.install", "config.commit"]);
        assert_eq!(summary.executed(), 0);
        assert!(kind.log.borrow().is_empty());
        assert!(store.entries().is_empty());
        assert!(store.backups().is_empty());
    }

    #[test]
    fn test_stop_request_is_a_failure_with_rollbacks() {
        struct StopAfter<'a>(&'a StopToken, usize);
        impl ProgressCallback for StopAfter<'_> {
            fn on_step_complete(&mut self, _description: &str, _cost: u32) {
                self.1 -= 1;
                if self.1 == 0 {
                    self.0.request_stop();
                }
            }
        }

        let kind = Labels::new("site");
        let buffer = plan(&kind, &install_manifest(vec!["a", "b"]));
        let mut applier = Applier::new();
        applier.register(&kind);
        let mut store = MemoryStore::new();
        let stop = StopToken::new();
        let mut progress = StopAfter(&stop, 2);

        let mut ctx = ApplyContext::new(&mut store);
        let failure = applier
            .apply(buffer, &mut ctx, ApplyOptions::default(), &stop, &mut progress)
            .unwrap_err();
        assert!(matches!(failure.error, EngineError::Stopped));
        let keys: Vec<_> = failure.rollbacks.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "run:site"]);
    }

    #[test]
    fn test_committed_envelope_is_not_rolled_back() {
        struct StopAfter<'a>(&'a StopToken, usize);
        impl ProgressCallback for StopAfter<'_> {
            fn on_step_complete(&mut self, _description: &str, _cost: u32) {
                self.1 -= 1;
                if self.1 == 0 {
                    self.0.request_stop();
                }
            }
        }

        let site = Labels::new("site");
        let pool = Labels::new("pool");
        let manifest = install_manifest(vec!["s1"]);
        let mut planner: Planner<'_, Manifest> = Planner::new();
        planner.register(&site).register(&pool);
        let buffer = planner
            .plan_simple(&manifest, &PlanOptions::new("run"))
            .unwrap()
            .buffer;

        let mut applier = Applier::new();
        applier.register(&site).register(&pool);
        let mut store = MemoryStore::new();
        let stop = StopToken::new();
        // begin site, install site, begin pool, install pool, commit site
        let mut progress = StopAfter(&stop, 5);

        let failure = {
            let mut ctx = ApplyContext::new(&mut store);
            applier
                .apply(buffer, &mut ctx, ApplyOptions::default(), &stop, &mut progress)
                .unwrap_err()
        };
        assert!(matches!(failure.error, EngineError::Stopped));
        assert_eq!(
            failure.summary.steps.last().map(|s| s.action.as_str()),
            Some(txn::COMMIT_ACTION)
        );
        let rollbacks: Vec<(&str, &str)> = failure
            .rollbacks
            .iter()
            .map(|s| (s.action.as_str(), s.key.as_str()))
            .collect();
        assert_eq!(
            rollbacks,
            vec![("pool.uninstall", "s1"), ("config.abort", "run:pool")]
        );

        let mut ctx = ApplyContext::new(&mut store);
        let report = failure.roll_back(&mut ctx);
        assert!(report.is_clean());
        assert_eq!(store.get("site/s1"), Some("label-s1:S1".to_string()));
        assert!(!store.exists("pool/s1"));
        let states: Vec<_> = store.backups().iter().map(|b| (b.id.as_str(), b.state)).collect();
        assert_eq!(
            states,
            vec![
                ("run:site", BackupState::Committed),
                ("run:pool", BackupState::Aborted),
            ]
        );
    }

    #[test]
    fn test_failed_reinstall_is_restored_by_abort() {
        let mut kind = Labels::new("site");
        kind.fail_on = vec!["a"];
        let manifest = Manifest {
            keys: vec!["a"],
            operation: Operation::Repair,
            present: vec!["a"],
        };
        let buffer = plan(&kind, &manifest);

        let mut applier = Applier::new();
        applier.register(&kind);
        let mut store = MemoryStore::new();
        store.set("site/a", "old").unwrap();
        let failure = apply(&applier, buffer, &mut store, ApplyOptions::default()).unwrap_err();
        assert_eq!(failure.error.to_string(), "site.install: a: refused");
        assert!(!store.exists("site/a"));

        // The uninstall half is undone by installing the new spec, which
        // fails here too; the abort still brings the old value back
        let actions: Vec<_> = failure.rollbacks.iter().map(|s| s.action.as_str()).collect();
        assert_eq!(actions, vec!["site.install", "config.abort"]);
        let mut ctx = ApplyContext::new(&mut store);
        let report = failure.roll_back(&mut ctx);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.undone, vec!["abort backup of site".to_string()]);
        assert_eq!(store.get("site/a"), Some("old".to_string()));
        assert_eq!(store.in_flight().count(), 0);
    }

    #[test]
    fn test_unknown_kind_fails_before_execution() {
        let kind = Labels::new("site");
        let buffer = plan(&kind, &install_manifest(vec!["a"]));

        let applier = Applier::new();
        let mut store = MemoryStore::new();
        let failure = apply(&applier, buffer, &mut store, ApplyOptions::default()).unwrap_err();
        assert!(matches!(failure.error, EngineError::UnknownAction { ref action } if action == "site.uninstall"));
        assert!(failure.rollbacks.is_empty());
        assert!(store.backups().is_empty());
    }

    #[test]
    fn test_corrupt_buffer_is_fatal() {
        let kind = Labels::new("site");
        let buffer = plan(&kind, &install_manifest(vec!["a"]));
        let cut = WireBuffer::from_string(buffer.as_str()[..buffer.len() - 3].to_string());

        let mut applier = Applier::new();
        applier.register(&kind);
        let mut store = MemoryStore::new();
        let failure = apply(&applier, cut, &mut store, ApplyOptions::default()).unwrap_err();
        assert!(failure.error.is_fatal());
        assert!(store.entries().is_empty());
    }

    #[test]
    fn test_missing_snapshot_row_is_not_found() {
        let kind = Labels::new("site");
        // Plan written by hand: one install item whose key is not in the table
        let mut buffer = WireBuffer::new();
        let mut table = Table::new(SnapshotSpec::new("site", 2).lookup(0));
        table.push(vec![Value::from("other"), Value::from("OTHER")]);
        wirekit::wrap(&mut buffer, &table.spec, &table.rows).unwrap();
        let entity = Entity::new("ghost", "core", "label".to_string());
        let payload = crate::resource::encode_entity(&kind, &entity).unwrap();
        let mut queue = crate::queue::ActionQueue::new();
        queue.enqueue("site.install", payload, 1);
        queue.flush(&mut buffer).unwrap();

        let mut applier = Applier::new();
        applier.register(&kind);
        let mut store = MemoryStore::new();
        let failure = apply(&applier, buffer, &mut store, ApplyOptions::default()).unwrap_err();
        assert_eq!(failure.error.category(), crate::error::ErrorCategory::NotFound);
    }

    #[test]
    fn test_interleaved_sections_pair_by_tag() {
        let site = Labels::new("site");
        let pool = Labels::new("pool");
        let site_plan = plan(&site, &install_manifest(vec!["s1"]));
        let pool_plan = plan(&pool, &install_manifest(vec!["p1"]));

        let mut combined = WireBuffer::new();
        combined.append_buffer(&pool_plan);
        combined.append_buffer(&site_plan);

        let mut applier = Applier::new();
        applier.register(&site).register(&pool);
        let mut store = MemoryStore::new();
        apply(&applier, combined, &mut store, ApplyOptions::default()).unwrap();
        assert_eq!(store.get("site/s1"), Some("label-s1:S1".to_string()));
        assert_eq!(store.get("pool/p1"), Some("label-p1:P1".to_string()));
    }
}
