//! PLAN phase - reads entities, classifies them and serializes the work.
//!
//! Init → ReadEntities → Resolve → Serialize → Done. Nothing is written to
//! the target during PLAN; the only output is the buffer handed to APPLY.

use crate::context::{NoProgress, PlanPhase, ProgressCallback, StopToken};
use crate::error::{EngineError, Result};
use crate::queue::ActionQueue;
use crate::resource::{Collaborator, Reader, Table, encode_entity};
use crate::todo::{Change, ToDo};
use crate::txn::BackupEnvelope;
use crate::types::{Entity, Filter, PlanSummary};
use std::collections::HashSet;
use wirekit::WireBuffer;

/// Explicit accumulator threaded through serialization
pub struct PlanBuilder {
    run_id: String,
    buffer: WireBuffer,
    queue: ActionQueue,
    envelopes: Vec<BackupEnvelope>,
    tags: HashSet<String>,
}

impl PlanBuilder {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            buffer: WireBuffer::new(),
            queue: ActionQueue::new(),
            envelopes: Vec::new(),
            tags: HashSet::new(),
        }
    }

    /// Append a snapshot block to the plan.
    ///
    /// Tags are unique per plan; a repeated tag is refused here rather than
    /// at APPLY.
    pub fn write_snapshot(&mut self, table: &Table) -> Result<()> {
        let tag = table.spec.tag();
        if self.tags.contains(tag) {
            return Err(EngineError::Encode(wirekit::Error::DuplicateTag {
                tag: tag.to_string(),
            }));
        }
        wirekit::wrap(&mut self.buffer, &table.spec, &table.rows)?;
        self.tags.insert(tag.to_string());
        Ok(())
    }

    /// Queue the begin of the backup for `subtree`, once per run
    pub fn open_envelope(&mut self, subtree: &str) -> Result<()> {
        if self.envelopes.iter().any(|e| e.subtree() == subtree) {
            return Ok(());
        }
        let envelope = BackupEnvelope::new(format!("{}:{subtree}", self.run_id), subtree);
        envelope.begin(&mut self.queue)?;
        log::debug!("Opened backup {} for {subtree}", envelope.id());
        self.envelopes.push(envelope);
        Ok(())
    }

    /// Queue one change with its inverse as rollback.
    ///
    /// Both items carry the declared spec. For the uninstall half of a
    /// reinstall the rollback therefore installs the new spec; the old state
    /// only comes back through the envelope's abort.
    pub fn enqueue_change(&mut self, kind: &str, change: Change, payload: WireBuffer, cost: u32) {
        self.queue.enqueue_with_rollback(
            change.action(kind),
            payload.clone(),
            change.inverse().action(kind),
            payload,
            cost,
        );
    }

    /// Commit every opened backup and flush the queue
    fn finish(mut self) -> Result<PlanOutput> {
        for envelope in &self.envelopes {
            envelope.commit(&mut self.queue)?;
        }
        let items = self.queue.len();
        let total_cost = self.queue.total_cost();
        self.queue.flush(&mut self.buffer)?;
        Ok(PlanOutput {
            buffer: self.buffer,
            summary: PlanSummary::default(),
            items,
            total_cost,
        })
    }
}

/// Result of PLAN
#[derive(Debug)]
pub struct PlanOutput {
    /// Everything APPLY needs
    pub buffer: WireBuffer,
    pub summary: PlanSummary,
    /// Number of work items, rollbacks included
    pub items: usize,
    pub total_cost: u64,
}

/// Entities of one kind, as read during PLAN
pub trait KindPlan {
    fn kind(&self) -> &'static str;

    /// Classify every entity and record the decisions
    fn resolve(&mut self, summary: &mut PlanSummary);

    /// Write snapshots and work items for the entities that change
    fn serialize(&self, builder: &mut PlanBuilder) -> Result<()>;
}

/// Type-erased PLAN entry point of one kind
pub trait PlanDriver<Src: ?Sized> {
    fn kind(&self) -> &'static str;

    fn read_entities(&self, source: &Src, filter: &Filter) -> Result<Box<dyn KindPlan + '_>>;
}

struct ReadSet<'c, C: Collaborator> {
    collaborator: &'c C,
    entities: Vec<Entity<C::Spec>>,
    todos: Vec<ToDo>,
    table: Option<Table>,
}

impl<Src: ?Sized, R: Reader<Src>> PlanDriver<Src> for R {
    fn kind(&self) -> &'static str {
        Collaborator::kind(self)
    }

    fn read_entities(&self, source: &Src, filter: &Filter) -> Result<Box<dyn KindPlan + '_>> {
        let kind = Collaborator::kind(self);
        let read_error = |e: anyhow::Error| EngineError::Read {
            kind: kind.to_string(),
            message: format!("{e:#}"),
        };
        let entities: Vec<_> = self
            .read(source, filter)
            .map_err(read_error)?
            .into_iter()
            .filter(|e| filter.matches(kind, &e.key))
            .collect();
        let table = self.snapshot(source, &entities).map_err(read_error)?;
        log::debug!("Read {} {kind} entities", entities.len());
        Ok(Box::new(ReadSet {
            collaborator: self,
            entities,
            todos: Vec::new(),
            table,
        }))
    }
}

impl<C: Collaborator> KindPlan for ReadSet<'_, C> {
    fn kind(&self) -> &'static str {
        Collaborator::kind(self.collaborator)
    }

    fn resolve(&mut self, summary: &mut PlanSummary) {
        let kind = Collaborator::kind(self.collaborator);
        self.todos = self.entities.iter().map(Entity::todo).collect();
        for (entity, todo) in self.entities.iter().zip(&self.todos) {
            summary.record(kind, &entity.key, &entity.component, *todo);
        }
    }

    fn serialize(&self, builder: &mut PlanBuilder) -> Result<()> {
        if self.todos.iter().all(|t| t.is_noop()) {
            return Ok(());
        }
        if let Some(table) = &self.table {
            builder.write_snapshot(table)?;
        }
        builder.open_envelope(self.collaborator.subtree())?;

        let kind = Collaborator::kind(self.collaborator);
        for (entity, todo) in self.entities.iter().zip(&self.todos) {
            if todo.is_noop() {
                continue;
            }
            let payload = encode_entity(self.collaborator, entity)?;
            let cost = self.collaborator.cost(entity);
            for change in todo.changes() {
                builder.enqueue_change(kind, *change, payload.clone(), cost);
            }
        }
        Ok(())
    }
}

/// Options for one PLAN run
#[derive(Debug, Clone)]
pub struct PlanOptions {
    pub filter: Filter,
    /// Prefix of every backup id of this run
    pub run_id: String,
}

impl PlanOptions {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            filter: Filter::all(),
            run_id: run_id.into(),
        }
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }
}

/// PLAN orchestrator over the registered kinds
pub struct Planner<'r, Src: ?Sized> {
    drivers: Vec<&'r dyn PlanDriver<Src>>,
}

impl<Src: ?Sized> Default for Planner<'_, Src> {
    fn default() -> Self {
        Self {
            drivers: Vec::new(),
        }
    }
}

impl<'r, Src: ?Sized> Planner<'r, Src> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a kind. Kinds are planned in registration order.
    pub fn register(&mut self, driver: &'r dyn PlanDriver<Src>) -> &mut Self {
        self.drivers.push(driver);
        self
    }

    /// Plan without progress reporting
    pub fn plan_simple(&self, source: &Src, options: &PlanOptions) -> Result<PlanOutput> {
        self.plan(source, options, &StopToken::new(), &mut NoProgress)
    }

    /// Run PLAN.
    ///
    /// A stop request is honored between kinds in every phase and yields
    /// [`EngineError::Cancelled`].
    pub fn plan(
        &self,
        source: &Src,
        options: &PlanOptions,
        stop: &StopToken,
        progress: &mut dyn ProgressCallback,
    ) -> Result<PlanOutput> {
        let check_stop = || {
            if stop.is_stop_requested() {
                log::warn!("Planning cancelled");
                Err(EngineError::Cancelled)
            } else {
                Ok(())
            }
        };

        progress.on_plan_phase(PlanPhase::Init);
        log::debug!("Planning run {}", options.run_id);

        progress.on_plan_phase(PlanPhase::ReadEntities);
        let mut sets = Vec::new();
        for driver in &self.drivers {
            check_stop()?;
            if !options.filter.matches_kind(PlanDriver::kind(*driver)) {
                continue;
            }
            sets.push(driver.read_entities(source, &options.filter)?);
        }

        progress.on_plan_phase(PlanPhase::Resolve);
        let mut summary = PlanSummary::default();
        for set in &mut sets {
            check_stop()?;
            set.resolve(&mut summary);
        }

        progress.on_plan_phase(PlanPhase::Serialize);
        let mut builder = PlanBuilder::new(options.run_id.as_str());
        for set in &sets {
            check_stop()?;
            set.serialize(&mut builder)?;
        }
        let mut output = builder.finish()?;
        output.summary = summary;

        progress.on_plan_phase(PlanPhase::Done);
        log::debug!(
            "Planned {} work items, total cost {}",
            output.items,
            output.total_cost
        );
        Ok(output)
    }
}
