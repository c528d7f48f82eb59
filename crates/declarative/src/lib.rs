//! # Declarative
//!
//! Two-phase reconciliation of declared entities against a configuration
//! store.
//!
//! PLAN reads every registered kind, decides what each entity needs and
//! writes the work into a single [`wirekit::WireBuffer`]. APPLY runs later,
//! possibly in another process, with nothing but that buffer: it rebuilds
//! each step from its payload and the snapshot tables written next to the
//! queue, then executes them in order.
//!
//! ## Core Concepts
//!
//! - **Collaborator**: one resource kind, see [`Collaborator`] and [`Reader`]
//! - **ToDo**: what one entity needs, derived from its current state and the
//!   requested action ([`classify`])
//! - **Work item**: one action id plus payload, forward or rollback
//!   ([`WorkItem`])
//! - **Backup envelope**: `config.begin` / `config.commit` around the writes
//!   to one store subtree, with `config.abort` as the rollback of begin
//!
//! Every forward item is preceded by its rollback. When forward item `k`
//! fails, [`ApplyFailure::rollbacks`] holds the rollbacks of items `1..k-1`
//! newest first, and the installer decides when to run them.
//!
//! ## Example
//!
//! ```ignore
//! use declarative::{ApplyContext, ApplyOptions, Applier, MemoryStore, NoProgress,
//!     PlanOptions, Planner, StopToken};
//!
//! let settings = SettingKind;
//! let mut planner = Planner::new();
//! planner.register(&settings);
//! let plan = planner.plan_simple(&manifest, &PlanOptions::new("run-1"))?;
//!
//! let mut applier = Applier::new();
//! applier.register(&settings);
//! let mut store = MemoryStore::new();
//! let mut ctx = ApplyContext::new(&mut store);
//! match applier.apply(plan.buffer, &mut ctx, ApplyOptions::default(),
//!                     &StopToken::new(), &mut NoProgress) {
//!     Ok(summary) => println!("{} steps", summary.executed()),
//!     Err(failure) => {
//!         failure.roll_back(&mut ctx);
//!     }
//! }
//! ```
//!
//! ## Provider Traits
//!
//! - [`ConfigStore`]: the target of every write, with named backups
//! - [`ProgressCallback`]: receives phase and step updates
//! - [`SecretSource`]: supplies redacted snapshot values on the apply side
//!
//! This allows the crate to be used without hard dependencies on a
//! particular store, UI or secret backend.

pub mod context;
pub mod error;
pub mod executor;
pub mod planner;
pub mod queue;
pub mod resource;
pub mod store;
pub mod todo;
pub mod txn;
pub mod types;

// Re-export main types at crate root
pub use context::{
    ApplyContext, ApplyPhase, NoProgress, NoSecrets, PlanPhase, ProgressCallback,
    ReconstructContext, SecretSource, StopToken,
};
pub use error::{EngineError, ErrorCategory, Result};
pub use executor::{Applier, ApplyDriver, ApplyFailure, PreparedStep, RollbackReport};
pub use planner::{KindPlan, PlanBuilder, PlanDriver, PlanOptions, PlanOutput, Planner};
pub use queue::{ActionQueue, WorkItem};
pub use resource::{Collaborator, Prepared, Reader, Step, Table, decode_entity, encode_entity};
pub use store::{Backup, BackupState, ConfigStore, MemoryStore, StoreError};
pub use todo::{Change, ToDo, classify};
pub use txn::BackupEnvelope;
pub use types::{
    ApplyOptions, ApplySummary, CurrentState, Entity, Filter, Operation, PlanSummary,
    PlannedChange, RequestedAction, Role, StepRecord,
};
