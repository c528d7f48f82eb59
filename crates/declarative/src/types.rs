//! Core types shared by both phases

use crate::todo::{ToDo, classify};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Whether an entity exists in the target store right now
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CurrentState {
    #[default]
    Absent,
    Present,
}

impl CurrentState {
    pub fn from_exists(exists: bool) -> Self {
        if exists { Self::Present } else { Self::Absent }
    }

    pub(crate) fn code(self) -> i64 {
        match self {
            Self::Absent => 0,
            Self::Present => 1,
        }
    }

    pub(crate) fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Absent),
            1 => Some(Self::Present),
            _ => None,
        }
    }
}

/// What the running operation asks for an entity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestedAction {
    Install,
    Uninstall,
    #[default]
    NoChange,
    Reinstall,
}

impl RequestedAction {
    pub(crate) fn code(self) -> i64 {
        match self {
            Self::Install => 0,
            Self::Uninstall => 1,
            Self::NoChange => 2,
            Self::Reinstall => 3,
        }
    }

    pub(crate) fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Install),
            1 => Some(Self::Uninstall),
            2 => Some(Self::NoChange),
            3 => Some(Self::Reinstall),
            _ => None,
        }
    }
}

/// Installer operation a reconciliation run is invoked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Install,
    Uninstall,
    Repair,
}

impl Operation {
    /// Action requested for every entity the operation covers
    pub fn requested(self) -> RequestedAction {
        match self {
            Self::Install => RequestedAction::Install,
            Self::Uninstall => RequestedAction::Uninstall,
            Self::Repair => RequestedAction::Reinstall,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Uninstall => "uninstall",
            Self::Repair => "repair",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "install" => Ok(Self::Install),
            "uninstall" => Ok(Self::Uninstall),
            "repair" => Ok(Self::Repair),
            other => Err(format!("unknown operation: {other}")),
        }
    }
}

/// One configurable object of a resource kind.
///
/// Built by a reader during PLAN and read-only afterwards. `S` is
/// fixed per kind, so collaborators never probe for optional columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity<S> {
    /// Unique within its kind
    pub key: String,
    /// Installer component that owns the entity
    pub component: String,
    pub current: CurrentState,
    pub requested: RequestedAction,
    pub spec: S,
}

impl<S> Entity<S> {
    pub fn new(key: impl Into<String>, component: impl Into<String>, spec: S) -> Self {
        Self {
            key: key.into(),
            component: component.into(),
            current: CurrentState::Absent,
            requested: RequestedAction::NoChange,
            spec,
        }
    }

    pub fn with_current(mut self, current: CurrentState) -> Self {
        self.current = current;
        self
    }

    pub fn with_requested(mut self, requested: RequestedAction) -> Self {
        self.requested = requested;
        self
    }

    /// What has to happen to this entity
    pub fn todo(&self) -> ToDo {
        classify(self.current, self.requested)
    }
}

/// Which part of a plan a work item belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Forward,
    Rollback,
}

/// Entity filter from a `kind` or `kind.name` target
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    kind: Option<String>,
    name: Option<String>,
}

impl Filter {
    /// Filter that accepts everything
    pub fn all() -> Self {
        Self::default()
    }

    /// Parse a target like `user` or `user.svc_web`.
    ///
    /// Only the first dot separates kind from name, so names may contain
    /// dots themselves.
    pub fn parse(target: &str) -> Self {
        let target = target.trim();
        if target.is_empty() {
            return Self::all();
        }
        match target.split_once('.') {
            Some((kind, name)) => Self {
                kind: Some(kind.to_string()).filter(|k| !k.is_empty()),
                name: Some(name.to_string()).filter(|n| !n.is_empty()),
            },
            None => Self {
                kind: Some(target.to_string()),
                name: None,
            },
        }
    }

    pub fn from_target(target: Option<&str>) -> Self {
        target.map(Self::parse).unwrap_or_default()
    }

    pub fn kind(&self) -> Option<&str> {
        self.kind.as_deref()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Whether entities of `kind` can match at all
    pub fn matches_kind(&self, kind: &str) -> bool {
        self.kind.as_deref().is_none_or(|k| k == kind)
    }

    /// Check if an entity matches the filter criteria
    pub fn matches(&self, kind: &str, key: &str) -> bool {
        if !self.matches_kind(kind) {
            return false;
        }
        if let Some(n) = &self.name
            && !key.contains(n.as_str())
        {
            return false;
        }
        true
    }
}

/// One entity the plan will change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedChange {
    pub kind: String,
    pub key: String,
    pub component: String,
    pub todo: ToDo,
}

/// Summary of what PLAN decided
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSummary {
    pub installs: usize,
    pub uninstalls: usize,
    pub reinstalls: usize,
    pub unchanged: usize,
    pub changes: Vec<PlannedChange>,
}

impl PlanSummary {
    /// Total number of entities that will change
    pub fn total_changes(&self) -> usize {
        self.installs + self.uninstalls + self.reinstalls
    }

    /// Check if there are any changes
    pub fn has_changes(&self) -> bool {
        self.total_changes() > 0
    }

    /// Record the decision for one entity
    pub fn record(&mut self, kind: &str, key: &str, component: &str, todo: ToDo) {
        match todo {
            ToDo::Noop => {
                self.unchanged += 1;
                return;
            }
            ToDo::Install => self.installs += 1,
            ToDo::Uninstall => self.uninstalls += 1,
            ToDo::Reinstall => self.reinstalls += 1,
        }
        self.changes.push(PlannedChange {
            kind: kind.to_string(),
            key: key.to_string(),
            component: component.to_string(),
            todo,
        });
    }
}

/// Options for APPLY
#[derive(Debug, Clone, Copy, Default)]
pub struct ApplyOptions {
    /// Reconstruct and list steps without executing them
    pub dry_run: bool,
}

/// A step APPLY executed, or would execute in a dry run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub action: String,
    pub key: String,
    pub description: String,
    pub cost: u32,
}

/// Summary of an APPLY run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplySummary {
    pub dry_run: bool,
    /// Forward steps, in execution order
    pub steps: Vec<StepRecord>,
    /// Sum of the cost of every forward step in the plan
    pub total_cost: u64,
    /// Cost of the steps that actually ran
    pub completed_cost: u64,
}

impl ApplySummary {
    pub fn executed(&self) -> usize {
        if self.dry_run { 0 } else { self.steps.len() }
    }
}
