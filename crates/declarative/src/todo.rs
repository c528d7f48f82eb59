//! Classification of what has to happen to one entity

use crate::types::{CurrentState, RequestedAction};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The work an entity needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToDo {
    Noop,
    Install,
    Uninstall,
    /// Uninstall the old entity, then install the new one
    Reinstall,
}

/// A single direction of change, the unit work items are made of
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Install,
    Uninstall,
}

impl Change {
    /// The change that undoes this one
    pub fn inverse(self) -> Self {
        match self {
            Self::Install => Self::Uninstall,
            Self::Uninstall => Self::Install,
        }
    }

    /// Suffix used in action ids
    pub fn suffix(self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Uninstall => "uninstall",
        }
    }

    pub fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "install" => Some(Self::Install),
            "uninstall" => Some(Self::Uninstall),
            _ => None,
        }
    }

    /// Action id for this change on `kind`
    pub fn action(self, kind: &str) -> String {
        format!("{kind}.{}", self.suffix())
    }
}

impl ToDo {
    pub fn is_noop(self) -> bool {
        self == Self::Noop
    }

    /// Changes to enqueue, in order
    pub fn changes(self) -> &'static [Change] {
        match self {
            Self::Noop => &[],
            Self::Install => &[Change::Install],
            Self::Uninstall => &[Change::Uninstall],
            Self::Reinstall => &[Change::Uninstall, Change::Install],
        }
    }
}

impl fmt::Display for ToDo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Noop => "no change",
            Self::Install => "install",
            Self::Uninstall => "uninstall",
            Self::Reinstall => "reinstall",
        };
        f.write_str(s)
    }
}

/// Decide what to do with an entity. Identical for every kind.
pub fn classify(current: CurrentState, requested: RequestedAction) -> ToDo {
    match (current, requested) {
        (CurrentState::Absent, RequestedAction::Install) => ToDo::Install,
        (CurrentState::Present, RequestedAction::Uninstall) => ToDo::Uninstall,
        (CurrentState::Present, RequestedAction::Reinstall) => ToDo::Reinstall,
        _ => ToDo::Noop,
    }
}
