//! Hierarchical configuration store and its named backups.
//!
//! Paths are `/`-separated segments (`sites/default/port`). A backup saves
//! one subtree when it begins; aborting restores that subtree, committing
//! discards the saved copy.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Target configuration store.
///
/// Writes return `anyhow::Result` so backends can surface their own IO or
/// protocol errors next to [`StoreError`].
pub trait ConfigStore {
    /// Value stored at `path`, if any
    fn get(&self, path: &str) -> Option<String>;

    /// Whether a node exists at `path`, with or without a value
    fn exists(&self, path: &str) -> bool;

    /// Names of the direct children of `path`
    fn children(&self, path: &str) -> Vec<String>;

    fn set(&mut self, path: &str, value: &str) -> anyhow::Result<()>;

    /// Remove the node at `path` and everything below it
    fn delete(&mut self, path: &str) -> anyhow::Result<bool>;

    fn begin_backup(&mut self, id: &str, subtree: &str) -> anyhow::Result<()>;

    fn commit_backup(&mut self, id: &str) -> anyhow::Result<()>;

    fn abort_backup(&mut self, id: &str) -> anyhow::Result<()>;
}

/// Lifecycle of a named backup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupState {
    Begun,
    Committed,
    Aborted,
}

impl fmt::Display for BackupState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Begun => "begun",
            Self::Committed => "committed",
            Self::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// Errors raised by [`MemoryStore`]
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid store path: {path:?}")]
    InvalidPath { path: String },

    #[error("backup {id} already exists")]
    DuplicateBackup { id: String },

    #[error("subtree {subtree} overlaps {other}, which has backup {existing} in flight")]
    BackupInFlight {
        subtree: String,
        other: String,
        existing: String,
    },

    #[error("unknown backup {id}")]
    UnknownBackup { id: String },

    #[error("backup {id} cannot {action} after it was {state}")]
    InvalidTransition {
        id: String,
        action: &'static str,
        state: BackupState,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct Node {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    children: BTreeMap<String, Node>,
}

/// One backup record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backup {
    pub id: String,
    pub subtree: String,
    pub state: BackupState,
    /// Subtree contents when the backup began. `None` when it did not exist.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    saved: Option<Node>,
}

/// In-memory reference store, serializable for persistence between runs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryStore {
    #[serde(default)]
    root: Node,
    #[serde(default)]
    backups: Vec<Backup>,
}

fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn normalize(path: &str) -> String {
    segments(path).join("/")
}

/// Whether two subtrees are the same or one contains the other
fn overlaps(a: &str, b: &str) -> bool {
    let (a, b) = (segments(a), segments(b));
    let shared = a.len().min(b.len());
    a[..shared] == b[..shared]
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn node(&self, path: &str) -> Option<&Node> {
        segments(path)
            .into_iter()
            .try_fold(&self.root, |node, seg| node.children.get(seg))
    }

    fn take_node(&mut self, path: &str) -> Option<Node> {
        let segs = segments(path);
        let (last, parents) = segs.split_last()?;
        let parent = parents
            .iter()
            .try_fold(&mut self.root, |node, seg| node.children.get_mut(*seg))?;
        parent.children.remove(*last)
    }

    fn put_node(&mut self, path: &str, node: Node) {
        let segs = segments(path);
        let Some((last, parents)) = segs.split_last() else {
            self.root = node;
            return;
        };
        let mut parent = &mut self.root;
        for seg in parents {
            parent = parent.children.entry((*seg).to_string()).or_default();
        }
        parent.children.insert((*last).to_string(), node);
    }

    fn backup_mut(&mut self, id: &str) -> Result<&mut Backup, StoreError> {
        self.backups
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or_else(|| StoreError::UnknownBackup { id: id.to_string() })
    }

    /// All backup records, in the order they began
    pub fn backups(&self) -> &[Backup] {
        &self.backups
    }

    /// Backups that have begun and not yet finished
    pub fn in_flight(&self) -> impl Iterator<Item = &Backup> {
        self.backups.iter().filter(|b| b.state == BackupState::Begun)
    }

    /// Forget committed and aborted backups
    pub fn clear_finished(&mut self) {
        self.backups.retain(|b| b.state == BackupState::Begun);
    }

    /// Every stored value with its full path, depth first
    pub fn entries(&self) -> Vec<(String, String)> {
        fn walk(node: &Node, prefix: &str, out: &mut Vec<(String, String)>) {
            for (name, child) in &node.children {
                let path = if prefix.is_empty() {
                    name.clone()
                } else {
                    format!("{prefix}/{name}")
                };
                if let Some(value) = &child.value {
                    out.push((path.clone(), value.clone()));
                }
                walk(child, &path, out);
            }
        }
        let mut out = Vec::new();
        walk(&self.root, "", &mut out);
        out
    }
}

impl ConfigStore for MemoryStore {
    fn get(&self, path: &str) -> Option<String> {
        self.node(path).and_then(|n| n.value.clone())
    }

    fn exists(&self, path: &str) -> bool {
        !segments(path).is_empty() && self.node(path).is_some()
    }

    fn children(&self, path: &str) -> Vec<String> {
        self.node(path)
            .map(|n| n.children.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn set(&mut self, path: &str, value: &str) -> anyhow::Result<()> {
        let segs = segments(path);
        if segs.is_empty() {
            return Err(StoreError::InvalidPath {
                path: path.to_string(),
            }
            .into());
        }
        let mut node = &mut self.root;
        for seg in segs {
            node = node.children.entry(seg.to_string()).or_default();
        }
        node.value = Some(value.to_string());
        Ok(())
    }

    fn delete(&mut self, path: &str) -> anyhow::Result<bool> {
        if segments(path).is_empty() {
            return Err(StoreError::InvalidPath {
                path: path.to_string(),
            }
            .into());
        }
        Ok(self.take_node(path).is_some())
    }

    fn begin_backup(&mut self, id: &str, subtree: &str) -> anyhow::Result<()> {
        if self.backups.iter().any(|b| b.id == id) {
            return Err(StoreError::DuplicateBackup { id: id.to_string() }.into());
        }
        if let Some(other) = self.in_flight().find(|b| overlaps(&b.subtree, subtree)) {
            return Err(StoreError::BackupInFlight {
                subtree: normalize(subtree),
                other: other.subtree.clone(),
                existing: other.id.clone(),
            }
            .into());
        }
        let saved = self.node(subtree).cloned();
        log::debug!("Backup {id} begun for {subtree}");
        self.backups.push(Backup {
            id: id.to_string(),
            subtree: normalize(subtree),
            state: BackupState::Begun,
            saved,
        });
        Ok(())
    }

    fn commit_backup(&mut self, id: &str) -> anyhow::Result<()> {
        let backup = self.backup_mut(id)?;
        if backup.state != BackupState::Begun {
            return Err(StoreError::InvalidTransition {
                id: id.to_string(),
                action: "commit",
                state: backup.state,
            }
            .into());
        }
        backup.state = BackupState::Committed;
        backup.saved = None;
        log::debug!("Backup {id} committed");
        Ok(())
    }

    fn abort_backup(&mut self, id: &str) -> anyhow::Result<()> {
        let backup = self.backup_mut(id)?;
        if backup.state != BackupState::Begun {
            return Err(StoreError::InvalidTransition {
                id: id.to_string(),
                action: "abort",
                state: backup.state,
            }
            .into());
        }
        backup.state = BackupState::Aborted;
        let saved = backup.saved.take();
        let subtree = backup.subtree.clone();
        match saved {
            Some(node) => self.put_node(&subtree, node),
            None if subtree.is_empty() => self.root = Node::default(),
            None => {
                self.take_node(&subtree);
            }
        }
        log::debug!("Backup {id} aborted, {subtree} restored");
        Ok(())
    }
}
