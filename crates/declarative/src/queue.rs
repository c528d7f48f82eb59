//! Deferred action queue.
//!
//! Work items are recorded during PLAN and written to the buffer as one
//! queue section:
//!
//! ```text
//! "queue" <count> { <action> <role> <cost> <payload blob> }*
//! ```
//!
//! A rollback item always sits immediately before the forward item it
//! undoes, so by the time any forward action runs its rollback is already
//! known to the apply side.

use crate::types::Role;
use wirekit::{Error, Result, Value, WireBuffer, WireReader};

/// Marker opening a queue section
pub const QUEUE_MARKER: &str = "queue";

/// One deferred action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub action: String,
    pub payload: WireBuffer,
    pub role: Role,
    /// Progress weight. Rollback items carry 0.
    pub cost: u32,
}

impl WorkItem {
    pub fn is_rollback(&self) -> bool {
        self.role == Role::Rollback
    }
}

/// Ordered list of work items, consumed once by [`ActionQueue::flush`]
#[derive(Debug, Default)]
pub struct ActionQueue {
    items: Vec<WorkItem>,
}

impl ActionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a forward item with no rollback
    pub fn enqueue(&mut self, action: impl Into<String>, payload: WireBuffer, cost: u32) {
        self.items.push(WorkItem {
            action: action.into(),
            payload,
            role: Role::Forward,
            cost,
        });
    }

    /// Append a rollback item followed immediately by its forward item
    pub fn enqueue_with_rollback(
        &mut self,
        action: impl Into<String>,
        payload: WireBuffer,
        rollback_action: impl Into<String>,
        rollback_payload: WireBuffer,
        cost: u32,
    ) {
        self.items.push(WorkItem {
            action: rollback_action.into(),
            payload: rollback_payload,
            role: Role::Rollback,
            cost: 0,
        });
        self.enqueue(action, payload, cost);
    }

    pub fn items(&self) -> &[WorkItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Sum of all item costs
    pub fn total_cost(&self) -> u64 {
        self.items.iter().map(|i| u64::from(i.cost)).sum()
    }

    /// Write the queue section into `out`, consuming the queue
    pub fn flush(self, out: &mut WireBuffer) -> Result<()> {
        let mut section = WireBuffer::new();
        section.append_text(QUEUE_MARKER)?;
        section.append_int(self.items.len() as i64)?;
        for item in &self.items {
            section.append_text(&item.action)?;
            section.append_int(match item.role {
                Role::Forward => 0,
                Role::Rollback => 1,
            })?;
            section.append_int(i64::from(item.cost))?;
            section.append_blob(item.payload.as_str().as_bytes())?;
        }
        log::debug!("Flushed {} work items", self.items.len());
        out.append_buffer(&section);
        Ok(())
    }
}

/// Whether the next field of `reader` opens a queue section
pub fn is_queue_start(reader: &WireReader<'_>) -> bool {
    matches!(reader.peek(), Ok(Value::Text(ref marker)) if marker == QUEUE_MARKER)
}

/// Read one queue section back.
///
/// Rejects a rollback item that is not immediately followed by a forward
/// item.
pub fn decode_items(reader: &mut WireReader<'_>) -> Result<Vec<WorkItem>> {
    let start = reader.position();
    let marker = reader.read_text()?;
    if marker != QUEUE_MARKER {
        return Err(Error::Malformed {
            offset: start,
            message: format!("expected queue section, found {marker:?}"),
        });
    }
    let count = reader.read_count()?;
    let mut items = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        let offset = reader.position();
        let action = reader.read_text()?;
        let role = match reader.read_int()? {
            0 => Role::Forward,
            1 => Role::Rollback,
            other => {
                return Err(Error::Malformed {
                    offset,
                    message: format!("unknown role {other} for {action}"),
                });
            }
        };
        let cost = u32::try_from(reader.read_int()?).map_err(|_| Error::Malformed {
            offset,
            message: format!("cost out of range for {action}"),
        })?;
        let payload = String::from_utf8(reader.read_blob()?).map_err(|_| Error::Malformed {
            offset,
            message: format!("payload of {action} is not UTF-8"),
        })?;
        if let Some(prev) = items.last().filter(|p: &&WorkItem| p.is_rollback())
            && role != Role::Forward
        {
            return Err(Error::Malformed {
                offset,
                message: format!("rollback {} is not followed by a forward item", prev.action),
            });
        }
        items.push(WorkItem {
            action,
            payload: WireBuffer::from_string(payload),
            role,
            cost,
        });
    }
    if let Some(last) = items.last().filter(|l| l.is_rollback()) {
        return Err(Error::Malformed {
            offset: reader.position(),
            message: format!("rollback {} is not followed by a forward item", last.action),
        });
    }
    Ok(items)
}
