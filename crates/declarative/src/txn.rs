//! Named backup envelope around the writes to one store subtree.
//!
//! `begin` queues `config.begin` with `config.abort` as its rollback, and
//! `commit` queues `config.commit` with none. If any step between them
//! fails, commit never runs and the rollback pass aborts the backup. Once
//! commit has run, nothing inside the envelope is rolled back any more.

use crate::context::ApplyContext;
use crate::error::{EngineError, Result};
use crate::queue::ActionQueue;
use crate::resource::{Prepared, Step};
use wirekit::WireBuffer;

/// Kind prefix of envelope actions
pub const CONFIG_KIND: &str = "config";
pub const BEGIN_ACTION: &str = "config.begin";
pub const ABORT_ACTION: &str = "config.abort";
pub const COMMIT_ACTION: &str = "config.commit";

/// Progress weight of one envelope step
const ENVELOPE_COST: u32 = 1;

/// One named backup of one subtree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupEnvelope {
    id: String,
    subtree: String,
}

impl BackupEnvelope {
    pub fn new(id: impl Into<String>, subtree: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            subtree: subtree.into(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn subtree(&self) -> &str {
        &self.subtree
    }

    fn payload(&self) -> wirekit::Result<WireBuffer> {
        let mut out = WireBuffer::new();
        out.append_text(&self.id)?;
        out.append_text(&self.subtree)?;
        Ok(out)
    }

    pub fn decode(payload: &WireBuffer) -> wirekit::Result<Self> {
        let mut reader = payload.reader();
        let id = reader.read_text()?;
        let subtree = reader.read_text()?;
        Ok(Self { id, subtree })
    }

    /// Queue the begin action, with abort as its rollback
    pub fn begin(&self, queue: &mut ActionQueue) -> wirekit::Result<()> {
        let payload = self.payload()?;
        queue.enqueue_with_rollback(
            BEGIN_ACTION,
            payload.clone(),
            ABORT_ACTION,
            payload,
            ENVELOPE_COST,
        );
        Ok(())
    }

    /// Queue the commit action
    pub fn commit(&self, queue: &mut ActionQueue) -> wirekit::Result<()> {
        queue.enqueue(COMMIT_ACTION, self.payload()?, ENVELOPE_COST);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum EnvelopeAction {
    Begin,
    Commit,
    Abort,
}

struct EnvelopeStep {
    action: EnvelopeAction,
    envelope: BackupEnvelope,
}

impl Step for EnvelopeStep {
    fn run(&self, ctx: &mut ApplyContext<'_>) -> anyhow::Result<()> {
        let BackupEnvelope { id, subtree } = &self.envelope;
        match self.action {
            EnvelopeAction::Begin => ctx.store.begin_backup(id, subtree),
            EnvelopeAction::Commit => ctx.store.commit_backup(id),
            EnvelopeAction::Abort => ctx.store.abort_backup(id),
        }
    }
}

/// Rebuild a `config.*` step from its payload
pub(crate) fn prepare(suffix: &str, payload: &WireBuffer) -> Result<Prepared<'static>> {
    let action = match suffix {
        "begin" => EnvelopeAction::Begin,
        "commit" => EnvelopeAction::Commit,
        "abort" => EnvelopeAction::Abort,
        _ => {
            return Err(EngineError::UnknownAction {
                action: format!("{CONFIG_KIND}.{suffix}"),
            });
        }
    };
    let envelope = BackupEnvelope::decode(payload)?;
    let description = format!("{suffix} backup of {}", envelope.subtree);
    Ok(Prepared {
        key: envelope.id.clone(),
        description,
        scope: envelope.subtree.clone(),
        step: Box::new(EnvelopeStep { action, envelope }),
    })
}
