//! Resource collaborator contract
//!
//! Every resource kind implements [`Collaborator`]: identity, the subtree
//! it writes under, how its typed spec crosses the wire, and how to install
//! or uninstall one entity. [`Reader`] adds the PLAN side, reading entities
//! from whatever declarative source the installer has.

use crate::context::{ApplyContext, ReconstructContext};
use crate::todo::Change;
use crate::types::{CurrentState, Entity, Filter, RequestedAction};
use anyhow::Context as _;
use wirekit::{Error as WireError, SnapshotSpec, Value, WireBuffer, WireReader};

/// One resource kind
///
/// # Example
///
/// ```ignore
/// struct SettingKind;
///
/// impl Collaborator for SettingKind {
///     type Spec = String;
///
///     fn kind(&self) -> &'static str { "setting" }
///     fn subtree(&self) -> &str { "settings" }
///
///     fn encode_spec(&self, value: &String, out: &mut WireBuffer) -> wirekit::Result<()> {
///         out.append_text(value)
///     }
///
///     fn decode_spec(&self, _key: &str, reader: &mut WireReader<'_>, _ctx: &mut ReconstructContext<'_, '_>)
///         -> anyhow::Result<String> {
///         Ok(reader.read_text()?)
///     }
///
///     fn install(&self, ctx: &mut ApplyContext<'_>, entity: &Entity<String>) -> anyhow::Result<()> {
///         ctx.store.set(&format!("settings/{}", entity.key), &entity.spec)
///     }
///
///     fn uninstall(&self, ctx: &mut ApplyContext<'_>, entity: &Entity<String>) -> anyhow::Result<()> {
///         ctx.store.delete(&format!("settings/{}", entity.key)).map(|_| ())
///     }
/// }
/// ```
pub trait Collaborator {
    /// Kind-specific description of one entity
    type Spec: 'static;

    /// Kind name, also the prefix of every action id of this kind
    fn kind(&self) -> &'static str;

    /// Store subtree this kind writes under. One backup covers it.
    fn subtree(&self) -> &str;

    /// Human-readable description of one step
    fn describe(&self, change: Change, entity: &Entity<Self::Spec>) -> String {
        format!("{} {} {}", change.suffix(), self.kind(), entity.key)
    }

    /// Write the spec into a work item payload
    fn encode_spec(&self, spec: &Self::Spec, out: &mut WireBuffer) -> wirekit::Result<()>;

    /// Rebuild the spec from a payload and the plan's snapshots.
    ///
    /// Runs on the apply side; must not consult the declarative source.
    fn decode_spec(
        &self,
        key: &str,
        reader: &mut WireReader<'_>,
        ctx: &mut ReconstructContext<'_, '_>,
    ) -> anyhow::Result<Self::Spec>;

    fn install(&self, ctx: &mut ApplyContext<'_>, entity: &Entity<Self::Spec>)
    -> anyhow::Result<()>;

    fn uninstall(
        &self,
        ctx: &mut ApplyContext<'_>,
        entity: &Entity<Self::Spec>,
    ) -> anyhow::Result<()>;

    /// Progress weight of one forward step
    fn cost(&self, _entity: &Entity<Self::Spec>) -> u32 {
        1
    }
}

/// PLAN side of a collaborator, generic over the declarative source
pub trait Reader<Src: ?Sized>: Collaborator {
    /// Read the entities of this kind, with current state and requested
    /// action already filled in
    fn read(&self, source: &Src, filter: &Filter) -> anyhow::Result<Vec<Entity<Self::Spec>>>;

    /// Table to carry across to the apply side, if the kind needs one
    fn snapshot(
        &self,
        _source: &Src,
        _entities: &[Entity<Self::Spec>],
    ) -> anyhow::Result<Option<Table>> {
        Ok(None)
    }
}

/// Rows for one snapshot block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub spec: SnapshotSpec,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(spec: SnapshotSpec) -> Self {
        Self {
            spec,
            rows: Vec::new(),
        }
    }

    pub fn push(&mut self, row: Vec<Value>) {
        self.rows.push(row);
    }
}

/// An executable unit rebuilt on the apply side
pub trait Step {
    fn run(&self, ctx: &mut ApplyContext<'_>) -> anyhow::Result<()>;
}

/// A step together with what it acts on
pub struct Prepared<'c> {
    pub key: String,
    pub description: String,
    /// Subtree whose backup envelope covers the step
    pub scope: String,
    pub step: Box<dyn Step + 'c>,
}

struct CollaboratorStep<'c, C: Collaborator> {
    collaborator: &'c C,
    change: Change,
    entity: Entity<C::Spec>,
}

impl<C: Collaborator> Step for CollaboratorStep<'_, C> {
    fn run(&self, ctx: &mut ApplyContext<'_>) -> anyhow::Result<()> {
        match self.change {
            Change::Install => self.collaborator.install(ctx, &self.entity),
            Change::Uninstall => self.collaborator.uninstall(ctx, &self.entity),
        }
    }
}

/// Build the payload for one entity of `collaborator`
pub fn encode_entity<C: Collaborator + ?Sized>(
    collaborator: &C,
    entity: &Entity<C::Spec>,
) -> wirekit::Result<WireBuffer> {
    let mut out = WireBuffer::new();
    out.append_text(&entity.key)?;
    out.append_text(&entity.component)?;
    out.append_int(entity.current.code())?;
    out.append_int(entity.requested.code())?;
    collaborator.encode_spec(&entity.spec, &mut out)?;
    Ok(out)
}

/// Rebuild one entity from its payload
pub fn decode_entity<C: Collaborator + ?Sized>(
    collaborator: &C,
    payload: &WireBuffer,
    ctx: &mut ReconstructContext<'_, '_>,
) -> anyhow::Result<Entity<C::Spec>> {
    let mut reader = payload.reader();
    let key = reader.read_text()?;
    let component = reader.read_text()?;

    let offset = reader.position();
    let current = CurrentState::from_code(reader.read_int()?).ok_or_else(|| WireError::Malformed {
        offset,
        message: format!("bad current state for {key}"),
    })?;
    let offset = reader.position();
    let requested =
        RequestedAction::from_code(reader.read_int()?).ok_or_else(|| WireError::Malformed {
            offset,
            message: format!("bad requested action for {key}"),
        })?;

    let spec = collaborator
        .decode_spec(&key, &mut reader, ctx)
        .with_context(|| format!("{} {key}", collaborator.kind()))?;
    Ok(Entity {
        key,
        component,
        current,
        requested,
        spec,
    })
}

/// Turn one payload into a step of `collaborator`
pub(crate) fn prepare<'c, C: Collaborator>(
    collaborator: &'c C,
    change: Change,
    payload: &WireBuffer,
    ctx: &mut ReconstructContext<'_, '_>,
) -> anyhow::Result<Prepared<'c>> {
    let entity = decode_entity(collaborator, payload, ctx)?;
    Ok(Prepared {
        key: entity.key.clone(),
        description: collaborator.describe(change, &entity),
        scope: collaborator.subtree().to_string(),
        step: Box::new(CollaboratorStep {
            collaborator,
            change,
            entity,
        }),
    })
}
