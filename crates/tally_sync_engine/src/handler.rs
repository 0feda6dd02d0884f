//! Per-entity message handlers.
//!
//! One handler exists per (entity kind x lifecycle stage): ADD, UPDATE and
//! DELETE plus their ACK counterparts, for each synchronizable entity. The
//! six handler types here are generic over the entity and its store;
//! [`register_entity_handlers`] instantiates and registers the full set for
//! one kind.
//!
//! Application is deliberately idempotent: ADD and UPDATE are unconditional
//! upserts and DELETE succeeds on an already-absent record, so the
//! transport's at-least-once redelivery can never corrupt state. An ACK is
//! emitted only for the non-ACK direction, which bounds every exchange to
//! request -> single ack.

use crate::error::{HandlerError, SyncResult};
use crate::router::HandlerRegistry;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::Arc;
use tally_core::{EntityId, EntityStore, SyncRecord, SyncStatus};
use tally_sync_protocol::{EntityKind, Envelope, EnvelopeType, Operation, ProtocolError};
use tracing::debug;

/// A record type the engine knows how to synchronize.
///
/// Ties an entity to its wire tag segment and to the book scope stamped on
/// its envelopes. A book is its own scope; a bill is scoped by the book it
/// belongs to.
pub trait SyncTarget: SyncRecord + Serialize + DeserializeOwned {
    /// The entity kind used in this record's envelope tags.
    const KIND: EntityKind;

    /// The book id stamped on this record's envelopes.
    fn book_scope(&self) -> EntityId;
}

impl SyncTarget for tally_core::Bill {
    const KIND: EntityKind = EntityKind::Bill;

    fn book_scope(&self) -> EntityId {
        self.book_id
    }
}

impl SyncTarget for tally_core::Book {
    const KIND: EntityKind = EntityKind::Book;

    fn book_scope(&self) -> EntityId {
        self.id
    }
}

/// Outbound path handed to handlers for emitting acknowledgments.
///
/// Implemented by the sync session; tests substitute a recorder.
pub trait SyncOutbound: Send + Sync {
    /// Publishes one envelope on the account's notify topics.
    fn send_envelope(&self, envelope: Envelope) -> SyncResult<()>;

    /// Returns true while envelopes can still be published.
    fn is_open(&self) -> bool;
}

/// A handler for one envelope tag.
pub trait SyncHandler: Send + Sync {
    /// Returns true if this handler wants the envelope.
    fn matches(&self, envelope: &Envelope) -> bool;

    /// Applies the envelope against the entity store.
    ///
    /// Must be idempotent. Emits at most one acknowledgment through
    /// `outbound`, and emits nothing at all on failure.
    fn apply(&self, envelope: &Envelope, outbound: &dyn SyncOutbound) -> Result<(), HandlerError>;

    /// Handler name for log lines.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Decodes an entity body, forces its status to `Synced` and upserts it,
/// then acknowledges with the record id.
fn apply_upsert<E, S>(
    store: &S,
    envelope: &Envelope,
    outbound: &dyn SyncOutbound,
) -> Result<(), HandlerError>
where
    E: SyncTarget,
    S: EntityStore<E>,
{
    let mut entity: E =
        serde_json::from_str(&envelope.content).map_err(ProtocolError::from)?;
    let record_id = entity.id();

    // The sender's state is already committed on its device; locally the
    // record has nothing left to publish.
    entity.set_sync_status(SyncStatus::Synced);
    store.upsert(entity)?;

    if let Some(ack) = envelope.ack_for(record_id) {
        outbound
            .send_envelope(ack)
            .map_err(|e| HandlerError::Ack(e.to_string()))?;
    }
    Ok(())
}

/// Moves a record from `Syncing` to `Synced` for an ADD/UPDATE ACK.
///
/// A record that is no longer `Syncing` (edited again, or already deleted)
/// keeps its newer status: the ACK is stale and acknowledging it would mask
/// a pending local change.
fn apply_acknowledge<E, S>(store: &S, envelope: &Envelope) -> Result<(), HandlerError>
where
    E: SyncTarget,
    S: EntityStore<E>,
{
    let record_id = envelope.record_id()?;
    match store.find_by_id(&record_id)? {
        Some(record) if record.sync_status().can_acknowledge() => {
            store.update_sync_status(&record_id, SyncStatus::Synced)?;
        }
        Some(record) => {
            debug!(
                id = %record_id,
                status = %record.sync_status(),
                "stale acknowledgment ignored"
            );
        }
        None => {
            debug!(id = %record_id, "acknowledgment for unknown record ignored");
        }
    }
    Ok(())
}

/// Handles `ADD_<KIND>`: upserts the entity and acknowledges.
pub struct AddHandler<E, S> {
    store: Arc<S>,
    _entity: PhantomData<E>,
}

impl<E, S> AddHandler<E, S> {
    /// Creates a handler over the given store.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            _entity: PhantomData,
        }
    }
}

impl<E: SyncTarget, S: EntityStore<E>> SyncHandler for AddHandler<E, S> {
    fn matches(&self, envelope: &Envelope) -> bool {
        envelope.kind == EnvelopeType::request(E::KIND, Operation::Add)
    }

    fn apply(&self, envelope: &Envelope, outbound: &dyn SyncOutbound) -> Result<(), HandlerError> {
        apply_upsert(self.store.as_ref(), envelope, outbound)
    }
}

/// Handles `UPDATE_<KIND>`: upserts the entity and acknowledges.
pub struct UpdateHandler<E, S> {
    store: Arc<S>,
    _entity: PhantomData<E>,
}

impl<E, S> UpdateHandler<E, S> {
    /// Creates a handler over the given store.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            _entity: PhantomData,
        }
    }
}

impl<E: SyncTarget, S: EntityStore<E>> SyncHandler for UpdateHandler<E, S> {
    fn matches(&self, envelope: &Envelope) -> bool {
        envelope.kind == EnvelopeType::request(E::KIND, Operation::Update)
    }

    fn apply(&self, envelope: &Envelope, outbound: &dyn SyncOutbound) -> Result<(), HandlerError> {
        apply_upsert(self.store.as_ref(), envelope, outbound)
    }
}

/// Handles `DELETE_<KIND>`: removes the record and acknowledges.
pub struct DeleteHandler<E, S> {
    store: Arc<S>,
    _entity: PhantomData<E>,
}

impl<E, S> DeleteHandler<E, S> {
    /// Creates a handler over the given store.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            _entity: PhantomData,
        }
    }
}

impl<E: SyncTarget, S: EntityStore<E>> SyncHandler for DeleteHandler<E, S> {
    fn matches(&self, envelope: &Envelope) -> bool {
        envelope.kind == EnvelopeType::request(E::KIND, Operation::Delete)
    }

    fn apply(&self, envelope: &Envelope, outbound: &dyn SyncOutbound) -> Result<(), HandlerError> {
        let record_id = envelope.record_id()?;
        let removed = self.store.delete_by_id(&record_id)?;
        if !removed {
            debug!(id = %record_id, "delete for absent record, nothing removed");
        }

        // The ACK goes out either way: the observable outcome (record gone)
        // is what gets acknowledged, not the removal itself.
        if let Some(ack) = envelope.ack_for(record_id) {
            outbound
                .send_envelope(ack)
                .map_err(|e| HandlerError::Ack(e.to_string()))?;
        }
        Ok(())
    }
}

/// Handles `ADD_<KIND>_ACK`.
pub struct AddAckHandler<E, S> {
    store: Arc<S>,
    _entity: PhantomData<E>,
}

impl<E, S> AddAckHandler<E, S> {
    /// Creates a handler over the given store.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            _entity: PhantomData,
        }
    }
}

impl<E: SyncTarget, S: EntityStore<E>> SyncHandler for AddAckHandler<E, S> {
    fn matches(&self, envelope: &Envelope) -> bool {
        envelope.kind == EnvelopeType::ack(E::KIND, Operation::Add)
    }

    fn apply(&self, envelope: &Envelope, _outbound: &dyn SyncOutbound) -> Result<(), HandlerError> {
        apply_acknowledge(self.store.as_ref(), envelope)
    }
}

/// Handles `UPDATE_<KIND>_ACK`.
pub struct UpdateAckHandler<E, S> {
    store: Arc<S>,
    _entity: PhantomData<E>,
}

impl<E, S> UpdateAckHandler<E, S> {
    /// Creates a handler over the given store.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            _entity: PhantomData,
        }
    }
}

impl<E: SyncTarget, S: EntityStore<E>> SyncHandler for UpdateAckHandler<E, S> {
    fn matches(&self, envelope: &Envelope) -> bool {
        envelope.kind == EnvelopeType::ack(E::KIND, Operation::Update)
    }

    fn apply(&self, envelope: &Envelope, _outbound: &dyn SyncOutbound) -> Result<(), HandlerError> {
        apply_acknowledge(self.store.as_ref(), envelope)
    }
}

/// Handles `DELETE_<KIND>_ACK`: removes the record if it still exists.
///
/// The deleting device already removed its copy; the ACK arriving here means
/// a peer confirmed the delete, so a lingering local copy (e.g. restored by
/// an out-of-order replay) is removed as well. Absent records are a no-op.
pub struct DeleteAckHandler<E, S> {
    store: Arc<S>,
    _entity: PhantomData<E>,
}

impl<E, S> DeleteAckHandler<E, S> {
    /// Creates a handler over the given store.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            _entity: PhantomData,
        }
    }
}

impl<E: SyncTarget, S: EntityStore<E>> SyncHandler for DeleteAckHandler<E, S> {
    fn matches(&self, envelope: &Envelope) -> bool {
        envelope.kind == EnvelopeType::ack(E::KIND, Operation::Delete)
    }

    fn apply(&self, envelope: &Envelope, _outbound: &dyn SyncOutbound) -> Result<(), HandlerError> {
        let record_id = envelope.record_id()?;
        self.store.delete_by_id(&record_id)?;
        Ok(())
    }
}

/// Registers the full handler set (six stages) for one entity kind.
pub fn register_entity_handlers<E, S>(registry: &mut HandlerRegistry, store: Arc<S>)
where
    E: SyncTarget,
    S: EntityStore<E> + 'static,
{
    registry.register(Box::new(AddHandler::<E, S>::new(Arc::clone(&store))));
    registry.register(Box::new(UpdateHandler::<E, S>::new(Arc::clone(&store))));
    registry.register(Box::new(DeleteHandler::<E, S>::new(Arc::clone(&store))));
    registry.register(Box::new(AddAckHandler::<E, S>::new(Arc::clone(&store))));
    registry.register(Box::new(UpdateAckHandler::<E, S>::new(Arc::clone(&store))));
    registry.register(Box::new(DeleteAckHandler::<E, S>::new(store)));
}
