//! Sync session state machine.
//!
//! A [`SyncSession`] owns the transport connection, the outbound send path
//! and the routing of inbound envelopes. One session serves one account on
//! one device; entity kinds are wired in with [`SyncSession::register_entity`],
//! which installs the kind's six handlers and its recovery sweeper.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::handler::{register_entity_handlers, SyncOutbound, SyncTarget};
use crate::router::{DispatchOutcome, HandlerRegistry};
use crate::transport::PubSubTransport;
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tally_core::{EntityId, EntityStore, SyncStatus};
use tally_sync_protocol::{notify_topic, Envelope, Operation, ProtocolError};
use tracing::{debug, warn};

/// The current state of a sync session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No broker connection; sends fail, pending records accumulate.
    Disconnected,
    /// Transport connection being established.
    Connecting,
    /// Connected; envelopes flow both ways.
    Connected,
    /// Shut down for good; nothing is accepted or published anymore.
    Closed,
}

impl SessionState {
    /// Returns true while envelopes can be published and applied.
    #[must_use]
    pub fn is_open(self) -> bool {
        self == SessionState::Connected
    }

    /// Returns true if `connect` may be called from this state.
    #[must_use]
    pub fn can_connect(self) -> bool {
        self == SessionState::Disconnected
    }

    /// Returns true once the session has been shut down.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self == SessionState::Closed
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Disconnected => "DISCONNECTED",
            SessionState::Connecting => "CONNECTING",
            SessionState::Connected => "CONNECTED",
            SessionState::Closed => "CLOSED",
        };
        f.write_str(name)
    }
}

/// Counters kept by a session.
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    /// Envelopes published, acknowledgments included.
    pub envelopes_sent: u64,
    /// Acknowledgments among the published envelopes.
    pub acks_sent: u64,
    /// Inbound envelopes routed to the registry.
    pub envelopes_received: u64,
    /// Inbound payloads dropped because they failed to decode.
    pub malformed_dropped: u64,
    /// Inbound envelopes no handler claimed.
    pub unmatched_dropped: u64,
    /// Own publishes echoed back by the broker and dropped.
    pub self_echoes_dropped: u64,
    /// Recovery sweeps completed.
    pub sweeps_completed: u64,
    /// Records republished by recovery sweeps.
    pub records_republished: u64,
}

/// Result of one recovery sweep across all registered entity kinds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Pending records republished, one envelope each.
    pub republished: usize,
}

/// How one inbound payload was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Decoded and routed; the outcome counts claiming handlers.
    Routed(DispatchOutcome),
    /// Dropped: payload failed to decode.
    Malformed,
    /// Dropped: the broker echoed this device's own publish.
    SelfEcho,
    /// Dropped: the session is closed.
    Rejected,
}

/// Per-kind source of records for the recovery sweep.
trait RecoverySweep: Send + Sync {
    /// Republishes every pending record once; returns how many.
    fn sweep(&self, outbound: &dyn SyncOutbound) -> SyncResult<usize>;
}

/// Sweeper for one entity kind.
struct EntitySweeper<E, S> {
    store: Arc<S>,
    _entity: PhantomData<E>,
}

impl<E, S> EntitySweeper<E, S> {
    fn new(store: Arc<S>) -> Self {
        Self {
            store,
            _entity: PhantomData,
        }
    }
}

impl<E: SyncTarget, S: EntityStore<E>> RecoverySweep for EntitySweeper<E, S> {
    fn sweep(&self, outbound: &dyn SyncOutbound) -> SyncResult<usize> {
        let pending = self.store.find_pending_sync()?;
        let mut republished = 0;

        for record in pending {
            if !outbound.is_open() {
                debug!("session left connected state, sweep stopped");
                break;
            }

            let seen = record.sync_status();
            let operation = match seen {
                SyncStatus::NotSynced => Operation::Add,
                // A SYNCING record's lost publish may have been either an
                // ADD or an UPDATE; UPDATE upserts remotely, so it
                // converges for both.
                SyncStatus::Updated | SyncStatus::Syncing => Operation::Update,
                SyncStatus::Synced => continue,
            };

            let body = serde_json::to_string(&record).map_err(ProtocolError::from)?;
            let envelope = Envelope::request(E::KIND, operation, body, record.book_scope());
            outbound.send_envelope(envelope)?;
            mark_syncing_if_unchanged::<E, S>(self.store.as_ref(), &record.id(), seen)?;
            republished += 1;
        }

        Ok(republished)
    }
}

/// Writes `Syncing` only if the record's status is still what the publish
/// snapshot saw. A record edited or removed while its envelope was being
/// published keeps the newer status and stays pending.
fn mark_syncing_if_unchanged<E, S>(store: &S, id: &EntityId, seen: SyncStatus) -> SyncResult<()>
where
    E: SyncTarget,
    S: EntityStore<E>,
{
    match store.find_by_id(id)? {
        Some(record) if record.sync_status() == seen => {
            store.update_sync_status(id, SyncStatus::Syncing)?;
        }
        Some(record) => {
            debug!(id = %id, status = %record.sync_status(), "record changed during publish, left pending");
        }
        None => {
            debug!(id = %id, "record removed during publish");
        }
    }
    Ok(())
}

/// The sync session.
///
/// All dependencies are injected: the transport at construction, one store
/// per registered entity kind. The session never reaches for globals.
pub struct SyncSession<T: PubSubTransport> {
    config: SyncConfig,
    transport: Arc<T>,
    router: HandlerRegistry,
    sweepers: Vec<Box<dyn RecoverySweep>>,
    state: RwLock<SessionState>,
    /// Serializes outbound record publishes so the publish and the
    /// follow-up status write form one atomic unit per record.
    send_lock: Mutex<()>,
    stats: RwLock<SessionStats>,
}

impl<T: PubSubTransport> SyncSession<T> {
    /// Creates a disconnected session.
    pub fn new(config: SyncConfig, transport: Arc<T>) -> Self {
        Self {
            config,
            transport,
            router: HandlerRegistry::new(),
            sweepers: Vec::new(),
            state: RwLock::new(SessionState::Disconnected),
            send_lock: Mutex::new(()),
            stats: RwLock::new(SessionStats::default()),
        }
    }

    /// Wires one entity kind into the session: its six handlers and its
    /// recovery sweeper, all reading through the given store.
    pub fn register_entity<E, S>(&mut self, store: Arc<S>)
    where
        E: SyncTarget,
        S: EntityStore<E> + 'static,
    {
        register_entity_handlers::<E, S>(&mut self.router, Arc::clone(&store));
        self.sweepers.push(Box::new(EntitySweeper::<E, S>::new(store)));
    }

    /// The session configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// The underlying transport.
    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> SessionStats {
        self.stats.read().clone()
    }

    fn set_state(&self, state: SessionState) {
        *self.state.write() = state;
    }

    /// Connects the transport and runs the recovery sweep.
    ///
    /// The sweep republishes every locally stored record whose status is
    /// `NOT_SYNCED`, `UPDATED` or `SYNCING` — the last covering publishes
    /// that left before a disconnection but were never acknowledged. This
    /// sweep is the engine's sole retry mechanism for lost envelopes.
    pub fn connect(&self) -> SyncResult<SweepReport> {
        {
            let state = self.state();
            if state.is_terminal() {
                return Err(SyncError::Closed);
            }
            if !state.can_connect() {
                return Err(SyncError::InvalidStateTransition {
                    from: state.to_string(),
                    to: SessionState::Connecting.to_string(),
                });
            }
        }

        self.set_state(SessionState::Connecting);
        if let Err(error) = self.transport.connect() {
            self.set_state(SessionState::Disconnected);
            return Err(error);
        }
        self.set_state(SessionState::Connected);

        self.run_recovery_sweep()
    }

    /// Disconnects the transport. Pending records keep their status and are
    /// republished by the sweep on the next [`connect`](Self::connect).
    pub fn disconnect(&self) -> SyncResult<()> {
        if self.state().is_terminal() {
            return Err(SyncError::Closed);
        }
        let result = self.transport.disconnect();
        self.set_state(SessionState::Disconnected);
        result
    }

    /// Shuts the session down for good.
    pub fn close(&self) {
        let previous = {
            let mut state = self.state.write();
            std::mem::replace(&mut *state, SessionState::Closed)
        };
        if previous != SessionState::Closed {
            if let Err(error) = self.transport.disconnect() {
                warn!(%error, "transport disconnect during close failed");
            }
        }
    }

    /// Publishes the current stored state of a record as ADD or UPDATE and
    /// marks it `SYNCING`.
    ///
    /// The record is re-read from the store under the send lock so the
    /// envelope carries the freshest committed state, and the status write
    /// happens only if no concurrent edit slipped in between.
    pub fn send_change<E, S>(
        &self,
        store: &S,
        record_id: EntityId,
        operation: Operation,
    ) -> SyncResult<()>
    where
        E: SyncTarget,
        S: EntityStore<E>,
    {
        if operation == Operation::Delete {
            return Err(SyncError::Unroutable(
                "delete sends carry no body, use send_delete".into(),
            ));
        }

        let _guard = self.send_lock.lock();

        let record = store
            .find_by_id(&record_id)?
            .ok_or(SyncError::UnknownRecord(record_id))?;
        let seen = record.sync_status();
        let body = serde_json::to_string(&record).map_err(ProtocolError::from)?;
        let envelope = Envelope::request(E::KIND, operation, body, record.book_scope());

        self.send_envelope(envelope)?;
        mark_syncing_if_unchanged::<E, S>(store, &record_id, seen)
    }

    /// Publishes a DELETE for a record that was already removed locally.
    pub fn send_delete<E: SyncTarget>(
        &self,
        record_id: EntityId,
        book_id: EntityId,
    ) -> SyncResult<()> {
        let _guard = self.send_lock.lock();
        self.send_envelope(Envelope::tombstone(E::KIND, record_id, book_id))
    }

    /// Runs the recovery sweep over every registered entity kind.
    ///
    /// Holds the send lock for the duration, so concurrent
    /// [`send_change`](Self::send_change) calls queue behind it.
    pub fn run_recovery_sweep(&self) -> SyncResult<SweepReport> {
        let _guard = self.send_lock.lock();

        let mut report = SweepReport::default();
        for sweeper in &self.sweepers {
            if !self.is_open() {
                debug!("sweep cancelled, session no longer connected");
                break;
            }
            report.republished += sweeper.sweep(self)?;
        }

        let mut stats = self.stats.write();
        stats.sweeps_completed += 1;
        stats.records_republished += report.republished as u64;
        Ok(report)
    }

    /// Decodes and routes one inbound payload.
    ///
    /// Never panics and never returns an error to the transport boundary:
    /// malformed payloads and unclaimed envelopes are logged, counted and
    /// dropped. Called sequentially by the [`crate::SyncWorker`] thread.
    pub fn deliver(&self, payload: &[u8]) -> Delivery {
        if self.state().is_terminal() {
            debug!("envelope after close rejected");
            return Delivery::Rejected;
        }

        let envelope = match Envelope::decode(payload) {
            Ok(envelope) => envelope,
            Err(error) => {
                warn!(%error, "dropping malformed envelope");
                self.stats.write().malformed_dropped += 1;
                return Delivery::Malformed;
            }
        };

        if envelope.sender_id.as_deref() == Some(self.config.device_id.as_str()) {
            debug!(tag = envelope.kind.tag(), "own envelope echoed back, dropping");
            self.stats.write().self_echoes_dropped += 1;
            return Delivery::SelfEcho;
        }

        let outcome = self.router.dispatch(&envelope, self);
        {
            let mut stats = self.stats.write();
            stats.envelopes_received += 1;
            if outcome.is_unmatched() {
                stats.unmatched_dropped += 1;
            }
        }
        Delivery::Routed(outcome)
    }
}

impl<T: PubSubTransport> SyncOutbound for SyncSession<T> {
    fn send_envelope(&self, envelope: Envelope) -> SyncResult<()> {
        let state = self.state();
        if state.is_terminal() {
            return Err(SyncError::Closed);
        }
        if !state.is_open() {
            return Err(SyncError::NotConnected);
        }

        let entity = envelope.kind.entity().ok_or_else(|| {
            SyncError::Unroutable(format!("no topic for tag {}", envelope.kind.tag()))
        })?;
        let topic = notify_topic(&self.config.topic_prefix, &self.config.account_id, entity);
        let stamped = envelope.with_sender(self.config.device_id.clone());
        let is_ack = stamped.kind.is_ack();
        let payload = stamped.encode()?;

        match self.transport.publish(&topic, &payload) {
            Ok(()) => {
                let mut stats = self.stats.write();
                stats.envelopes_sent += 1;
                if is_ack {
                    stats.acks_sent += 1;
                }
                Ok(())
            }
            Err(error) => {
                warn!(%error, topic, "publish failed, session disconnected");
                self.set_state(SessionState::Disconnected);
                Err(error)
            }
        }
    }

    fn is_open(&self) -> bool {
        self.state().is_open()
    }
}
