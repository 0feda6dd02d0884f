//! # Tally Sync Engine
//!
//! Per-entity reconciliation engine for Tally: keeps the local stores of an
//! account's devices eventually consistent over a publish/subscribe
//! transport that guarantees FIFO-per-topic, at-least-once delivery.
//!
//! This crate provides:
//! - Per-(entity x stage) message handlers with idempotent application
//! - A registry/router dispatching inbound envelopes to all claiming
//!   handlers
//! - The sync session: connection lifecycle, outbound send path and the
//!   recovery sweep that republishes pending records on reconnect
//! - A dedicated inbound worker thread
//! - The transport abstraction and a mock implementation for tests
//!
//! ## Key invariants
//!
//! - Applying a remote ADD/UPDATE is an unconditional upsert; DELETE is an
//!   idempotent remove — duplicate delivery never corrupts state
//! - An acknowledgment is emitted only after the change is applied; no ACK
//!   means the peer must resend
//! - A record's status reaches `SYNCED` only through an acknowledgment or a
//!   remote apply
//! - Handler failures are isolated; nothing here is fatal to the host —
//!   worst case synchronization stalls and resumes on reconnect

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod handler;
mod router;
mod session;
mod transport;
mod worker;

pub use config::SyncConfig;
pub use error::{HandlerError, SyncError, SyncResult};
pub use handler::{
    register_entity_handlers, AddAckHandler, AddHandler, DeleteAckHandler, DeleteHandler,
    SyncHandler, SyncOutbound, SyncTarget, UpdateAckHandler, UpdateHandler,
};
pub use router::{DispatchOutcome, HandlerRegistry};
pub use session::{Delivery, SessionState, SessionStats, SweepReport, SyncSession};
pub use transport::{MockTransport, PubSubTransport};
pub use worker::{InboundQueue, SyncWorker};
