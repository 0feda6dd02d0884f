//! Dedicated inbound worker.
//!
//! The transport's message callback runs on whatever thread the broker
//! client owns; handlers, however, make blocking store calls and must never
//! interleave two envelopes touching the same record. The worker gives both
//! guarantees: payloads are queued onto an `mpsc` channel and drained by a
//! single dedicated OS thread that feeds them to
//! [`SyncSession::deliver`](crate::SyncSession::deliver) in arrival order.
//!
//! Store calls block only this thread — never the UI or the broker
//! callback.

use crate::session::SyncSession;
use crate::transport::PubSubTransport;
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::debug;

enum Inbound {
    Payload(Vec<u8>),
    Stop,
}

/// Cloneable producer side of the worker's queue.
///
/// Hand a clone to the transport's message callback; `push` is cheap and
/// never blocks.
#[derive(Clone)]
pub struct InboundQueue {
    sender: Sender<Inbound>,
}

impl InboundQueue {
    /// Enqueues one raw payload for sequential processing.
    ///
    /// Returns false if the worker has shut down.
    pub fn push(&self, payload: Vec<u8>) -> bool {
        self.sender.send(Inbound::Payload(payload)).is_ok()
    }
}

/// One dedicated thread draining inbound payloads into a session.
pub struct SyncWorker {
    sender: Sender<Inbound>,
    handle: Option<JoinHandle<()>>,
}

impl SyncWorker {
    /// Spawns the worker thread for a session.
    pub fn spawn<T>(session: Arc<SyncSession<T>>) -> Self
    where
        T: PubSubTransport + 'static,
    {
        let (sender, receiver) = mpsc::channel::<Inbound>();

        let handle = std::thread::spawn(move || {
            while let Ok(message) = receiver.recv() {
                match message {
                    Inbound::Payload(payload) => {
                        session.deliver(&payload);
                    }
                    Inbound::Stop => break,
                }
            }
            debug!("sync worker stopped");
        });

        Self {
            sender,
            handle: Some(handle),
        }
    }

    /// Returns a producer handle for the transport callback.
    pub fn queue(&self) -> InboundQueue {
        InboundQueue {
            sender: self.sender.clone(),
        }
    }

    /// Stops the worker after the payloads already queued are processed
    /// and joins the thread.
    pub fn shutdown(mut self) {
        let _ = self.sender.send(Inbound::Stop);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SyncWorker {
    fn drop(&mut self) {
        let _ = self.sender.send(Inbound::Stop);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
