//! Transport layer abstraction.
//!
//! The engine talks to the pub/sub broker through this trait. The broker
//! implementation owns connection management, TLS and retained messages;
//! the engine requires only FIFO ordering per topic and at-least-once
//! delivery. Inbound messages are not part of this trait: the broker
//! callback hands raw payloads to the session's inbound queue
//! (see [`crate::SyncWorker`]).

use crate::error::{SyncError, SyncResult};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// A publish/subscribe transport to the account's broker.
///
/// Implementations must preserve publish order within a topic and deliver
/// each message at least once. Methods are synchronous and may block the
/// calling thread briefly (a hand-off to the broker client).
pub trait PubSubTransport: Send + Sync {
    /// Establishes the broker connection and subscribes to the account's
    /// notify topics.
    fn connect(&self) -> SyncResult<()>;

    /// Tears the connection down. Idempotent.
    fn disconnect(&self) -> SyncResult<()>;

    /// Publishes one payload to a topic.
    fn publish(&self, topic: &str, payload: &[u8]) -> SyncResult<()>;

    /// Returns true while the broker connection is up.
    fn is_connected(&self) -> bool;
}

/// A mock transport for testing.
///
/// Records every published payload per topic and supports failure
/// injection for the connect and publish paths.
#[derive(Default)]
pub struct MockTransport {
    connected: AtomicBool,
    refuse_connect: AtomicBool,
    fail_publishes: AtomicBool,
    published: Mutex<Vec<(String, Vec<u8>)>>,
}

impl MockTransport {
    /// Creates a new disconnected mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent `connect` calls fail.
    pub fn set_refuse_connect(&self, refuse: bool) {
        self.refuse_connect.store(refuse, Ordering::SeqCst);
    }

    /// Makes subsequent `publish` calls fail with a retryable error.
    pub fn set_fail_publishes(&self, fail: bool) {
        self.fail_publishes.store(fail, Ordering::SeqCst);
    }

    /// Forces the connection flag (simulates a broker-side drop).
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Everything published so far, in publish order.
    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.published.lock().clone()
    }

    /// Drains and returns everything published so far.
    pub fn take_published(&self) -> Vec<(String, Vec<u8>)> {
        std::mem::take(&mut *self.published.lock())
    }

    /// Number of payloads published so far.
    pub fn published_count(&self) -> usize {
        self.published.lock().len()
    }
}

impl PubSubTransport for MockTransport {
    fn connect(&self) -> SyncResult<()> {
        if self.refuse_connect.load(Ordering::SeqCst) {
            return Err(SyncError::transport_retryable("mock broker unreachable"));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn disconnect(&self) -> SyncResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn publish(&self, topic: &str, payload: &[u8]) -> SyncResult<()> {
        if !self.is_connected() {
            return Err(SyncError::NotConnected);
        }
        if self.fail_publishes.load(Ordering::SeqCst) {
            return Err(SyncError::transport_retryable("mock publish failure"));
        }
        self.published
            .lock()
            .push((topic.to_string(), payload.to_vec()));
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_then_publish() {
        let transport = MockTransport::new();
        assert!(!transport.is_connected());

        transport.connect().unwrap();
        assert!(transport.is_connected());

        transport.publish("t/1", b"payload").unwrap();
        assert_eq!(transport.published(), vec![("t/1".to_string(), b"payload".to_vec())]);
    }

    #[test]
    fn publish_requires_connection() {
        let transport = MockTransport::new();
        let result = transport.publish("t/1", b"payload");
        assert!(matches!(result, Err(SyncError::NotConnected)));
    }

    #[test]
    fn refuse_connect() {
        let transport = MockTransport::new();
        transport.set_refuse_connect(true);
        assert!(transport.connect().is_err());
        assert!(!transport.is_connected());
    }

    #[test]
    fn publish_failure_injection() {
        let transport = MockTransport::new();
        transport.connect().unwrap();
        transport.set_fail_publishes(true);

        let result = transport.publish("t/1", b"payload");
        assert!(matches!(result, Err(SyncError::Transport { retryable: true, .. })));
        assert_eq!(transport.published_count(), 0);
    }

    #[test]
    fn disconnect_is_idempotent() {
        let transport = MockTransport::new();
        transport.connect().unwrap();
        transport.disconnect().unwrap();
        transport.disconnect().unwrap();
        assert!(!transport.is_connected());
    }
}
