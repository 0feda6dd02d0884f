//! Handler registry and dispatch.

use crate::handler::{SyncHandler, SyncOutbound};
use tally_sync_protocol::Envelope;
use tracing::{debug, warn};

/// Result of routing one envelope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Handlers whose `matches` claimed the envelope.
    pub matched: usize,
    /// Claimed handlers whose `apply` failed.
    pub failed: usize,
}

impl DispatchOutcome {
    /// True if no handler claimed the envelope.
    #[must_use]
    pub fn is_unmatched(&self) -> bool {
        self.matched == 0
    }
}

/// Ordered collection of handlers.
///
/// Dispatch invokes `apply` on **every** handler that claims the envelope,
/// not the first match: handler sets for different entity kinds are
/// disjoint today, but the contract does not assume it, so nothing is
/// silently lost if future kinds share a tag. An envelope no handler claims
/// is logged and dropped; that is forward compatibility, not an error.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: Vec<Box<dyn SyncHandler>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a handler. Registration order is dispatch order.
    pub fn register(&mut self, handler: Box<dyn SyncHandler>) {
        self.handlers.push(handler);
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// True if no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Routes one envelope to all claiming handlers.
    ///
    /// A failing handler is logged and skipped; it never aborts the
    /// remaining handlers.
    pub fn dispatch(&self, envelope: &Envelope, outbound: &dyn SyncOutbound) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();

        for handler in &self.handlers {
            if !handler.matches(envelope) {
                continue;
            }
            outcome.matched += 1;
            debug!(handler = handler.name(), tag = envelope.kind.tag(), "dispatching");

            if let Err(error) = handler.apply(envelope, outbound) {
                outcome.failed += 1;
                warn!(
                    handler = handler.name(),
                    tag = envelope.kind.tag(),
                    %error,
                    "handler failed, envelope left unacknowledged"
                );
            }
        }

        if outcome.is_unmatched() {
            debug!(tag = envelope.kind.tag(), "no handler claimed envelope, dropping");
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{HandlerError, SyncResult};
    use parking_lot::Mutex;
    use std::sync::Arc;
    use tally_core::{EntityId, StoreError};
    use tally_sync_protocol::{EntityKind, EnvelopeType, Operation};

    struct NullOutbound;

    impl SyncOutbound for NullOutbound {
        fn send_envelope(&self, _envelope: Envelope) -> SyncResult<()> {
            Ok(())
        }

        fn is_open(&self) -> bool {
            true
        }
    }

    struct TagHandler {
        tag: EnvelopeType,
        applied: Arc<Mutex<usize>>,
        fail: bool,
    }

    impl TagHandler {
        fn new(tag: EnvelopeType, applied: Arc<Mutex<usize>>) -> Self {
            Self {
                tag,
                applied,
                fail: false,
            }
        }

        fn failing(tag: EnvelopeType, applied: Arc<Mutex<usize>>) -> Self {
            Self {
                tag,
                applied,
                fail: true,
            }
        }
    }

    impl SyncHandler for TagHandler {
        fn matches(&self, envelope: &Envelope) -> bool {
            envelope.kind == self.tag
        }

        fn apply(
            &self,
            _envelope: &Envelope,
            _outbound: &dyn SyncOutbound,
        ) -> Result<(), HandlerError> {
            *self.applied.lock() += 1;
            if self.fail {
                Err(HandlerError::Store(StoreError::Backend("boom".into())))
            } else {
                Ok(())
            }
        }
    }

    fn bill_add() -> Envelope {
        Envelope::request(
            EntityKind::Bill,
            Operation::Add,
            "{}".to_string(),
            EntityId::new(),
        )
    }

    #[test]
    fn dispatch_reaches_every_matching_handler() {
        let mut registry = HandlerRegistry::new();
        let applied = Arc::new(Mutex::new(0));
        let tag = EnvelopeType::request(EntityKind::Bill, Operation::Add);

        registry.register(Box::new(TagHandler::new(tag.clone(), Arc::clone(&applied))));
        registry.register(Box::new(TagHandler::new(tag, Arc::clone(&applied))));
        registry.register(Box::new(TagHandler::new(
            EnvelopeType::request(EntityKind::Book, Operation::Add),
            Arc::clone(&applied),
        )));

        let outcome = registry.dispatch(&bill_add(), &NullOutbound);
        assert_eq!(outcome.matched, 2);
        assert_eq!(outcome.failed, 0);
        assert_eq!(*applied.lock(), 2);
    }

    #[test]
    fn unmatched_envelope_is_dropped_silently() {
        let registry = HandlerRegistry::new();
        let outcome = registry.dispatch(&bill_add(), &NullOutbound);
        assert!(outcome.is_unmatched());
    }

    #[test]
    fn failure_does_not_stop_other_handlers() {
        let mut registry = HandlerRegistry::new();
        let applied = Arc::new(Mutex::new(0));
        let tag = EnvelopeType::request(EntityKind::Bill, Operation::Add);

        registry.register(Box::new(TagHandler::failing(
            tag.clone(),
            Arc::clone(&applied),
        )));
        registry.register(Box::new(TagHandler::new(tag, Arc::clone(&applied))));

        let outcome = registry.dispatch(&bill_add(), &NullOutbound);
        assert_eq!(outcome.matched, 2);
        assert_eq!(outcome.failed, 1);
        assert_eq!(*applied.lock(), 2);
    }

    #[test]
    fn unknown_tags_route_nowhere() {
        let mut registry = HandlerRegistry::new();
        let applied = Arc::new(Mutex::new(0));
        registry.register(Box::new(TagHandler::new(
            EnvelopeType::request(EntityKind::Bill, Operation::Add),
            Arc::clone(&applied),
        )));

        let mut envelope = bill_add();
        envelope.kind = EnvelopeType::Unknown("ARCHIVE_BILL".into());

        let outcome = registry.dispatch(&envelope, &NullOutbound);
        assert!(outcome.is_unmatched());
        assert_eq!(*applied.lock(), 0);
    }
}
