//! The wire envelope.

use crate::types::{EntityKind, EnvelopeType, Operation};
use serde::{Deserialize, Serialize};
use tally_core::EntityId;
use thiserror::Error;
use uuid::Uuid;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors produced while encoding or decoding wire messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The payload is not the expected JSON shape.
    #[error("malformed envelope: {0}")]
    Json(#[from] serde_json::Error),

    /// The `content` field does not hold what the `type` tag promises
    /// (e.g. an ACK whose content is not a record id).
    #[error("invalid envelope content: {0}")]
    InvalidContent(String),
}

/// A single sync message.
///
/// `content` is either the full entity JSON (ADD/UPDATE requests) or the
/// bare record id (DELETE requests and every ACK). The constructors enforce
/// that invariant; code that builds envelopes by hand is expected to keep
/// it.
///
/// `id` and `sender_id` are additive fields: a message id for tracing, and
/// the publishing device's id, which receivers use to drop their own
/// envelopes when the broker echoes a publish back to its origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Operation tag.
    #[serde(rename = "type")]
    pub kind: EnvelopeType,
    /// Entity JSON or bare record id, per the tag.
    pub content: String,
    /// Book scope of the change.
    #[serde(rename = "bookId")]
    pub book_id: EntityId,
    /// Message id, for tracing and de-duplication in logs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Publishing device id.
    #[serde(rename = "senderId", default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<String>,
}

impl Envelope {
    /// Builds an ADD or UPDATE request carrying a full entity body.
    #[must_use]
    pub fn request(
        entity: EntityKind,
        operation: Operation,
        body: String,
        book_id: EntityId,
    ) -> Self {
        Self {
            kind: EnvelopeType::request(entity, operation),
            content: body,
            book_id,
            id: Some(Uuid::new_v4().to_string()),
            sender_id: None,
        }
    }

    /// Builds a DELETE request carrying a bare record id.
    #[must_use]
    pub fn tombstone(entity: EntityKind, record_id: EntityId, book_id: EntityId) -> Self {
        Self {
            kind: EnvelopeType::request(entity, Operation::Delete),
            content: record_id.to_string(),
            book_id,
            id: Some(Uuid::new_v4().to_string()),
            sender_id: None,
        }
    }

    /// Builds the acknowledgment answering this request.
    ///
    /// The ACK's content is always the bare record id the request
    /// established, never an entity body. Returns `None` when `self` is an
    /// ACK or an unknown tag — those are never acknowledged.
    #[must_use]
    pub fn ack_for(&self, record_id: EntityId) -> Option<Self> {
        let kind = self.kind.ack_counterpart()?;
        Some(Self {
            kind,
            content: record_id.to_string(),
            book_id: self.book_id,
            id: Some(Uuid::new_v4().to_string()),
            sender_id: None,
        })
    }

    /// Stamps the publishing device id.
    #[must_use]
    pub fn with_sender(mut self, device_id: impl Into<String>) -> Self {
        self.sender_id = Some(device_id.into());
        self
    }

    /// Interprets `content` as a bare record id.
    ///
    /// Used by DELETE and ACK handlers.
    pub fn record_id(&self) -> ProtocolResult<EntityId> {
        self.content.trim().parse().map_err(|_| {
            ProtocolError::InvalidContent(format!(
                "{} content is not a record id",
                self.kind.tag()
            ))
        })
    }

    /// Serializes to wire bytes.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Deserializes from wire bytes.
    ///
    /// Fails only on malformed JSON; unknown `type` tags decode into
    /// [`EnvelopeType::Unknown`] and are the router's problem.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn body() -> String {
        "{\"amount\":100}".to_string()
    }

    #[test]
    fn request_roundtrip() {
        let book_id = EntityId::new();
        let env = Envelope::request(EntityKind::Bill, Operation::Add, body(), book_id)
            .with_sender("device-a");

        let bytes = env.encode().unwrap();
        let decoded = Envelope::decode(&bytes).unwrap();

        assert_eq!(decoded, env);
        assert_eq!(decoded.kind.tag(), "ADD_BILL");
        assert_eq!(decoded.book_id, book_id);
        assert_eq!(decoded.sender_id.as_deref(), Some("device-a"));
    }

    #[test]
    fn wire_field_names() {
        let env = Envelope::tombstone(EntityKind::Book, EntityId::new(), EntityId::new());
        let json: serde_json::Value =
            serde_json::from_slice(&env.encode().unwrap()).unwrap();

        assert_eq!(json["type"], "DELETE_BOOK");
        assert!(json.get("bookId").is_some());
        // Absent optional fields are omitted, not null.
        assert!(json.get("senderId").is_none());
    }

    #[test]
    fn ack_carries_bare_id() {
        let record_id = EntityId::new();
        let request =
            Envelope::request(EntityKind::Bill, Operation::Update, body(), EntityId::new());

        let ack = request.ack_for(record_id).unwrap();
        assert_eq!(ack.kind.tag(), "UPDATE_BILL_ACK");
        assert_eq!(ack.content, record_id.to_string());
        assert_eq!(ack.book_id, request.book_id);
        assert_eq!(ack.record_id().unwrap(), record_id);
    }

    #[test]
    fn acks_are_never_acknowledged() {
        let request = Envelope::tombstone(EntityKind::Book, EntityId::new(), EntityId::new());
        let ack = request.ack_for(request.record_id().unwrap()).unwrap();
        assert!(ack.ack_for(EntityId::new()).is_none());
    }

    #[test]
    fn record_id_rejects_entity_body() {
        let request =
            Envelope::request(EntityKind::Bill, Operation::Add, body(), EntityId::new());
        assert!(matches!(
            request.record_id(),
            Err(ProtocolError::InvalidContent(_))
        ));
    }

    #[test]
    fn decode_rejects_malformed_json() {
        assert!(Envelope::decode(b"{ not json").is_err());
        assert!(Envelope::decode(b"").is_err());
        assert!(Envelope::decode(b"\xff\xfe").is_err());
    }

    #[test]
    fn decode_tolerates_unknown_type_and_extra_fields() {
        let json = format!(
            "{{\"type\":\"ARCHIVE_BILL\",\"content\":\"x\",\"bookId\":\"{}\",\
             \"someFutureField\":42}}",
            EntityId::new()
        );
        let env = Envelope::decode(json.as_bytes()).unwrap();
        assert_eq!(env.kind, EnvelopeType::Unknown("ARCHIVE_BILL".into()));
    }

    #[test]
    fn decode_tolerates_missing_optional_fields() {
        let json = format!(
            "{{\"type\":\"DELETE_BILL_ACK\",\"content\":\"{}\",\"bookId\":\"{}\"}}",
            EntityId::new(),
            EntityId::new()
        );
        let env = Envelope::decode(json.as_bytes()).unwrap();
        assert!(env.id.is_none());
        assert!(env.sender_id.is_none());
    }

    proptest! {
        #[test]
        fn decode_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
            let _ = Envelope::decode(&bytes);
        }
    }
}
