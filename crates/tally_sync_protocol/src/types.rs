//! Envelope operation tags.

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Kind of synchronizable entity an envelope refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// A bookkeeping entry.
    Bill,
    /// A ledger grouping bills.
    Book,
}

impl EntityKind {
    /// Every kind the protocol knows about.
    pub const ALL: [EntityKind; 2] = [EntityKind::Bill, EntityKind::Book];

    /// The tag segment, as it appears inside `type` values.
    #[must_use]
    pub fn tag_segment(self) -> &'static str {
        match self {
            EntityKind::Bill => "BILL",
            EntityKind::Book => "BOOK",
        }
    }

    /// The topic segment, as it appears in notify topics.
    #[must_use]
    pub fn topic_segment(self) -> &'static str {
        match self {
            EntityKind::Bill => "bill",
            EntityKind::Book => "book",
        }
    }
}

/// Lifecycle operation carried by an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Record created.
    Add,
    /// Record replaced with a newer version.
    Update,
    /// Record removed.
    Delete,
}

impl Operation {
    /// The tag segment, as it appears inside `type` values.
    #[must_use]
    pub fn tag_segment(self) -> &'static str {
        match self {
            Operation::Add => "ADD",
            Operation::Update => "UPDATE",
            Operation::Delete => "DELETE",
        }
    }
}

/// The `type` tag of an envelope.
///
/// Twelve concrete tags (`{ADD,UPDATE,DELETE} x {BILL,BOOK} x {"", "_ACK"}`)
/// plus a passthrough for tags this build does not know. Unknown tags are
/// preserved verbatim so a newer peer's messages decode cleanly and can be
/// dropped by the router instead of failing the session boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EnvelopeType {
    /// An operation a peer must apply (`ADD_BILL`, `DELETE_BOOK`, ...).
    Request {
        /// Entity kind segment of the tag.
        entity: EntityKind,
        /// Operation segment of the tag.
        operation: Operation,
    },
    /// An acknowledgment of an applied operation (`ADD_BILL_ACK`, ...).
    Ack {
        /// Entity kind segment of the tag.
        entity: EntityKind,
        /// Operation segment of the tag.
        operation: Operation,
    },
    /// A tag from a newer protocol revision; kept verbatim.
    Unknown(String),
}

impl EnvelopeType {
    /// Builds a request tag.
    #[must_use]
    pub fn request(entity: EntityKind, operation: Operation) -> Self {
        EnvelopeType::Request { entity, operation }
    }

    /// Builds an acknowledgment tag.
    #[must_use]
    pub fn ack(entity: EntityKind, operation: Operation) -> Self {
        EnvelopeType::Ack { entity, operation }
    }

    /// The entity kind, if this is a known tag.
    #[must_use]
    pub fn entity(&self) -> Option<EntityKind> {
        match self {
            EnvelopeType::Request { entity, .. } | EnvelopeType::Ack { entity, .. } => {
                Some(*entity)
            }
            EnvelopeType::Unknown(_) => None,
        }
    }

    /// The operation, if this is a known tag.
    #[must_use]
    pub fn operation(&self) -> Option<Operation> {
        match self {
            EnvelopeType::Request { operation, .. } | EnvelopeType::Ack { operation, .. } => {
                Some(*operation)
            }
            EnvelopeType::Unknown(_) => None,
        }
    }

    /// True for acknowledgment tags.
    #[must_use]
    pub fn is_ack(&self) -> bool {
        matches!(self, EnvelopeType::Ack { .. })
    }

    /// The acknowledgment tag answering this request tag.
    ///
    /// `None` for acks (acks are never acknowledged; that is what bounds
    /// the exchange) and for unknown tags.
    #[must_use]
    pub fn ack_counterpart(&self) -> Option<EnvelopeType> {
        match self {
            EnvelopeType::Request { entity, operation } => Some(EnvelopeType::Ack {
                entity: *entity,
                operation: *operation,
            }),
            _ => None,
        }
    }

    /// The wire string for this tag.
    #[must_use]
    pub fn tag(&self) -> &str {
        match self {
            EnvelopeType::Request { entity, operation } => {
                match (operation, entity) {
                    (Operation::Add, EntityKind::Bill) => "ADD_BILL",
                    (Operation::Update, EntityKind::Bill) => "UPDATE_BILL",
                    (Operation::Delete, EntityKind::Bill) => "DELETE_BILL",
                    (Operation::Add, EntityKind::Book) => "ADD_BOOK",
                    (Operation::Update, EntityKind::Book) => "UPDATE_BOOK",
                    (Operation::Delete, EntityKind::Book) => "DELETE_BOOK",
                }
            }
            EnvelopeType::Ack { entity, operation } => {
                match (operation, entity) {
                    (Operation::Add, EntityKind::Bill) => "ADD_BILL_ACK",
                    (Operation::Update, EntityKind::Bill) => "UPDATE_BILL_ACK",
                    (Operation::Delete, EntityKind::Bill) => "DELETE_BILL_ACK",
                    (Operation::Add, EntityKind::Book) => "ADD_BOOK_ACK",
                    (Operation::Update, EntityKind::Book) => "UPDATE_BOOK_ACK",
                    (Operation::Delete, EntityKind::Book) => "DELETE_BOOK_ACK",
                }
            }
            EnvelopeType::Unknown(tag) => tag,
        }
    }

    /// Parses a wire string. Total: unrecognized input becomes
    /// [`EnvelopeType::Unknown`].
    #[must_use]
    pub fn from_tag(tag: &str) -> Self {
        let (body, is_ack) = match tag.strip_suffix("_ACK") {
            Some(body) => (body, true),
            None => (tag, false),
        };

        let (operation, entity) = match body {
            "ADD_BILL" => (Operation::Add, EntityKind::Bill),
            "UPDATE_BILL" => (Operation::Update, EntityKind::Bill),
            "DELETE_BILL" => (Operation::Delete, EntityKind::Bill),
            "ADD_BOOK" => (Operation::Add, EntityKind::Book),
            "UPDATE_BOOK" => (Operation::Update, EntityKind::Book),
            "DELETE_BOOK" => (Operation::Delete, EntityKind::Book),
            _ => return EnvelopeType::Unknown(tag.to_string()),
        };

        if is_ack {
            EnvelopeType::Ack { entity, operation }
        } else {
            EnvelopeType::Request { entity, operation }
        }
    }
}

impl fmt::Display for EnvelopeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl Serialize for EnvelopeType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.tag())
    }
}

impl<'de> Deserialize<'de> for EnvelopeType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TagVisitor;

        impl Visitor<'_> for TagVisitor {
            type Value = EnvelopeType;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an envelope type tag")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
                Ok(EnvelopeType::from_tag(value))
            }
        }

        deserializer.deserialize_str(TagVisitor)
    }
}
