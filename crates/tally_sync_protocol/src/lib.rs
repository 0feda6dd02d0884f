//! # Tally Sync Protocol
//!
//! Wire protocol for Tally's device synchronization: the envelope message
//! type, its operation tags, and the notify-topic naming scheme.
//!
//! The wire format is a single JSON object per message:
//!
//! ```json
//! { "type": "ADD_BILL", "content": "<entity JSON or bare id>",
//!   "bookId": "<uuid>", "id": "<message uuid>", "senderId": "<device>" }
//! ```
//!
//! This schema is a compatibility boundary: new fields are additive and
//! optional, and unknown `type` tags decode successfully (they route to no
//! handler and are dropped by the engine). Only malformed JSON is a decode
//! error.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod envelope;
mod topic;
mod types;

pub use envelope::{Envelope, ProtocolError, ProtocolResult};
pub use topic::{account_topics, notify_topic, DEFAULT_TOPIC_PREFIX};
pub use types::{EntityKind, EnvelopeType, Operation};
