//! Book records.

use crate::entity::bill::now_millis;
use crate::entity::EntityId;
use crate::status::SyncStatus;
use serde::{Deserialize, Serialize};

/// A ledger that groups bills, possibly shared between account members.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    /// Stable record id, generated by the creating device.
    pub id: EntityId,
    /// Display name, unique per account.
    pub name: String,
    /// Id of the user who created the book.
    pub created_by: String,
    /// Optional book type label ("family", "travel", ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Optional cover image URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,
    /// Record creation time, epoch millis.
    pub created_at: i64,
    /// Last local edit time, epoch millis.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
    /// Synchronization status; persisted with the record.
    #[serde(default)]
    pub sync_status: SyncStatus,
}

impl Book {
    /// Creates a new, not-yet-synced book.
    pub fn new(name: impl Into<String>, created_by: impl Into<String>) -> Self {
        Self {
            id: EntityId::new(),
            name: name.into(),
            created_by: created_by.into(),
            kind: None,
            cover_url: None,
            created_at: now_millis(),
            updated_at: None,
            sync_status: SyncStatus::NotSynced,
        }
    }

    /// Sets the book type label.
    #[must_use]
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    /// Sets the cover image URL.
    #[must_use]
    pub fn with_cover_url(mut self, url: impl Into<String>) -> Self {
        self.cover_url = Some(url.into());
        self
    }

    /// Records a local edit: stamps `updated_at` and moves the status
    /// through [`SyncStatus::after_local_edit`].
    pub fn mark_edited(&mut self) {
        self.updated_at = Some(now_millis());
        self.sync_status = self.sync_status.after_local_edit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_book_is_not_synced() {
        let book = Book::new("Household", "user-1");
        assert_eq!(book.sync_status, SyncStatus::NotSynced);
    }

    #[test]
    fn json_roundtrip_preserves_fields() {
        let book = Book::new("Travel 2026", "user-1").with_kind("travel");
        let json = serde_json::to_string(&book).unwrap();
        let back: Book = serde_json::from_str(&json).unwrap();
        assert_eq!(back, book);
    }

    #[test]
    fn mark_edited_moves_status() {
        let mut book = Book::new("Household", "user-1");
        book.sync_status = SyncStatus::Synced;
        book.mark_edited();
        assert_eq!(book.sync_status, SyncStatus::Updated);
    }
}
