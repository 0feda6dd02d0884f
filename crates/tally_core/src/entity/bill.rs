//! Bill records.

use crate::entity::EntityId;
use crate::status::SyncStatus;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Direction of a bill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillKind {
    /// Money coming in.
    Income,
    /// Money going out.
    Expense,
}

/// A single bookkeeping entry inside a book.
///
/// Amounts are integer cents; `kind` carries the direction so `amount` is
/// always non-negative. `bill_time` is when the expense/income happened,
/// `created_at`/`updated_at` are record timestamps (epoch milliseconds).
///
/// The JSON form of this struct is both the persistence schema and the
/// `content` of ADD/UPDATE envelopes, so a remote device decodes exactly
/// what the local store wrote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bill {
    /// Stable record id, generated by the creating device.
    pub id: EntityId,
    /// The book this bill belongs to.
    pub book_id: EntityId,
    /// Income or expense.
    pub kind: BillKind,
    /// Amount in cents, non-negative.
    pub amount: i64,
    /// Category label ("Food", "Transport", ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Free-form note.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remark: Option<String>,
    /// When the income/expense occurred, epoch millis.
    pub bill_time: i64,
    /// Id of the user who created the record.
    pub created_by: String,
    /// Record creation time, epoch millis.
    pub created_at: i64,
    /// Last local edit time, epoch millis.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
    /// Synchronization status; persisted with the record.
    #[serde(default)]
    pub sync_status: SyncStatus,
}

impl Bill {
    /// Creates a new, not-yet-synced bill.
    pub fn new(book_id: EntityId, kind: BillKind, amount: i64, created_by: impl Into<String>) -> Self {
        let now = now_millis();
        Self {
            id: EntityId::new(),
            book_id,
            kind,
            amount,
            category: None,
            remark: None,
            bill_time: now,
            created_by: created_by.into(),
            created_at: now,
            updated_at: None,
            sync_status: SyncStatus::NotSynced,
        }
    }

    /// Sets the category.
    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Sets the remark.
    #[must_use]
    pub fn with_remark(mut self, remark: impl Into<String>) -> Self {
        self.remark = Some(remark.into());
        self
    }

    /// Sets the bill time.
    #[must_use]
    pub fn with_bill_time(mut self, bill_time: i64) -> Self {
        self.bill_time = bill_time;
        self
    }

    /// Records a local edit: stamps `updated_at` and moves the status
    /// through [`SyncStatus::after_local_edit`].
    pub fn mark_edited(&mut self) {
        self.updated_at = Some(now_millis());
        self.sync_status = self.sync_status.after_local_edit();
    }

    /// Signed amount: expenses are negative, income positive.
    #[must_use]
    pub fn signed_amount(&self) -> i64 {
        match self.kind {
            BillKind::Income => self.amount,
            BillKind::Expense => -self.amount,
        }
    }
}

pub(crate) fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
