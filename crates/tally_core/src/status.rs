//! Per-record synchronization status.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Synchronization state of a single record.
///
/// The status is persisted with the record (it must survive process
/// restarts) and serializes as a bare numeric code, which is also the form
/// it takes inside entity JSON on the wire.
///
/// Allowed transitions:
///
/// ```text
/// NotSynced --publish--> Syncing --ack--> Synced
/// Synced --local edit--> Updated --publish--> Syncing
/// remote ADD/UPDATE applied locally --> Synced (forced)
/// ```
///
/// A record never reaches `Synced` except through an acknowledgment or a
/// remote apply, and a record in `Syncing` always has an outbound message
/// pending (a lost one is re-driven by the recovery sweep).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum SyncStatus {
    /// Created locally, never published.
    NotSynced,
    /// Remote peers have acknowledged the latest local state.
    Synced,
    /// Edited locally after having been synced; awaiting publish.
    Updated,
    /// Published; awaiting acknowledgment.
    Syncing,
}

impl SyncStatus {
    /// Converts to the persisted numeric code.
    #[must_use]
    pub fn to_code(self) -> u8 {
        match self {
            SyncStatus::NotSynced => 0,
            SyncStatus::Synced => 1,
            SyncStatus::Updated => 2,
            SyncStatus::Syncing => 3,
        }
    }

    /// Converts from the persisted numeric code.
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(SyncStatus::NotSynced),
            1 => Some(SyncStatus::Synced),
            2 => Some(SyncStatus::Updated),
            3 => Some(SyncStatus::Syncing),
            _ => None,
        }
    }

    /// Returns true if the record still has an outstanding remote operation.
    #[must_use]
    pub fn is_pending(self) -> bool {
        self != SyncStatus::Synced
    }

    /// Returns true if an acknowledgment may move this record to `Synced`.
    ///
    /// Only `Syncing` qualifies: an ACK arriving after the user edited the
    /// record again (status `Updated`) is stale and must not mask the newer
    /// local state.
    #[must_use]
    pub fn can_acknowledge(self) -> bool {
        self == SyncStatus::Syncing
    }

    /// The status a record takes after a local edit.
    ///
    /// A record that was never published stays `NotSynced`; anything else
    /// becomes `Updated`, including `Syncing` (the in-flight publish is now
    /// outdated and the edit will be re-published).
    #[must_use]
    pub fn after_local_edit(self) -> Self {
        match self {
            SyncStatus::NotSynced => SyncStatus::NotSynced,
            _ => SyncStatus::Updated,
        }
    }
}

impl Default for SyncStatus {
    fn default() -> Self {
        SyncStatus::NotSynced
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncStatus::NotSynced => "NOT_SYNCED",
            SyncStatus::Synced => "SYNCED",
            SyncStatus::Updated => "UPDATED",
            SyncStatus::Syncing => "SYNCING",
        };
        f.write_str(name)
    }
}

impl From<SyncStatus> for u8 {
    fn from(status: SyncStatus) -> Self {
        status.to_code()
    }
}

impl TryFrom<u8> for SyncStatus {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        SyncStatus::from_code(code).ok_or_else(|| format!("invalid sync status code {code}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_roundtrip() {
        for status in [
            SyncStatus::NotSynced,
            SyncStatus::Synced,
            SyncStatus::Updated,
            SyncStatus::Syncing,
        ] {
            assert_eq!(SyncStatus::from_code(status.to_code()), Some(status));
        }
        assert_eq!(SyncStatus::from_code(4), None);
    }

    #[test]
    fn serde_uses_numeric_code() {
        let json = serde_json::to_string(&SyncStatus::Updated).unwrap();
        assert_eq!(json, "2");

        let back: SyncStatus = serde_json::from_str("3").unwrap();
        assert_eq!(back, SyncStatus::Syncing);

        assert!(serde_json::from_str::<SyncStatus>("9").is_err());
    }

    #[test]
    fn pending_states() {
        assert!(SyncStatus::NotSynced.is_pending());
        assert!(SyncStatus::Updated.is_pending());
        assert!(SyncStatus::Syncing.is_pending());
        assert!(!SyncStatus::Synced.is_pending());
    }

    #[test]
    fn only_syncing_acknowledges() {
        assert!(SyncStatus::Syncing.can_acknowledge());
        assert!(!SyncStatus::Synced.can_acknowledge());
        assert!(!SyncStatus::Updated.can_acknowledge());
        assert!(!SyncStatus::NotSynced.can_acknowledge());
    }

    #[test]
    fn local_edit_transitions() {
        assert_eq!(
            SyncStatus::Synced.after_local_edit(),
            SyncStatus::Updated
        );
        assert_eq!(
            SyncStatus::Syncing.after_local_edit(),
            SyncStatus::Updated
        );
        assert_eq!(
            SyncStatus::NotSynced.after_local_edit(),
            SyncStatus::NotSynced
        );
    }
}
