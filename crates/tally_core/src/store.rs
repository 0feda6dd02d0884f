//! Storage interface consumed by the sync engine.
//!
//! The host application owns the real storage backend and implements
//! [`EntityStore`] for each record type it wants synchronized. The engine
//! only ever calls through this trait, so the backend's own concurrency
//! control (single writer, transactions) is never bypassed.
//!
//! [`MemoryStore`] is the in-process reference implementation, used by the
//! test suites and suitable for small deployments.

use crate::entity::{Bill, Book, EntityId};
use crate::status::SyncStatus;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors reported by an entity store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend is temporarily unreachable (locked, closed, offline).
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// An insert collided with an existing record id.
    #[error("duplicate record id {0}")]
    DuplicateId(EntityId),

    /// Any other backend failure.
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// A record the sync engine can reconcile.
///
/// Implemented by every synchronizable entity; gives the store and the
/// engine uniform access to the id and the persisted status field.
pub trait SyncRecord: Clone + Send + Sync + 'static {
    /// The record's stable id.
    fn id(&self) -> EntityId;

    /// The persisted synchronization status.
    fn sync_status(&self) -> SyncStatus;

    /// Overwrites the synchronization status.
    fn set_sync_status(&mut self, status: SyncStatus);
}

impl SyncRecord for Bill {
    fn id(&self) -> EntityId {
        self.id
    }

    fn sync_status(&self) -> SyncStatus {
        self.sync_status
    }

    fn set_sync_status(&mut self, status: SyncStatus) {
        self.sync_status = status;
    }
}

impl SyncRecord for Book {
    fn id(&self) -> EntityId {
        self.id
    }

    fn sync_status(&self) -> SyncStatus {
        self.sync_status
    }

    fn set_sync_status(&mut self, status: SyncStatus) {
        self.sync_status = status;
    }
}

/// CRUD-plus-status operations over one record type.
///
/// All mutations go through the implementation's own locking; calls are
/// synchronous and may block the calling thread.
pub trait EntityStore<E: SyncRecord>: Send + Sync {
    /// Inserts a new record; fails with [`StoreError::DuplicateId`] if the
    /// id already exists.
    fn insert(&self, entity: E) -> StoreResult<()>;

    /// Updates an existing record in place.
    ///
    /// Returns false if no record with that id exists.
    fn update(&self, entity: E) -> StoreResult<bool>;

    /// Inserts or replaces the record, whichever applies.
    fn upsert(&self, entity: E) -> StoreResult<()>;

    /// Deletes by id. Returns false if the record was already absent.
    fn delete_by_id(&self, id: &EntityId) -> StoreResult<bool>;

    /// Rewrites only the status field of the record.
    ///
    /// Returns false if no record with that id exists.
    fn update_sync_status(&self, id: &EntityId, status: SyncStatus) -> StoreResult<bool>;

    /// Returns true if a record with this id exists.
    fn exists(&self, id: &EntityId) -> StoreResult<bool>;

    /// Looks a record up by id.
    fn find_by_id(&self, id: &EntityId) -> StoreResult<Option<E>>;

    /// Returns every record whose status is not [`SyncStatus::Synced`],
    /// in stable id order.
    fn find_pending_sync(&self) -> StoreResult<Vec<E>>;
}

/// In-memory entity store.
///
/// Records live in a `BTreeMap` keyed by id, so `find_pending_sync`
/// returns a stable order. `set_available(false)` makes every operation
/// fail with [`StoreError::Unavailable`], which the engine tests use to
/// exercise the persistence-failure paths.
pub struct MemoryStore<E: SyncRecord> {
    records: RwLock<BTreeMap<EntityId, E>>,
    available: RwLock<bool>,
}

impl<E: SyncRecord> MemoryStore<E> {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            available: RwLock::new(true),
        }
    }

    /// Toggles backend availability (failure injection for tests).
    pub fn set_available(&self, available: bool) {
        *self.available.write() = available;
    }

    /// Returns the number of stored records.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    fn check_available(&self) -> StoreResult<()> {
        if *self.available.read() {
            Ok(())
        } else {
            Err(StoreError::Unavailable("memory store offline".into()))
        }
    }
}

impl<E: SyncRecord> Default for MemoryStore<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: SyncRecord> EntityStore<E> for MemoryStore<E> {
    fn insert(&self, entity: E) -> StoreResult<()> {
        self.check_available()?;
        let mut records = self.records.write();
        let id = entity.id();
        if records.contains_key(&id) {
            return Err(StoreError::DuplicateId(id));
        }
        records.insert(id, entity);
        Ok(())
    }

    fn update(&self, entity: E) -> StoreResult<bool> {
        self.check_available()?;
        let mut records = self.records.write();
        let id = entity.id();
        if !records.contains_key(&id) {
            return Ok(false);
        }
        records.insert(id, entity);
        Ok(true)
    }

    fn upsert(&self, entity: E) -> StoreResult<()> {
        self.check_available()?;
        self.records.write().insert(entity.id(), entity);
        Ok(())
    }

    fn delete_by_id(&self, id: &EntityId) -> StoreResult<bool> {
        self.check_available()?;
        Ok(self.records.write().remove(id).is_some())
    }

    fn update_sync_status(&self, id: &EntityId, status: SyncStatus) -> StoreResult<bool> {
        self.check_available()?;
        let mut records = self.records.write();
        match records.get_mut(id) {
            Some(entity) => {
                entity.set_sync_status(status);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn exists(&self, id: &EntityId) -> StoreResult<bool> {
        self.check_available()?;
        Ok(self.records.read().contains_key(id))
    }

    fn find_by_id(&self, id: &EntityId) -> StoreResult<Option<E>> {
        self.check_available()?;
        Ok(self.records.read().get(id).cloned())
    }

    fn find_pending_sync(&self) -> StoreResult<Vec<E>> {
        self.check_available()?;
        Ok(self
            .records
            .read()
            .values()
            .filter(|e| e.sync_status().is_pending())
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::BillKind;

    fn make_bill() -> Bill {
        Bill::new(EntityId::new(), BillKind::Expense, 1_000, "user-1")
    }

    #[test]
    fn insert_rejects_duplicate_id() {
        let store = MemoryStore::new();
        let bill = make_bill();
        store.insert(bill.clone()).unwrap();

        let result = store.insert(bill);
        assert!(matches!(result, Err(StoreError::DuplicateId(_))));
    }

    #[test]
    fn update_missing_returns_false() {
        let store = MemoryStore::new();
        assert!(!store.update(make_bill()).unwrap());
    }

    #[test]
    fn upsert_inserts_then_replaces() {
        let store = MemoryStore::new();
        let mut bill = make_bill();
        store.upsert(bill.clone()).unwrap();
        assert_eq!(store.len(), 1);

        bill.amount = 2_000;
        store.upsert(bill.clone()).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.find_by_id(&bill.id).unwrap().unwrap().amount, 2_000);
    }

    #[test]
    fn delete_is_idempotent() {
        let store = MemoryStore::new();
        let bill = make_bill();
        store.insert(bill.clone()).unwrap();

        assert!(store.delete_by_id(&bill.id).unwrap());
        assert!(!store.delete_by_id(&bill.id).unwrap());
        assert!(!store.exists(&bill.id).unwrap());
    }

    #[test]
    fn update_sync_status_touches_only_status() {
        let store = MemoryStore::new();
        let bill = make_bill();
        store.insert(bill.clone()).unwrap();

        assert!(store
            .update_sync_status(&bill.id, SyncStatus::Syncing)
            .unwrap());
        let stored = store.find_by_id(&bill.id).unwrap().unwrap();
        assert_eq!(stored.sync_status, SyncStatus::Syncing);
        assert_eq!(stored.amount, bill.amount);

        assert!(!store
            .update_sync_status(&EntityId::new(), SyncStatus::Synced)
            .unwrap());
    }

    #[test]
    fn pending_sync_excludes_synced() {
        let store = MemoryStore::new();

        let not_synced = make_bill();
        store.insert(not_synced.clone()).unwrap();

        let mut synced = make_bill();
        synced.sync_status = SyncStatus::Synced;
        store.insert(synced).unwrap();

        let mut updated = make_bill();
        updated.sync_status = SyncStatus::Updated;
        store.insert(updated.clone()).unwrap();

        let pending = store.find_pending_sync().unwrap();
        assert_eq!(pending.len(), 2);
        let ids: Vec<_> = pending.iter().map(|b| b.id).collect();
        assert!(ids.contains(&not_synced.id));
        assert!(ids.contains(&updated.id));
    }

    #[test]
    fn unavailable_store_fails_everything() {
        let store = MemoryStore::new();
        let bill = make_bill();
        store.insert(bill.clone()).unwrap();

        store.set_available(false);
        assert!(matches!(
            store.find_by_id(&bill.id),
            Err(StoreError::Unavailable(_))
        ));
        assert!(matches!(
            store.upsert(bill.clone()),
            Err(StoreError::Unavailable(_))
        ));

        store.set_available(true);
        assert!(store.exists(&bill.id).unwrap());
    }
}
