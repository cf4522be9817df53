//! Local persistence for table objects.
//!
//! # Design
//! The store is a key/value map keyed by uuid. Upserts overwrite the whole
//! object; there are no cross-object transactions. `MemoryStore` is the
//! in-process implementation; hosts with real storage implement the trait
//! over their own backend and can persist objects with serde.

use std::collections::HashMap;

use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::StoreError;
use crate::table_object::{TableObject, UploadStatus};

pub trait TableObjectStore: Send + Sync {
    fn exists(&self, uuid: Uuid) -> Result<bool, StoreError>;

    /// Insert or overwrite the object with the same uuid.
    fn upsert(&self, object: &TableObject) -> Result<(), StoreError>;

    fn remove(&self, uuid: Uuid, table_id: i64) -> Result<(), StoreError>;

    fn get(&self, uuid: Uuid) -> Result<Option<TableObject>, StoreError>;

    /// Objects of one table, ordered by uuid. Objects waiting for a server
    /// deletion or removal are skipped unless `include_pending_deletions`.
    fn get_all(
        &self,
        table_id: i64,
        include_pending_deletions: bool,
    ) -> Result<Vec<TableObject>, StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: RwLock<HashMap<Uuid, TableObject>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

impl TableObjectStore for MemoryStore {
    fn exists(&self, uuid: Uuid) -> Result<bool, StoreError> {
        Ok(self.objects.read().contains_key(&uuid))
    }

    fn upsert(&self, object: &TableObject) -> Result<(), StoreError> {
        self.objects.write().insert(object.uuid(), object.clone());
        Ok(())
    }

    fn remove(&self, uuid: Uuid, table_id: i64) -> Result<(), StoreError> {
        let mut objects = self.objects.write();
        if objects.get(&uuid).is_some_and(|o| o.table_id() == table_id) {
            objects.remove(&uuid);
        }
        Ok(())
    }

    fn get(&self, uuid: Uuid) -> Result<Option<TableObject>, StoreError> {
        Ok(self.objects.read().get(&uuid).cloned())
    }

    fn get_all(
        &self,
        table_id: i64,
        include_pending_deletions: bool,
    ) -> Result<Vec<TableObject>, StoreError> {
        let mut objects: Vec<TableObject> = self
            .objects
            .read()
            .values()
            .filter(|o| o.table_id() == table_id)
            .filter(|o| {
                include_pending_deletions
                    || !matches!(o.upload_status(), UploadStatus::Deleted | UploadStatus::Removed)
            })
            .cloned()
            .collect();
        objects.sort_by_key(|o| o.uuid());
        Ok(objects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_overwrites_by_uuid() {
        let store = MemoryStore::new();
        let object = TableObject::new(1);
        store.upsert(&object).unwrap();
        let object = object.with_upload_status(UploadStatus::UpToDate);
        store.upsert(&object).unwrap();

        assert_eq!(store.len(), 1);
        let stored = store.get(object.uuid()).unwrap().unwrap();
        assert_eq!(stored.upload_status(), UploadStatus::UpToDate);
    }

    #[test]
    fn remove_requires_matching_table() {
        let store = MemoryStore::new();
        let object = TableObject::new(1);
        store.upsert(&object).unwrap();

        store.remove(object.uuid(), 2).unwrap();
        assert!(store.exists(object.uuid()).unwrap());
        store.remove(object.uuid(), 1).unwrap();
        assert!(!store.exists(object.uuid()).unwrap());
    }

    #[test]
    fn get_all_filters_table_and_pending_deletions() {
        let store = MemoryStore::new();
        let kept = TableObject::new(1);
        let deleted = TableObject::new(1).with_upload_status(UploadStatus::Deleted);
        let other = TableObject::new(2);
        for object in [&kept, &deleted, &other] {
            store.upsert(object).unwrap();
        }

        let visible = store.get_all(1, false).unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].uuid(), kept.uuid());
        assert_eq!(store.get_all(1, true).unwrap().len(), 2);
    }
}
