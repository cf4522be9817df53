//! Local-first table objects and their upload state machine.
//!
//! # Overview
//! A `TableObject` is one record of an app table: a uuid, a set of named
//! properties and, for file tables, a binary payload. Every mutation is
//! persisted through the `TableObjectStore` and, unless the mutation only
//! records sync bookkeeping, asks the `SyncPush` for a push according to the
//! session's `PushMode`.
//!
//! # Upload status
//! - `New`: created locally, never synced.
//! - `UpToDate`: matches the server. The first push-requesting save of a
//!   stored `UpToDate` object turns it into `Updated`.
//! - `Deleted` / `Removed`: waiting for the sync engine to delete the object
//!   on the server, or to drop it from this device only.
//! - `NoUpload`: never pushed; saves do not request a push.
//!
//! Without an active session there is nothing to reconcile, so `delete`,
//! `remove` and non-local property removals erase data immediately.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::download::DownloadTracker;
use crate::error::DataError;
use crate::session::Session;
use crate::store::TableObjectStore;
use crate::sync::SyncPush;
use crate::transport::{call_with_session, Transport};

/// Name of the property holding a file object's extension.
pub const EXT_PROPERTY: &str = "ext";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum UploadStatus {
    #[default]
    New,
    UpToDate,
    Updated,
    Deleted,
    Removed,
    NoUpload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileDownloadStatus {
    NoFileOrNotLoggedIn,
    NotDownloaded,
    Downloading,
    Downloaded,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Number(f64),
    String(String),
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::String(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::String(value)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        PropertyValue::Number(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Number(value as f64)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}

/// Stored form of a property. A `None` value marks a property removed while
/// logged in; the entry stays until the removal has been synced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyEntry {
    pub value: Option<PropertyValue>,
    /// Local properties never leave the device.
    #[serde(default)]
    pub local: bool,
}

/// A property assignment. `local: None` keeps an existing entry's flag.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub name: String,
    pub value: PropertyValue,
    pub local: Option<bool>,
}

impl Property {
    pub fn new(name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            local: None,
        }
    }

    pub fn local(name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        Self::new(name, value).with_local(true)
    }

    pub fn with_local(mut self, local: bool) -> Self {
        self.local = Some(local);
        self
    }
}

/// Collaborators a table object needs to persist and sync itself.
#[derive(Clone)]
pub struct DataContext {
    pub session: Arc<Session>,
    pub store: Arc<dyn TableObjectStore>,
    pub sync: Arc<dyn SyncPush>,
    pub downloads: DownloadTracker,
}

impl DataContext {
    pub fn new(
        session: Arc<Session>,
        store: Arc<dyn TableObjectStore>,
        sync: Arc<dyn SyncPush>,
    ) -> Self {
        Self {
            session,
            store,
            sync,
            downloads: DownloadTracker::new(),
        }
    }

    /// Share an existing download registry.
    pub fn with_downloads(mut self, downloads: DownloadTracker) -> Self {
        self.downloads = downloads;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableObject {
    uuid: Uuid,
    table_id: i64,
    #[serde(default)]
    is_file: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    file: Option<Vec<u8>>,
    #[serde(default)]
    properties: BTreeMap<String, PropertyEntry>,
    #[serde(default)]
    upload_status: UploadStatus,
    #[serde(default)]
    etag: Option<String>,
}

impl TableObject {
    pub fn new(table_id: i64) -> Self {
        Self::with_uuid(Uuid::new_v4(), table_id)
    }

    pub fn with_uuid(uuid: Uuid, table_id: i64) -> Self {
        Self {
            uuid,
            table_id,
            is_file: false,
            file: None,
            properties: BTreeMap::new(),
            upload_status: UploadStatus::New,
            etag: None,
        }
    }

    /// A new object of a file table.
    pub fn new_file(table_id: i64) -> Self {
        Self {
            is_file: true,
            ..Self::new(table_id)
        }
    }

    // Builders below only touch memory. They are meant for assembling
    // objects from server data before the first save.

    pub fn with_upload_status(mut self, upload_status: UploadStatus) -> Self {
        self.upload_status = upload_status;
        self
    }

    pub fn with_etag(mut self, etag: impl Into<String>) -> Self {
        self.etag = Some(etag.into());
        self
    }

    pub fn with_property(mut self, property: Property) -> Self {
        self.apply_property(property);
        self
    }

    pub fn with_is_file(mut self, is_file: bool) -> Self {
        self.is_file = is_file;
        self
    }

    pub fn with_file(mut self, file: Vec<u8>) -> Self {
        self.is_file = true;
        self.file = Some(file);
        self
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn table_id(&self) -> i64 {
        self.table_id
    }

    pub fn is_file(&self) -> bool {
        self.is_file
    }

    pub fn file(&self) -> Option<&[u8]> {
        self.file.as_deref()
    }

    pub fn properties(&self) -> &BTreeMap<String, PropertyEntry> {
        &self.properties
    }

    pub fn upload_status(&self) -> UploadStatus {
        self.upload_status
    }

    pub fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }

    pub fn get_property_value(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name).and_then(|p| p.value.as_ref())
    }

    /// Set one property. Returns whether anything changed; an unchanged
    /// property is neither persisted nor pushed.
    pub fn set_property_value(
        &mut self,
        ctx: &DataContext,
        property: Property,
    ) -> Result<bool, DataError> {
        if !self.apply_property(property) {
            return Ok(false);
        }
        self.save(ctx, true)?;
        Ok(true)
    }

    /// Set several properties with at most one save and one push.
    pub fn set_property_values(
        &mut self,
        ctx: &DataContext,
        properties: impl IntoIterator<Item = Property>,
    ) -> Result<bool, DataError> {
        let mut changed = false;
        for property in properties {
            changed |= self.apply_property(property);
        }
        if changed {
            self.save(ctx, true)?;
        }
        Ok(changed)
    }

    /// Remove a property. Local properties, and every property while logged
    /// out, are erased; otherwise the value is cleared so the removal syncs.
    pub fn remove_property(&mut self, ctx: &DataContext, name: &str) -> Result<bool, DataError> {
        let local = match self.properties.get(name) {
            Some(entry) => entry.local,
            None => return Ok(false),
        };

        if local || !ctx.session.is_authenticated() {
            self.properties.remove(name);
        } else if let Some(entry) = self.properties.get_mut(name) {
            entry.value = None;
        }

        self.save(ctx, true)?;
        Ok(true)
    }

    /// Record a status decided by the sync engine. Never requests a push.
    pub fn set_upload_status(
        &mut self,
        ctx: &DataContext,
        upload_status: UploadStatus,
    ) -> Result<(), DataError> {
        self.upload_status = upload_status;
        self.save(ctx, false)
    }

    /// Record the etag of the last synced version. Never requests a push.
    pub fn set_etag(&mut self, ctx: &DataContext, etag: impl Into<String>) -> Result<(), DataError> {
        self.etag = Some(etag.into());
        self.save(ctx, false)
    }

    /// Attach a payload to a file object and record its extension.
    ///
    /// Returns `false` without saving when the object is not a file or the
    /// payload is identical to the current one.
    pub fn set_file(
        &mut self,
        ctx: &DataContext,
        file: Vec<u8>,
        ext: &str,
    ) -> Result<bool, DataError> {
        if !self.is_file || self.file.as_deref() == Some(file.as_slice()) {
            return Ok(false);
        }

        if self.upload_status == UploadStatus::UpToDate {
            self.upload_status = UploadStatus::Updated;
        }
        self.file = Some(file);
        self.apply_property(Property::new(EXT_PROPERTY, ext));
        self.save(ctx, true)?;
        Ok(true)
    }

    pub fn file_download_status(&self, ctx: &DataContext) -> FileDownloadStatus {
        if !self.is_file {
            return FileDownloadStatus::NoFileOrNotLoggedIn;
        }
        if self.file.is_some() {
            return FileDownloadStatus::Downloaded;
        }
        if !ctx.session.is_authenticated() {
            return FileDownloadStatus::NoFileOrNotLoggedIn;
        }
        if ctx.downloads.contains(self.uuid) {
            return FileDownloadStatus::Downloading;
        }
        FileDownloadStatus::NotDownloaded
    }

    /// Fetch the payload from the server.
    ///
    /// Returns `false` when there is nothing to download, another download of
    /// this object is running, or the request failed. Store failures while
    /// saving the payload are returned as errors.
    pub fn download_file(
        &mut self,
        ctx: &DataContext,
        transport: &dyn Transport,
    ) -> Result<bool, DataError> {
        if self.file_download_status(ctx) != FileDownloadStatus::NotDownloaded {
            return Ok(false);
        }
        let Some(_guard) = ctx.downloads.try_begin(self.uuid) else {
            return Ok(false);
        };

        let uuid = self.uuid;
        let result = call_with_session(
            transport,
            &ctx.session,
            |client, token| Ok(client.build_download_table_object_file(token, uuid)),
            |client, response| client.parse_download_table_object_file(response),
        );

        match result {
            Ok(response) => {
                self.file = Some(response.data);
                self.save(ctx, false)?;
                Ok(true)
            }
            Err(err) => {
                warn!(%uuid, status = err.status, errors = ?err.errors, "file download failed");
                Ok(false)
            }
        }
    }

    /// Mark for deletion on the server, or erase right away when logged out.
    pub fn delete(&mut self, ctx: &DataContext) -> Result<(), DataError> {
        if ctx.session.is_authenticated() {
            self.upload_status = UploadStatus::Deleted;
            self.save(ctx, true)
        } else {
            self.delete_immediately(ctx)
        }
    }

    /// Mark for removal from this device only, or erase right away when
    /// logged out.
    pub fn remove(&mut self, ctx: &DataContext) -> Result<(), DataError> {
        if ctx.session.is_authenticated() {
            self.upload_status = UploadStatus::Removed;
            self.save(ctx, true)
        } else {
            self.delete_immediately(ctx)
        }
    }

    /// Erase from the local store without involving the server.
    pub fn delete_immediately(&self, ctx: &DataContext) -> Result<(), DataError> {
        ctx.store.remove(self.uuid, self.table_id)?;
        debug!(uuid = %self.uuid, table_id = self.table_id, "table object erased");
        Ok(())
    }

    /// Merge one property into the map. Returns whether the map changed.
    fn apply_property(&mut self, property: Property) -> bool {
        match self.properties.entry(property.name) {
            Entry::Vacant(slot) => {
                slot.insert(PropertyEntry {
                    value: Some(property.value),
                    local: property.local.unwrap_or(false),
                });
                true
            }
            Entry::Occupied(mut slot) => {
                let entry = slot.get_mut();
                if entry.value.as_ref() == Some(&property.value) {
                    match property.local {
                        Some(local) if local != entry.local => {
                            entry.local = local;
                            true
                        }
                        _ => false,
                    }
                } else {
                    entry.value = Some(property.value);
                    if let Some(local) = property.local {
                        entry.local = local;
                    }
                    true
                }
            }
        }
    }

    fn save(&mut self, ctx: &DataContext, request_push: bool) -> Result<(), DataError> {
        let push = request_push && self.upload_status != UploadStatus::NoUpload;

        if push && self.upload_status == UploadStatus::UpToDate && ctx.store.exists(self.uuid)? {
            self.upload_status = UploadStatus::Updated;
        }

        ctx.store.upsert(self)?;
        debug!(
            uuid = %self.uuid,
            status = ?self.upload_status,
            push,
            "table object saved"
        );

        if push {
            ctx.session.push_mode().dispatch(ctx.sync.as_ref())?;
        }
        Ok(())
    }
}
