//! Client core for the dav backend API.
//!
//! # Overview
//! Builds `HttpRequest` values and parses `HttpResponse` values without
//! touching the network (host-does-IO pattern). On top of the stateless
//! controllers sits `TableObject`, a local-first record that persists itself
//! through a `TableObjectStore` and asks a `SyncPush` to send pending changes
//! to the server.
//!
//! # Design
//! - `DavClient` is stateless; each operation is a `build_*` / `parse_*` pair.
//! - `Session` replaces process-wide configuration: base URL, access token,
//!   environment and the resulting `PushMode`.
//! - Storage, sync engine and transport are traits implemented by the host.
//! - `DownloadTracker` is the only shared mutable registry; it keeps two
//!   downloads of the same file from running at once.

pub mod client;
pub mod download;
pub mod error;
pub mod http;
pub mod session;
pub mod store;
pub mod sync;
pub mod table_object;
pub mod transport;
pub mod types;

pub use client::{ApiResult, DavClient};
pub use download::{DownloadGuard, DownloadTracker};
pub use error::{
    ApiError, DataError, ErrorDetail, ErrorResponse, StoreError, SyncError,
    ACCESS_TOKEN_MUST_BE_RENEWED,
};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use session::{Environment, Session, SessionConfig};
pub use store::{MemoryStore, TableObjectStore};
pub use sync::{PushMode, SyncPush};
pub use table_object::{
    DataContext, FileDownloadStatus, Property, PropertyEntry, PropertyValue, TableObject,
    UploadStatus, EXT_PROPERTY,
};
pub use transport::{call, call_with_session, renew_session, Transport};
pub use types::{
    Api, ApiResponse, App, AppUser, Auth, CreateTableParams, GetTableParams, GetTableResponseData,
    Plan, SignupParams, SignupResponseData, SubscriptionStatus, Table, TableObjectRef,
    UpdateAppParams, User,
};
