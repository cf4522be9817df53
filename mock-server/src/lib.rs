//! In-memory stand-in for the dav backend.
//!
//! Serves the subset of endpoints the client core talks to. Tokens are
//! passed raw in `Authorization`. A seeded session token is already marked
//! expired so clients can exercise the renew-and-retry path.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::debug;
use uuid::Uuid;

/// Token accepted as developer auth on `/signup`.
pub const DEV_AUTH_TOKEN: &str = "dev-api-key,dev-signature";
/// Valid session token of the seeded user.
pub const USER_TOKEN: &str = "user-session-token";
/// Session token of the seeded user that must be renewed before use.
pub const EXPIRED_TOKEN: &str = "expired-session-token";
/// Seeded app owned by the seeded user.
pub const APP_ID: i64 = 12;
/// Seeded table of `APP_ID` holding file objects.
pub const FILE_TABLE_ID: i64 = 21;
/// Seeded file object in `FILE_TABLE_ID`.
pub const FILE_OBJECT_UUID: Uuid = Uuid::from_u128(0x6f1f_3b54_8a2c_4d8e_9b55_0a1c_2d3e_4f50);
/// Payload of `FILE_OBJECT_UUID`.
pub const FILE_CONTENT: &[u8] = b"\x89PNG mock payload";

pub const CODE_AUTHENTICATION_FAILED: i32 = 2101;
pub const CODE_ACTION_NOT_ALLOWED: i32 = 1103;
pub const CODE_NAME_TOO_SHORT: i32 = 2203;
pub const CODE_EMAIL_TAKEN: i32 = 2702;
pub const CODE_RESOURCE_NOT_FOUND: i32 = 2805;
pub const CODE_ACCESS_TOKEN_MUST_BE_RENEWED: i32 = 3100;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct App {
    pub id: i64,
    pub dev_id: i64,
    pub name: String,
    pub description: String,
    pub published: bool,
    pub web_link: Option<String>,
    pub google_play_link: Option<String>,
    pub microsoft_store_link: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Table {
    pub id: i64,
    pub app_id: i64,
    pub name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Api {
    pub id: i64,
    pub app_id: i64,
    pub name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppUser {
    pub user_id: i64,
    pub created_at: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub first_name: String,
    pub confirmed: bool,
    pub total_storage: u64,
    pub used_storage: u64,
    pub stripe_customer_id: Option<String>,
    pub plan: u8,
    pub subscription_status: u8,
    pub period_end: Option<String>,
    pub dev: bool,
    pub provider: bool,
}

#[derive(Clone, Debug)]
pub struct StoredObject {
    pub table_id: i64,
    pub etag: String,
    pub file: Option<Vec<u8>>,
}

#[derive(Clone, Debug)]
struct SessionEntry {
    user_id: i64,
    expired: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: i32,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub errors: Vec<ErrorDetail>,
}

#[derive(Deserialize)]
pub struct UpdateApp {
    pub name: Option<String>,
    pub description: Option<String>,
    pub published: Option<bool>,
    pub web_link: Option<String>,
    pub google_play_link: Option<String>,
    pub microsoft_store_link: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateTable {
    pub app_id: i64,
    pub name: String,
}

#[derive(Deserialize)]
pub struct Signup {
    pub email: String,
    pub first_name: String,
    pub password: String,
    pub app_id: i64,
    pub api_key: String,
    pub device_name: Option<String>,
    pub device_type: Option<String>,
    pub device_os: Option<String>,
}

#[derive(Deserialize)]
pub struct TablePage {
    pub count: Option<usize>,
    pub page: Option<usize>,
}

#[derive(Deserialize)]
pub struct ObjectQuery {
    #[serde(default)]
    pub file: bool,
}

/// Backend state shared by all handlers.
#[derive(Debug, Default)]
pub struct Backend {
    pub apps: HashMap<i64, App>,
    pub apis: HashMap<i64, Vec<Api>>,
    pub app_users: HashMap<i64, Vec<AppUser>>,
    pub tables: HashMap<i64, Table>,
    pub objects: HashMap<Uuid, StoredObject>,
    pub users: HashMap<i64, User>,
    sessions: HashMap<String, SessionEntry>,
    dev_tokens: HashSet<String>,
    next_id: i64,
}

impl Backend {
    /// One developer user owning one app with one file table.
    pub fn seeded() -> Self {
        let mut backend = Backend {
            next_id: 100,
            ..Default::default()
        };
        backend.dev_tokens.insert(DEV_AUTH_TOKEN.to_string());
        backend.users.insert(
            1,
            User {
                id: 1,
                email: "dav@example.com".to_string(),
                first_name: "Dav".to_string(),
                confirmed: true,
                total_storage: 50_000_000_000,
                used_storage: 1_024,
                stripe_customer_id: Some("cus_mock".to_string()),
                plan: 2,
                subscription_status: 0,
                period_end: Some("2031-01-01T00:00:00Z".to_string()),
                dev: true,
                provider: false,
            },
        );
        backend.sessions.insert(
            USER_TOKEN.to_string(),
            SessionEntry {
                user_id: 1,
                expired: false,
            },
        );
        backend.sessions.insert(
            EXPIRED_TOKEN.to_string(),
            SessionEntry {
                user_id: 1,
                expired: true,
            },
        );
        backend.apps.insert(
            APP_ID,
            App {
                id: APP_ID,
                dev_id: 1,
                name: "TestApp".to_string(),
                description: "TestApp description".to_string(),
                published: true,
                web_link: Some("https://testapp.dav-apps.tech".to_string()),
                google_play_link: None,
                microsoft_store_link: None,
            },
        );
        backend.apis.insert(
            APP_ID,
            vec![Api {
                id: 5,
                app_id: APP_ID,
                name: "TestApi".to_string(),
            }],
        );
        backend.app_users.insert(
            APP_ID,
            vec![
                AppUser {
                    user_id: 1,
                    created_at: "2021-01-11T23:00:00Z".to_string(),
                },
                AppUser {
                    user_id: 2,
                    created_at: "2021-01-16T23:00:00Z".to_string(),
                },
            ],
        );
        backend.tables.insert(
            FILE_TABLE_ID,
            Table {
                id: FILE_TABLE_ID,
                app_id: APP_ID,
                name: "Image".to_string(),
            },
        );
        backend.objects.insert(
            FILE_OBJECT_UUID,
            StoredObject {
                table_id: FILE_TABLE_ID,
                etag: "etag-1".to_string(),
                file: Some(FILE_CONTENT.to_vec()),
            },
        );
        backend
    }

    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    /// Resolve the session token in `headers` to a user id.
    fn authenticate(&self, headers: &HeaderMap) -> Result<i64, Failure> {
        let token = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| failure(StatusCode::UNAUTHORIZED, CODE_AUTHENTICATION_FAILED, "Authentication failed"))?;
        match self.sessions.get(token) {
            Some(session) if session.expired => Err(failure(
                StatusCode::FORBIDDEN,
                CODE_ACCESS_TOKEN_MUST_BE_RENEWED,
                "Access token must be renewed",
            )),
            Some(session) => Ok(session.user_id),
            None => Err(failure(StatusCode::UNAUTHORIZED, CODE_AUTHENTICATION_FAILED, "Authentication failed")),
        }
    }

    fn owned_app(&self, user_id: i64, app_id: i64) -> Result<&App, Failure> {
        let app = self
            .apps
            .get(&app_id)
            .ok_or_else(|| failure(StatusCode::NOT_FOUND, CODE_RESOURCE_NOT_FOUND, "App does not exist"))?;
        if app.dev_id != user_id {
            return Err(failure(StatusCode::FORBIDDEN, CODE_ACTION_NOT_ALLOWED, "Action not allowed"));
        }
        Ok(app)
    }

    fn app_json(&self, app: &App) -> serde_json::Value {
        let tables: Vec<&Table> = self.tables.values().filter(|t| t.app_id == app.id).collect();
        let mut json = serde_json::to_value(app).unwrap_or_default();
        json["tables"] = serde_json::to_value(tables).unwrap_or_default();
        json["apis"] = serde_json::to_value(self.apis.get(&app.id).cloned().unwrap_or_default())
            .unwrap_or_default();
        json
    }

    fn user_json(&self, user: &User) -> serde_json::Value {
        let apps: Vec<&App> = self.apps.values().filter(|a| a.dev_id == user.id).collect();
        let mut json = serde_json::to_value(user).unwrap_or_default();
        json["apps"] = serde_json::to_value(apps).unwrap_or_default();
        json
    }
}

pub type Db = Arc<RwLock<Backend>>;

type Failure = (StatusCode, Json<ErrorBody>);

fn failure(status: StatusCode, code: i32, message: &str) -> Failure {
    (
        status,
        Json(ErrorBody {
            errors: vec![ErrorDetail {
                code,
                message: message.to_string(),
            }],
        }),
    )
}

pub fn app() -> Router {
    app_with(Arc::new(RwLock::new(Backend::seeded())))
}

pub fn app_with(db: Db) -> Router {
    Router::new()
        .route("/apps", get(get_apps))
        .route("/app/{id}", get(get_app).put(update_app))
        .route("/app/{id}/users", get(get_app_users))
        .route("/table", post(create_table))
        .route("/table/{id}", get(get_table))
        .route("/signup", post(signup))
        .route("/user", get(get_user))
        .route("/session/renew", put(renew_session))
        .route("/apps/object/{uuid}", get(get_table_object))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn get_apps(State(db): State<Db>) -> Json<serde_json::Value> {
    let backend = db.read().await;
    let mut apps: Vec<&App> = backend.apps.values().filter(|a| a.published).collect();
    apps.sort_by_key(|a| a.id);
    Json(serde_json::json!({ "apps": apps }))
}

async fn get_app(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, Failure> {
    let backend = db.read().await;
    let user_id = backend.authenticate(&headers)?;
    let app = backend.owned_app(user_id, id)?;
    Ok(Json(backend.app_json(app)))
}

async fn update_app(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(input): Json<UpdateApp>,
) -> Result<Json<App>, Failure> {
    let mut backend = db.write().await;
    let user_id = backend.authenticate(&headers)?;
    backend.owned_app(user_id, id)?;
    let Some(app) = backend.apps.get_mut(&id) else {
        return Err(failure(StatusCode::NOT_FOUND, CODE_RESOURCE_NOT_FOUND, "App does not exist"));
    };
    if let Some(name) = input.name {
        app.name = name;
    }
    if let Some(description) = input.description {
        app.description = description;
    }
    if let Some(published) = input.published {
        app.published = published;
    }
    if let Some(link) = input.web_link {
        app.web_link = Some(link);
    }
    if let Some(link) = input.google_play_link {
        app.google_play_link = Some(link);
    }
    if let Some(link) = input.microsoft_store_link {
        app.microsoft_store_link = Some(link);
    }
    debug!(app_id = id, "app updated");
    Ok(Json(app.clone()))
}

async fn get_app_users(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, Failure> {
    let backend = db.read().await;
    let user_id = backend.authenticate(&headers)?;
    backend.owned_app(user_id, id)?;
    let users = backend.app_users.get(&id).cloned().unwrap_or_default();
    Ok(Json(serde_json::json!({ "app_users": users })))
}

async fn create_table(
    State(db): State<Db>,
    headers: HeaderMap,
    Json(input): Json<CreateTable>,
) -> Result<(StatusCode, Json<Table>), Failure> {
    let mut backend = db.write().await;
    let user_id = backend.authenticate(&headers)?;
    backend.owned_app(user_id, input.app_id)?;
    if input.name.len() < 2 {
        return Err(failure(StatusCode::BAD_REQUEST, CODE_NAME_TOO_SHORT, "Name too short"));
    }
    let table = Table {
        id: backend.next_id(),
        app_id: input.app_id,
        name: input.name,
    };
    backend.tables.insert(table.id, table.clone());
    debug!(table_id = table.id, "table created");
    Ok((StatusCode::CREATED, Json(table)))
}

async fn get_table(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Query(paging): Query<TablePage>,
) -> Result<Json<serde_json::Value>, Failure> {
    let backend = db.read().await;
    let user_id = backend.authenticate(&headers)?;
    let table = backend
        .tables
        .get(&id)
        .ok_or_else(|| failure(StatusCode::NOT_FOUND, CODE_RESOURCE_NOT_FOUND, "Table does not exist"))?;
    backend.owned_app(user_id, table.app_id)?;

    let mut objects: Vec<(Uuid, &StoredObject)> = backend
        .objects
        .iter()
        .filter(|(_, o)| o.table_id == id)
        .map(|(uuid, o)| (*uuid, o))
        .collect();
    objects.sort_by_key(|(uuid, _)| *uuid);

    let count = paging.count.unwrap_or(100).max(1);
    let page = paging.page.unwrap_or(1).max(1);
    let pages = objects.len().div_ceil(count).max(1);
    let listed: Vec<serde_json::Value> = objects
        .into_iter()
        .skip((page - 1) * count)
        .take(count)
        .map(|(uuid, o)| serde_json::json!({ "uuid": uuid, "etag": o.etag }))
        .collect();

    Ok(Json(serde_json::json!({
        "id": table.id,
        "app_id": table.app_id,
        "name": table.name,
        "pages": pages,
        "table_objects": listed,
    })))
}

async fn signup(
    State(db): State<Db>,
    headers: HeaderMap,
    Json(input): Json<Signup>,
) -> Result<(StatusCode, Json<serde_json::Value>), Failure> {
    let mut backend = db.write().await;
    let authorized = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|token| backend.dev_tokens.contains(token));
    if !authorized {
        return Err(failure(StatusCode::UNAUTHORIZED, CODE_AUTHENTICATION_FAILED, "Authentication failed"));
    }
    if backend.users.values().any(|u| u.email == input.email) {
        return Err(failure(StatusCode::CONFLICT, CODE_EMAIL_TAKEN, "Email already in use"));
    }

    let user = User {
        id: backend.next_id(),
        email: input.email,
        first_name: input.first_name,
        confirmed: false,
        total_storage: 5_000_000_000,
        used_storage: 0,
        stripe_customer_id: None,
        plan: 0,
        subscription_status: 0,
        period_end: None,
        dev: false,
        provider: false,
    };
    let jwt = Uuid::new_v4().to_string();
    backend.sessions.insert(
        jwt.clone(),
        SessionEntry {
            user_id: user.id,
            expired: false,
        },
    );
    backend.users.insert(user.id, user.clone());
    debug!(
        user_id = user.id,
        app_id = input.app_id,
        api_key = %input.api_key,
        password_len = input.password.len(),
        device_name = ?input.device_name,
        device_type = ?input.device_type,
        device_os = ?input.device_os,
        "user signed up"
    );

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "user": user,
            "jwt": jwt,
            "website_jwt": null,
        })),
    ))
}

async fn get_user(
    State(db): State<Db>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, Failure> {
    let backend = db.read().await;
    let user_id = backend.authenticate(&headers)?;
    let user = backend
        .users
        .get(&user_id)
        .ok_or_else(|| failure(StatusCode::NOT_FOUND, CODE_RESOURCE_NOT_FOUND, "User does not exist"))?;
    Ok(Json(backend.user_json(user)))
}

/// Expired tokens are accepted here; that is what renewal is for.
async fn renew_session(
    State(db): State<Db>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, Failure> {
    let mut backend = db.write().await;
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| failure(StatusCode::UNAUTHORIZED, CODE_AUTHENTICATION_FAILED, "Authentication failed"))?;
    let session = backend
        .sessions
        .remove(&token)
        .ok_or_else(|| failure(StatusCode::NOT_FOUND, CODE_RESOURCE_NOT_FOUND, "Session does not exist"))?;

    let access_token = Uuid::new_v4().to_string();
    backend.sessions.insert(
        access_token.clone(),
        SessionEntry {
            user_id: session.user_id,
            expired: false,
        },
    );
    debug!(user_id = session.user_id, "session renewed");
    Ok(Json(serde_json::json!({ "access_token": access_token })))
}

async fn get_table_object(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(uuid): Path<Uuid>,
    Query(query): Query<ObjectQuery>,
) -> Result<Response, Failure> {
    let backend = db.read().await;
    let user_id = backend.authenticate(&headers)?;
    let object = backend
        .objects
        .get(&uuid)
        .ok_or_else(|| failure(StatusCode::NOT_FOUND, CODE_RESOURCE_NOT_FOUND, "Table object does not exist"))?;
    let app_id = backend.tables.get(&object.table_id).map(|t| t.app_id).unwrap_or_default();
    backend.owned_app(user_id, app_id)?;

    if !query.file {
        let json = serde_json::json!({
            "uuid": uuid,
            "table_id": object.table_id,
            "etag": object.etag,
        });
        return Ok(Json(json).into_response());
    }

    let file = object
        .file
        .clone()
        .ok_or_else(|| failure(StatusCode::NOT_FOUND, CODE_RESOURCE_NOT_FOUND, "Table object has no file"))?;
    Ok(([(header::CONTENT_TYPE, "application/octet-stream")], file).into_response())
}
