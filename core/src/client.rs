//! Stateless request builders and response parsers for the dav API.
//!
//! # Design
//! `DavClient` holds only a `base_url`. Each controller operation is split
//! into a `build_*` method producing an `HttpRequest` and a `parse_*` method
//! consuming an `HttpResponse`. Parsers never fail with a transport error:
//! every failure is flattened into `ErrorResponse`.
//!
//! The backend expects the raw token in `Authorization`, without a scheme.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ApiError, ErrorDetail, ErrorResponse};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::types::{
    ApiResponse, App, AppUser, Auth, CreateTableParams, GetTableParams, GetTableResponseData,
    SignupParams, SignupResponseData, Table, TableObjectRef, UpdateAppParams, User,
};

/// Result type of every `parse_*` method.
pub type ApiResult<T> = Result<ApiResponse<T>, ErrorResponse>;

#[derive(Deserialize)]
struct ErrorBody {
    errors: Vec<ErrorDetail>,
}

#[derive(Deserialize)]
struct AppsBody {
    apps: Vec<App>,
}

#[derive(Deserialize)]
struct AppUsersBody {
    app_users: Vec<AppUser>,
}

#[derive(Deserialize)]
struct TableBody {
    id: i64,
    app_id: i64,
    name: String,
    #[serde(default)]
    pages: u32,
    #[serde(default)]
    table_objects: Vec<TableObjectRef>,
}

#[derive(Deserialize)]
struct SignupBody {
    user: User,
    jwt: String,
    #[serde(default)]
    website_jwt: Option<String>,
}

#[derive(Deserialize)]
struct RenewSessionBody {
    access_token: String,
}

/// Stateless client for the dav API.
#[derive(Debug, Clone)]
pub struct DavClient {
    base_url: String,
}

impl DavClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // --- apps ---

    pub fn build_get_apps(&self) -> HttpRequest {
        self.request(HttpMethod::Get, "/apps", None)
    }

    pub fn parse_get_apps(&self, response: HttpResponse) -> ApiResult<Vec<App>> {
        respond(&response, 200, |body: AppsBody| body.apps)
    }

    pub fn build_get_app(&self, access_token: &str, id: i64) -> HttpRequest {
        self.request(HttpMethod::Get, &format!("/app/{id}"), Some(access_token))
    }

    pub fn parse_get_app(&self, response: HttpResponse) -> ApiResult<App> {
        respond(&response, 200, |app: App| app)
    }

    pub fn build_update_app(
        &self,
        access_token: &str,
        id: i64,
        params: &UpdateAppParams,
    ) -> Result<HttpRequest, ApiError> {
        self.json_request(HttpMethod::Put, &format!("/app/{id}"), Some(access_token), params)
    }

    pub fn parse_update_app(&self, response: HttpResponse) -> ApiResult<App> {
        respond(&response, 200, |app: App| app)
    }

    // --- app users ---

    pub fn build_get_app_users(&self, access_token: &str, app_id: i64) -> HttpRequest {
        self.request(
            HttpMethod::Get,
            &format!("/app/{app_id}/users"),
            Some(access_token),
        )
    }

    pub fn parse_get_app_users(&self, response: HttpResponse) -> ApiResult<Vec<AppUser>> {
        respond(&response, 200, |body: AppUsersBody| body.app_users)
    }

    // --- tables ---

    pub fn build_create_table(
        &self,
        access_token: &str,
        params: &CreateTableParams,
    ) -> Result<HttpRequest, ApiError> {
        self.json_request(HttpMethod::Post, "/table", Some(access_token), params)
    }

    pub fn parse_create_table(&self, response: HttpResponse) -> ApiResult<Table> {
        respond(&response, 201, |table: Table| table)
    }

    pub fn build_get_table(&self, access_token: &str, params: &GetTableParams) -> HttpRequest {
        let mut query = Vec::new();
        if let Some(count) = params.count {
            query.push(format!("count={count}"));
        }
        if let Some(page) = params.page {
            query.push(format!("page={page}"));
        }
        let mut path = format!("/table/{}", params.id);
        if !query.is_empty() {
            path.push('?');
            path.push_str(&query.join("&"));
        }
        self.request(HttpMethod::Get, &path, Some(access_token))
    }

    pub fn parse_get_table(&self, response: HttpResponse) -> ApiResult<GetTableResponseData> {
        respond(&response, 200, |body: TableBody| GetTableResponseData {
            table: Table {
                id: body.id,
                app_id: body.app_id,
                name: body.name,
            },
            pages: body.pages,
            table_objects: body.table_objects,
        })
    }

    // --- users ---

    pub fn build_signup(&self, auth: &Auth, params: &SignupParams) -> Result<HttpRequest, ApiError> {
        self.json_request(HttpMethod::Post, "/signup", Some(&auth.token), params)
    }

    pub fn parse_signup(&self, response: HttpResponse) -> ApiResult<SignupResponseData> {
        respond(&response, 201, |body: SignupBody| SignupResponseData {
            user: body.user,
            jwt: body.jwt,
            website_jwt: body.website_jwt,
        })
    }

    pub fn build_get_user(&self, access_token: &str) -> HttpRequest {
        self.request(HttpMethod::Get, "/user", Some(access_token))
    }

    pub fn parse_get_user(&self, response: HttpResponse) -> ApiResult<User> {
        respond(&response, 200, |user: User| user)
    }

    // --- session ---

    pub fn build_renew_session(&self, access_token: &str) -> HttpRequest {
        self.request(HttpMethod::Put, "/session/renew", Some(access_token))
    }

    /// Returns the new access token.
    pub fn parse_renew_session(&self, response: HttpResponse) -> ApiResult<String> {
        respond(&response, 200, |body: RenewSessionBody| body.access_token)
    }

    // --- table object files ---

    pub fn build_download_table_object_file(&self, access_token: &str, uuid: Uuid) -> HttpRequest {
        self.request(
            HttpMethod::Get,
            &format!("/apps/object/{uuid}?file=true"),
            Some(access_token),
        )
    }

    /// Returns the raw file bytes.
    pub fn parse_download_table_object_file(&self, response: HttpResponse) -> ApiResult<Vec<u8>> {
        check_status(&response, 200)?;
        Ok(ApiResponse {
            status: response.status,
            data: response.body,
        })
    }

    fn request(&self, method: HttpMethod, path: &str, access_token: Option<&str>) -> HttpRequest {
        let mut headers = Vec::new();
        if let Some(token) = access_token {
            headers.push(("authorization".to_string(), token.to_string()));
        }
        HttpRequest {
            method,
            path: format!("{}{path}", self.base_url),
            headers,
            body: None,
        }
    }

    fn json_request<T: Serialize>(
        &self,
        method: HttpMethod,
        path: &str,
        access_token: Option<&str>,
        input: &T,
    ) -> Result<HttpRequest, ApiError> {
        let body =
            serde_json::to_string(input).map_err(|e| ApiError::Serialization(e.to_string()))?;
        let mut req = self.request(method, path, access_token);
        req.headers
            .push(("content-type".to_string(), "application/json".to_string()));
        req.body = Some(body);
        Ok(req)
    }
}

/// Check the status, decode the body as `W` and map it to the local model.
fn respond<W, T>(response: &HttpResponse, expected: u16, map: impl FnOnce(W) -> T) -> ApiResult<T>
where
    W: DeserializeOwned,
{
    check_status(response, expected)?;
    let wire: W = serde_json::from_slice(&response.body)
        .map_err(|e| ErrorResponse::from(ApiError::Deserialization(e.to_string())))?;
    Ok(ApiResponse {
        status: response.status,
        data: map(wire),
    })
}

/// Map a non-matching status to `ErrorResponse`, keeping any structured
/// errors the server sent.
fn check_status(response: &HttpResponse, expected: u16) -> Result<(), ErrorResponse> {
    if response.status == expected {
        return Ok(());
    }
    let errors = serde_json::from_slice::<ErrorBody>(&response.body)
        .map(|body| body.errors)
        .unwrap_or_default();
    Err(ApiError::Api {
        status: response.status,
        errors,
    }
    .into())
}
