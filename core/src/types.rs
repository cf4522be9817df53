//! Resource models and request parameters for the dav API.
//!
//! # Design
//! Models deserialize straight from the backend's snake_case JSON; fields the
//! backend omits on some endpoints (apps on a freshly signed-up user, tables
//! on an app list entry) fall back to their defaults. Parameter structs skip
//! unset optional fields so the request body only carries what the caller
//! asked to change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Successful controller result: the HTTP status plus the mapped model.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse<T> {
    pub status: u16,
    pub data: T,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct App {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub published: bool,
    #[serde(default)]
    pub web_link: Option<String>,
    #[serde(default)]
    pub google_play_link: Option<String>,
    #[serde(default)]
    pub microsoft_store_link: Option<String>,
    #[serde(default)]
    pub tables: Vec<Table>,
    #[serde(default)]
    pub apis: Vec<Api>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub id: i64,
    pub app_id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Api {
    pub id: i64,
    pub name: String,
}

/// A user of a specific app, as listed by `get_app_users`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppUser {
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Plan {
    #[default]
    Free,
    Plus,
    Pro,
}

impl TryFrom<u8> for Plan {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Plan::Free),
            1 => Ok(Plan::Plus),
            2 => Ok(Plan::Pro),
            other => Err(format!("unknown plan {other}")),
        }
    }
}

impl From<Plan> for u8 {
    fn from(plan: Plan) -> Self {
        match plan {
            Plan::Free => 0,
            Plan::Plus => 1,
            Plan::Pro => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum SubscriptionStatus {
    #[default]
    Active,
    Ending,
}

impl TryFrom<u8> for SubscriptionStatus {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(SubscriptionStatus::Active),
            1 => Ok(SubscriptionStatus::Ending),
            other => Err(format!("unknown subscription status {other}")),
        }
    }
}

impl From<SubscriptionStatus> for u8 {
    fn from(status: SubscriptionStatus) -> Self {
        match status {
            SubscriptionStatus::Active => 0,
            SubscriptionStatus::Ending => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub first_name: String,
    pub confirmed: bool,
    pub total_storage: u64,
    pub used_storage: u64,
    #[serde(default)]
    pub stripe_customer_id: Option<String>,
    #[serde(default)]
    pub plan: Plan,
    #[serde(default)]
    pub subscription_status: SubscriptionStatus,
    #[serde(default)]
    pub period_end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub dev: bool,
    #[serde(default)]
    pub provider: bool,
    #[serde(default)]
    pub apps: Vec<App>,
}

/// Credentials of the developer app calling auth endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Auth {
    pub token: String,
}

impl Auth {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

/// Fields to change on an app. Unset fields are left untouched on the server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateAppParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub google_play_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub microsoft_store_link: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateTableParams {
    pub app_id: i64,
    pub name: String,
}

/// Selects a table and, optionally, one page of its object listing.
#[derive(Debug, Clone, Default)]
pub struct GetTableParams {
    pub id: i64,
    pub count: Option<u32>,
    pub page: Option<u32>,
}

/// Uuid and etag of one object listed by `get_table`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableObjectRef {
    pub uuid: Uuid,
    pub etag: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetTableResponseData {
    pub table: Table,
    pub pages: u32,
    pub table_objects: Vec<TableObjectRef>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignupParams {
    pub email: String,
    pub first_name: String,
    pub password: String,
    pub app_id: i64,
    pub api_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_os: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignupResponseData {
    pub user: User,
    pub jwt: String,
    pub website_jwt: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_app_params_skip_unset_fields() {
        let params = UpdateAppParams {
            name: Some("Renamed".to_string()),
            web_link: Some("https://example.com".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["name"], "Renamed");
        assert_eq!(json["web_link"], "https://example.com");
        assert!(json.get("description").is_none());
        assert!(json.get("published").is_none());
    }

    #[test]
    fn plan_uses_numeric_wire_value() {
        let plan: Plan = serde_json::from_str("2").unwrap();
        assert_eq!(plan, Plan::Pro);
        assert_eq!(serde_json::to_string(&Plan::Plus).unwrap(), "1");
        assert!(serde_json::from_str::<Plan>("7").is_err());
    }

    #[test]
    fn signup_user_falls_back_to_defaults() {
        let user: User = serde_json::from_str(
            r#"{"id":5,"email":"a@b.c","first_name":"Ann","confirmed":false,
                "total_storage":100,"used_storage":0,"plan":0}"#,
        )
        .unwrap();
        assert_eq!(user.subscription_status, SubscriptionStatus::Active);
        assert!(user.apps.is_empty());
        assert!(user.period_end.is_none());
        assert!(!user.dev);
    }

    #[test]
    fn app_list_entry_ignores_unknown_fields() {
        let app: App = serde_json::from_str(
            r#"{"id":12,"dev_id":1,"name":"TestApp","description":"d","published":true,
                "web_link":null,"google_play_link":null,"microsoft_store_link":null}"#,
        )
        .unwrap();
        assert_eq!(app.id, 12);
        assert!(app.tables.is_empty());
    }
}
