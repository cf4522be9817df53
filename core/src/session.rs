//! Session context shared by controllers and table objects.
//!
//! # Design
//! A `Session` is built once from a `SessionConfig` and shared behind an
//! `Arc`. The access token is the only mutable part; it changes on login,
//! logout and session renewal, so it sits behind a `RwLock`.

use parking_lot::RwLock;
use serde::Deserialize;

use crate::client::DavClient;
use crate::sync::PushMode;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Test,
    Production,
}

/// Host-provided settings, typically loaded from JSON.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub base_url: String,
    #[serde(default)]
    pub environment: Environment,
    /// Only meaningful with `Environment::Test`.
    #[serde(default)]
    pub skip_sync_push_in_tests: bool,
    #[serde(default)]
    pub access_token: Option<String>,
}

#[derive(Debug)]
pub struct Session {
    client: DavClient,
    environment: Environment,
    push_mode: PushMode,
    access_token: RwLock<Option<String>>,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        let push_mode = match (config.environment, config.skip_sync_push_in_tests) {
            (Environment::Test, true) => PushMode::Suppress,
            (Environment::Test, false) => PushMode::Await,
            _ => PushMode::Schedule,
        };
        Self {
            client: DavClient::new(&config.base_url),
            environment: config.environment,
            push_mode,
            access_token: RwLock::new(config.access_token),
        }
    }

    /// Override the push mode derived from the environment.
    pub fn with_push_mode(mut self, push_mode: PushMode) -> Self {
        self.push_mode = push_mode;
        self
    }

    pub fn client(&self) -> &DavClient {
        &self.client
    }

    pub fn base_url(&self) -> &str {
        self.client.base_url()
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn push_mode(&self) -> PushMode {
        self.push_mode
    }

    pub fn access_token(&self) -> Option<String> {
        self.access_token.read().clone()
    }

    pub fn set_access_token(&self, token: Option<String>) {
        *self.access_token.write() = token;
    }

    pub fn is_authenticated(&self) -> bool {
        self.access_token.read().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(environment: Environment, skip: bool) -> SessionConfig {
        SessionConfig {
            base_url: "http://localhost:3111/v1/".to_string(),
            environment,
            skip_sync_push_in_tests: skip,
            access_token: None,
        }
    }

    #[test]
    fn push_mode_follows_environment() {
        assert_eq!(Session::new(config(Environment::Test, false)).push_mode(), PushMode::Await);
        assert_eq!(Session::new(config(Environment::Test, true)).push_mode(), PushMode::Suppress);
        assert_eq!(
            Session::new(config(Environment::Production, true)).push_mode(),
            PushMode::Schedule
        );
    }

    #[test]
    fn token_can_be_replaced() {
        let session = Session::new(config(Environment::Development, false));
        assert!(!session.is_authenticated());
        session.set_access_token(Some("jwt".to_string()));
        assert_eq!(session.access_token().as_deref(), Some("jwt"));
        session.set_access_token(None);
        assert!(!session.is_authenticated());
    }

    #[test]
    fn config_loads_from_json() {
        let config: SessionConfig = serde_json::from_str(
            r#"{"base_url":"https://api.example.com","environment":"production"}"#,
        )
        .unwrap();
        assert_eq!(config.environment, Environment::Production);
        assert!(!config.skip_sync_push_in_tests);
        let session = Session::new(config);
        assert_eq!(session.base_url(), "https://api.example.com");
    }
}
