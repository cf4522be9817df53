//! Executing requests through a host transport.
//!
//! # Design
//! The core never performs I/O itself. A `Transport` turns an `HttpRequest`
//! into an `HttpResponse`; `call` and `call_with_session` glue a builder, the
//! transport and a parser together. Calls that use the session token get one
//! transparent retry when the backend reports that the access token must be
//! renewed.

use tracing::{debug, info};

use crate::client::{ApiResult, DavClient};
use crate::error::{ApiError, ErrorResponse};
use crate::http::{HttpRequest, HttpResponse};
use crate::session::Session;

/// Executes HTTP round-trips on behalf of the core.
///
/// Any HTTP status, including 4xx/5xx, is a successful execution; only the
/// absence of a response is an error (`ApiError::Transport`).
pub trait Transport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError>;
}

/// Run one request and parse its response.
pub fn call<T>(
    transport: &dyn Transport,
    request: HttpRequest,
    parse: impl FnOnce(HttpResponse) -> ApiResult<T>,
) -> ApiResult<T> {
    let response = transport.execute(&request)?;
    parse(response)
}

/// Run a request authorized with the session's access token.
///
/// If the first attempt fails because the token must be renewed, the session
/// is renewed and the request is rebuilt with the new token and retried once.
pub fn call_with_session<T, B, P>(
    transport: &dyn Transport,
    session: &Session,
    build: B,
    parse: P,
) -> ApiResult<T>
where
    B: Fn(&DavClient, &str) -> Result<HttpRequest, ApiError>,
    P: Fn(&DavClient, HttpResponse) -> ApiResult<T>,
{
    let client = session.client();
    let mut renewed = false;
    loop {
        let token = session.access_token().ok_or(ApiError::NotLoggedIn)?;
        let request = build(client, &token)?;
        debug!(method = request.method.as_str(), path = %request.path, "calling api");
        let response = transport.execute(&request)?;
        match parse(client, response) {
            Err(err) if !renewed && err.is_access_token_expired() => {
                renew_session(transport, session)?;
                renewed = true;
            }
            result => return result,
        }
    }
}

/// Exchange the session's access token for a fresh one.
pub fn renew_session(transport: &dyn Transport, session: &Session) -> Result<(), ErrorResponse> {
    let client = session.client();
    let token = session.access_token().ok_or(ApiError::NotLoggedIn)?;
    let response = transport.execute(&client.build_renew_session(&token))?;
    let renewed = client.parse_renew_session(response)?;
    session.set_access_token(Some(renewed.data));
    info!("access token renewed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;
    use crate::error::ACCESS_TOKEN_MUST_BE_RENEWED;
    use crate::session::{Environment, SessionConfig};

    /// Replays canned responses and records every request.
    struct Scripted {
        responses: Mutex<Vec<HttpResponse>>,
        seen: Mutex<Vec<HttpRequest>>,
    }

    impl Scripted {
        fn new(mut responses: Vec<HttpResponse>) -> Self {
            responses.reverse();
            Self {
                responses: Mutex::new(responses),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl Transport for Scripted {
        fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError> {
            self.seen.lock().push(request.clone());
            self.responses
                .lock()
                .pop()
                .ok_or_else(|| ApiError::Transport("no scripted response".to_string()))
        }
    }

    fn json(status: u16, body: serde_json::Value) -> HttpResponse {
        HttpResponse {
            status,
            headers: Vec::new(),
            body: body.to_string().into_bytes(),
        }
    }

    fn expired() -> HttpResponse {
        json(
            403,
            serde_json::json!({"errors": [{
                "code": ACCESS_TOKEN_MUST_BE_RENEWED,
                "message": "Access token must be renewed"
            }]}),
        )
    }

    fn user_body() -> serde_json::Value {
        serde_json::json!({
            "id": 1, "email": "dav@example.com", "first_name": "Dav", "confirmed": true,
            "total_storage": 100, "used_storage": 10, "plan": 1, "subscription_status": 0
        })
    }

    fn session(token: Option<&str>) -> Session {
        Session::new(SessionConfig {
            base_url: "http://localhost:3111/v1".to_string(),
            environment: Environment::Test,
            skip_sync_push_in_tests: false,
            access_token: token.map(str::to_string),
        })
    }

    fn get_user(transport: &dyn Transport, session: &Session) -> ApiResult<crate::types::User> {
        call_with_session(
            transport,
            session,
            |client, token| Ok(client.build_get_user(token)),
            |client, response| client.parse_get_user(response),
        )
    }

    #[test]
    fn expired_token_is_renewed_and_retried_once() {
        let transport = Scripted::new(vec![
            expired(),
            json(200, serde_json::json!({"access_token": "fresh"})),
            json(200, user_body()),
        ]);
        let session = session(Some("stale"));

        let user = get_user(&transport, &session).unwrap().data;
        assert_eq!(user.first_name, "Dav");
        assert_eq!(session.access_token().as_deref(), Some("fresh"));

        let seen = transport.seen.lock();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0].header("authorization"), Some("stale"));
        assert!(seen[1].path.ends_with("/session/renew"));
        assert_eq!(seen[2].header("authorization"), Some("fresh"));
    }

    #[test]
    fn second_expiry_is_surfaced() {
        let transport = Scripted::new(vec![
            expired(),
            json(200, serde_json::json!({"access_token": "fresh"})),
            expired(),
        ]);
        let err = get_user(&transport, &session(Some("stale"))).unwrap_err();
        assert_eq!(err.status, 403);
        assert!(err.is_access_token_expired());
        assert_eq!(transport.seen.lock().len(), 3);
    }

    #[test]
    fn failed_renewal_is_surfaced() {
        let transport = Scripted::new(vec![
            expired(),
            json(404, serde_json::json!({"errors": [{"code": 2814, "message": "Session does not exist"}]})),
        ]);
        let err = get_user(&transport, &session(Some("stale"))).unwrap_err();
        assert_eq!(err.status, 404);
        assert_eq!(err.first_code(), Some(2814));
    }

    #[test]
    fn other_errors_are_not_retried() {
        let transport = Scripted::new(vec![json(
            403,
            serde_json::json!({"errors": [{"code": 1103, "message": "Action not allowed"}]}),
        )]);
        let err = get_user(&transport, &session(Some("jwt"))).unwrap_err();
        assert_eq!(err.first_code(), Some(1103));
        assert_eq!(transport.seen.lock().len(), 1);
    }

    #[test]
    fn missing_session_fails_without_io() {
        let transport = Scripted::new(Vec::new());
        let err = get_user(&transport, &session(None)).unwrap_err();
        assert_eq!(err.status, -1);
        assert!(transport.seen.lock().is_empty());
    }

    #[test]
    fn transport_failure_becomes_error_response() {
        let transport = Scripted::new(Vec::new());
        let client = DavClient::new("http://localhost:3111/v1");
        let err = call(&transport, client.build_get_apps(), |r| client.parse_get_apps(r))
            .unwrap_err();
        assert_eq!(err.status, -1);
        assert!(err.errors.is_empty());
    }
}
