use super::*;
use axum::extract::FromRequestParts;
use axum::http::{HeaderValue, Request};

use crate::state::test_helpers::{test_app_state, test_config};

fn headers(pairs: &[(header::HeaderName, &str)]) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in pairs {
        map.append(name.clone(), HeaderValue::from_str(value).unwrap());
    }
    map
}

// =============================================================================
// request_token
// =============================================================================

#[test]
fn bearer_header_wins_over_cookie() {
    let map = headers(&[
        (header::AUTHORIZATION, "Bearer abc123"),
        (header::COOKIE, "session_token=from-cookie"),
    ]);
    assert_eq!(request_token(&map).as_deref(), Some("abc123"));
}

#[test]
fn cookie_is_used_without_bearer() {
    let map = headers(&[(header::COOKIE, "theme=dark; session_token=tok")]);
    assert_eq!(request_token(&map).as_deref(), Some("tok"));
}

#[test]
fn blank_or_foreign_credentials_are_ignored() {
    assert_eq!(request_token(&headers(&[(header::AUTHORIZATION, "Bearer   ")])), None);
    assert_eq!(request_token(&headers(&[(header::AUTHORIZATION, "Basic dXNlcg==")])), None);
    assert_eq!(request_token(&headers(&[(header::COOKIE, "session_token=")])), None);
    assert_eq!(request_token(&HeaderMap::new()), None);
}

#[test]
fn auth_errors_map_to_statuses() {
    assert_eq!(auth_error_to_status(&AuthError::Unauthorized), StatusCode::UNAUTHORIZED);
    assert_eq!(auth_error_to_status(&AuthError::DevLoginDisabled), StatusCode::NOT_FOUND);
    assert_eq!(auth_error_to_status(&AuthError::InvalidEmail), StatusCode::BAD_REQUEST);
    assert_eq!(AuthError::DevLoginDisabled.error_code(), "E_DEV_LOGIN_DISABLED");
}

// =============================================================================
// extractor / handlers without a database
// =============================================================================

#[tokio::test]
async fn extractor_rejects_requests_without_credentials() {
    let state = test_app_state();
    let (mut parts, ()) = Request::builder().uri("/api/auth/me").body(()).unwrap().into_parts();
    let Err(rejection) = AuthUser::from_request_parts(&mut parts, &state).await else {
        panic!("expected rejection");
    };
    assert_eq!(rejection.status, StatusCode::UNAUTHORIZED);
    assert_eq!(rejection.body.code, "E_UNAUTHORIZED");
}

#[tokio::test]
async fn dev_login_is_hidden_when_disabled() {
    let mut state = test_app_state();
    state.config = std::sync::Arc::new(crate::config::ServerConfig { dev_login_enabled: false, ..test_config() });
    let body = DevLoginBody { email: "ada@example.com".into(), name: None };
    let Err(err) = dev_login(State(state), Json(body)).await else {
        panic!("expected dev login to be rejected");
    };
    assert_eq!(err.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn dev_login_rejects_malformed_email() {
    let state = test_app_state();
    let body = DevLoginBody { email: "nobody".into(), name: Some("N".into()) };
    let Err(err) = dev_login(State(state), Json(body)).await else {
        panic!("expected invalid email");
    };
    assert_eq!(err.status, StatusCode::BAD_REQUEST);
    assert_eq!(err.body.code, "E_INVALID_EMAIL");
}
