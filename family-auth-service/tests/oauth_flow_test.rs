//! OAuth start and callback integration tests.

mod common;

use axum::http::StatusCode;
use chrono::{Duration, Utc};
use common::{body_json, cookie_pair, identity, location, state_from_location, TestApp};

#[tokio::test]
async fn start_redirects_with_family_bound_state() {
    let app = TestApp::spawn().await;

    let response = app.get("/oauth/start?family=north", None).await;

    assert_eq!(response.status(), StatusCode::FOUND);
    let location = location(&response);
    assert!(location.starts_with("https://accounts.test/o/oauth2/v2/auth"));

    let state = state_from_location(location);
    let (family, csrf) = state.split_once(':').unwrap();
    assert_eq!(family, "north");
    // 32 random bytes, base64url without padding
    assert_eq!(csrf.len(), 43);
}

#[tokio::test]
async fn start_rejects_unknown_family() {
    let app = TestApp::spawn().await;

    let response = app.get("/oauth/start?family=smith", None).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["code"], "invalid_family");
    assert_eq!(body["retryable"], false);
}

#[tokio::test]
async fn callback_signs_in_and_emails_a_code() {
    let app = TestApp::spawn().await;
    app.google
        .register("code-ada", identity("g-ada", "ada@example.com", "Ada"));

    let state = app.start("north").await;
    let response = app.callback("code-ada", &state).await;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "https://family.example/north/verify");
    assert!(cookie_pair(&response, "family_pending").is_some());
    assert!(cookie_pair(&response, "family_session").is_none());

    let sent = app.mail.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "ada@example.com");
    assert!(sent[0].subject().starts_with("[North Family Archives]"));
    assert_eq!(sent[0].verify_link, "https://family.example/north/verify");
}

#[tokio::test]
async fn callback_never_grants_access() {
    let app = TestApp::spawn().await;
    app.google
        .register("code-ada", identity("g-ada", "ada@example.com", "Ada"));

    let state = app.start("north").await;
    app.callback("code-ada", &state).await;

    let north = app.state.directory.resolve("north").unwrap();
    let members = app.state.admin.audit(&north).await.unwrap();
    assert!(members.is_empty());
}

#[tokio::test]
async fn never_issued_state_is_csrf_mismatch() {
    let app = TestApp::spawn().await;
    app.google
        .register("code-ada", identity("g-ada", "ada@example.com", "Ada"));

    let response = app
        .callback("code-ada", "north:AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA")
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(cookie_pair(&response, "family_pending").is_none());
    let body = body_json(response).await;
    assert_eq!(body["code"], "csrf_mismatch");
    assert!(app.mail.sent().is_empty());
}

#[tokio::test]
async fn stale_state_is_csrf_mismatch() {
    let app = TestApp::spawn().await;
    app.google
        .register("code-ada", identity("g-ada", "ada@example.com", "Ada"));

    let issued = app
        .state
        .oauth
        .start_authorization_at("north", Utc::now() - Duration::minutes(11))
        .await
        .unwrap();

    let response = app.callback("code-ada", &issued.state.encode()).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "csrf_mismatch");
}

#[tokio::test]
async fn replayed_state_is_csrf_mismatch() {
    let app = TestApp::spawn().await;
    app.google
        .register("code-ada", identity("g-ada", "ada@example.com", "Ada"));

    let state = app.start("north").await;
    assert_eq!(app.callback("code-ada", &state).await.status(), StatusCode::FOUND);

    let replay = app.callback("code-ada", &state).await;
    assert_eq!(replay.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(replay).await["code"], "csrf_mismatch");
}

#[tokio::test]
async fn malformed_states_are_rejected() {
    let app = TestApp::spawn().await;

    for state in ["no-separator", ":csrf-only", "north:", "smith:abc"] {
        let response = app.callback("code", state).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{state}");
        assert_eq!(body_json(response).await["code"], "malformed_state", "{state}");
    }
}

#[tokio::test]
async fn provider_failure_is_bad_gateway() {
    let app = TestApp::spawn().await;

    let state = app.start("north").await;
    let response = app.callback("unregistered-code", &state).await;

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = body_json(response).await;
    assert_eq!(body["code"], "provider_exchange_failed");
    assert_eq!(body["retryable"], true);
}

#[tokio::test]
async fn unverified_google_email_is_forbidden() {
    let app = TestApp::spawn().await;
    let mut unverified = identity("g-eve", "eve@example.com", "Eve");
    unverified.email_verified = false;
    app.google.register("code-eve", unverified);

    let state = app.start("north").await;
    let response = app.callback("code-eve", &state).await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["code"], "provider_email_unverified");
}

#[tokio::test]
async fn provider_error_parameter_is_rejected() {
    let app = TestApp::spawn().await;

    let response = app
        .get("/oauth/callback?error=access_denied&state=north:abc", None)
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "invalid_request");
}

#[tokio::test]
async fn mail_failure_keeps_pending_cookie_for_resend() {
    let app = TestApp::spawn().await;
    app.google
        .register("code-ada", identity("g-ada", "ada@example.com", "Ada"));
    app.mail.set_failing(true);

    let state = app.start("north").await;
    let response = app.callback("code-ada", &state).await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let pending = cookie_pair(&response, "family_pending").unwrap();

    app.mail.set_failing(false);
    let resend = app
        .post_json(
            "/verify/resend",
            Some(&pending),
            serde_json::json!({ "family": "north" }),
        )
        .await;
    assert_eq!(resend.status(), StatusCode::ACCEPTED);
    assert!(app.mail.last_code_for("ada@example.com").is_some());
}
