//! `/me` and `/logout` integration tests.

mod common;

use axum::http::StatusCode;
use chrono::{Duration, Utc};
use common::{body_json, identity, set_cookies, TestApp};

async fn session_cookie(app: &TestApp) -> String {
    app.google
        .register("code-ada", identity("g-ada", "ada@example.com", "Ada"));
    app.join_family("north", "code-ada", "ada@example.com").await
}

#[tokio::test]
async fn me_returns_user_and_families() {
    let app = TestApp::spawn().await;
    let cookie = session_cookie(&app).await;

    let response = app.get("/me", Some(&cookie)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["email"], "ada@example.com");
    assert_eq!(body["name"], "Ada");
    assert_eq!(body["families"], serde_json::json!(["north"]));
    assert!(body["id"].as_str().is_some());
}

#[tokio::test]
async fn me_without_cookie_is_unauthorized() {
    let app = TestApp::spawn().await;

    let response = app.get("/me", None).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["code"], "unauthenticated");
    assert_eq!(body["error"], "Not authenticated");
}

#[tokio::test]
async fn me_with_tampered_cookie_is_unauthorized() {
    let app = TestApp::spawn().await;
    let cookie = session_cookie(&app).await;

    let (header_and_claims, signature) = cookie.rsplit_once('.').unwrap();
    let flipped = if signature.starts_with('A') { "B" } else { "A" };
    let tampered = format!("{}.{}{}", header_and_claims, flipped, &signature[1..]);

    let response = app.get("/me", Some(&tampered)).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "Not authenticated");
}

#[tokio::test]
async fn me_rejects_session_one_second_past_expiry() {
    let app = TestApp::spawn().await;
    app.google
        .register("code-ada", identity("g-ada", "ada@example.com", "Ada"));
    app.join_family("north", "code-ada", "ada@example.com").await;

    let north = app.state.directory.resolve("north").unwrap();
    let member = app.state.admin.audit(&north).await.unwrap().remove(0);
    let user = app
        .state
        .store
        .find_user(member.user_id)
        .await
        .unwrap()
        .unwrap();

    let issued_at = Utc::now() - Duration::hours(24) - Duration::seconds(1);
    let stale = app
        .state
        .sessions
        .issue_at(&user, &[north], issued_at)
        .unwrap();

    let response = app
        .get("/me", Some(&format!("family_session={}", stale.token)))
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn pending_cookie_is_not_a_session() {
    let app = TestApp::spawn().await;
    app.google
        .register("code-ada", identity("g-ada", "ada@example.com", "Ada"));
    let pending = app.sign_in("north", "code-ada").await;
    let token = pending.trim_start_matches("family_pending=");

    let response = app
        .get("/me", Some(&format!("family_session={}", token)))
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_clears_cookies_even_without_session() {
    let app = TestApp::spawn().await;

    let response = app.post_json("/logout", None, serde_json::json!({})).await;

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let cookies = set_cookies(&response);
    assert!(cookies
        .iter()
        .any(|c| c.starts_with("family_session=;") && c.contains("Max-Age=0")));
    assert!(cookies
        .iter()
        .any(|c| c.starts_with("family_pending=;") && c.contains("Max-Age=0")));
}
