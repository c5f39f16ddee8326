//! Google provider against a local token endpoint.

mod common;

use axum::{routing::post, Json, Router};
use chrono::Utc;
use family_auth_service::services::{AuthError, GoogleProvider, IdentityProvider};
use jsonwebtoken::{encode, EncodingKey, Header};
use std::net::SocketAddr;

fn id_token(audience: &str, email_verified: bool) -> String {
    let claims = serde_json::json!({
        "iss": "https://accounts.google.com",
        "aud": audience,
        "sub": "google-subject-1",
        "email": "ada@example.com",
        "email_verified": email_verified,
        "name": "Ada Lovelace",
        "picture": "https://lh3.example/ada.png",
        "iat": Utc::now().timestamp(),
        "exp": Utc::now().timestamp() + 3600,
    });
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(b"not-checked"),
    )
    .unwrap()
}

async fn serve(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

fn provider(token_endpoint: String, timeout_seconds: u64) -> GoogleProvider {
    let mut config = common::test_config().google;
    config.token_endpoint = token_endpoint;
    config.timeout_seconds = timeout_seconds;
    GoogleProvider::new(&config).unwrap()
}

#[test]
fn authorization_url_carries_scope_prompt_and_state() {
    let google = provider("http://127.0.0.1:9/token".to_string(), 10);

    let url = google.authorization_url("north:abc-DEF_123");

    assert!(url.starts_with("https://accounts.test/o/oauth2/v2/auth?"));
    assert!(url.contains("client_id=test-client-id"));
    assert!(url.contains("response_type=code"));
    assert!(url.contains("scope=openid%20email%20profile"));
    assert!(url.contains("prompt=select_account"));
    assert!(url.contains("state=north%3Aabc-DEF_123"));
    assert!(url.contains(
        "redirect_uri=https%3A%2F%2Fauth.family.example%2Foauth%2Fcallback"
    ));
}

#[tokio::test]
async fn exchange_reads_identity_from_id_token() {
    let token = id_token("test-client-id", true);
    let router = Router::new().route(
        "/token",
        post(move || {
            let token = token.clone();
            async move { Json(serde_json::json!({ "access_token": "at", "id_token": token })) }
        }),
    );
    let addr = serve(router).await;
    let google = provider(format!("http://{}/token", addr), 10);

    let identity = google.exchange_code("auth-code").await.unwrap();

    assert_eq!(identity.subject, "google-subject-1");
    assert_eq!(identity.email, "ada@example.com");
    assert!(identity.email_verified);
    assert_eq!(identity.name.as_deref(), Some("Ada Lovelace"));
}

#[tokio::test]
async fn exchange_rejects_token_for_other_client() {
    let token = id_token("someone-else", true);
    let router = Router::new().route(
        "/token",
        post(move || {
            let token = token.clone();
            async move { Json(serde_json::json!({ "id_token": token })) }
        }),
    );
    let addr = serve(router).await;
    let google = provider(format!("http://{}/token", addr), 10);

    assert!(matches!(
        google.exchange_code("auth-code").await,
        Err(AuthError::ProviderExchangeFailed(_))
    ));
}

#[tokio::test]
async fn exchange_error_status_is_provider_failure() {
    let router = Router::new().route(
        "/token",
        post(|| async { (axum::http::StatusCode::BAD_REQUEST, "invalid_grant") }),
    );
    let addr = serve(router).await;
    let google = provider(format!("http://{}/token", addr), 10);

    assert!(matches!(
        google.exchange_code("auth-code").await,
        Err(AuthError::ProviderExchangeFailed(_))
    ));
}

#[tokio::test]
async fn slow_token_endpoint_times_out() {
    let router = Router::new().route(
        "/token",
        post(|| async {
            tokio::time::sleep(std::time::Duration::from_secs(3)).await;
            Json(serde_json::json!({}))
        }),
    );
    let addr = serve(router).await;
    let google = provider(format!("http://{}/token", addr), 1);

    assert!(matches!(
        google.exchange_code("auth-code").await,
        Err(AuthError::ProviderExchangeFailed(_))
    ));
}
