//! Test helpers for family-auth-service integration tests.
//!
//! Builds the full router over the in-memory store, a scripted Google provider and
//! a recording mailer, and drives it with `tower::ServiceExt::oneshot`.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, Response, StatusCode},
    Router,
};
use family_auth_service::{
    build_router,
    config::{
        AuthConfig, Environment, FamilyConfig, GoogleOAuthConfig, RateLimitConfig, SecurityConfig,
        SessionConfig, SmtpConfig, StoreBackend, StoreConfig, SwaggerConfig, SwaggerMode,
        SweeperConfig, VerificationConfig,
    },
    models::ProviderIdentity,
    services::{AuthError, IdentityProvider, InMemoryStore, MockEmailService},
    AppState,
};
use http_body_util::BodyExt;
use secrecy::SecretString;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

pub const TEST_ADMIN_API_KEY: &str = "test-admin-key-12345";
pub const TEST_SESSION_SECRET: &str = "test-session-secret-0123456789abcdef";
pub const SITE_BASE: &str = "https://family.example";

/// Google stand-in: authorization codes are registered up front.
#[derive(Default)]
pub struct ScriptedGoogle {
    identities: Mutex<HashMap<String, ProviderIdentity>>,
}

impl ScriptedGoogle {
    pub fn register(&self, code: &str, identity: ProviderIdentity) {
        self.identities
            .lock()
            .unwrap()
            .insert(code.to_string(), identity);
    }
}

#[async_trait]
impl IdentityProvider for ScriptedGoogle {
    fn authorization_url(&self, state: &str) -> String {
        format!(
            "https://accounts.test/o/oauth2/v2/auth?scope=openid%20email%20profile&state={}",
            urlencoding::encode(state)
        )
    }

    async fn exchange_code(&self, code: &str) -> Result<ProviderIdentity, AuthError> {
        self.identities
            .lock()
            .unwrap()
            .get(code)
            .cloned()
            .ok_or_else(|| AuthError::ProviderExchangeFailed("unknown code".to_string()))
    }
}

pub fn identity(subject: &str, email: &str, name: &str) -> ProviderIdentity {
    ProviderIdentity {
        subject: subject.to_string(),
        email: email.to_string(),
        email_verified: true,
        name: Some(name.to_string()),
        picture: None,
    }
}

pub fn test_config() -> AuthConfig {
    AuthConfig {
        common: service_core::config::Config::default(),
        environment: Environment::Dev,
        service_name: "family-auth-service-test".to_string(),
        service_version: "test".to_string(),
        log_level: "error".to_string(),
        otlp_endpoint: None,
        store: StoreConfig {
            backend: StoreBackend::Memory,
            database: None,
        },
        families: FamilyConfig {
            names: vec![
                "bull".to_string(),
                "north".to_string(),
                "klingenberg".to_string(),
                "herrman".to_string(),
            ],
            site_base_url: SITE_BASE.to_string(),
        },
        session: SessionConfig {
            secret: SecretString::new(TEST_SESSION_SECRET.to_string()),
            cookie_domain: Some(".family.example".to_string()),
            ttl_hours: 24,
            pending_ttl_minutes: 30,
            issuer: "family-genealogy-platform".to_string(),
        },
        google: GoogleOAuthConfig {
            client_id: "test-client-id".to_string(),
            client_secret: SecretString::new("test-client-secret".to_string()),
            redirect_uri: "https://auth.family.example/oauth/callback".to_string(),
            auth_endpoint: "https://accounts.test/o/oauth2/v2/auth".to_string(),
            token_endpoint: "https://oauth2.test/token".to_string(),
            timeout_seconds: 10,
            state_ttl_minutes: 10,
        },
        smtp: SmtpConfig {
            host: "smtp.example.com".to_string(),
            port: 587,
            username: "mailer".to_string(),
            password: SecretString::new("mailer-password".to_string()),
            from_email: "archives@family.example".to_string(),
            from_name: "Family Archives".to_string(),
            timeout_seconds: 10,
        },
        verification: VerificationConfig {
            code_ttl_minutes: 30,
            max_attempts: 5,
        },
        security: SecurityConfig {
            allowed_origins: vec![SITE_BASE.to_string()],
            admin_api_key: SecretString::new(TEST_ADMIN_API_KEY.to_string()),
            admin_session_minutes: 60,
        },
        swagger: SwaggerConfig {
            enabled: SwaggerMode::Disabled,
        },
        rate_limit: RateLimitConfig {
            oauth_start_attempts: 1000,
            oauth_start_window_seconds: 60,
            verify_attempts: 1000,
            verify_window_seconds: 60,
            admin_attempts: 1000,
            admin_window_seconds: 60,
            global_ip_limit: 10_000,
            global_ip_window_seconds: 60,
        },
        sweeper: SweeperConfig {
            enabled: false,
            interval_seconds: 300,
            token_retention_minutes: 60,
        },
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<InMemoryStore>,
    pub mail: MockEmailService,
    pub google: Arc<ScriptedGoogle>,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(test_config()).await
    }

    pub async fn spawn_with(config: AuthConfig) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let mail = MockEmailService::new();
        let google = Arc::new(ScriptedGoogle::default());

        let state = AppState::new(config, store.clone(), google.clone(), Arc::new(mail.clone()))
            .expect("Failed to build app state");
        let router = build_router(state.clone())
            .await
            .expect("Failed to build router");

        Self {
            router,
            state,
            store,
            mail,
            google,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("Router failed")
    }

    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> Response<Body> {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    pub async fn post_json(
        &self,
        uri: &str,
        cookie: Option<&str>,
        body: serde_json::Value,
    ) -> Response<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::from(body.to_string())).unwrap())
            .await
    }

    /// `/oauth/start` for `family`, returning the decoded `state`.
    pub async fn start(&self, family: &str) -> String {
        let response = self.get(&format!("/oauth/start?family={}", family), None).await;
        assert_eq!(response.status(), StatusCode::FOUND);
        state_from_location(location(&response))
    }

    pub async fn callback(&self, code: &str, state: &str) -> Response<Body> {
        self.get(
            &format!(
                "/oauth/callback?code={}&state={}",
                urlencoding::encode(code),
                urlencoding::encode(state)
            ),
            None,
        )
        .await
    }

    /// Sign in through Google for `family`; returns the `family_pending` cookie pair.
    pub async fn sign_in(&self, family: &str, code: &str) -> String {
        let state = self.start(family).await;
        let response = self.callback(code, &state).await;
        assert_eq!(response.status(), StatusCode::FOUND);
        cookie_pair(&response, "family_pending").expect("pending cookie not set")
    }

    pub async fn verify(&self, pending_cookie: &str, family: &str, code: &str) -> Response<Body> {
        self.post_json(
            "/verify",
            Some(pending_cookie),
            serde_json::json!({ "family": family, "code": code }),
        )
        .await
    }

    /// Complete sign-in and verification for `family`; returns the session cookie pair.
    pub async fn join_family(&self, family: &str, code: &str, email: &str) -> String {
        let pending = self.sign_in(family, code).await;
        let emailed = self.mail.last_code_for(email).expect("no code emailed");
        let response = self.verify(&pending, family, &emailed).await;
        assert_eq!(response.status(), StatusCode::OK);
        cookie_pair(&response, "family_session").expect("session cookie not set")
    }
}

pub fn location(response: &Response<Body>) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .expect("missing Location")
        .to_str()
        .unwrap()
}

pub fn state_from_location(location: &str) -> String {
    let encoded = location
        .split(['?', '&'])
        .find_map(|part| part.strip_prefix("state="))
        .expect("state parameter missing");
    urlencoding::decode(encoded).unwrap().into_owned()
}

/// `name=value` of the first non-empty `Set-Cookie` for `name`.
pub fn cookie_pair(response: &Response<Body>, name: &str) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .find(|pair| {
            pair.strip_prefix(name)
                .and_then(|rest| rest.strip_prefix('='))
                .is_some_and(|value| !value.is_empty())
        })
        .map(str::to_string)
}

/// All `Set-Cookie` header values.
pub fn set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(str::to_string)
        .collect()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}
