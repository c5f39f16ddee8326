pub mod config;
pub mod db;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use service_core::axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use service_core::middleware::{
    metrics::metrics_middleware,
    rate_limit::{create_ip_rate_limiter, ip_rate_limit_middleware, IpRateLimiter},
    security_headers::security_headers_middleware,
    tracing::request_id_middleware,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{ApiKey, ApiKeyValue, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::config::AuthConfig;
use crate::services::{
    AccessStore, AdminService, EmailProvider, FamilyDirectory, IdentityProvider,
    OAuthCoordinator, SessionService, VerificationService,
};
use chrono::Duration;
use service_core::error::AppError;
use std::sync::Arc;

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        handlers::oauth::oauth_start,
        handlers::oauth::oauth_callback,
        handlers::verify::resend_code,
        handlers::verify::verify_code,
        handlers::session::me,
        handlers::session::logout,
        handlers::families::list_families,
        handlers::families::record_consent,
        handlers::admin::open_admin_session,
        handlers::admin::revoke_admin_session,
        handlers::admin::export_family_emails,
        handlers::admin::list_family_members,
    ),
    components(
        schemas(
            services::ErrorBody,
            dtos::auth::ResendRequest,
            dtos::auth::ChallengeResponse,
            dtos::auth::VerifyRequest,
            dtos::auth::MeResponse,
            dtos::auth::FamiliesResponse,
            dtos::auth::ConsentRequest,
            dtos::auth::ConsentResponse,
            dtos::admin::AdminSessionRequest,
            dtos::admin::AdminSessionResponse,
            dtos::admin::FamilyMembersResponse,
            models::FamilyId,
            models::FamilyProfile,
            models::FamilyMember,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "OAuth", description = "Google sign-in bound to a family"),
        (name = "Verification", description = "Email verification codes"),
        (name = "Session", description = "Multi-family session cookie"),
        (name = "Families", description = "Family directory and consent"),
        (name = "Admin", description = "Administrative operations"),
        (name = "Observability", description = "Service health and monitoring"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    utoipa::openapi::security::HttpBuilder::new()
                        .scheme(utoipa::openapi::security::HttpAuthScheme::Bearer)
                        .build(),
                ),
            );
            components.add_security_scheme(
                "session_cookie",
                SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::new(
                    services::SESSION_COOKIE,
                ))),
            );
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AuthConfig>,
    pub directory: Arc<FamilyDirectory>,
    pub store: Arc<dyn AccessStore>,
    pub sessions: SessionService,
    pub oauth: OAuthCoordinator,
    pub verification: VerificationService,
    pub admin: AdminService,
    pub oauth_start_rate_limiter: IpRateLimiter,
    pub verify_rate_limiter: IpRateLimiter,
    pub admin_rate_limiter: IpRateLimiter,
    pub ip_rate_limiter: IpRateLimiter,
}

impl AppState {
    /// Wire services around a store and the two outbound providers.
    pub fn new(
        config: AuthConfig,
        store: Arc<dyn AccessStore>,
        identity_provider: Arc<dyn IdentityProvider>,
        email: Arc<dyn EmailProvider>,
    ) -> Result<Self, AppError> {
        let directory = Arc::new(
            FamilyDirectory::new(&config.families.names, &config.families.site_base_url)
                .map_err(AppError::ConfigError)?,
        );

        let sessions = SessionService::new(&config.session);
        let oauth = OAuthCoordinator::new(
            store.clone(),
            identity_provider,
            directory.clone(),
            Duration::minutes(config.google.state_ttl_minutes),
        );
        let verification = VerificationService::new(
            store.clone(),
            email,
            directory.clone(),
            Duration::minutes(config.verification.code_ttl_minutes),
            config.verification.max_attempts,
        );
        let admin = AdminService::new(
            store.clone(),
            config.security.admin_api_key.clone(),
            Duration::minutes(config.security.admin_session_minutes),
        );

        let limits = &config.rate_limit;
        let oauth_start_rate_limiter =
            create_ip_rate_limiter(limits.oauth_start_attempts, limits.oauth_start_window_seconds);
        let verify_rate_limiter =
            create_ip_rate_limiter(limits.verify_attempts, limits.verify_window_seconds);
        let admin_rate_limiter =
            create_ip_rate_limiter(limits.admin_attempts, limits.admin_window_seconds);
        let ip_rate_limiter =
            create_ip_rate_limiter(limits.global_ip_limit, limits.global_ip_window_seconds);

        Ok(Self {
            config: Arc::new(config),
            directory,
            store,
            sessions,
            oauth,
            verification,
            admin,
            oauth_start_rate_limiter,
            verify_rate_limiter,
            admin_rate_limiter,
            ip_rate_limiter,
        })
    }
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let allow_origin = if allowed_origins.iter().any(|o| o == "*") {
        AllowOrigin::mirror_request()
    } else {
        AllowOrigin::list(allowed_origins.iter().filter_map(|o| {
            o.parse::<HeaderValue>()
                .map_err(|e| tracing::error!("Invalid CORS origin '{}': {}. Skipping.", o, e))
                .ok()
        }))
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static("x-admin-api-key"),
            HeaderName::from_static("x-request-id"),
        ])
}

pub async fn build_router(state: AppState) -> Result<Router, AppError> {
    // Admin routes behind an admin session
    let admin_routes = Router::new()
        .route(
            "/admin/sessions",
            service_core::axum::routing::delete(handlers::admin::revoke_admin_session),
        )
        .route(
            "/admin/families/:family/emails.csv",
            get(handlers::admin::export_family_emails),
        )
        .route(
            "/admin/families/:family/members",
            get(handlers::admin::list_family_members),
        )
        .layer(from_fn_with_state(
            state.clone(),
            middleware::admin_session_middleware,
        ));

    let admin_login_route = Router::new()
        .route("/admin/sessions", post(handlers::admin::open_admin_session))
        .layer(from_fn_with_state(
            state.admin_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let oauth_start_route = Router::new()
        .route("/oauth/start", get(handlers::oauth::oauth_start))
        .layer(from_fn_with_state(
            state.oauth_start_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let verify_routes = Router::new()
        .route("/verify", post(handlers::verify::verify_code))
        .route("/verify/resend", post(handlers::verify::resend_code))
        .layer(from_fn_with_state(
            state.verify_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let ip_limiter = state.ip_rate_limiter.clone();

    let mut app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(handlers::metrics::metrics));

    // Only add Swagger UI if enabled in config
    let swagger_enabled = match state.config.environment {
        crate::config::Environment::Dev => true,
        crate::config::Environment::Prod => match state.config.swagger.enabled {
            crate::config::SwaggerMode::Public => true,
            crate::config::SwaggerMode::Disabled => false,
        },
    };

    if swagger_enabled {
        app =
            app.merge(SwaggerUi::new("/docs").url("/.well-known/openapi.json", ApiDoc::openapi()));
    } else {
        // Without Swagger UI the OpenAPI JSON stays available for programmatic access
        app = app.route(
            "/.well-known/openapi.json",
            get(|| async { service_core::axum::Json(ApiDoc::openapi()) }),
        );
    }

    let cors = cors_layer(&state.config.security.allowed_origins);

    let app = app
        .route("/oauth/callback", get(handlers::oauth::oauth_callback))
        .route("/me", get(handlers::session::me))
        .route("/logout", post(handlers::session::logout))
        .route("/families", get(handlers::families::list_families))
        .route("/consent/:family", post(handlers::families::record_consent))
        .merge(oauth_start_route)
        .merge(verify_routes)
        .merge(admin_login_route)
        .merge(admin_routes)
        // Route templates are only known after matching
        .route_layer(from_fn(metrics_middleware))
        .with_state(state)
        // Global IP rate limiting
        .layer(from_fn_with_state(ip_limiter, ip_rate_limit_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &service_core::axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                // Path only: the callback query carries the OAuth code and state.
                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    path = %request.uri().path(),
                    version = ?request.version(),
                )
            },
        ))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(cors);

    Ok(app)
}

/// Service health check
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
        (status = 503, description = "Service is unhealthy")
    ),
    tag = "Observability"
)]
pub async fn health_check(
    service_core::axum::extract::State(state): service_core::axum::extract::State<AppState>,
) -> Result<service_core::axum::Json<serde_json::Value>, AppError> {
    state.store.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Store health check failed");
        AppError::DatabaseError(anyhow::Error::new(e))
    })?;

    Ok(service_core::axum::Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "environment": format!("{:?}", state.config.environment),
        "checks": {
            "store": format!("{:?}", state.config.store.backend),
            "families": state.directory.families().len(),
        }
    })))
}
