use family_auth_service::{
    build_router,
    config::{AuthConfig, StoreBackend},
    db,
    services::{
        spawn_sweeper, AccessStore, EmailService, GoogleProvider, InMemoryStore, PostgresStore,
    },
    AppState,
};
use service_core::error::AppError;
use service_core::observability::logging::init_tracing;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Load configuration - fail fast if invalid
    let config = AuthConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    );

    family_auth_service::services::metrics::init_metrics()?;

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        families = ?config.families.names,
        "Starting family auth service"
    );

    let store: Arc<dyn AccessStore> = match (config.store.backend, &config.store.database) {
        (StoreBackend::Postgres, Some(database)) => {
            let pool = db::create_pool(database)
                .await
                .map_err(|e| AppError::DatabaseError(e.into()))?;
            let store = PostgresStore::new(pool);
            store
                .migrate()
                .await
                .map_err(|e| AppError::DatabaseError(e.into()))?;
            Arc::new(store)
        }
        (StoreBackend::Postgres, None) => {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "DATABASE_URL is required for the postgres store"
            )));
        }
        (StoreBackend::Memory, _) => {
            tracing::warn!("Using in-memory store; records are lost on restart");
            Arc::new(InMemoryStore::new())
        }
    };

    let email = Arc::new(EmailService::new(&config.smtp).map_err(AppError::ConfigError)?);
    let google = Arc::new(GoogleProvider::new(&config.google).map_err(AppError::ConfigError)?);

    let sweeper = config.sweeper.enabled.then(|| {
        tracing::info!(
            interval_secs = config.sweeper.interval_seconds,
            "Starting expired-record sweeper"
        );
        spawn_sweeper(
            store.clone(),
            std::time::Duration::from_secs(config.sweeper.interval_seconds.max(1)),
            chrono::Duration::minutes(config.sweeper.token_retention_minutes),
        )
    });

    let state = AppState::new(config.clone(), store, google, email)?;
    let app = build_router(state).await?;

    let addr = config.common.bind_address()?;

    let service_span = tracing::info_span!(
        "service",
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
    );
    let _guard = service_span.enter();

    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    service_core::axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    if let Some(handle) = sweeper {
        handle.abort();
    }

    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
