use keygate_auth::{
    build_router,
    config::AuthConfig,
    services::{AuthService, JwtService, Mailer, MfaService, SessionService, VerificationService},
    store::{DynStore, PgStore},
    AppState, RateLimiters,
};
use keygate_core::error::AppError;
use keygate_core::observability::init_tracing;
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();

    // Load configuration - fail fast if invalid.
    let config = Arc::new(AuthConfig::from_env()?);

    init_tracing(&config.service_name, &config.log_level, config.is_prod());

    tracing::info!(
        service = %config.service_name,
        environment = ?config.environment,
        "Starting authentication service"
    );

    // Database pool + migrations.
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
    sqlx::migrate!()
        .run(&pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
    let store: DynStore = Arc::new(PgStore::new(pool));
    tracing::info!("Database initialized");

    // Collaborators and domain services.
    let mailer: Arc<dyn Mailer> = Arc::new(keygate_auth::services::SmtpMailer::new(&config.smtp)?);
    let jwt = JwtService::new(&config.jwt);
    let sessions = SessionService::new(store.clone(), &config);
    let verification = VerificationService::new(store.clone(), &config);
    let mfa = MfaService::new(
        store.clone(),
        sessions.clone(),
        jwt.clone(),
        config.mfa.issuer.clone(),
    );
    let auth = AuthService::new(
        store.clone(),
        mailer,
        jwt.clone(),
        sessions,
        verification,
        config.clone(),
    );

    let limiters = RateLimiters::from_config(&config.rate_limit);

    let state = AppState {
        config: config.clone(),
        store,
        jwt,
        auth,
        mfa,
    };
    let app = build_router(state, &limiters);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(%addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
