//! School Server - Main entry point

use std::net::SocketAddr;
use std::sync::Arc;

use school_core::{
    api::{self, AppState},
    config::Config,
    identity::LocalCredentials,
    rbac::catalog,
    service::SchoolService,
    store::PgStore,
    telemetry,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = match std::env::var("SCHOOL_CONFIG") {
        Ok(path) => Config::from_file(&path)?,
        Err(_) => Config::load()?,
    };

    telemetry::init("school-server", &config.observability)?;
    let metrics = telemetry::install_metrics()?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting School Server"
    );

    // Connect to database
    let store = PgStore::connect(&config.database).await?;
    store.migrate().await?;
    tracing::info!("Connected to database (migrations applied)");

    let report = catalog::seed_defaults(&store).await?;
    tracing::info!(
        permissions_created = report.permissions_created,
        roles_created = report.roles_created,
        "Default roles ready"
    );

    let credentials = LocalCredentials::new(&config.auth)?;
    let service = SchoolService::new(
        Arc::new(store),
        Arc::new(credentials),
        config.school.clone(),
    );

    let app_state = AppState::new(service).with_metrics(metrics);
    let app = api::build_router(app_state);

    // Start server
    let host: std::net::IpAddr = config.server.host.parse()?;
    let addr = SocketAddr::from((host, config.server.port));
    tracing::info!(address = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    telemetry::shutdown();
    tracing::info!("Server shutdown complete");

    Ok(())
}

/// Wait for shutdown signal.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
