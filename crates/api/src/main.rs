use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vigil_api::config::ServerConfig;
use vigil_api::routes;
use vigil_api::state::AppState;
use vigil_cdc::{CdcConfig, CdcListener};
use vigil_events::{EventProcessor, PgEventStore};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = ServerConfig::from_env();
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = vigil_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    vigil_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database ready, migrations applied");

    // The watched database may differ from the service's own; publication and
    // slot setup run against the watched one.
    let cdc_config = CdcConfig::from_env();
    tracing::info!(?cdc_config, "Loaded CDC configuration");
    let cdc_pool = if cdc_config.database_url == database_url {
        pool.clone()
    } else {
        vigil_db::create_pool(&cdc_config.database_url)
            .await
            .expect("Failed to connect to watched database")
    };

    let store = Arc::new(PgEventStore::new(pool.clone()));
    let processor = Arc::new(EventProcessor::new(store));
    let cdc = Arc::new(CdcListener::new(cdc_config, cdc_pool, processor));
    cdc.start().await.expect("Failed to start CDC listener");

    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        cdc: Arc::clone(&cdc),
    };

    let addr = SocketAddr::new(
        config.host.parse().expect("HOST must be a valid IP address"),
        config.port,
    );
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind server address");
    tracing::info!(%addr, "Serving HTTP");

    axum::serve(listener, routes::app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // The dispatch loop finishes the event in flight before it observes the
    // stop, so the final delivery is recorded and acknowledged.
    cdc.stop().await;
    tracing::info!("Shutdown complete");
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "vigil_api=debug,vigil_cdc=debug,vigil_events=debug,vigil_db=debug,tower_http=debug"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Resolves on SIGINT or, on Unix, SIGTERM, so the server drains cleanly
/// whether stopped interactively or by a process manager.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received SIGINT, shutting down"),
        () = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
