use std::net::SocketAddr;

use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use runhost::config::Config;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let config = Config::from_env().map_err(|e| format!("Failed to load configuration: {e}"))?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(&config.log_level)
        }))
        .init();

    tracing::info!("Starting runhost");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    tracing::info!("Migrations applied");

    tokio::fs::create_dir_all(&config.projects_dir).await?;

    let addr = SocketAddr::new(config.host, config.port);
    let (app, state) = runhost::build_app(pool, config);

    let backend = state.supervisor.backend();
    if backend.enforces_limits() {
        tracing::info!("Sandbox backend: {}", backend.name());
    } else {
        tracing::warn!(
            "Sandbox backend '{}' does not enforce isolation or resource limits",
            backend.name()
        );
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = runhost::sweeper::spawn(state.clone(), shutdown_rx);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on {addr}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    let _ = shutdown_tx.send(true);
    if let Some(handle) = sweeper {
        let _ = handle.await;
    }

    // Children are left running. Only the in-memory registry goes away.
    let tracked = state.supervisor.tracked_count();
    if tracked > 0 {
        tracing::info!("Leaving {tracked} project process(es) running");
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
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
                tracing::error!("Failed to install SIGTERM handler: {e}");
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

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
