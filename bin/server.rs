// Bond Chatbot - Web Server
// JSON API over the wizard state machine

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use bond_chatbot::{db, server, Config};

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Bond Chatbot - Web Server");

    let config = Config::load().context("Failed to load configuration")?;

    // Open database
    let conn = Connection::open(&config.db_path)
        .with_context(|| format!("Failed to open database {:?}", config.db_path))?;
    db::setup_database(&conn).context("Failed to initialize database")?;
    info!("Database opened: {:?}", config.db_path);

    let stored = db::get_all_records(&conn)?;
    let source = config.record_source(stored)?;
    info!("Lookups use {}", source.describe());

    let state = server::AppState::new(source, Some(conn))
        .with_session_ttl(Duration::from_secs(config.session_ttl_secs));
    let app = server::router(state);

    let address = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind to {}", address))?;
    info!("Server running on http://{}/api", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                warn!("Failed to install signal handler: {}", e);
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
}
