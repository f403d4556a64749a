//! API Server Entry Point
//!
//! Application entry point and server initialization.
//! Uses `anyhow` for startup errors, but application-level
//! errors should use `kernel::error::AppError`.

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use auth::domain::repository::Persistence;
use auth::{AuthAppState, AuthConfig, FileSessionStore, MemoryStore, MySqlStore, SessionController};
use axum::{
    http,
    http::{Method, header},
};
use clap::Parser;
use platform::config::{Configuration, DatabaseType};
use platform::mail::LogMailer;
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowHeaders, AllowMethods, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// Re-export unified error types for use in handlers
pub use kernel::error::{
    app_error::{AppError, AppResult},
    kind::ErrorKind,
};

/// Exit status for any startup failure
const STARTUP_FAILURE: u8 = 2;

#[derive(Parser, Debug)]
#[command(version, about = "EVE community authentication and authorization service")]
struct Cli {
    /// Database type (0 = None, 1 = MySQL)
    #[arg(long, default_value_t = 1)]
    dbtype: i64,

    #[arg(long, default_value = "")]
    dbhost: String,

    #[arg(long, default_value_t = 3306)]
    dbport: u16,

    #[arg(long, default_value = "")]
    dbschema: String,

    #[arg(long, default_value = "")]
    dbuser: String,

    #[arg(long, default_value = "")]
    dbpassword: String,

    /// Debug level 0-9, lower numbers display more messages
    #[arg(long, default_value_t = 3)]
    debug: u8,

    /// HTTP listen host
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// HTTP listen port
    #[arg(long, default_value_t = 5000)]
    port: u16,

    /// JSON configuration file; replaces every flag above when given
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for session records
    #[arg(long, default_value = "sessions")]
    sessions: PathBuf,
}

impl Cli {
    fn into_configuration(self) -> AppResult<Configuration> {
        if let Some(path) = &self.config {
            return Configuration::from_json_file(path);
        }

        Ok(Configuration {
            database_type: self.dbtype,
            database_host: self.dbhost,
            database_port: self.dbport,
            database_schema: self.dbschema,
            database_user: self.dbuser,
            database_password: self.dbpassword,
            debug_level: self.debug,
            http_host: self.host,
            http_port: self.port,
            session_directory: self.sessions,
        })
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file
    dotenvy::dotenv().ok();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            eprintln!("eveauth: {:#}", e);
            ExitCode::from(STARTUP_FAILURE)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = cli.into_configuration()?;

    // Initialize tracing
    let default_filter = format!(
        "eveauth={level},auth={level},platform={level},tower_http={level}",
        level = config.log_level()
    );
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let shutdown = CancellationToken::new();

    match config.database_type()? {
        DatabaseType::None => {
            tracing::warn!("No database configured, data is kept in memory only");
            serve(MemoryStore::new(), &config, shutdown).await
        }
        DatabaseType::MySql => {
            let options = MySqlConnectOptions::new()
                .host(&config.database_host)
                .port(config.database_port)
                .username(&config.database_user)
                .password(&config.database_password)
                .database(&config.database_schema);

            let pool = MySqlPoolOptions::new()
                .max_connections(5)
                .connect_with(options)
                .await?;

            tracing::info!(host = %config.database_host, "Connected to database");

            // Run migrations
            sqlx::migrate!("../../../database/migrations")
                .run(&pool)
                .await?;

            tracing::info!("Migrations completed");

            serve(MySqlStore::new(pool), &config, shutdown).await
        }
    }
}

async fn serve<R>(repo: R, config: &Configuration, shutdown: CancellationToken) -> anyhow::Result<()>
where
    R: Persistence,
{
    let mut auth_config = if cfg!(debug_assertions) {
        AuthConfig::development()
    } else {
        AuthConfig::default()
    };
    auth_config = auth_config.with_session_dir(config.session_directory.clone());
    let auth_config = Arc::new(auth_config);

    let session_store = FileSessionStore::open(auth_config.session_dir.clone()).await?;
    let sessions = Arc::new(SessionController::new(
        Arc::new(session_store),
        auth_config.clone(),
    ));

    // Startup cleanup: remove expired sessions
    // Errors here should not prevent server startup
    match sessions.clean_sessions().await {
        Ok(removed) => {
            tracing::info!(sessions_deleted = removed, "Session cleanup completed");
        }
        Err(e) => {
            tracing::warn!(error = %e, "Session cleanup failed, continuing anyway");
        }
    }
    let cleaner = sessions.clone().spawn_cleaner(shutdown.clone());

    // CORS configuration
    let frontend_origins = env::var("FRONTEND_ORIGINS")
        .unwrap_or_else(|_| "http://localhost:40922,http://127.0.0.1:40922".to_string());

    let allowed_origins: Vec<http::HeaderValue> = frontend_origins
        .split(',')
        .filter_map(|origin| origin.trim().parse().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods(AllowMethods::list([
            Method::GET,
            Method::POST,
            Method::OPTIONS,
        ]))
        .allow_headers(AllowHeaders::list([
            header::CONTENT_TYPE,
            header::ACCEPT,
        ]))
        .allow_credentials(true);

    let state = AuthAppState::new(
        repo,
        sessions,
        auth_config,
        Arc::new(LogMailer),
        shutdown.clone(),
    );

    // Build router
    let app = auth::auth_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start server
    let addr = config.bind_address()?;
    tracing::info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
    .await?;

    // Stops the cleaner even when serve returned for another reason
    shutdown.cancel();
    cleaner.await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Resolve on Ctrl-C or SIGTERM and cancel every request scope
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
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
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
        _ = shutdown.cancelled() => {},
    }

    tracing::info!("Shutdown signal received");
    shutdown.cancel();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_build_configuration() {
        let cli = Cli::parse_from([
            "eveauth", "--dbtype", "0", "--debug", "1", "--port", "8080", "--host", "127.0.0.1",
        ]);
        let config = cli.into_configuration().unwrap();
        assert_eq!(config.database_type().unwrap(), DatabaseType::None);
        assert_eq!(config.log_level(), "debug");
        assert_eq!(config.bind_address().unwrap().to_string(), "127.0.0.1:8080");
    }

    #[test]
    fn test_missing_config_file_fails() {
        let cli = Cli::parse_from(["eveauth", "--config", "/nonexistent/config.json"]);
        let err = cli.into_configuration().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }
}
