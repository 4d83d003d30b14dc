//! Warden Server
//!
//! Serves the credential endpoints over PostgreSQL (users, reset tokens)
//! and Redis (bearer tokens, login throttle, sessions).
//!
//! # Usage
//!
//! ```bash
//! DATABASE_URL=postgres://... REDIS_URL=redis://... warden-server --port 8080
//!
//! # Token lifetimes and throttle windows come from the environment
//! WARDEN_ACCESS_TOKEN_TTL=15m WARDEN_THROTTLE_MAX_FAILURES=5 warden-server
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use warden_api::{create_router, ApiConfig, AppState};
use warden_auth::{AuthConfig, AuthService, LogNotifier};
use warden_db::{Database, DatabaseConfig};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Warden Server - bearer tokens, sessions and password reset
#[derive(Parser, Debug)]
#[command(name = "warden-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Host to bind to
    #[arg(long, env = "WARDEN_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(short, long, env = "WARDEN_PORT", default_value_t = 8080)]
    port: u16,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "WARDEN_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Log format (json, pretty)
    #[arg(long, env = "WARDEN_LOG_FORMAT", default_value = "pretty")]
    log_format: String,

    /// Allowed CORS origins, comma separated
    #[arg(long, env = "WARDEN_CORS_ORIGINS", value_delimiter = ',', default_value = "*")]
    cors_origins: Vec<String>,

    /// Skip running migrations on startup
    #[arg(long, env = "WARDEN_SKIP_MIGRATIONS")]
    skip_migrations: bool,

    /// Seconds to wait for in-flight requests on shutdown
    #[arg(long, env = "WARDEN_SHUTDOWN_TIMEOUT", default_value_t = 5)]
    shutdown_timeout: u64,
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    init_logging(&args.log_level, &args.log_format);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting Warden Server");

    let auth_config = load_auth_config()?;
    let db = init_database(args.skip_migrations).await?;

    let auth = AuthService::from_database(&db, Arc::new(LogNotifier), auth_config);
    tracing::info!("Authentication service initialized");

    let state = Arc::new(AppState::with_database(Arc::new(auth), db));

    let api_config = ApiConfig {
        enable_cors: !args.cors_origins.is_empty(),
        cors_origins: args.cors_origins.clone(),
        enable_tracing: true,
    };

    let app = create_router(state, api_config);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;

    tracing::info!(host = %args.host, port = args.port, "Server listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Peer address feeds the throttle key when no proxy header is present
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal(Duration::from_secs(args.shutdown_timeout)))
        .await?;

    tracing::info!("Server shutdown complete");

    Ok(())
}

// =============================================================================
// Initialization Functions
// =============================================================================

/// Initialize tracing/logging
fn init_logging(level: &str, format: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(env_filter);

    match format {
        "json" => {
            subscriber.with(fmt::layer().json().with_target(true)).init();
        }
        _ => {
            subscriber.with(fmt::layer().pretty().with_target(true)).init();
        }
    }
}

/// Credential settings from the environment, rejected at startup when invalid
fn load_auth_config() -> anyhow::Result<AuthConfig> {
    let config = AuthConfig::from_env()?;

    if let Err(problems) = config.validate() {
        for problem in &problems {
            tracing::error!(problem = %problem, "Invalid auth configuration");
        }
        anyhow::bail!("Invalid auth configuration: {}", problems.join("; "));
    }

    if !config.session.secure {
        tracing::warn!("Session cookies are not marked Secure");
    }

    tracing::info!(
        access_ttl_secs = config.bearer.access_token_ttl.as_secs(),
        refresh_ttl_secs = config.bearer.refresh_token_ttl.as_secs(),
        throttle_enabled = config.throttle.enabled,
        max_failures = config.throttle.max_failures,
        "Auth configuration loaded"
    );

    Ok(config)
}

/// Connect to PostgreSQL and Redis, then migrate
async fn init_database(skip_migrations: bool) -> anyhow::Result<Arc<Database>> {
    tracing::info!("Connecting to database...");

    let config = DatabaseConfig::from_env()?;
    let db = Database::connect(&config).await?;

    let health = db.health_check().await;
    if !health.healthy {
        anyhow::bail!(
            "Database health check failed (postgres={}, kv_writer={}, kv_reader={})",
            health.postgres,
            health.kv_writer,
            health.kv_reader
        );
    }

    if !skip_migrations {
        db.migrate().await?;
    }

    tracing::info!("Database connected successfully");

    Ok(Arc::new(db))
}

// =============================================================================
// Graceful Shutdown
// =============================================================================

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal(timeout: Duration) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
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
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }

    tracing::info!(
        timeout_secs = timeout.as_secs(),
        "Waiting for in-flight requests to complete..."
    );

    tokio::time::sleep(timeout).await;
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let args = Args::parse_from(["warden-server", "--port", "9090", "--cors-origins", "https://a.example,https://b.example"]);
        assert_eq!(args.port, 9090);
        assert_eq!(args.cors_origins, vec!["https://a.example", "https://b.example"]);
    }

    #[test]
    fn test_cli_defaults() {
        let args = Args::parse_from(["warden-server"]);
        assert_eq!(args.host, "0.0.0.0");
        assert_eq!(args.log_format, "pretty");
        assert!(!args.skip_migrations);
    }
}
