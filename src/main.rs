//! AuthGate - JWT authentication service
//! Password login, access/refresh tokens and role-based user management

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use authgate_backend::{
    api::create_router,
    auth::{AuthState, BcryptHasher, PasswordVerifier, TokenAuthority, UserStore},
    config::Settings,
    middleware::RateLimitLayer,
};

#[derive(Parser, Debug)]
#[command(name = "authgate")]
#[command(about = "JWT authentication service with role-based access control")]
struct Cli {
    /// Listen address (overrides BIND_ADDR)
    #[arg(long)]
    bind: Option<String>,

    /// SQLite database path (overrides DATABASE_PATH)
    #[arg(long)]
    database: Option<String>,

    /// Extra env file loaded before `.env` and the process environment
    #[arg(long)]
    env_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(path) = &cli.env_file {
        dotenv::from_path(path)
            .with_context(|| format!("Failed to load env file {}", path.display()))?;
    }

    init_tracing();

    let mut settings = Settings::from_env().context("Invalid configuration")?;
    if let Some(bind) = cli.bind {
        settings.bind_addr = bind;
    }
    if let Some(database) = cli.database {
        settings.database_path = database;
    }

    info!(
        "🚀 Starting {} v{}",
        settings.project_name,
        env!("CARGO_PKG_VERSION")
    );

    let users = Arc::new(
        UserStore::new(&settings.database_path)
            .with_context(|| format!("Failed to open user database {}", settings.database_path))?,
    );
    info!("🔐 User store initialized at: {}", settings.database_path);

    let passwords: Arc<dyn PasswordVerifier> = Arc::new(BcryptHasher::new(settings.bcrypt_cost));

    if let Some(superuser) = &settings.first_superuser {
        users.ensure_superuser(superuser, passwords.as_ref())?;
    }

    let authority = Arc::new(
        TokenAuthority::new(&settings.token, users.clone(), passwords)
            .context("Failed to initialize token authority")?,
    );
    info!(
        "🔑 Token authority ready ({:?}, access {}m, refresh {}d)",
        settings.token.algorithm, settings.token.access_ttl_minutes, settings.token.refresh_ttl_days
    );

    let limiter = RateLimitLayer::new(settings.auth_rate_limit.clone());
    spawn_rate_limit_cleanup(limiter.clone());

    let app = create_router(AuthState::new(authority, users), &settings, limiter);

    let listener = TcpListener::bind(&settings.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", settings.bind_addr))?;
    info!("🎯 API server listening on {}", settings.bind_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    info!("👋 Server stopped");
    Ok(())
}

fn spawn_rate_limit_cleanup(limiter: RateLimitLayer) {
    let period = limiter.config().window.max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            limiter.cleanup();
        }
    });
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "authgate_backend=debug,authgate=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
