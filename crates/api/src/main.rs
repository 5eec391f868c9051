use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use editlock_core::clock::SystemClock;
use editlock_core::coordinator::LockCoordinator;
use editlock_core::memory::{InMemoryLockStore, InMemoryVersionStore};
use editlock_core::store::{LockStore, VersionStore};
use editlock_db::{DbPool, PgLockStore, PgVersionStore};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use editlock_api::background;
use editlock_api::config::ServerConfig;
use editlock_api::router::build_app_router;
use editlock_api::state::AppState;

const DEFAULT_LOG_FILTER: &str = "editlock_api=debug,editlock_core=debug,editlock_db=info,tower_http=debug";

type Stores = (Arc<dyn LockStore>, Arc<dyn VersionStore>, Option<DbPool>);

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = ServerConfig::from_env().expect("Invalid server configuration");
    tracing::info!(
        addr = %format!("{}:{}", config.host, config.port),
        lease_secs = config.lock.lease_duration.as_secs(),
        warning_lead_secs = config.lock.warning_lead_time.as_secs(),
        "Loaded server configuration"
    );

    let (locks, versions, pool) = open_stores().await;
    let coordinator = Arc::new(LockCoordinator::new(
        locks,
        versions,
        Arc::new(SystemClock),
        config.lock,
    ));

    let shutdown = CancellationToken::new();
    let sweeper = tokio::spawn(background::lock_sweeper::run(
        Arc::clone(&coordinator),
        Duration::from_secs(config.lock_sweep_interval_secs),
        shutdown.child_token(),
    ));

    let state = AppState {
        coordinator,
        pool,
        config: Arc::new(config.clone()),
    };
    let app = build_app_router(state, &config).expect("Failed to build router");

    let addr = SocketAddr::new(
        config.host.parse().expect("HOST must be an IP address"),
        config.port,
    );
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");
    tracing::info!(%addr, "Edit-lock server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    shutdown.cancel();
    if tokio::time::timeout(Duration::from_secs(5), sweeper).await.is_err() {
        tracing::warn!("Lock sweeper did not stop in time");
    }
    tracing::info!("Shutdown complete");
}

/// `RUST_LOG` filters; `LOG_FORMAT=json` switches to one JSON object per line.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// PostgreSQL when `DATABASE_URL` is set, otherwise process memory.
async fn open_stores() -> Stores {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        tracing::warn!("DATABASE_URL not set, locks live in memory and are lost on restart");
        return (
            Arc::new(InMemoryLockStore::new()),
            Arc::new(InMemoryVersionStore::new()),
            None,
        );
    };

    let pool = editlock_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    editlock_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    editlock_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database ready, migrations applied");

    (
        Arc::new(PgLockStore::new(pool.clone())),
        Arc::new(PgVersionStore::new(pool.clone())),
        Some(pool),
    )
}

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
        () = ctrl_c => tracing::info!("SIGINT received, shutting down"),
        () = terminate => tracing::info!("SIGTERM received, shutting down"),
    }
}
