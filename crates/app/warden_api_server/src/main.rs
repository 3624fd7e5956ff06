//! Warden API server binary.
//!
//! Loads `.env`, applies the embedded schema, wires the optional cache and
//! serves the auth API until Ctrl-C.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use warden_api::config::ApiConfig;
use warden_core::auth::notifier::LogNotifier;
use warden_core::auth::service::SessionService;
use warden_core::cache::CacheLayer;
use warden_core::cache::memory::MemoryAuthCache;
use warden_core::cache::redis::RedisAuthCache;
use warden_core::config::{AuthConfig, CacheBackend, CacheConfig};
use warden_core::store::postgres::PgAuthStore;

/// CLI arguments for the API server.
#[derive(Parser, Debug)]
#[command(name = "warden_api_server", about = "Warden session and token service")]
struct Args {
    /// Address to listen on. Overrides `BIND_ADDR`.
    #[arg(long)]
    bind: Option<String>,

    /// PostgreSQL connection URL. Overrides `DATABASE_URL`.
    #[arg(long)]
    database_url: Option<String>,

    /// Maximum number of database connections in the pool.
    #[arg(long, env = "DB_MAX_CONNECTIONS", default_value_t = 10)]
    max_connections: u32,

    /// Owner account created at startup when missing (ignored in production).
    #[arg(long, env = "BOOTSTRAP_OWNER_EMAIL")]
    bootstrap_owner_email: Option<String>,

    #[arg(long, env = "BOOTSTRAP_OWNER_PASSWORD", hide_env_values = true)]
    bootstrap_owner_password: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| {
                    tracing_subscriber::EnvFilter::try_new(
                        "info,warden_api=debug,warden_core=debug",
                    )
                })?,
        )
        .init();

    let args = Args::parse();

    let mut api_config = ApiConfig::from_env()?;
    if let Some(bind) = args.bind {
        api_config.bind_addr = bind;
    }
    if let Some(url) = args.database_url {
        api_config.pg_connection_url = url;
    }
    let auth_config = Arc::new(AuthConfig::from_env()?);
    let cache_config = CacheConfig::from_env()?;

    info!(
        bind = %api_config.bind_addr,
        production = api_config.production,
        max_connections = args.max_connections,
        "starting warden_api_server"
    );

    let pool = PgPoolOptions::new()
        .max_connections(args.max_connections)
        .acquire_timeout(std::time::Duration::from_secs(30))
        .connect(&api_config.pg_connection_url)
        .await?;

    let store = PgAuthStore::new(pool);
    info!("running database migrations");
    store.migrate().await?;

    let cache = build_cache(&cache_config).await;
    let sessions = SessionService::new(
        auth_config,
        Arc::new(store),
        cache,
        Arc::new(LogNotifier),
    );

    match (&args.bootstrap_owner_email, &args.bootstrap_owner_password) {
        (Some(_), Some(_)) if api_config.production => {
            warn!("bootstrap owner ignored in production");
        }
        (Some(email), Some(password)) => {
            if sessions.bootstrap_owner(email, password).await?.is_none() {
                info!(%email, "bootstrap owner already exists");
            }
        }
        _ => {}
    }

    let listener = tokio::net::TcpListener::bind(&api_config.bind_addr).await?;
    let local_addr = listener.local_addr()?;
    let app = warden_api::router(warden_api::AppState::new(sessions, api_config));

    info!(addr = %local_addr, "REST API listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received");
    })
    .await?;

    Ok(())
}

/// Build the cache layer. A Redis connection failure disables caching
/// rather than aborting startup.
async fn build_cache(config: &CacheConfig) -> CacheLayer {
    if !config.enabled {
        info!("auth cache disabled");
        return CacheLayer::disabled();
    }
    match config.backend {
        CacheBackend::Memory => {
            info!("using in-process auth cache");
            CacheLayer::new(Arc::new(MemoryAuthCache::new()), config.ttl)
        }
        CacheBackend::Redis => match RedisAuthCache::connect(&config.redis_url()).await {
            Ok(cache) => {
                info!(address = %config.address, db = config.db, "using redis auth cache");
                CacheLayer::new(Arc::new(cache), config.ttl)
            }
            Err(e) => {
                warn!(error = %e, "redis unavailable, continuing without cache");
                CacheLayer::disabled()
            }
        },
    }
}
