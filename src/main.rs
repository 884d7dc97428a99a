use assessment_backend::{
    config::{get_config, init_config, LogFormat},
    database::{
        memory::MemorySessionStore,
        pool::{create_pool, run_migrations},
        postgres::PgSessionStore,
        store::SessionStore,
    },
    router, AppState,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_config()?;
    let config = get_config()?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }

    let store: Arc<dyn SessionStore> = match config.database_url {
        Some(_) => {
            let pool = create_pool(config).await?;
            run_migrations(&pool).await?;
            info!("Using PostgreSQL session store");
            Arc::new(PgSessionStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, drafts and attempts are kept in memory only");
            Arc::new(MemorySessionStore::new())
        }
    };

    let settings = config.engine_settings();
    info!(
        autosave_interval_secs = settings.autosave_interval.as_secs(),
        "Session engine configured"
    );

    let app = router(AppState::new(store, settings, &config.jwt_secret));

    let addr: SocketAddr = config.server_address.parse()?;
    info!("Server listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
