use std::sync::Arc;

use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use kanzlei_backend::{
    auth::jwt::JwtService,
    config::AppConfig,
    db,
    jobs::PgJobQueue,
    routes,
    state::AppState,
    store::PgClientStore,
    ticketing::{Ticketing, ZendeskClient},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "server",
        database_url = %config.redacted_database_url(),
        pool_size = config.database_max_pool_size,
        zendesk_enabled = config.zendesk_configured(),
        "loaded backend configuration"
    );

    let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
    db::run_migrations(&pool)?;

    let store = Arc::new(PgClientStore::new(pool.clone()));
    let queue = Arc::new(PgJobQueue::new(pool));
    let ticketing: Option<Arc<dyn Ticketing>> = if config.zendesk_configured() {
        Some(Arc::new(ZendeskClient::from_config(&config)?))
    } else {
        tracing::warn!("zendesk credentials missing; creditor contact is disabled");
        None
    };
    let jwt = JwtService::from_config(&config)?;

    let addr = format!("{}:{}", config.server_host, config.server_port);
    let state = AppState::new(config, store, queue, ticketing, jwt);
    let router = routes::create_router(state);

    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, router).await?;

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
