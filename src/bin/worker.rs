use std::{sync::Arc, time::Duration};

use tokio::signal;
use tracing_subscriber::EnvFilter;

use kanzlei_backend::{
    auth::jwt::JwtService,
    config::AppConfig,
    db, default_handlers,
    jobs::PgJobQueue,
    state::AppState,
    store::PgClientStore,
    ticketing::{Ticketing, ZendeskClient},
    Worker,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "worker",
        database_url = %config.redacted_database_url(),
        pool_size = 1,
        zendesk_enabled = config.zendesk_configured(),
        "loaded backend configuration"
    );

    let pool = db::init_pool_with_size(&config.database_url, 1)?;
    let store = Arc::new(PgClientStore::new(pool.clone()));
    let queue = Arc::new(PgJobQueue::new(pool));
    let ticketing: Option<Arc<dyn Ticketing>> = if config.zendesk_configured() {
        Some(Arc::new(ZendeskClient::from_config(&config)?))
    } else {
        tracing::warn!("zendesk credentials missing; contact jobs will be skipped");
        None
    };
    let jwt = JwtService::from_config(&config)?;

    let state = Arc::new(AppState::new(config, store, queue, ticketing, jwt));
    let worker = Worker::new(state, default_handlers(), Duration::from_secs(2));

    tokio::select! {
        _ = worker.run() => {}
        _ = signal::ctrl_c() => {
            tracing::info!("worker received shutdown signal");
        }
    }

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
