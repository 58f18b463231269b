use std::sync::Arc;

use crate::{
    auth::jwt::JwtService, config::AppConfig, jobs::JobQueue, store::ClientStore,
    ticketing::Ticketing,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn ClientStore>,
    pub queue: Arc<dyn JobQueue>,
    /// None when Zendesk credentials are not configured; contact jobs then
    /// skip with a warning instead of failing.
    pub ticketing: Option<Arc<dyn Ticketing>>,
    pub jwt: JwtService,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        store: Arc<dyn ClientStore>,
        queue: Arc<dyn JobQueue>,
        ticketing: Option<Arc<dyn Ticketing>>,
        jwt: JwtService,
    ) -> Self {
        Self {
            config: Arc::new(config),
            store,
            queue,
            ticketing,
            jwt,
        }
    }
}
