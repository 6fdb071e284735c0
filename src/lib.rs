pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod presentation;
pub mod shared;

use std::sync::Arc;

pub use application::ports::{AlwaysOnline, ConnectivityMonitor};
pub use application::services::{
    DeltaSyncReport, FlushOutcome, FullSyncReport, OfflineQueueService, SyncService, SyncStatus,
};
pub use domain::entities::{CachedChannel, CachedVideo, CategoryStat, PendingVote};
pub use infrastructure::api::ApiClient;
pub use infrastructure::database::{CacheStore, ConnectionPool};
pub use infrastructure::identity::IdentityService;
pub use presentation::Handlers;
pub use shared::{AppConfig, AppError, Result};

/// Fully wired sync core: one instance per process, background jobs started by
/// the host once it is ready.
pub struct SyncCore {
    pub store: Arc<CacheStore>,
    pub api: Arc<ApiClient>,
    pub identity: Arc<IdentityService>,
    pub queue: Arc<OfflineQueueService>,
    pub sync: Arc<SyncService>,
    pub handlers: Handlers,
}

impl SyncCore {
    pub async fn new(
        config: &AppConfig,
        connectivity: Arc<dyn ConnectivityMonitor>,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(AppError::ConfigurationError)?;

        let pool = ConnectionPool::new(&config.database.url, config.database.max_connections)
            .await?;
        pool.initialize_schema().await?;

        let store = Arc::new(CacheStore::new(&pool));
        let api = Arc::new(ApiClient::new(&config.api));
        let identity = Arc::new(IdentityService::new(Arc::clone(&store)));
        let queue = Arc::new(OfflineQueueService::new(
            Arc::clone(&store),
            Arc::clone(&api),
            Arc::clone(&identity),
            connectivity,
            config.queue.clone(),
        ));
        let sync = Arc::new(SyncService::new(
            Arc::clone(&store),
            Arc::clone(&api),
            config.sync.clone(),
        ));
        let handlers = Handlers::new(
            Arc::clone(&store),
            Arc::clone(&api),
            Arc::clone(&identity),
            Arc::clone(&queue),
            Arc::clone(&sync),
        );

        Ok(Self {
            store,
            api,
            identity,
            queue,
            sync,
            handlers,
        })
    }

    /// Start the background sync schedule and the offline queue listener.
    pub async fn start(&self) {
        self.sync.start_schedule();
        self.queue.start().await;
    }

    pub fn stop(&self) {
        self.sync.stop_schedule();
        self.queue.stop();
    }
}

pub fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "realtube_sync=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
