//! Application context - dependency injection container

use std::path::PathBuf;
use std::sync::Arc;

use sellerscan_common::{SharedClock, SystemClock};
use sellerscan_core::{ItemFetcher, ResultSink, ScanOrchestrator};
use sellerscan_domain::{AppConfig, Result, StorageConfig};
use sellerscan_infra::config;
use sellerscan_infra::{
    DbManager, InMemoryResultSink, ItemOperation, JsonCostLookup, SpApiClient, SpApiItemFetcher,
    SqliteResultSink,
};
use tracing::info;

const DEFAULT_POOL_SIZE: u32 = 4;

/// Wiring choices that are not part of the environment configuration
#[derive(Debug, Clone)]
pub struct ContextOptions {
    /// SP-API call made for every scanned identifier
    pub operation: ItemOperation,
    /// JSON file of seller costs keyed by SKU
    pub cost_file: Option<PathBuf>,
    pub pool_size: u32,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self { operation: ItemOperation::default(), cost_file: None, pool_size: DEFAULT_POOL_SIZE }
    }
}

/// Application context - holds all services and dependencies
pub struct AppContext {
    pub config: AppConfig,
    /// Present when results are persisted to SQLite
    pub db: Option<Arc<DbManager>>,
    pub sink: Arc<dyn ResultSink>,
    pub orchestrator: Arc<ScanOrchestrator>,
}

impl AppContext {
    /// Load configuration from the environment (or a config file) and wire
    /// the full SP-API stack.
    pub fn new(options: ContextOptions) -> Result<Self> {
        let config = config::load()?;
        Self::new_with_config(config, options)
    }

    pub fn new_with_config(config: AppConfig, options: ContextOptions) -> Result<Self> {
        let clock: SharedClock = SystemClock::shared();
        let client = Arc::new(SpApiClient::from_config(&config, Arc::clone(&clock))?);
        info!(
            operation = ?options.operation,
            marketplace_id = %client.marketplace_id(),
            "SP-API client ready"
        );

        let fetcher: Arc<dyn ItemFetcher> =
            Arc::new(SpApiItemFetcher::new(client, options.operation));
        Self::with_fetcher(config, options, fetcher)
    }

    /// Wire the context around an arbitrary fetcher.
    pub fn with_fetcher(
        config: AppConfig,
        options: ContextOptions,
        fetcher: Arc<dyn ItemFetcher>,
    ) -> Result<Self> {
        let (db, sink) = open_sink(&config.storage, options.pool_size)?;

        let mut orchestrator = ScanOrchestrator::new(Arc::clone(&sink), fetcher);
        if let Some(path) = &options.cost_file {
            orchestrator = orchestrator.with_cost_lookup(Arc::new(JsonCostLookup::from_path(path)?));
        }

        Ok(Self { config, db, sink, orchestrator: Arc::new(orchestrator) })
    }
}

fn open_sink(
    storage: &StorageConfig,
    pool_size: u32,
) -> Result<(Option<Arc<DbManager>>, Arc<dyn ResultSink>)> {
    match &storage.db_path {
        Some(path) => {
            let db = Arc::new(DbManager::new(path, pool_size)?);
            db.run_migrations()?;
            info!(path = %path.display(), "Persisting scan results to SQLite");
            let sink: Arc<dyn ResultSink> = Arc::new(SqliteResultSink::new(Arc::clone(&db)));
            Ok((Some(db), sink))
        }
        None => {
            info!("No database configured; scan results are kept in memory");
            Ok((None, Arc::new(InMemoryResultSink::new())))
        }
    }
}
