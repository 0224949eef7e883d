//! stroll-history
//!
//! Historical market-data query service over local, partitioned SQLite
//! files, exposed as a stdio JSON-RPC tool server.

use std::sync::Arc;
use std::time::Duration;

pub mod catalog;
pub mod config;
pub mod models;
pub mod rpc;
pub mod services;
pub mod store;
pub mod utils;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use config::Config;
pub use utils::{ServiceError, ServiceResult};

use catalog::Catalog;
use models::SymbolInterner;
use rpc::StaticPayloads;
use services::{HealthMonitor, InventoryAnalyzer, MetricsRing, QueryPlanner, ResponseCache};
use store::{PartitionProvider, PartitionStore, StorageProvider};

/// Shared service state.
///
/// Everything the handlers touch hangs off this one structure, created at
/// startup and passed down explicitly; there is no ambient state. Rust's
/// type system is the DI container.
pub struct ServiceState {
    pub config: Config,
    pub interner: Arc<SymbolInterner>,
    pub catalog: Arc<Catalog>,
    pub store: Arc<PartitionStore>,
    pub provider: Arc<dyn StorageProvider>,
    pub planner: Arc<QueryPlanner>,
    pub cache: Arc<ResponseCache>,
    pub metrics: Arc<MetricsRing>,
    pub inventory: Arc<InventoryAnalyzer>,
    pub health: Arc<HealthMonitor>,
    pub statics: StaticPayloads,
}

impl ServiceState {
    pub fn new(config: Config) -> Arc<Self> {
        let interner = Arc::new(SymbolInterner::new());
        let catalog = Arc::new(Catalog::new(config.data.root.clone(), Arc::clone(&interner)));
        let store = Arc::new(PartitionStore::new(
            Duration::from_millis(config.limits.scan_timeout_ms),
            config.limits.max_in_flight as u32,
        ));
        let provider: Arc<dyn StorageProvider> =
            Arc::new(PartitionProvider::new(Arc::clone(&catalog), Arc::clone(&store)));
        let planner = Arc::new(QueryPlanner::new(Arc::clone(&provider), config.limits.max_rows));
        let cache = Arc::new(ResponseCache::new(config.cache.max_entries));
        let metrics = Arc::new(MetricsRing::new(
            config.limits.metrics_capacity,
            rpc::tools::tool_names(),
        ));
        let inventory = Arc::new(InventoryAnalyzer::new(Arc::clone(&provider)));
        let health = Arc::new(HealthMonitor::new(Arc::clone(&catalog), Arc::clone(&provider)));
        let statics = StaticPayloads::build();

        Arc::new(Self {
            config,
            interner,
            catalog,
            store,
            provider,
            planner,
            cache,
            metrics,
            inventory,
            health,
            statics,
        })
    }

    /// Discover partitions, seed the static cache entries and probe the
    /// store once so the first `provider_status` carries real latencies.
    pub async fn startup(&self) {
        let discovered = self.catalog.discover();
        if self.catalog.is_degraded() {
            tracing::warn!(
                "Starting degraded: data root {} is unavailable",
                self.config.data.root
            );
        } else {
            tracing::info!("Catalog ready with {} partitions", discovered);
        }

        self.cache.seed("discover|", self.statics.discover.clone());
        self.cache.seed("version|", self.statics.version.clone());

        self.health.startup_probe().await;
    }

    /// Re-scan the data root, clearing quarantined entries
    pub fn refresh_catalog(&self) -> usize {
        self.catalog.refresh()
    }
}
