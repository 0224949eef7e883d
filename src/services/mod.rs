pub mod health;
pub mod inventory;
pub mod metrics;
pub mod planner;
pub mod response_cache;

pub use health::{HealthMonitor, ProviderStatus};
pub use inventory::{InventoryAnalyzer, InventoryReport, Recommendation};
pub use metrics::{MetricsRing, MetricsSnapshot, ToolStats};
pub use planner::QueryPlanner;
pub use response_cache::ResponseCache;
