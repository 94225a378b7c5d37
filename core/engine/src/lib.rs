//! Multi-provider storage aggregation engine.
//!
//! Treats several independent, quota-limited storage backends as a single
//! logical pool: aggregate quota, a unified catalog with de-duplication,
//! upload placement, multi-target backup replication, and
//! threshold-triggered rebalancing.
//!
//! Everything here is computed on call; the engine keeps no durable index
//! of its own. The only in-process state is the provider registry, the
//! round-robin placement cursor and the rebalance guard.

mod aggregator;
pub mod catalog;
mod config;
mod fanout;
mod placement;
pub mod quota;
pub mod rebalance;
pub mod replicate;

pub use aggregator::Aggregator;
pub use catalog::{CatalogReport, ProviderFailure, UnifiedFile};
pub use config::{EngineConfig, IdentityStrategy, PlacementStrategy};
pub use placement::{PlacementEngine, UploadReceipt};
pub use quota::{ProviderQuota, QuotaReport, QuotaStatus};
pub use rebalance::{MoveOutcome, MoveStage, RebalanceAction, RebalanceReport};
pub use replicate::{BackupSource, TargetOutcome};
