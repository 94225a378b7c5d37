//! Aggregation engine configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use omnidrive_common::ProviderId;

/// Strategy for choosing which provider receives a new upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "strategy", content = "providers")]
pub enum PlacementStrategy {
    /// Pick the provider with the most available space (live quota probe).
    /// Ties break by registry insertion order. No fallback on failure.
    MostFreeSpace,
    /// Cycle deterministically through registered providers, quota-blind.
    /// No fallback on failure.
    RoundRobin,
    /// Attempt providers in the configured order, falling through to the
    /// next on failure until one succeeds or the list is exhausted.
    PriorityList(Vec<ProviderId>),
}

/// Strategy for folding raw listings into unified files.
///
/// Name+size is the baseline identity rule: not every backend exposes a
/// content hash, so hash-based matching is opt-in and still falls back to
/// name+size for entries without a hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IdentityStrategy {
    /// Two entries are the same logical file when (name, size) match exactly.
    NameSize,
    /// Match on content hash when both entries carry one; otherwise
    /// fall back to (name, size).
    ContentHash,
}

/// Configuration for the aggregation engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Deadline for each individual adapter call during fan-out.
    pub call_timeout: Duration,
    /// Default utilization threshold for rebalancing, in percent.
    pub rebalance_threshold: f64,
    /// Upload placement strategy.
    pub placement: PlacementStrategy,
    /// File identity rule for catalog merging.
    pub identity: IdentityStrategy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(30),
            rebalance_threshold: 80.0,
            placement: PlacementStrategy::MostFreeSpace,
            identity: IdentityStrategy::NameSize,
        }
    }
}
