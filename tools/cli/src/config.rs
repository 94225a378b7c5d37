//! CLI configuration: provider credentials and engine settings.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use omnidrive_common::ProviderId;
use omnidrive_engine::{Aggregator, EngineConfig, IdentityStrategy, PlacementStrategy};
use omnidrive_provider::{LocalAdapter, MemoryAdapter, ProviderAdapter};

/// Engine settings as written in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Per-adapter-call timeout in seconds.
    pub call_timeout_secs: u64,
    /// Default rebalance threshold, percent.
    pub rebalance_threshold: f64,
    pub placement: PlacementStrategy,
    pub identity: IdentityStrategy,
}

impl Default for EngineSettings {
    fn default() -> Self {
        let defaults = EngineConfig::default();
        Self {
            call_timeout_secs: defaults.call_timeout.as_secs(),
            rebalance_threshold: defaults.rebalance_threshold,
            placement: defaults.placement,
            identity: defaults.identity,
        }
    }
}

impl EngineSettings {
    fn to_engine_config(&self) -> EngineConfig {
        EngineConfig {
            call_timeout: Duration::from_secs(self.call_timeout_secs),
            rebalance_threshold: self.rebalance_threshold,
            placement: self.placement.clone(),
            identity: self.identity,
        }
    }
}

/// One provider entry in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    /// Identifier the provider is registered under.
    pub id: String,
    #[serde(flatten)]
    pub backend: BackendConfig,
}

/// Backend-specific adapter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "kebab-case")]
pub enum BackendConfig {
    /// Directory-backed provider with a capacity limit.
    Local { root: PathBuf, capacity: u64 },
    /// In-memory provider (development only; data is lost on exit).
    Memory { capacity: u64 },
}

/// Top-level config file shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolConfig {
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub providers: Vec<ProviderEntry>,
}

impl PoolConfig {
    /// Load the config from `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Default config file location.
    pub fn default_path() -> Result<PathBuf> {
        let base = dirs::config_dir().context("Cannot determine config directory")?;
        Ok(base.join("omnidrive").join("config.json"))
    }

    /// Build an aggregator with every configured provider registered.
    ///
    /// Reads credentials/paths once, at startup; the aggregator instance is
    /// then handed to whatever needs it.
    pub async fn build_aggregator(&self) -> Result<Aggregator> {
        let aggregator = Aggregator::new(self.engine.to_engine_config());

        for entry in &self.providers {
            let id = ProviderId::new(entry.id.clone())
                .with_context(|| format!("Invalid provider id '{}'", entry.id))?;
            let adapter: Arc<dyn ProviderAdapter> = match &entry.backend {
                BackendConfig::Local { root, capacity } => Arc::new(
                    LocalAdapter::new(root, *capacity)
                        .with_context(|| format!("Cannot open local provider '{}'", entry.id))?,
                ),
                BackendConfig::Memory { capacity } => {
                    Arc::new(MemoryAdapter::with_capacity(*capacity))
                }
            };
            aggregator.register_provider(id, adapter).await;
        }

        Ok(aggregator)
    }
}
