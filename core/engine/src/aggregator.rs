//! Aggregator facade: one logical storage pool over many providers.

use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use omnidrive_common::{Error, FileMetadata, ProviderId, Result, Uploaded};
use omnidrive_provider::{ProviderAdapter, ProviderRegistry, SearchOptions};

use crate::catalog::{self, CatalogReport};
use crate::config::EngineConfig;
use crate::placement::{PlacementEngine, UploadReceipt};
use crate::quota::{aggregate_quota, QuotaReport};
use crate::rebalance::{rebalance_pass, RebalanceReport};
use crate::replicate::{self, BackupSource, TargetOutcome};

/// The multi-provider storage aggregation engine.
///
/// Explicitly constructed and explicitly owned: callers build one instance
/// from configured credentials and pass it to whatever needs it. There is
/// no global registry. Providers can be added and removed at runtime.
pub struct Aggregator {
    registry: RwLock<ProviderRegistry>,
    config: EngineConfig,
    placement: PlacementEngine,
    // Single in-flight rebalance per process.
    rebalance_guard: Mutex<()>,
}

impl Aggregator {
    /// Create an aggregator with an empty registry.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_registry(ProviderRegistry::new(), config)
    }

    /// Create an aggregator over an already-populated registry.
    pub fn with_registry(registry: ProviderRegistry, config: EngineConfig) -> Self {
        Self {
            registry: RwLock::new(registry),
            config,
            placement: PlacementEngine::new(),
            rebalance_guard: Mutex::new(()),
        }
    }

    /// Engine configuration in effect.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Register (or replace) a provider adapter under `id`.
    pub async fn register_provider(&self, id: ProviderId, adapter: Arc<dyn ProviderAdapter>) {
        info!("Registering provider {} ({})", id, adapter.backend());
        self.registry.write().await.register(id, adapter);
    }

    /// Remove a provider. Returns false if it was not registered.
    pub async fn remove_provider(&self, id: &ProviderId) -> bool {
        let removed = self.registry.write().await.remove(id).is_some();
        if removed {
            info!("Removed provider {}", id);
        }
        removed
    }

    /// Registered provider identifiers, in insertion order.
    pub async fn provider_ids(&self) -> Vec<ProviderId> {
        self.registry.read().await.ids()
    }

    /// Snapshot the adapters, optionally narrowed to one provider.
    async fn adapters(
        &self,
        only: Option<&ProviderId>,
    ) -> Result<Vec<(ProviderId, Arc<dyn ProviderAdapter>)>> {
        let registry = self.registry.read().await;
        match only {
            Some(id) => {
                let adapter = registry.get(id)?;
                Ok(vec![(id.clone(), adapter)])
            }
            None => Ok(registry.adapters()),
        }
    }

    /// Aggregate quota snapshot across all providers.
    pub async fn quota(&self) -> QuotaReport {
        self.quota_with(&CancellationToken::new()).await
    }

    /// Cancellable variant of [`Aggregator::quota`].
    pub async fn quota_with(&self, cancel: &CancellationToken) -> QuotaReport {
        let adapters = self.registry.read().await.adapters();
        aggregate_quota(&adapters, self.config.call_timeout, cancel).await
    }

    /// Unified listing, optionally filtered to one provider.
    pub async fn list_all(&self, provider: Option<&ProviderId>) -> Result<CatalogReport> {
        self.list_all_with(provider, &CancellationToken::new())
            .await
    }

    /// Cancellable variant of [`Aggregator::list_all`].
    pub async fn list_all_with(
        &self,
        provider: Option<&ProviderId>,
        cancel: &CancellationToken,
    ) -> Result<CatalogReport> {
        let adapters = self.adapters(provider).await?;
        Ok(catalog::list_all(
            &adapters,
            self.config.identity,
            self.config.call_timeout,
            cancel,
        )
        .await)
    }

    /// Unified search, optionally filtered to one provider.
    pub async fn search(
        &self,
        query: &str,
        options: &SearchOptions,
        provider: Option<&ProviderId>,
    ) -> Result<CatalogReport> {
        self.search_with(query, options, provider, &CancellationToken::new())
            .await
    }

    /// Cancellable variant of [`Aggregator::search`].
    pub async fn search_with(
        &self,
        query: &str,
        options: &SearchOptions,
        provider: Option<&ProviderId>,
        cancel: &CancellationToken,
    ) -> Result<CatalogReport> {
        if query.is_empty() {
            return Err(Error::InvalidInput("Search query cannot be empty".to_string()));
        }
        let adapters = self.adapters(provider).await?;
        Ok(catalog::search(
            &adapters,
            query,
            options,
            self.config.identity,
            self.config.call_timeout,
            cancel,
        )
        .await)
    }

    /// Upload a new file, placed by the configured strategy or on the
    /// explicitly preferred provider.
    pub async fn upload(
        &self,
        data: Bytes,
        name: &str,
        mime_type: &str,
        preferred: Option<&ProviderId>,
    ) -> Result<UploadReceipt> {
        let adapters = self.registry.read().await.adapters();
        self.placement
            .upload(
                &adapters,
                &self.config.placement,
                data,
                name,
                mime_type,
                preferred,
                self.config.call_timeout,
            )
            .await
    }

    /// Replicate a source to every requested target provider.
    pub async fn backup(
        &self,
        source: BackupSource,
        targets: &[ProviderId],
    ) -> Result<Vec<TargetOutcome>> {
        let registry = self.registry.read().await;
        replicate::backup(&registry, source, targets, self.config.call_timeout).await
    }

    /// Run a rebalance pass at the configured threshold, or at an explicit
    /// override.
    ///
    /// # Errors
    /// - `RebalanceInProgress` if a pass is already running
    /// - `InvalidInput` for a threshold outside (0, 100]
    pub async fn rebalance(&self, threshold_override: Option<f64>) -> Result<RebalanceReport> {
        let threshold = threshold_override.unwrap_or(self.config.rebalance_threshold);
        if !(threshold > 0.0 && threshold <= 100.0) {
            return Err(Error::InvalidInput(format!(
                "Rebalance threshold must be in (0, 100], got {}",
                threshold
            )));
        }

        let _guard = self
            .rebalance_guard
            .try_lock()
            .map_err(|_| Error::RebalanceInProgress)?;

        let adapters = self.registry.read().await.adapters();
        Ok(rebalance_pass(&adapters, threshold, self.config.call_timeout).await)
    }

    /// Pass-through: create a folder on one provider.
    pub async fn create_folder(
        &self,
        provider: &ProviderId,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<String> {
        let adapter = self.registry.read().await.get(provider)?;
        self.bounded(adapter.create_folder(name, parent_id), "create_folder")
            .await?
    }

    /// Pass-through: move a file to a new parent folder on one provider.
    pub async fn move_file(
        &self,
        provider: &ProviderId,
        file_id: &str,
        new_parent_id: &str,
    ) -> Result<bool> {
        let adapter = self.registry.read().await.get(provider)?;
        self.bounded(adapter.move_file(file_id, new_parent_id), "move_file")
            .await?
    }

    /// Pass-through: fetch one file's metadata from one provider.
    pub async fn file_metadata(
        &self,
        provider: &ProviderId,
        file_id: &str,
    ) -> Result<Option<FileMetadata>> {
        let adapter = self.registry.read().await.get(provider)?;
        self.bounded(adapter.get_file_metadata(file_id), "get_file_metadata")
            .await?
    }

    /// Pass-through: download one file from one provider.
    pub async fn download(&self, provider: &ProviderId, file_id: &str) -> Result<Bytes> {
        let adapter = self.registry.read().await.get(provider)?;
        self.bounded(adapter.download_file(file_id), "download_file")
            .await??
            .ok_or_else(|| Error::NotFound(format!("File {} not found on {}", file_id, provider)))
    }

    /// Pass-through: delete one file on one provider.
    pub async fn delete_file(&self, provider: &ProviderId, file_id: &str) -> Result<bool> {
        let adapter = self.registry.read().await.get(provider)?;
        self.bounded(adapter.delete_file(file_id), "delete_file")
            .await?
    }

    /// Rename a file on one provider by re-creating it under the new name.
    ///
    /// Not every backend exposes a native rename, so this downloads the
    /// content, uploads it under `new_name`, and deletes the original.
    /// If the delete fails the file exists under both names; the error is
    /// surfaced and nothing is rolled back.
    pub async fn rename_file(
        &self,
        provider: &ProviderId,
        file_id: &str,
        new_name: &str,
    ) -> Result<Uploaded> {
        if new_name.is_empty() {
            return Err(Error::InvalidInput("New name cannot be empty".to_string()));
        }
        let adapter = self.registry.read().await.get(provider)?;

        let meta = self
            .bounded(adapter.get_file_metadata(file_id), "get_file_metadata")
            .await??
            .ok_or_else(|| Error::NotFound(format!("File {} not found on {}", file_id, provider)))?;

        let data = self
            .bounded(adapter.download_file(file_id), "download_file")
            .await??
            .ok_or_else(|| Error::NotFound(format!("File {} not found on {}", file_id, provider)))?;

        let uploaded = self
            .bounded(
                adapter.upload_file(data, new_name, &meta.mime_type),
                "upload_file",
            )
            .await??;

        if let Err(err) = self
            .bounded(adapter.delete_file(file_id), "delete_file")
            .await?
        {
            warn!(
                "Rename on {} left '{}' behind under its old name: {}",
                provider, meta.name, err
            );
            return Err(err);
        }

        Ok(uploaded)
    }

    /// Bound a single adapter call by the configured per-call timeout.
    async fn bounded<T>(
        &self,
        fut: impl std::future::Future<Output = T>,
        what: &str,
    ) -> Result<T> {
        tokio::time::timeout(self.config.call_timeout, fut)
            .await
            .map_err(|_| Error::Timeout(format!("{} call timed out", what)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use omnidrive_provider::MemoryAdapter;

    fn pid(s: &str) -> ProviderId {
        ProviderId::new(s).unwrap()
    }

    #[tokio::test]
    async fn test_register_and_remove() {
        let aggregator = Aggregator::new(EngineConfig::default());
        aggregator
            .register_provider(pid("a"), Arc::new(MemoryAdapter::with_capacity(100)))
            .await;

        assert_eq!(aggregator.provider_ids().await, vec![pid("a")]);
        assert!(aggregator.remove_provider(&pid("a")).await);
        assert!(!aggregator.remove_provider(&pid("a")).await);
        assert!(aggregator.provider_ids().await.is_empty());
    }

    #[tokio::test]
    async fn test_empty_registry_degrades_to_empty_results() {
        let aggregator = Aggregator::new(EngineConfig::default());

        let quota = aggregator.quota().await;
        assert!(quota.providers.is_empty());

        let listing = aggregator.list_all(None).await.unwrap();
        assert!(listing.files.is_empty());
        assert!(listing.failed.is_empty());
    }

    #[tokio::test]
    async fn test_upload_requires_a_provider() {
        let aggregator = Aggregator::new(EngineConfig::default());
        let result = aggregator
            .upload(Bytes::from_static(b"x"), "f.txt", "text/plain", None)
            .await;
        assert!(matches!(result, Err(Error::NoProviders)));
    }

    #[tokio::test]
    async fn test_listing_unknown_provider_filter_fails() {
        let aggregator = Aggregator::new(EngineConfig::default());
        let result = aggregator.list_all(Some(&pid("ghost"))).await;
        assert!(matches!(result, Err(Error::ProviderNotFound(_))));
    }

    #[tokio::test]
    async fn test_rebalance_threshold_validated() {
        let aggregator = Aggregator::new(EngineConfig::default());
        assert!(matches!(
            aggregator.rebalance(Some(0.0)).await,
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            aggregator.rebalance(Some(150.0)).await,
            Err(Error::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_search_query_rejected() {
        let aggregator = Aggregator::new(EngineConfig::default());
        let result = aggregator
            .search("", &SearchOptions::default(), None)
            .await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }
}
