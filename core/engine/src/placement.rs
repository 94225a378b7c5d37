//! Upload placement: choosing the provider that receives a new upload.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use omnidrive_common::{Error, ProviderId, Result, Uploaded};
use omnidrive_provider::ProviderAdapter;

use crate::config::PlacementStrategy;
use crate::quota::{aggregate_quota, QuotaStatus};

/// Result of placing an upload on one provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadReceipt {
    /// Provider that received the bytes.
    pub provider: ProviderId,
    /// Provider-native identifier of the created file.
    pub file_id: String,
    pub url: Option<String>,
    pub size: u64,
    pub mime_type: String,
}

/// Placement engine for single-provider uploads.
///
/// Exactly one adapter receives the write attempt per call; multi-target
/// writes are the replication manager's job. The only state is the
/// round-robin cursor, which advances across successive calls.
pub struct PlacementEngine {
    cursor: AtomicUsize,
}

impl PlacementEngine {
    pub fn new() -> Self {
        Self {
            cursor: AtomicUsize::new(0),
        }
    }

    /// Upload to the provider chosen by `strategy`, or to `preferred`.
    ///
    /// # Errors
    /// - `NoProviders` if the adapter set is empty
    /// - `ProviderNotFound` if `preferred` names an unregistered provider
    /// - the chosen provider's failure for most-free-space and round-robin
    ///   (no automatic fallback); for priority-list, the last failure once
    ///   every listed provider has been attempted
    pub async fn upload(
        &self,
        adapters: &[(ProviderId, Arc<dyn ProviderAdapter>)],
        strategy: &PlacementStrategy,
        data: Bytes,
        name: &str,
        mime_type: &str,
        preferred: Option<&ProviderId>,
        timeout: Duration,
    ) -> Result<UploadReceipt> {
        if name.is_empty() {
            return Err(Error::InvalidInput("File name cannot be empty".to_string()));
        }
        if adapters.is_empty() {
            return Err(Error::NoProviders);
        }

        if let Some(preferred) = preferred {
            let (id, adapter) = adapters
                .iter()
                .find(|(id, _)| id == preferred)
                .ok_or_else(|| Error::ProviderNotFound(preferred.to_string()))?;
            debug!("Placing '{}' on explicitly requested provider {}", name, id);
            return upload_one(id, adapter, data, name, mime_type, timeout).await;
        }

        match strategy {
            PlacementStrategy::MostFreeSpace => {
                let (id, adapter) = self.pick_most_free(adapters, timeout).await?;
                info!("Placing '{}' on {} (most free space)", name, id);
                upload_one(&id, &adapter, data, name, mime_type, timeout).await
            }
            PlacementStrategy::RoundRobin => {
                let index = self.cursor.fetch_add(1, Ordering::Relaxed) % adapters.len();
                let (id, adapter) = &adapters[index];
                info!("Placing '{}' on {} (round-robin)", name, id);
                upload_one(id, adapter, data, name, mime_type, timeout).await
            }
            PlacementStrategy::PriorityList(priority) => {
                self.upload_by_priority(adapters, priority, data, name, mime_type, timeout)
                    .await
            }
        }
    }

    /// Pick the provider with the largest live `available`, ties broken
    /// by registry insertion order.
    async fn pick_most_free(
        &self,
        adapters: &[(ProviderId, Arc<dyn ProviderAdapter>)],
        timeout: Duration,
    ) -> Result<(ProviderId, Arc<dyn ProviderAdapter>)> {
        let report = aggregate_quota(adapters, timeout, &CancellationToken::new()).await;

        let mut best: Option<(usize, u64)> = None;
        for (index, provider) in report.providers.iter().enumerate() {
            if let QuotaStatus::Ok(quota) = &provider.status {
                // Strictly greater keeps the earliest-registered winner on ties.
                if best.map_or(true, |(_, available)| quota.available > available) {
                    best = Some((index, quota.available));
                }
            }
        }

        match best {
            Some((index, _)) => {
                let (id, adapter) = &adapters[index];
                Ok((id.clone(), adapter.clone()))
            }
            None => Err(Error::Backend(
                "No provider reported a usable quota".to_string(),
            )),
        }
    }

    /// Attempt providers in the configured order, falling through on failure.
    async fn upload_by_priority(
        &self,
        adapters: &[(ProviderId, Arc<dyn ProviderAdapter>)],
        priority: &[ProviderId],
        data: Bytes,
        name: &str,
        mime_type: &str,
        timeout: Duration,
    ) -> Result<UploadReceipt> {
        let mut last_error = None;

        for id in priority {
            let Some((_, adapter)) = adapters.iter().find(|(aid, _)| aid == id) else {
                warn!("Priority provider {} is not registered, skipping", id);
                continue;
            };

            match upload_one(id, adapter, data.clone(), name, mime_type, timeout).await {
                Ok(receipt) => {
                    info!("Placing '{}' on {} (priority list)", name, id);
                    return Ok(receipt);
                }
                Err(err) => {
                    warn!("Priority provider {} rejected '{}': {}", id, name, err);
                    last_error = Some(err);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            Error::InvalidInput("Priority list contains no registered provider".to_string())
        }))
    }
}

impl Default for PlacementEngine {
    fn default() -> Self {
        Self::new()
    }
}

async fn upload_one(
    id: &ProviderId,
    adapter: &Arc<dyn ProviderAdapter>,
    data: Bytes,
    name: &str,
    mime_type: &str,
    timeout: Duration,
) -> Result<UploadReceipt> {
    let uploaded: Uploaded =
        match tokio::time::timeout(timeout, adapter.upload_file(data, name, mime_type)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(Error::Timeout(format!(
                    "Upload of '{}' to {} timed out",
                    name, id
                )))
            }
        };

    Ok(UploadReceipt {
        provider: id.clone(),
        file_id: uploaded.file_id,
        url: uploaded.url,
        size: uploaded.size,
        mime_type: uploaded.mime_type,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use omnidrive_provider::MemoryAdapter;

    fn pid(s: &str) -> ProviderId {
        ProviderId::new(s).unwrap()
    }

    async fn filled(capacity: u64, used: usize) -> Arc<MemoryAdapter> {
        let adapter = Arc::new(MemoryAdapter::with_capacity(capacity));
        if used > 0 {
            adapter
                .upload_file(
                    Bytes::from(vec![0u8; used]),
                    "seed.bin",
                    "application/octet-stream",
                )
                .await
                .unwrap();
        }
        adapter
    }

    fn timeout() -> Duration {
        Duration::from_secs(1)
    }

    #[tokio::test]
    async fn test_most_free_space_picks_largest_available() {
        // Available: a=10, b=50, c=5.
        let adapters: Vec<(ProviderId, Arc<dyn ProviderAdapter>)> = vec![
            (pid("a"), filled(20, 10).await),
            (pid("b"), filled(60, 10).await),
            (pid("c"), filled(10, 5).await),
        ];

        let engine = PlacementEngine::new();
        let receipt = engine
            .upload(
                &adapters,
                &PlacementStrategy::MostFreeSpace,
                Bytes::from_static(b"x"),
                "new.txt",
                "text/plain",
                None,
                timeout(),
            )
            .await
            .unwrap();

        assert_eq!(receipt.provider, pid("b"));
    }

    #[tokio::test]
    async fn test_most_free_space_tie_breaks_by_insertion_order() {
        let adapters: Vec<(ProviderId, Arc<dyn ProviderAdapter>)> = vec![
            (pid("first"), filled(50, 0).await),
            (pid("second"), filled(50, 0).await),
        ];

        let engine = PlacementEngine::new();
        let receipt = engine
            .upload(
                &adapters,
                &PlacementStrategy::MostFreeSpace,
                Bytes::from_static(b"x"),
                "new.txt",
                "text/plain",
                None,
                timeout(),
            )
            .await
            .unwrap();

        assert_eq!(receipt.provider, pid("first"));
    }

    #[tokio::test]
    async fn test_round_robin_cycles() {
        let adapters: Vec<(ProviderId, Arc<dyn ProviderAdapter>)> = vec![
            (pid("a"), filled(100, 0).await),
            (pid("b"), filled(100, 0).await),
        ];

        let engine = PlacementEngine::new();
        let mut placed = Vec::new();
        for i in 0..4 {
            let receipt = engine
                .upload(
                    &adapters,
                    &PlacementStrategy::RoundRobin,
                    Bytes::from_static(b"x"),
                    &format!("f{}.txt", i),
                    "text/plain",
                    None,
                    timeout(),
                )
                .await
                .unwrap();
            placed.push(receipt.provider);
        }

        assert_eq!(placed, vec![pid("a"), pid("b"), pid("a"), pid("b")]);
    }

    #[tokio::test]
    async fn test_preferred_provider_wins_over_strategy() {
        let adapters: Vec<(ProviderId, Arc<dyn ProviderAdapter>)> = vec![
            (pid("a"), filled(100, 0).await),
            (pid("b"), filled(1000, 0).await),
        ];

        let engine = PlacementEngine::new();
        let receipt = engine
            .upload(
                &adapters,
                &PlacementStrategy::MostFreeSpace,
                Bytes::from_static(b"x"),
                "new.txt",
                "text/plain",
                Some(&pid("a")),
                timeout(),
            )
            .await
            .unwrap();

        assert_eq!(receipt.provider, pid("a"));
    }

    #[tokio::test]
    async fn test_unknown_preferred_provider_fails() {
        let adapters: Vec<(ProviderId, Arc<dyn ProviderAdapter>)> =
            vec![(pid("a"), filled(100, 0).await)];

        let engine = PlacementEngine::new();
        let result = engine
            .upload(
                &adapters,
                &PlacementStrategy::MostFreeSpace,
                Bytes::from_static(b"x"),
                "new.txt",
                "text/plain",
                Some(&pid("ghost")),
                timeout(),
            )
            .await;

        assert!(matches!(result, Err(Error::ProviderNotFound(_))));
    }

    #[tokio::test]
    async fn test_priority_list_falls_through_on_failure() {
        let failing = Arc::new(MemoryAdapter::with_capacity(100));
        failing.fail_uploads(true);
        let healthy = filled(100, 0).await;

        let adapters: Vec<(ProviderId, Arc<dyn ProviderAdapter>)> =
            vec![(pid("a"), failing), (pid("b"), healthy)];

        let engine = PlacementEngine::new();
        let receipt = engine
            .upload(
                &adapters,
                &PlacementStrategy::PriorityList(vec![pid("a"), pid("b")]),
                Bytes::from_static(b"x"),
                "new.txt",
                "text/plain",
                None,
                timeout(),
            )
            .await
            .unwrap();

        assert_eq!(receipt.provider, pid("b"));
    }

    #[tokio::test]
    async fn test_priority_list_exhaustion_returns_last_error() {
        let failing = Arc::new(MemoryAdapter::with_capacity(100));
        failing.fail_uploads(true);

        let adapters: Vec<(ProviderId, Arc<dyn ProviderAdapter>)> = vec![(pid("a"), failing)];

        let engine = PlacementEngine::new();
        let result = engine
            .upload(
                &adapters,
                &PlacementStrategy::PriorityList(vec![pid("a")]),
                Bytes::from_static(b"x"),
                "new.txt",
                "text/plain",
                None,
                timeout(),
            )
            .await;

        assert!(matches!(result, Err(Error::Backend(_))));
    }

    #[tokio::test]
    async fn test_most_free_space_no_fallback_on_upload_failure() {
        let big_but_broken = Arc::new(MemoryAdapter::with_capacity(1000));
        big_but_broken.fail_uploads(true);
        let small = filled(10, 0).await;

        let adapters: Vec<(ProviderId, Arc<dyn ProviderAdapter>)> =
            vec![(pid("broken"), big_but_broken), (pid("small"), small.clone())];

        let engine = PlacementEngine::new();
        let result = engine
            .upload(
                &adapters,
                &PlacementStrategy::MostFreeSpace,
                Bytes::from_static(b"x"),
                "new.txt",
                "text/plain",
                None,
                timeout(),
            )
            .await;

        // The chosen provider failed; the operation fails outright.
        assert!(result.is_err());
        let quota = small.get_quota().await.unwrap();
        assert_eq!(quota.used, 0);
    }

    #[tokio::test]
    async fn test_no_providers() {
        let engine = PlacementEngine::new();
        let result = engine
            .upload(
                &[],
                &PlacementStrategy::MostFreeSpace,
                Bytes::from_static(b"x"),
                "new.txt",
                "text/plain",
                None,
                timeout(),
            )
            .await;
        assert!(matches!(result, Err(Error::NoProviders)));
    }
}
