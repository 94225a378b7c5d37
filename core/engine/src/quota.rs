//! Quota aggregation across all registered providers.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use omnidrive_common::{ProviderId, Quota};
use omnidrive_provider::ProviderAdapter;

use crate::fanout::{fan_out, CallOutcome};

/// Per-provider result inside a quota report.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "kebab-case")]
pub enum QuotaStatus {
    /// Quota retrieved successfully.
    Ok(Quota),
    /// The provider errored, timed out, or is not authenticated.
    /// Its quota is excluded from the grand total, never zero-filled,
    /// so a down provider does not skew rebalancing decisions.
    Error(String),
    /// The operation was cancelled before this provider answered.
    Cancelled,
}

/// One provider's entry in a quota report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderQuota {
    pub id: ProviderId,
    pub status: QuotaStatus,
}

/// Aggregate quota view across all registered providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaReport {
    /// Per-provider quotas, in registry insertion order.
    pub providers: Vec<ProviderQuota>,
    /// Grand total across succeeding providers only.
    pub total: Quota,
    /// Whether the operation was cancelled before completing.
    pub cancelled: bool,
}

impl QuotaReport {
    /// Quota for a single provider, if it answered successfully.
    pub fn quota_for(&self, id: &ProviderId) -> Option<Quota> {
        self.providers.iter().find(|p| &p.id == id).and_then(|p| {
            match &p.status {
                QuotaStatus::Ok(quota) => Some(*quota),
                _ => None,
            }
        })
    }

    /// Identifiers of providers that failed or were cancelled.
    pub fn failed_ids(&self) -> Vec<ProviderId> {
        self.providers
            .iter()
            .filter(|p| !matches!(p.status, QuotaStatus::Ok(_)))
            .map(|p| p.id.clone())
            .collect()
    }
}

/// Query every adapter's quota concurrently and aggregate the results.
///
/// An empty adapter set yields an empty report with a zero total, so
/// callers can distinguish "no providers configured" from "a provider
/// failed."
pub async fn aggregate_quota(
    adapters: &[(ProviderId, Arc<dyn ProviderAdapter>)],
    timeout: Duration,
    cancel: &CancellationToken,
) -> QuotaReport {
    let outcomes = fan_out(adapters, timeout, cancel, |adapter| async move {
        adapter.get_quota().await
    })
    .await;

    let mut total = Quota::zero();
    let mut providers = Vec::with_capacity(outcomes.len());
    let mut cancelled = false;

    for (id, outcome) in outcomes {
        let status = match outcome {
            CallOutcome::Ok(quota) => {
                total.accumulate(&quota);
                QuotaStatus::Ok(quota)
            }
            CallOutcome::Failed(error) => QuotaStatus::Error(error),
            CallOutcome::Cancelled => {
                cancelled = true;
                QuotaStatus::Cancelled
            }
        };
        providers.push(ProviderQuota { id, status });
    }

    debug!(
        "Aggregated quota over {} providers: {} used / {} total",
        providers.len(),
        total.used,
        total.total
    );

    QuotaReport {
        providers,
        total,
        cancelled,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use omnidrive_provider::{Fault, MemoryAdapter};

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

    #[tokio::test]
    async fn test_totals_across_providers() {
        let a = filled(100, 10).await;
        let b = filled(200, 50).await;
        let adapters: Vec<(ProviderId, Arc<dyn ProviderAdapter>)> =
            vec![(pid("a"), a), (pid("b"), b)];

        let report =
            aggregate_quota(&adapters, Duration::from_secs(1), &CancellationToken::new()).await;

        assert_eq!(report.total.used, 60);
        assert_eq!(report.total.total, 300);
        assert_eq!(report.total.available, 240);
        assert!(!report.cancelled);
    }

    #[tokio::test]
    async fn test_failed_provider_excluded_not_zeroed() {
        let a = filled(100, 10).await;
        let b = Arc::new(MemoryAdapter::with_capacity(500));
        b.set_delay(Some(Duration::from_secs(5)));
        let adapters: Vec<(ProviderId, Arc<dyn ProviderAdapter>)> =
            vec![(pid("a"), a), (pid("b"), b)];

        let report =
            aggregate_quota(&adapters, Duration::from_millis(20), &CancellationToken::new())
                .await;

        // Total reflects only A; B is present and marked failed.
        assert_eq!(report.total.total, 100);
        assert_eq!(report.providers.len(), 2);
        assert!(matches!(report.providers[1].status, QuotaStatus::Error(_)));
        assert_eq!(report.failed_ids(), vec![pid("b")]);
    }

    #[tokio::test]
    async fn test_unauthenticated_provider_excluded() {
        let a = Arc::new(MemoryAdapter::with_capacity(100));
        a.set_fault(Some(Fault::Unauthenticated));
        let adapters: Vec<(ProviderId, Arc<dyn ProviderAdapter>)> = vec![(pid("a"), a)];

        let report =
            aggregate_quota(&adapters, Duration::from_secs(1), &CancellationToken::new()).await;

        assert_eq!(report.total.total, 0);
        assert!(matches!(report.providers[0].status, QuotaStatus::Error(_)));
    }

    #[tokio::test]
    async fn test_empty_registry_gives_empty_report() {
        let report =
            aggregate_quota(&[], Duration::from_secs(1), &CancellationToken::new()).await;
        assert!(report.providers.is_empty());
        assert_eq!(report.total, Quota::zero());
    }

    #[tokio::test]
    async fn test_cancelled_report_is_marked() {
        let slow = Arc::new(MemoryAdapter::with_capacity(100));
        slow.set_delay(Some(Duration::from_secs(5)));
        let adapters: Vec<(ProviderId, Arc<dyn ProviderAdapter>)> = vec![(pid("slow"), slow)];

        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = aggregate_quota(&adapters, Duration::from_secs(10), &cancel).await;

        assert!(report.cancelled);
        assert!(matches!(report.providers[0].status, QuotaStatus::Cancelled));
    }
}
