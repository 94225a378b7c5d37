//! Concurrent per-provider fan-out with timeout and cancellation.

use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use omnidrive_common::ProviderId;
use omnidrive_provider::ProviderAdapter;

/// Outcome of one per-provider call inside a fan-out operation.
///
/// Failures are captured here, at the adapter boundary, so a single
/// provider can never abort the whole aggregate operation.
#[derive(Debug)]
pub(crate) enum CallOutcome<T> {
    Ok(T),
    Failed(String),
    Cancelled,
}

/// Issue one call per adapter concurrently and collect every outcome.
///
/// Each call is bounded by `timeout`; a timed-out call is reported as a
/// failure, not retried. Cancelling `cancel` stops outstanding calls while
/// preserving the results that had already completed. Each task writes only
/// its own slot of the output, so no locking is needed in the merge.
pub(crate) async fn fan_out<T, F, Fut>(
    adapters: &[(ProviderId, Arc<dyn ProviderAdapter>)],
    timeout: Duration,
    cancel: &CancellationToken,
    call: F,
) -> Vec<(ProviderId, CallOutcome<T>)>
where
    F: Fn(Arc<dyn ProviderAdapter>) -> Fut,
    Fut: Future<Output = omnidrive_common::Result<T>>,
{
    let tasks = adapters.iter().map(|(id, adapter)| {
        let id = id.clone();
        let fut = call(adapter.clone());
        async move {
            let outcome = tokio::select! {
                _ = cancel.cancelled() => CallOutcome::Cancelled,
                result = tokio::time::timeout(timeout, fut) => match result {
                    Ok(Ok(value)) => CallOutcome::Ok(value),
                    Ok(Err(err)) => {
                        warn!("Provider {} failed: {}", id, err);
                        CallOutcome::Failed(err.to_string())
                    }
                    Err(_) => {
                        warn!("Provider {} timed out after {:?}", id, timeout);
                        CallOutcome::Failed(format!("timed out after {:?}", timeout))
                    }
                },
            };
            (id, outcome)
        }
    });

    join_all(tasks).await
}
