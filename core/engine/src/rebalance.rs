//! Threshold-triggered rebalancing between providers.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use omnidrive_common::{Error, FileMetadata, ProviderId, Quota};
use omnidrive_provider::ProviderAdapter;

use crate::catalog::ProviderFailure;
use crate::quota::{aggregate_quota, QuotaStatus};

/// Step of the move protocol at which a failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MoveStage {
    Download,
    Upload,
    Delete,
}

/// Terminal state of one attempted move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum MoveOutcome {
    /// Download, upload and delete all succeeded.
    Moved,
    /// Upload succeeded but the source delete failed: the file now exists
    /// on both providers. Accepted duplication, never rolled back, since
    /// rebalancing must not delete data it cannot first confirm is
    /// replicated elsewhere.
    Duplicated { delete_error: String },
    /// The move failed before the file reached the target.
    Failed { stage: MoveStage, error: String },
}

/// Audit record for one attempted move within a rebalance pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebalanceAction {
    pub source: ProviderId,
    pub target: ProviderId,
    pub file_name: String,
    pub file_id: String,
    pub size: u64,
    pub outcome: MoveOutcome,
}

/// Result of one rebalance pass. Transient; nothing is persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebalanceReport {
    /// Threshold the pass ran with, in percent.
    pub threshold: f64,
    /// Providers that started the pass above the threshold.
    pub over_threshold: Vec<ProviderId>,
    /// Providers that started the pass at or below the threshold.
    pub under_threshold: Vec<ProviderId>,
    /// Providers whose quota could not be read; they took no part.
    pub skipped: Vec<ProviderFailure>,
    /// Every attempted move, in execution order.
    pub actions: Vec<RebalanceAction>,
}

/// Run one rebalance pass.
///
/// Stateless between invocations: quota and candidates are recomputed from
/// scratch every call, so a crash mid-pass leaves files duplicated or
/// unmoved and is safely resumable by calling again. Caller is responsible
/// for ensuring a single in-flight pass per process.
pub async fn rebalance_pass(
    adapters: &[(ProviderId, Arc<dyn ProviderAdapter>)],
    threshold: f64,
    timeout: Duration,
) -> RebalanceReport {
    let quota_report = aggregate_quota(adapters, timeout, &CancellationToken::new()).await;

    let mut quotas: HashMap<ProviderId, Quota> = HashMap::new();
    let mut skipped = Vec::new();
    for provider in &quota_report.providers {
        match &provider.status {
            QuotaStatus::Ok(quota) => {
                quotas.insert(provider.id.clone(), *quota);
            }
            QuotaStatus::Error(error) => skipped.push(ProviderFailure {
                id: provider.id.clone(),
                error: error.clone(),
            }),
            QuotaStatus::Cancelled => skipped.push(ProviderFailure {
                id: provider.id.clone(),
                error: "cancelled".to_string(),
            }),
        }
    }

    // Partition in registry insertion order.
    let mut over = Vec::new();
    let mut under = Vec::new();
    for (id, _) in adapters {
        if let Some(quota) = quotas.get(id) {
            if quota.percent_used() > threshold {
                over.push(id.clone());
            } else {
                under.push(id.clone());
            }
        }
    }

    info!(
        "Rebalance pass at {}%: {} over, {} under, {} skipped",
        threshold,
        over.len(),
        under.len(),
        skipped.len()
    );

    let mut actions = Vec::new();

    for source_id in &over {
        let Some((_, source)) = adapters.iter().find(|(id, _)| id == source_id) else {
            continue;
        };

        let candidates = match tokio::time::timeout(timeout, source.list_files(None)).await {
            Ok(Ok(listing)) => {
                let mut files: Vec<FileMetadata> =
                    listing.into_iter().filter(|f| !f.is_folder).collect();
                // Largest first: fewer moves to get back under threshold.
                files.sort_by(|a, b| b.size.cmp(&a.size));
                files
            }
            Ok(Err(err)) => {
                warn!("Cannot list files on {} for rebalance: {}", source_id, err);
                skipped.push(ProviderFailure {
                    id: source_id.clone(),
                    error: err.to_string(),
                });
                continue;
            }
            Err(_) => {
                warn!("Listing files on {} timed out", source_id);
                skipped.push(ProviderFailure {
                    id: source_id.clone(),
                    error: format!("listing timed out after {:?}", timeout),
                });
                continue;
            }
        };

        for file in candidates {
            let source_quota = quotas[source_id];
            if source_quota.percent_used() <= threshold {
                break;
            }

            // Target: the under-threshold provider with the most available
            // space right now. Tracked quotas are updated after every move,
            // since a move changes both providers' numbers.
            let target_id = under
                .iter()
                .filter(|id| *id != source_id)
                .filter(|id| quotas[*id].available >= file.size)
                .max_by_key(|id| quotas[*id].available);

            let Some(target_id) = target_id.cloned() else {
                debug!(
                    "No under-threshold provider can hold '{}' ({} bytes), skipping",
                    file.name, file.size
                );
                continue;
            };

            let Some((_, target)) = adapters.iter().find(|(id, _)| id == &target_id) else {
                continue;
            };

            let outcome = move_file(source, target, &file, timeout).await;

            match &outcome {
                MoveOutcome::Moved => {
                    let sq = quotas[source_id];
                    quotas.insert(
                        source_id.clone(),
                        Quota::new(sq.used.saturating_sub(file.size), sq.total),
                    );
                    let tq = quotas[&target_id];
                    quotas.insert(target_id.clone(), Quota::new(tq.used + file.size, tq.total));
                    info!(
                        "Moved '{}' ({} bytes): {} -> {}",
                        file.name, file.size, source_id, target_id
                    );
                }
                MoveOutcome::Duplicated { delete_error } => {
                    // Source still holds the bytes; only the target grew.
                    let tq = quotas[&target_id];
                    quotas.insert(target_id.clone(), Quota::new(tq.used + file.size, tq.total));
                    warn!(
                        "'{}' now exists on both {} and {} (delete failed: {})",
                        file.name, source_id, target_id, delete_error
                    );
                }
                MoveOutcome::Failed { stage, error } => {
                    warn!(
                        "Move of '{}' from {} failed at {:?}: {}",
                        file.name, source_id, stage, error
                    );
                }
            }

            actions.push(RebalanceAction {
                source: source_id.clone(),
                target: target_id,
                file_name: file.name,
                file_id: file.id,
                size: file.size,
                outcome,
            });
        }
    }

    RebalanceReport {
        threshold,
        over_threshold: over,
        under_threshold: under,
        skipped,
        actions,
    }
}

/// Execute the download -> upload -> delete triple for one file.
///
/// Strictly sequential: the delete is only attempted once the upload has
/// confirmed the bytes exist on the target.
async fn move_file(
    source: &Arc<dyn ProviderAdapter>,
    target: &Arc<dyn ProviderAdapter>,
    file: &FileMetadata,
    timeout: Duration,
) -> MoveOutcome {
    let data = match tokio::time::timeout(timeout, source.download_file(&file.id)).await {
        Ok(Ok(Some(data))) => data,
        Ok(Ok(None)) => {
            return MoveOutcome::Failed {
                stage: MoveStage::Download,
                error: Error::NotFound(file.id.clone()).to_string(),
            }
        }
        Ok(Err(err)) => {
            return MoveOutcome::Failed {
                stage: MoveStage::Download,
                error: err.to_string(),
            }
        }
        Err(_) => {
            return MoveOutcome::Failed {
                stage: MoveStage::Download,
                error: format!("timed out after {:?}", timeout),
            }
        }
    };

    match tokio::time::timeout(timeout, target.upload_file(data, &file.name, &file.mime_type))
        .await
    {
        Ok(Ok(_)) => {}
        Ok(Err(err)) => {
            return MoveOutcome::Failed {
                stage: MoveStage::Upload,
                error: err.to_string(),
            }
        }
        Err(_) => {
            return MoveOutcome::Failed {
                stage: MoveStage::Upload,
                error: format!("timed out after {:?}", timeout),
            }
        }
    }

    match tokio::time::timeout(timeout, source.delete_file(&file.id)).await {
        // Deleting an already-absent source still leaves exactly one copy.
        Ok(Ok(_)) => MoveOutcome::Moved,
        Ok(Err(err)) => MoveOutcome::Duplicated {
            delete_error: err.to_string(),
        },
        Err(_) => MoveOutcome::Duplicated {
            delete_error: format!("timed out after {:?}", timeout),
        },
    }
}
