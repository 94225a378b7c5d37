//! Unified catalog: merged listing and search across all providers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use omnidrive_common::{FileMetadata, ProviderId};
use omnidrive_provider::{ProviderAdapter, SearchOptions};

use crate::config::IdentityStrategy;
use crate::fanout::{fan_out, CallOutcome};

/// One logical file as seen across potentially several providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedFile {
    pub name: String,
    pub size: u64,
    pub mime_type: String,
    /// Earliest creation time across all copies.
    pub created: DateTime<Utc>,
    /// Latest modification time across all copies.
    pub modified: DateTime<Utc>,
    /// Providers holding a copy. Never empty.
    pub providers: BTreeSet<ProviderId>,
    /// Native file id per provider.
    pub per_provider_id: BTreeMap<ProviderId, String>,
}

/// A provider that contributed nothing to a catalog operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderFailure {
    pub id: ProviderId,
    pub error: String,
}

/// Result of a unified listing or search.
///
/// A provider failure during fan-out does not fail the operation; its
/// contribution is simply absent from the merge and it is listed in
/// `failed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogReport {
    pub files: Vec<UnifiedFile>,
    pub failed: Vec<ProviderFailure>,
    pub cancelled: bool,
}

/// Grouping key for the merge, per the configured identity strategy.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum MergeKey {
    NameSize(String, u64),
    Hash(String),
}

impl MergeKey {
    fn for_entry(entry: &FileMetadata, identity: IdentityStrategy) -> Self {
        match identity {
            IdentityStrategy::NameSize => MergeKey::NameSize(entry.name.clone(), entry.size),
            IdentityStrategy::ContentHash => match &entry.content_hash {
                Some(hash) => MergeKey::Hash(hash.clone()),
                // Not every backend exposes a hash; fall back per entry.
                None => MergeKey::NameSize(entry.name.clone(), entry.size),
            },
        }
    }
}

/// Fold raw per-provider entries into unified files.
///
/// Folders are not part of the logical namespace and are skipped. For each
/// merge group the provider sets and id maps are unioned, the earliest
/// `created` and latest `modified` win, and output order is deterministic
/// (name, then size). Merging the same raw listing twice yields the same
/// unified set as merging it once.
pub fn merge_entries(
    entries: Vec<(ProviderId, FileMetadata)>,
    identity: IdentityStrategy,
) -> Vec<UnifiedFile> {
    let mut groups: HashMap<MergeKey, UnifiedFile> = HashMap::new();

    for (provider, entry) in entries {
        if entry.is_folder {
            continue;
        }
        let key = MergeKey::for_entry(&entry, identity);

        match groups.get_mut(&key) {
            Some(unified) => {
                unified.created = unified.created.min(entry.created);
                unified.modified = unified.modified.max(entry.modified);
                unified.providers.insert(provider.clone());
                unified.per_provider_id.insert(provider, entry.id);
            }
            None => {
                let mut providers = BTreeSet::new();
                providers.insert(provider.clone());
                let mut per_provider_id = BTreeMap::new();
                per_provider_id.insert(provider, entry.id);

                groups.insert(
                    key,
                    UnifiedFile {
                        name: entry.name,
                        size: entry.size,
                        mime_type: entry.mime_type,
                        created: entry.created,
                        modified: entry.modified,
                        providers,
                        per_provider_id,
                    },
                );
            }
        }
    }

    // A unified file with no backing providers must be dropped, not kept.
    let mut files: Vec<UnifiedFile> = groups
        .into_values()
        .filter(|f| !f.providers.is_empty())
        .collect();
    files.sort_by(|a, b| a.name.cmp(&b.name).then(a.size.cmp(&b.size)));
    files
}

fn collect(
    outcomes: Vec<(ProviderId, CallOutcome<Vec<FileMetadata>>)>,
    identity: IdentityStrategy,
) -> CatalogReport {
    let mut entries = Vec::new();
    let mut failed = Vec::new();
    let mut cancelled = false;

    for (id, outcome) in outcomes {
        match outcome {
            CallOutcome::Ok(listing) => {
                entries.extend(listing.into_iter().map(|e| (id.clone(), e)));
            }
            CallOutcome::Failed(error) => failed.push(ProviderFailure { id, error }),
            CallOutcome::Cancelled => {
                cancelled = true;
                failed.push(ProviderFailure {
                    id,
                    error: "cancelled".to_string(),
                });
            }
        }
    }

    let files = merge_entries(entries, identity);
    debug!(
        "Catalog merge produced {} unified files ({} providers failed)",
        files.len(),
        failed.len()
    );

    CatalogReport {
        files,
        failed,
        cancelled,
    }
}

/// List every file on every provider, merged into one logical namespace.
pub async fn list_all(
    adapters: &[(ProviderId, Arc<dyn ProviderAdapter>)],
    identity: IdentityStrategy,
    timeout: Duration,
    cancel: &CancellationToken,
) -> CatalogReport {
    let outcomes = fan_out(adapters, timeout, cancel, |adapter| async move {
        adapter.list_files(None).await
    })
    .await;
    collect(outcomes, identity)
}

/// Search every provider and merge the hits.
pub async fn search(
    adapters: &[(ProviderId, Arc<dyn ProviderAdapter>)],
    query: &str,
    options: &SearchOptions,
    identity: IdentityStrategy,
    timeout: Duration,
    cancel: &CancellationToken,
) -> CatalogReport {
    let outcomes = fan_out(adapters, timeout, cancel, |adapter| {
        let query = query.to_string();
        let options = options.clone();
        async move { adapter.search_files(&query, &options).await }
    })
    .await;
    collect(outcomes, identity)
}
