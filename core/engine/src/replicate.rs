//! Multi-target backup replication.

use bytes::Bytes;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

use omnidrive_common::{Error, ProviderId, Result};
use omnidrive_provider::ProviderRegistry;

/// What to back up: raw bytes, or an existing file on one provider.
#[derive(Debug, Clone)]
pub enum BackupSource {
    /// Back up content supplied by the caller.
    Bytes {
        data: Bytes,
        name: String,
        mime_type: String,
    },
    /// Back up an existing file; its bytes and original name/MIME type
    /// are fetched once from the source provider.
    Existing {
        provider: ProviderId,
        file_id: String,
    },
}

/// Outcome for one requested backup target.
///
/// Targets are independent: "backed up to 2 of 3" is a valid, expected
/// terminal state, and callers must inspect individual entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetOutcome {
    pub provider: ProviderId,
    pub success: bool,
    pub file_id: Option<String>,
    pub error: Option<String>,
}

/// Replicate a source to every requested target provider.
///
/// The source content is read exactly once, then one upload is issued per
/// target, concurrently and independently; failure on one target never
/// aborts or rolls back the others. The result has exactly one entry per
/// requested target, in request order.
///
/// # Errors
/// Only resolving the source can fail the whole operation: an unknown
/// source provider or an absent source file. Unknown *target* identifiers
/// become failed outcome entries instead, preserving the one-entry-per-
/// target arity.
pub async fn backup(
    registry: &ProviderRegistry,
    source: BackupSource,
    targets: &[ProviderId],
    timeout: Duration,
) -> Result<Vec<TargetOutcome>> {
    let (data, name, mime_type) = resolve_source(registry, source, timeout).await?;
    info!(
        "Backing up '{}' ({} bytes) to {} targets",
        name,
        data.len(),
        targets.len()
    );

    let uploads = targets.iter().map(|target| {
        let adapter = registry.get(target);
        let data = data.clone();
        let name = name.clone();
        let mime_type = mime_type.clone();
        let target = target.clone();

        async move {
            let adapter = match adapter {
                Ok(adapter) => adapter,
                Err(err) => {
                    warn!("Backup target {} unavailable: {}", target, err);
                    return TargetOutcome {
                        provider: target,
                        success: false,
                        file_id: None,
                        error: Some(err.to_string()),
                    };
                }
            };

            let result =
                tokio::time::timeout(timeout, adapter.upload_file(data, &name, &mime_type)).await;

            match result {
                Ok(Ok(uploaded)) => TargetOutcome {
                    provider: target,
                    success: true,
                    file_id: Some(uploaded.file_id),
                    error: None,
                },
                Ok(Err(err)) => {
                    warn!("Backup to {} failed: {}", target, err);
                    TargetOutcome {
                        provider: target,
                        success: false,
                        file_id: None,
                        error: Some(err.to_string()),
                    }
                }
                Err(_) => {
                    warn!("Backup to {} timed out after {:?}", target, timeout);
                    TargetOutcome {
                        provider: target,
                        success: false,
                        file_id: None,
                        error: Some(format!("timed out after {:?}", timeout)),
                    }
                }
            }
        }
    });

    Ok(join_all(uploads).await)
}

/// Fetch the source content once, along with its name and MIME type.
async fn resolve_source(
    registry: &ProviderRegistry,
    source: BackupSource,
    timeout: Duration,
) -> Result<(Bytes, String, String)> {
    match source {
        BackupSource::Bytes {
            data,
            name,
            mime_type,
        } => {
            if name.is_empty() {
                return Err(Error::InvalidInput("File name cannot be empty".to_string()));
            }
            Ok((data, name, mime_type))
        }
        BackupSource::Existing { provider, file_id } => {
            let adapter = registry.get(&provider)?;

            let meta = tokio::time::timeout(timeout, adapter.get_file_metadata(&file_id))
                .await
                .map_err(|_| Error::Timeout(format!("Metadata fetch from {}", provider)))??
                .ok_or_else(|| {
                    Error::NotFound(format!("File {} not found on {}", file_id, provider))
                })?;

            let data = tokio::time::timeout(timeout, adapter.download_file(&file_id))
                .await
                .map_err(|_| Error::Timeout(format!("Download from {}", provider)))??
                .ok_or_else(|| {
                    Error::NotFound(format!("File {} not found on {}", file_id, provider))
                })?;

            Ok((data, meta.name, meta.mime_type))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use omnidrive_provider::{MemoryAdapter, ProviderAdapter};

    fn pid(s: &str) -> ProviderId {
        ProviderId::new(s).unwrap()
    }

    fn timeout() -> Duration {
        Duration::from_secs(1)
    }

    fn registry_of(entries: Vec<(&str, Arc<MemoryAdapter>)>) -> ProviderRegistry {
        let mut registry = ProviderRegistry::new();
        for (name, adapter) in entries {
            registry.register(pid(name), adapter);
        }
        registry
    }

    #[tokio::test]
    async fn test_one_outcome_per_target() {
        let a = Arc::new(MemoryAdapter::with_capacity(100));
        let b = Arc::new(MemoryAdapter::with_capacity(100));
        let c = Arc::new(MemoryAdapter::with_capacity(100));
        c.fail_uploads(true);
        let registry = registry_of(vec![("a", a), ("b", b), ("c", c)]);

        let outcomes = backup(
            &registry,
            BackupSource::Bytes {
                data: Bytes::from_static(b"payload"),
                name: "backup.txt".to_string(),
                mime_type: "text/plain".to_string(),
            },
            &[pid("a"), pid("b"), pid("c")],
            timeout(),
        )
        .await
        .unwrap();

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].success);
        assert!(outcomes[1].success);
        assert!(!outcomes[2].success);
        assert!(outcomes[2].error.is_some());
    }

    #[tokio::test]
    async fn test_failure_does_not_abort_other_targets() {
        let good = Arc::new(MemoryAdapter::with_capacity(100));
        let bad = Arc::new(MemoryAdapter::with_capacity(100));
        bad.fail_uploads(true);
        let registry = registry_of(vec![("bad", bad), ("good", good.clone())]);

        let outcomes = backup(
            &registry,
            BackupSource::Bytes {
                data: Bytes::from_static(b"payload"),
                name: "backup.txt".to_string(),
                mime_type: "text/plain".to_string(),
            },
            &[pid("bad"), pid("good")],
            timeout(),
        )
        .await
        .unwrap();

        assert!(!outcomes[0].success);
        assert!(outcomes[1].success);
        assert_eq!(good.file_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_target_becomes_failed_outcome() {
        let a = Arc::new(MemoryAdapter::with_capacity(100));
        let registry = registry_of(vec![("a", a)]);

        let outcomes = backup(
            &registry,
            BackupSource::Bytes {
                data: Bytes::from_static(b"x"),
                name: "f.txt".to_string(),
                mime_type: "text/plain".to_string(),
            },
            &[pid("a"), pid("ghost")],
            timeout(),
        )
        .await
        .unwrap();

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[0].success);
        assert!(!outcomes[1].success);
    }

    #[tokio::test]
    async fn test_existing_source_preserves_name_and_mime() {
        let source = Arc::new(MemoryAdapter::with_capacity(100));
        let uploaded = source
            .upload_file(Bytes::from_static(b"original"), "report.pdf", "application/pdf")
            .await
            .unwrap();
        let target = Arc::new(MemoryAdapter::with_capacity(100));
        let registry = registry_of(vec![("src", source), ("dst", target.clone())]);

        let outcomes = backup(
            &registry,
            BackupSource::Existing {
                provider: pid("src"),
                file_id: uploaded.file_id,
            },
            &[pid("dst")],
            timeout(),
        )
        .await
        .unwrap();

        assert!(outcomes[0].success);
        let copies = target.list_files(None).await.unwrap();
        assert_eq!(copies[0].name, "report.pdf");
        assert_eq!(copies[0].mime_type, "application/pdf");
    }

    #[tokio::test]
    async fn test_missing_source_file_fails_whole_operation() {
        let source = Arc::new(MemoryAdapter::with_capacity(100));
        let registry = registry_of(vec![("src", source)]);

        let result = backup(
            &registry,
            BackupSource::Existing {
                provider: pid("src"),
                file_id: "missing".to_string(),
            },
            &[pid("src")],
            timeout(),
        )
        .await;

        assert!(matches!(result, Err(Error::NotFound(_))));
    }
}
