//! Provider adapter trait definition.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use omnidrive_common::{FileMetadata, Quota, Result, Uploaded};

/// Options for a provider-native search.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchOptions {
    /// Maximum number of entries to return (backend default if None).
    pub max_results: Option<usize>,
    /// Restrict results to a specific MIME type.
    pub mime_type: Option<String>,
}

/// Contract implemented by every backend-specific adapter.
///
/// An adapter is pure translation: it maps these generic operations onto
/// one backend's wire protocol and has no awareness of other providers.
/// Implementations must handle their own authentication and rate limiting.
///
/// # Errors
/// Every method must distinguish `Error::NotAuthenticated` (no valid
/// credential) from `Error::Backend` (network/timeout/5xx), because the
/// aggregation layer treats them differently: not-authenticated providers
/// are excluded from aggregate totals rather than retried.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Backend kind this adapter translates to (e.g. "memory", "local").
    fn backend(&self) -> &str;

    /// Get the current quota as reported by the backend.
    ///
    /// Must reflect live backend state; the aggregator never caches it.
    async fn get_quota(&self) -> Result<Quota>;

    /// List files, optionally restricted to one parent folder.
    ///
    /// `None` lists every file the adapter can see.
    async fn list_files(&self, parent_id: Option<&str>) -> Result<Vec<FileMetadata>>;

    /// Search files by name.
    async fn search_files(&self, query: &str, options: &SearchOptions)
        -> Result<Vec<FileMetadata>>;

    /// Get metadata for a single file, or `None` if absent.
    async fn get_file_metadata(&self, file_id: &str) -> Result<Option<FileMetadata>>;

    /// Upload a file.
    ///
    /// # Postconditions
    /// - On success the file exists at the backend under `name`
    ///
    /// # Errors
    /// - Insufficient space, authentication, network
    async fn upload_file(&self, data: Bytes, name: &str, mime_type: &str) -> Result<Uploaded>;

    /// Download a file's content, or `None` if absent.
    async fn download_file(&self, file_id: &str) -> Result<Option<Bytes>>;

    /// Delete a file. Returns false if the file was already absent.
    async fn delete_file(&self, file_id: &str) -> Result<bool>;

    /// Move a file to a new parent folder. Returns false if the file
    /// or the destination folder is absent.
    async fn move_file(&self, file_id: &str, new_parent_id: &str) -> Result<bool>;

    /// Create a folder, returning its native identifier.
    async fn create_folder(&self, name: &str, parent_id: Option<&str>) -> Result<String>;
}
