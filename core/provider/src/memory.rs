//! In-memory provider adapter for testing and development.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use uuid::Uuid;

use omnidrive_common::{Error, FileMetadata, Quota, Result, Uploaded};

use crate::adapter::{ProviderAdapter, SearchOptions};

/// Global fault applied to every adapter call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Every call fails with `NotAuthenticated`.
    Unauthenticated,
    /// Every call fails with `Backend`.
    Unavailable,
}

#[derive(Debug, Clone, Default)]
struct Faults {
    global: Option<Fault>,
    fail_uploads: bool,
    fail_deletes: bool,
    delay: Option<Duration>,
}

#[derive(Debug, Clone)]
struct StoredFile {
    data: Bytes,
    meta: FileMetadata,
    parent: Option<String>,
}

#[derive(Debug, Clone)]
struct StoredFolder {
    name: String,
    parent: Option<String>,
}

/// In-memory provider adapter.
///
/// Backs a fixed-capacity store entirely in memory, enforcing capacity on
/// upload like a real quota-limited backend. Fault injection hooks let the
/// aggregation engine's tests exercise authentication failures, backend
/// outages, per-operation failures, and slow calls. All data is lost on
/// drop.
pub struct MemoryAdapter {
    capacity: u64,
    files: Arc<RwLock<HashMap<String, StoredFile>>>,
    folders: Arc<RwLock<HashMap<String, StoredFolder>>>,
    faults: Arc<RwLock<Faults>>,
}

impl MemoryAdapter {
    /// Create an adapter with the given total capacity in bytes.
    pub fn with_capacity(capacity: u64) -> Self {
        Self {
            capacity,
            files: Arc::new(RwLock::new(HashMap::new())),
            folders: Arc::new(RwLock::new(HashMap::new())),
            faults: Arc::new(RwLock::new(Faults::default())),
        }
    }

    /// Inject or clear a global fault affecting every call.
    pub fn set_fault(&self, fault: Option<Fault>) {
        self.faults.write().unwrap().global = fault;
    }

    /// Make `upload_file` fail while leaving other calls working.
    pub fn fail_uploads(&self, fail: bool) {
        self.faults.write().unwrap().fail_uploads = fail;
    }

    /// Make `delete_file` fail while leaving other calls working.
    pub fn fail_deletes(&self, fail: bool) {
        self.faults.write().unwrap().fail_deletes = fail;
    }

    /// Delay every call by `delay` (for exercising per-call timeouts).
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.faults.write().unwrap().delay = delay;
    }

    /// Number of stored files (test helper).
    pub fn file_count(&self) -> usize {
        self.files.read().unwrap().len()
    }

    async fn check_faults(&self) -> Result<()> {
        let (global, delay) = {
            let faults = self.faults.read().unwrap();
            (faults.global, faults.delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match global {
            Some(Fault::Unauthenticated) => Err(Error::NotAuthenticated(
                "memory adapter has no credential".to_string(),
            )),
            Some(Fault::Unavailable) => {
                Err(Error::Backend("memory backend unavailable".to_string()))
            }
            None => Ok(()),
        }
    }

    fn used_bytes(&self) -> u64 {
        self.files
            .read()
            .unwrap()
            .values()
            .map(|f| f.meta.size)
            .sum()
    }
}

#[async_trait]
impl ProviderAdapter for MemoryAdapter {
    fn backend(&self) -> &str {
        "memory"
    }

    async fn get_quota(&self) -> Result<Quota> {
        self.check_faults().await?;
        Ok(Quota::new(self.used_bytes(), self.capacity))
    }

    async fn list_files(&self, parent_id: Option<&str>) -> Result<Vec<FileMetadata>> {
        self.check_faults().await?;
        let files = self.files.read().unwrap();
        let mut entries: Vec<FileMetadata> = files
            .values()
            .filter(|f| match parent_id {
                Some(parent) => f.parent.as_deref() == Some(parent),
                None => true,
            })
            .map(|f| f.meta.clone())
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn search_files(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<FileMetadata>> {
        self.check_faults().await?;
        let needle = query.to_lowercase();
        let files = self.files.read().unwrap();
        let mut entries: Vec<FileMetadata> = files
            .values()
            .filter(|f| f.meta.name.to_lowercase().contains(&needle))
            .filter(|f| match &options.mime_type {
                Some(mime) => &f.meta.mime_type == mime,
                None => true,
            })
            .map(|f| f.meta.clone())
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        if let Some(max) = options.max_results {
            entries.truncate(max);
        }
        Ok(entries)
    }

    async fn get_file_metadata(&self, file_id: &str) -> Result<Option<FileMetadata>> {
        self.check_faults().await?;
        Ok(self
            .files
            .read()
            .unwrap()
            .get(file_id)
            .map(|f| f.meta.clone()))
    }

    async fn upload_file(&self, data: Bytes, name: &str, mime_type: &str) -> Result<Uploaded> {
        self.check_faults().await?;
        if self.faults.read().unwrap().fail_uploads {
            return Err(Error::Backend("injected upload failure".to_string()));
        }
        if name.is_empty() {
            return Err(Error::InvalidInput("File name cannot be empty".to_string()));
        }

        let size = data.len() as u64;
        if self.used_bytes() + size > self.capacity {
            return Err(Error::Backend(format!(
                "Insufficient space for '{}' ({} bytes)",
                name, size
            )));
        }

        let now = Utc::now();
        let id = Uuid::new_v4().to_string();
        let meta = FileMetadata {
            id: id.clone(),
            name: name.to_string(),
            size,
            mime_type: mime_type.to_string(),
            is_folder: false,
            created: now,
            modified: now,
            content_hash: None,
        };

        self.files.write().unwrap().insert(
            id.clone(),
            StoredFile {
                data,
                meta,
                parent: None,
            },
        );

        Ok(Uploaded {
            file_id: id,
            url: None,
            size,
            mime_type: mime_type.to_string(),
        })
    }

    async fn download_file(&self, file_id: &str) -> Result<Option<Bytes>> {
        self.check_faults().await?;
        Ok(self
            .files
            .read()
            .unwrap()
            .get(file_id)
            .map(|f| f.data.clone()))
    }

    async fn delete_file(&self, file_id: &str) -> Result<bool> {
        self.check_faults().await?;
        if self.faults.read().unwrap().fail_deletes {
            return Err(Error::Backend("injected delete failure".to_string()));
        }
        Ok(self.files.write().unwrap().remove(file_id).is_some())
    }

    async fn move_file(&self, file_id: &str, new_parent_id: &str) -> Result<bool> {
        self.check_faults().await?;
        if !self.folders.read().unwrap().contains_key(new_parent_id) {
            return Ok(false);
        }
        let mut files = self.files.write().unwrap();
        match files.get_mut(file_id) {
            Some(file) => {
                file.parent = Some(new_parent_id.to_string());
                file.meta.modified = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn create_folder(&self, name: &str, parent_id: Option<&str>) -> Result<String> {
        self.check_faults().await?;
        if name.is_empty() {
            return Err(Error::InvalidInput(
                "Folder name cannot be empty".to_string(),
            ));
        }
        let id = Uuid::new_v4().to_string();
        self.folders.write().unwrap().insert(
            id.clone(),
            StoredFolder {
                name: name.to_string(),
                parent: parent_id.map(String::from),
            },
        );
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upload_download() {
        let adapter = MemoryAdapter::with_capacity(1024);
        let data = Bytes::from_static(b"Hello, World!");

        let uploaded = adapter
            .upload_file(data.clone(), "hello.txt", "text/plain")
            .await
            .unwrap();
        assert_eq!(uploaded.size, 13);

        let downloaded = adapter.download_file(&uploaded.file_id).await.unwrap();
        assert_eq!(downloaded, Some(data));
    }

    #[tokio::test]
    async fn test_quota_tracks_usage() {
        let adapter = MemoryAdapter::with_capacity(100);
        adapter
            .upload_file(Bytes::from(vec![0u8; 40]), "a.bin", "application/octet-stream")
            .await
            .unwrap();

        let quota = adapter.get_quota().await.unwrap();
        assert_eq!(quota.used, 40);
        assert_eq!(quota.available, 60);
    }

    #[tokio::test]
    async fn test_upload_over_capacity_fails() {
        let adapter = MemoryAdapter::with_capacity(10);
        let result = adapter
            .upload_file(Bytes::from(vec![0u8; 11]), "big.bin", "application/octet-stream")
            .await;
        assert!(matches!(result, Err(Error::Backend(_))));
    }

    #[tokio::test]
    async fn test_delete() {
        let adapter = MemoryAdapter::with_capacity(100);
        let uploaded = adapter
            .upload_file(Bytes::from_static(b"x"), "x.txt", "text/plain")
            .await
            .unwrap();

        assert!(adapter.delete_file(&uploaded.file_id).await.unwrap());
        assert!(!adapter.delete_file(&uploaded.file_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_search() {
        let adapter = MemoryAdapter::with_capacity(100);
        adapter
            .upload_file(Bytes::from_static(b"1"), "report.pdf", "application/pdf")
            .await
            .unwrap();
        adapter
            .upload_file(Bytes::from_static(b"2"), "notes.txt", "text/plain")
            .await
            .unwrap();

        let hits = adapter
            .search_files("REPORT", &SearchOptions::default())
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "report.pdf");
    }

    #[tokio::test]
    async fn test_move_into_folder() {
        let adapter = MemoryAdapter::with_capacity(100);
        let folder = adapter.create_folder("docs", None).await.unwrap();
        let uploaded = adapter
            .upload_file(Bytes::from_static(b"x"), "x.txt", "text/plain")
            .await
            .unwrap();

        assert!(adapter.move_file(&uploaded.file_id, &folder).await.unwrap());
        assert!(!adapter.move_file(&uploaded.file_id, "missing").await.unwrap());

        let in_folder = adapter.list_files(Some(&folder)).await.unwrap();
        assert_eq!(in_folder.len(), 1);
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let adapter = MemoryAdapter::with_capacity(100);

        adapter.set_fault(Some(Fault::Unauthenticated));
        assert!(matches!(
            adapter.get_quota().await,
            Err(Error::NotAuthenticated(_))
        ));

        adapter.set_fault(Some(Fault::Unavailable));
        assert!(matches!(adapter.get_quota().await, Err(Error::Backend(_))));

        adapter.set_fault(None);
        assert!(adapter.get_quota().await.is_ok());
    }
}
