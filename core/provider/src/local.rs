//! Local filesystem provider adapter.
//!
//! Backs a quota-limited "provider" with a directory on disk. Useful as a
//! real (non-mock) adapter for development and for staging data alongside
//! remote backends. Native file identifiers are paths relative to the
//! adapter root.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::fs;

use omnidrive_common::{Error, FileMetadata, Quota, Result, Uploaded};

use crate::adapter::{ProviderAdapter, SearchOptions};

/// Local filesystem provider adapter with a configured capacity.
pub struct LocalAdapter {
    root: PathBuf,
    capacity: u64,
}

impl LocalAdapter {
    /// Create a new local adapter rooted at `root` with `capacity` bytes.
    ///
    /// The root directory is created if it does not exist.
    ///
    /// # Errors
    /// - Invalid path or permission denied
    pub fn new(root: impl AsRef<Path>, capacity: u64) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.exists() {
            std::fs::create_dir_all(&root)?;
        }
        Ok(Self { root, capacity })
    }

    /// Resolve a native id to an absolute path, rejecting escapes.
    fn resolve(&self, id: &str) -> Result<PathBuf> {
        if id.split('/').any(|c| c == "..") || id.starts_with('/') {
            return Err(Error::InvalidInput(format!("Invalid file id: {}", id)));
        }
        Ok(self.root.join(id))
    }

    fn relative_id(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/")
    }

    async fn entry_metadata(&self, path: &Path) -> Result<FileMetadata> {
        let fs_meta = fs::metadata(path).await?;
        let modified: DateTime<Utc> = fs_meta.modified().map(Into::into).unwrap_or_else(|_| Utc::now());
        let created: DateTime<Utc> = fs_meta.created().map(Into::into).unwrap_or(modified);
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        Ok(FileMetadata {
            id: self.relative_id(path),
            size: if fs_meta.is_file() { fs_meta.len() } else { 0 },
            mime_type: if fs_meta.is_dir() {
                "inode/directory".to_string()
            } else {
                mime_for_name(&name).to_string()
            },
            is_folder: fs_meta.is_dir(),
            name,
            created,
            modified,
            content_hash: None,
        })
    }

    /// Walk the tree under `start`, collecting metadata for every entry.
    async fn walk(&self, start: &Path) -> Result<Vec<FileMetadata>> {
        let mut entries = Vec::new();
        let mut pending = vec![start.to_path_buf()];

        while let Some(dir) = pending.pop() {
            let mut read_dir = fs::read_dir(&dir).await?;
            while let Some(entry) = read_dir.next_entry().await? {
                let path = entry.path();
                entries.push(self.entry_metadata(&path).await?);
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                }
            }
        }

        entries.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(entries)
    }

    async fn used_bytes(&self) -> Result<u64> {
        let entries = self.walk(&self.root).await?;
        Ok(entries.iter().map(|e| e.size).sum())
    }
}

/// Best-effort MIME detection from the file extension.
fn mime_for_name(name: &str) -> &'static str {
    let ext = name.rsplit('.').next().unwrap_or("");
    match ext.to_ascii_lowercase().as_str() {
        "txt" | "md" | "log" => "text/plain",
        "json" => "application/json",
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "mp4" => "video/mp4",
        "mp3" => "audio/mpeg",
        "zip" => "application/zip",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        _ => "application/octet-stream",
    }
}

#[async_trait]
impl ProviderAdapter for LocalAdapter {
    fn backend(&self) -> &str {
        "local"
    }

    async fn get_quota(&self) -> Result<Quota> {
        Ok(Quota::new(self.used_bytes().await?, self.capacity))
    }

    async fn list_files(&self, parent_id: Option<&str>) -> Result<Vec<FileMetadata>> {
        let start = match parent_id {
            Some(parent) => {
                let dir = self.resolve(parent)?;
                if !dir.is_dir() {
                    return Err(Error::NotFound(format!("Folder not found: {}", parent)));
                }
                dir
            }
            None => self.root.clone(),
        };
        self.walk(&start).await
    }

    async fn search_files(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<FileMetadata>> {
        let needle = query.to_lowercase();
        let mut entries: Vec<FileMetadata> = self
            .walk(&self.root)
            .await?
            .into_iter()
            .filter(|e| !e.is_folder && e.name.to_lowercase().contains(&needle))
            .filter(|e| match &options.mime_type {
                Some(mime) => &e.mime_type == mime,
                None => true,
            })
            .collect();
        if let Some(max) = options.max_results {
            entries.truncate(max);
        }
        Ok(entries)
    }

    async fn get_file_metadata(&self, file_id: &str) -> Result<Option<FileMetadata>> {
        let path = self.resolve(file_id)?;
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(self.entry_metadata(&path).await?))
    }

    async fn upload_file(&self, data: Bytes, name: &str, mime_type: &str) -> Result<Uploaded> {
        if name.is_empty() || name.contains('/') || name.contains('\\') {
            return Err(Error::InvalidInput(format!("Invalid file name: {}", name)));
        }

        let size = data.len() as u64;
        if self.used_bytes().await? + size > self.capacity {
            return Err(Error::Backend(format!(
                "Insufficient space for '{}' ({} bytes)",
                name, size
            )));
        }

        let path = self.root.join(name);
        fs::write(&path, &data).await?;

        Ok(Uploaded {
            file_id: self.relative_id(&path),
            url: None,
            size,
            mime_type: mime_type.to_string(),
        })
    }

    async fn download_file(&self, file_id: &str) -> Result<Option<Bytes>> {
        let path = self.resolve(file_id)?;
        if !path.is_file() {
            return Ok(None);
        }
        Ok(Some(Bytes::from(fs::read(&path).await?)))
    }

    async fn delete_file(&self, file_id: &str) -> Result<bool> {
        let path = self.resolve(file_id)?;
        if !path.is_file() {
            return Ok(false);
        }
        fs::remove_file(&path).await?;
        Ok(true)
    }

    async fn move_file(&self, file_id: &str, new_parent_id: &str) -> Result<bool> {
        let from = self.resolve(file_id)?;
        let parent = self.resolve(new_parent_id)?;
        if !from.is_file() || !parent.is_dir() {
            return Ok(false);
        }
        let Some(file_name) = from.file_name() else {
            return Ok(false);
        };
        fs::rename(&from, parent.join(file_name)).await?;
        Ok(true)
    }

    async fn create_folder(&self, name: &str, parent_id: Option<&str>) -> Result<String> {
        if name.is_empty() || name.contains('/') || name.contains('\\') {
            return Err(Error::InvalidInput(format!("Invalid folder name: {}", name)));
        }
        let parent = match parent_id {
            Some(parent) => self.resolve(parent)?,
            None => self.root.clone(),
        };
        let path = parent.join(name);
        fs::create_dir_all(&path).await?;
        Ok(self.relative_id(&path))
    }
}
