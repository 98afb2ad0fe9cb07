use std::path::Path;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

use crate::error::StoreError;
use crate::traits::BlobStore;

/// Keeps attachments as files under a root directory and hands out URLs below a base URL.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root:     PathBuf,
    base_url: String,
}

impl LocalBlobStore {
    pub fn new<P: Into<PathBuf>, U: ToString>(root: P, base_url: U) -> Self {
        Self {
            root:     root.into(),
            base_url: base_url.to_string().trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Names are reduced to their last path component and prefixed with a fresh id, so they can neither escape the
    /// root nor clash.
    fn file_name(name: &str) -> Result<String, StoreError> {
        let base = Path::new(name.trim())
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| StoreError::Rejected(format!("bad attachment name '{name}'")))?;
        Ok(format!("{}-{base}", Uuid::new_v4().simple()))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, name: &str, bytes: &[u8]) -> Result<String, StoreError> {
        let file_name = Self::file_name(name)?;
        let io_err = |e: std::io::Error| StoreError::Unavailable(format!("{}: {e}", self.root.display()));

        tokio::fs::create_dir_all(&self.root).await.map_err(io_err)?;
        let path = self.root.join(&file_name);
        let mut file = tokio::fs::File::create(&path).await.map_err(io_err)?;
        file.write_all(bytes).await.map_err(io_err)?;
        file.flush().await.map_err(io_err)?;

        debug!("stored {} byte(s) as {}", bytes.len(), path.display());
        Ok(format!("{}/{file_name}", self.base_url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stores_under_root() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = LocalBlobStore::new(dir.path(), "https://img.example.com/");

        let url = blobs.put("../../etc/lamp.png", b"png").await.unwrap();
        assert!(url.starts_with("https://img.example.com/"));
        assert!(url.ends_with("-lamp.png"));

        let file_name = url.rsplit('/').next().unwrap();
        let stored = tokio::fs::read(dir.path().join(file_name)).await.unwrap();
        assert_eq!(stored, b"png");
    }

    #[tokio::test]
    async fn empty_name_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = LocalBlobStore::new(dir.path(), "/img");
        assert!(matches!(blobs.put("  ", b"x").await, Err(StoreError::Rejected(_))));
    }
}
