use std::collections::HashMap;
use std::io::Cursor;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::RwLock;

use super::{BlobError, BlobStore};
use crate::video::VideoId;

/// Keeps every payload in memory for the lifetime of the process.
#[derive(Debug, Default)]
pub struct MemBlobStore {
    blobs: RwLock<HashMap<VideoId, Bytes>>,
}

impl MemBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl BlobStore for MemBlobStore {
    type Read = Cursor<Bytes>;

    async fn exists(&self, id: VideoId) -> Result<bool, BlobError> {
        Ok(self.blobs.read().await.contains_key(&id))
    }

    async fn save<R>(&self, id: VideoId, mut data: R) -> Result<u64, BlobError>
    where
        R: AsyncRead + Send + Unpin,
    {
        // buffer first, so a failing stream never replaces an existing blob
        let mut buf = Vec::new();
        let len = data.read_to_end(&mut buf).await? as u64;

        self.blobs.write().await.insert(id, Bytes::from(buf));
        tracing::debug!(%id, size_bytes = len, "stored blob in memory");

        Ok(len)
    }

    async fn read(&self, id: VideoId) -> Result<Self::Read, BlobError> {
        let blobs = self.blobs.read().await;
        let blob = blobs.get(&id).cloned().ok_or(BlobError::NotFound(id))?;
        Ok(Cursor::new(blob))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn read_all(store: &MemBlobStore, id: VideoId) -> Vec<u8> {
        let mut contents = vec![];
        let mut reader = store.read(id).await.unwrap();
        reader.read_to_end(&mut contents).await.unwrap();
        contents
    }

    #[tokio::test]
    async fn test_mem_blobstore() {
        let store = MemBlobStore::new();
        let id = VideoId(1);

        assert!(!store.exists(id).await.unwrap());
        assert!(matches!(
            store.read(id).await,
            Err(BlobError::NotFound(VideoId(1)))
        ));

        let len = store.save(id, &b"first upload"[..]).await.unwrap();
        assert_eq!(len, 12);
        assert!(store.exists(id).await.unwrap());
        assert_eq!(read_all(&store, id).await, b"first upload");

        store.save(id, &b"second"[..]).await.unwrap();
        assert_eq!(read_all(&store, id).await, b"second");

        assert!(!store.exists(VideoId(2)).await.unwrap());
    }

    #[tokio::test]
    async fn stores_empty_payloads() {
        let store = MemBlobStore::new();
        store.save(VideoId(5), &b""[..]).await.unwrap();

        assert!(store.exists(VideoId(5)).await.unwrap());
        assert!(read_all(&store, VideoId(5)).await.is_empty());
    }
}
