use tokio::io::AsyncRead;

use crate::video::VideoId;

pub mod fs_impl;
pub mod mem_impl;

pub use fs_impl::FsBlobStore;
pub use mem_impl::MemBlobStore;

#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("no blob stored for video {0}")]
    NotFound(VideoId),
    #[error("blob storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A key-addressed byte store holding one payload per video.
///
/// A repeated `save` for the same id replaces the previous payload. A failed
/// `save` may leave the old payload, no payload, or (depending on the backend)
/// a partial one, so `exists` is only meaningful after a successful `save`.
#[async_trait::async_trait]
pub trait BlobStore: Send + Sync + 'static {
    type Read: AsyncRead + Send + Unpin + 'static;

    async fn exists(&self, id: VideoId) -> Result<bool, BlobError>;

    /// Consumes `data` until EOF, returning the number of bytes stored.
    async fn save<R>(&self, id: VideoId, data: R) -> Result<u64, BlobError>
    where
        R: AsyncRead + Send + Unpin;

    async fn read(&self, id: VideoId) -> Result<Self::Read, BlobError>;
}
