use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::RwLock;

use crate::blobstore::{BlobError, BlobStore};
use crate::video::{BaseUrl, Video, VideoId, VideoInput, VideoStatus};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Covers unknown ids as well as known ids without uploaded data.
    #[error("video {0} not found")]
    NotFound(VideoId),
    #[error("storage failure for video {id}")]
    StorageFailure {
        id: VideoId,
        #[source]
        source: BlobError,
    },
}

impl RegistryError {
    fn from_blob(id: VideoId, err: BlobError) -> Self {
        match err {
            BlobError::NotFound(_) => Self::NotFound(id),
            source => Self::StorageFailure { id, source },
        }
    }
}

/// The in-memory authority over video metadata, coupled to a [`BlobStore`]
/// holding the payloads.
///
/// Entries are only ever inserted. Whether a video has data is not recorded
/// here; it is whatever the blob store says.
#[derive(Debug)]
pub struct VideoRegistry<B> {
    last_id: AtomicI64,
    videos: RwLock<BTreeMap<VideoId, Video>>,
    blobstore: B,
}

impl<B: BlobStore> VideoRegistry<B> {
    pub fn new(blobstore: B) -> Self {
        Self {
            last_id: AtomicI64::new(0),
            videos: Default::default(),
            blobstore,
        }
    }

    pub fn blobstore(&self) -> &B {
        &self.blobstore
    }

    /// A snapshot of all videos, ordered by id.
    pub async fn list_videos(&self) -> Vec<Video> {
        self.videos.read().await.values().cloned().collect()
    }

    pub async fn add_video(
        &self,
        input: VideoInput,
        base: &BaseUrl,
    ) -> Result<Video, RegistryError> {
        if input.title.trim().is_empty() {
            return Err(RegistryError::InvalidArgument("video title must not be empty".into()));
        }

        let id = self.next_id();
        let video = Video {
            id,
            title: input.title,
            duration: input.duration,
            content_type: input.content_type,
            data_url: base.data_url(id),
        };

        self.videos.write().await.insert(id, video.clone());
        tracing::info!(%id, title = %video.title, data_url = %video.data_url, "added video");

        Ok(video)
    }

    pub async fn get_video(&self, id: VideoId) -> Result<Video, RegistryError> {
        if !id.is_valid() {
            return Err(RegistryError::NotFound(id));
        }
        let videos = self.videos.read().await;
        videos.get(&id).cloned().ok_or(RegistryError::NotFound(id))
    }

    /// Stores `data` as the payload of video `id`, replacing any earlier upload.
    pub async fn attach_data<R>(
        &self,
        id: VideoId,
        data: R,
    ) -> Result<VideoStatus, RegistryError>
    where
        R: AsyncRead + Send + Unpin,
    {
        self.get_video(id).await?;

        let len = self
            .blobstore
            .save(id, data)
            .await
            .map_err(|source| RegistryError::StorageFailure { id, source })?;
        tracing::info!(%id, size_bytes = len, "attached video data");

        Ok(VideoStatus::READY)
    }

    /// Resolves `id` and opens its payload for reading.
    pub async fn open_data(&self, id: VideoId) -> Result<(Video, B::Read), RegistryError> {
        let video = self.get_video(id).await?;

        let exists = self
            .blobstore
            .exists(id)
            .await
            .map_err(|err| RegistryError::from_blob(id, err))?;
        if !exists {
            return Err(RegistryError::NotFound(id));
        }

        let reader = self
            .blobstore
            .read(id)
            .await
            .map_err(|err| RegistryError::from_blob(id, err))?;
        Ok((video, reader))
    }

    /// Copies the payload of video `id` into `sink`, returning the number of bytes written.
    pub async fn stream_data<W>(&self, id: VideoId, sink: &mut W) -> Result<u64, RegistryError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let (_, mut reader) = self.open_data(id).await?;
        tokio::io::copy(&mut reader, sink)
            .await
            .map_err(|err| RegistryError::from_blob(id, err.into()))
    }

    fn next_id(&self) -> VideoId {
        VideoId(self.last_id.fetch_add(1, Ordering::Relaxed) + 1)
    }
}
