use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs::{self, File};
use tokio::io::AsyncRead;

use super::{BlobError, BlobStore};
use crate::video::VideoId;

/// Stores each payload as `<root>/<id>.bin`.
///
/// Writes go to a temporary file in the same directory which is then renamed
/// over the target, so a reader sees either the previous payload or the new
/// one, never a truncated file.
#[derive(Debug)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, BlobError> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        tracing::debug!(root = %root.display(), "opened filesystem blob store");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, id: VideoId) -> PathBuf {
        self.root.join(format!("{id}.bin"))
    }

    fn temp_path(&self) -> PathBuf {
        self.root.join(format!(".{}.tmp", uuid::Uuid::new_v4()))
    }
}

#[async_trait::async_trait]
impl BlobStore for FsBlobStore {
    type Read = File;

    async fn exists(&self, id: VideoId) -> Result<bool, BlobError> {
        Ok(fs::try_exists(self.blob_path(id)).await?)
    }

    async fn save<R>(&self, id: VideoId, mut data: R) -> Result<u64, BlobError>
    where
        R: AsyncRead + Send + Unpin,
    {
        let temp_path = self.temp_path();
        let path = self.blob_path(id);

        let write = async {
            let mut file = File::create(&temp_path).await?;
            let len = tokio::io::copy(&mut data, &mut file).await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&temp_path, &path).await?;
            Ok::<_, std::io::Error>(len)
        };

        match write.await {
            Ok(len) => {
                tracing::debug!(%id, size_bytes = len, path = %path.display(), "stored blob");
                Ok(len)
            }
            Err(err) => {
                if let Err(cleanup_err) = fs::remove_file(&temp_path).await {
                    if cleanup_err.kind() != ErrorKind::NotFound {
                        tracing::warn!(
                            path = %temp_path.display(),
                            error = %cleanup_err,
                            "failed to remove temporary blob file"
                        );
                    }
                }
                Err(err.into())
            }
        }
    }

    async fn read(&self, id: VideoId) -> Result<Self::Read, BlobError> {
        match File::open(self.blob_path(id)).await {
            Ok(file) => Ok(file),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(BlobError::NotFound(id)),
            Err(err) => Err(err.into()),
        }
    }
}
