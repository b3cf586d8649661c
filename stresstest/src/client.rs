use std::io::Read;

use anyhow::{bail, ensure, Context, Result};
use dataup::{Video, VideoId, VideoInput, VideoState, VideoStatus};
use reqwest::multipart::{Form, Part};

use crate::workload::Payload;

pub struct VideoClient {
    pub base_url: String,
    pub client: reqwest::Client,
}

impl VideoClient {
    fn data_url(&self, id: VideoId) -> String {
        format!("{}/video/{id}/data", self.base_url)
    }

    pub async fn add_video(&self, title: String) -> Result<VideoId> {
        let input = VideoInput {
            title,
            duration: 0,
            content_type: "application/octet-stream".into(),
        };
        let video: Video = self
            .client
            .post(format!("{}/video", self.base_url))
            .json(&input)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        ensure!(
            video.data_url.ends_with(&format!("/video/{}/data", video.id)),
            "unexpected data url {:?} for {:?}",
            video.data_url,
            video.id
        );
        Ok(video.id)
    }

    pub async fn list_videos(&self) -> Result<Vec<Video>> {
        let videos = self
            .client
            .get(format!("{}/video", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(videos)
    }

    pub async fn upload(&self, id: VideoId, mut payload: Payload) -> Result<()> {
        let mut contents = Vec::with_capacity(payload.len as usize);
        payload.read_to_end(&mut contents)?;

        let form = Form::new().part("data", Part::bytes(contents).file_name("payload.bin"));
        let status: VideoStatus = self
            .client
            .post(self.data_url(id))
            .multipart(form)
            .send()
            .await?
            .error_for_status()
            .with_context(|| format!("uploading {id:?}"))?
            .json()
            .await?;

        ensure!(status.state == VideoState::Ready, "upload of {id:?} returned {status:?}");
        Ok(())
    }

    pub async fn read(&self, id: VideoId, mut payload: Payload) -> Result<()> {
        let contents = self
            .client
            .get(self.data_url(id))
            .send()
            .await?
            .error_for_status()
            .with_context(|| format!("downloading {id:?}"))?
            .bytes()
            .await?;

        let mut expected_payload = Vec::new();
        payload.read_to_end(&mut expected_payload)?;

        if contents != expected_payload {
            bail!("readback mismatch for {id:?}");
        }
        Ok(())
    }
}
