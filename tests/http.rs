use std::io::{self, Cursor};
use std::net::SocketAddr;
use std::sync::Arc;

use dataup::blobstore::{BlobError, BlobStore, FsBlobStore, MemBlobStore};
use dataup::server;
use dataup::{Video, VideoId, VideoInput, VideoRegistry, VideoState, VideoStatus};
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde_json::json;
use tokio::io::AsyncRead;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

struct TestServer {
    addr: SocketAddr,
    client: reqwest::Client,
    _shutdown: oneshot::Sender<()>,
}

impl TestServer {
    async fn start<B: BlobStore>(blobstore: B) -> Self {
        Self::start_with_limit(blobstore, 16 * 1024 * 1024).await
    }

    async fn start_with_limit<B: BlobStore>(blobstore: B, body_limit: usize) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let registry = Arc::new(VideoRegistry::new(blobstore));

        let (tx, rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            server::serve(listener, registry, body_limit, async {
                let _ = rx.await;
            })
            .await
            .unwrap();
        });

        Self {
            addr,
            client: reqwest::Client::new(),
            _shutdown: tx,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    async fn add(&self, input: &VideoInput) -> Video {
        let res = self
            .client
            .post(self.url("/video"))
            .json(input)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        res.json().await.unwrap()
    }

    async fn upload(&self, data_url: &str, contents: Vec<u8>) -> reqwest::Response {
        let form = Form::new().part("data", Part::bytes(contents).file_name("video.mp4"));
        self.client
            .post(data_url)
            .multipart(form)
            .send()
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn upload_and_download_flow() {
    let server = TestServer::start(MemBlobStore::new()).await;

    let input = VideoInput {
        title: "A".into(),
        duration: 42,
        content_type: "video/mp4".into(),
    };
    let a = server.add(&input).await;
    assert_eq!(a.id, VideoId(1));
    assert_eq!(
        a.data_url,
        format!("http://127.0.0.1:{}/video/1/data", server.addr.port())
    );

    let b = server.add(&VideoInput::titled("B")).await;
    assert_eq!(b.id, VideoId(2));

    let listed: Vec<Video> = server
        .client
        .get(server.url("/video"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed, vec![a.clone(), b.clone()]);

    let res = server.upload(&a.data_url, b"hello".to_vec()).await;
    assert_eq!(res.status(), StatusCode::OK);
    let status: VideoStatus = res.json().await.unwrap();
    assert_eq!(status.state, VideoState::Ready);

    let res = server.client.get(&a.data_url).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["content-type"], "video/mp4");
    assert_eq!(res.bytes().await.unwrap(), &b"hello"[..]);

    // known id without data
    let res = server.client.get(&b.data_url).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["code"], "not_found");
}

#[tokio::test]
async fn client_supplied_ids_are_overwritten() {
    let server = TestServer::start(MemBlobStore::new()).await;

    let res = server
        .client
        .post(server.url("/video"))
        .header("host", "videos.example")
        .json(&json!({
            "id": 1000,
            "title": "sneaky",
            "dataUrl": "http://elsewhere/",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let video: Video = res.json().await.unwrap();
    assert_eq!(video.id, VideoId(1));
    assert_eq!(video.data_url, "http://videos.example/video/1/data");
}

#[tokio::test]
async fn invalid_metadata_is_a_client_error() {
    let server = TestServer::start(MemBlobStore::new()).await;

    for body in ["", "not json", r#"{"duration": 3}"#, r#"{"title": ""}"#] {
        let res = server
            .client
            .post(server.url("/video"))
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST, "body: {body:?}");
    }
}

#[tokio::test]
async fn unknown_ids_are_not_found() {
    let server = TestServer::start(MemBlobStore::new()).await;
    server.add(&VideoInput::titled("A")).await;

    for id in ["0", "-5", "2", "abc"] {
        let url = server.url(&format!("/video/{id}/data"));

        let res = server.upload(&url, b"data".to_vec()).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND, "upload to {id}");

        let res = server.client.get(&url).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND, "download from {id}");
    }
}

#[tokio::test]
async fn upload_without_data_field_is_rejected() {
    let server = TestServer::start(MemBlobStore::new()).await;
    let video = server.add(&VideoInput::titled("A")).await;

    let form = Form::new().text("other", "value");
    let res = server
        .client
        .post(&video.data_url)
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid argument: missing multipart field `data`");

    let res = server.client.get(&video.data_url).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn reupload_overwrites_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let server = TestServer::start(FsBlobStore::open(dir.path()).await.unwrap()).await;
    let video = server.add(&VideoInput::titled("A")).await;

    let first: Vec<u8> = (0..300_000u32).map(|i| (i % 256) as u8).collect();
    let res = server.upload(&video.data_url, first.clone()).await;
    assert_eq!(res.status(), StatusCode::OK);

    let res = server.client.get(&video.data_url).send().await.unwrap();
    assert_eq!(res.headers()["content-type"], "application/octet-stream");
    assert_eq!(res.bytes().await.unwrap(), first);

    let res = server.upload(&video.data_url, Vec::new()).await;
    assert_eq!(res.status(), StatusCode::OK);

    let res = server.client.get(&video.data_url).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.bytes().await.unwrap().is_empty());
}

#[tokio::test]
async fn oversized_uploads_are_client_errors() {
    let server = TestServer::start_with_limit(MemBlobStore::new(), 16 * 1024).await;
    let video = server.add(&VideoInput::titled("A")).await;

    let res = server.upload(&video.data_url, vec![7; 128 * 1024]).await;
    assert!(res.status().is_client_error(), "status: {}", res.status());
    let body: serde_json::Value = res.json().await.unwrap();
    assert_ne!(body["code"], "storage_failure");

    // nothing was stored
    let res = server.client.get(&video.data_url).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = server.upload(&video.data_url, vec![7; 4 * 1024]).await;
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn negative_durations_are_accepted() {
    let server = TestServer::start(MemBlobStore::new()).await;

    let res = server
        .client
        .post(server.url("/video"))
        .json(&json!({ "title": "A", "duration": -1 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let video: Video = res.json().await.unwrap();
    assert_eq!(video.duration, -1);
}

/// Has data for every id, but fails to read or write any of it.
struct BrokenDisk;

#[async_trait::async_trait]
impl BlobStore for BrokenDisk {
    type Read = Cursor<Vec<u8>>;

    async fn exists(&self, _id: VideoId) -> Result<bool, BlobError> {
        Ok(true)
    }

    async fn save<R>(&self, _id: VideoId, _data: R) -> Result<u64, BlobError>
    where
        R: AsyncRead + Send + Unpin,
    {
        Err(io::Error::other("disk full").into())
    }

    async fn read(&self, _id: VideoId) -> Result<Self::Read, BlobError> {
        Err(io::Error::other("bad sector").into())
    }
}

#[tokio::test]
async fn storage_failures_are_server_errors() {
    let server = TestServer::start(BrokenDisk).await;
    let video = server.add(&VideoInput::titled("A")).await;

    let res = server.upload(&video.data_url, b"data".to_vec()).await;
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["code"], "storage_failure");

    let res = server.client.get(&video.data_url).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
}
