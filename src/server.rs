use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures_util::StreamExt;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::io::{ReaderStream, StreamReader};
use tower_http::trace::TraceLayer;

use crate::blobstore::{BlobError, BlobStore};
use crate::registry::{RegistryError, VideoRegistry};
use crate::video::{BaseUrl, Video, VideoId, VideoInput, VideoStatus};

const DATA_FIELD: &str = "data";
const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

pub struct AppState<B> {
    pub registry: Arc<VideoRegistry<B>>,
    /// Used for data URLs when a request carries no host information.
    pub local_addr: SocketAddr,
}

impl<B> Clone for AppState<B> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            local_addr: self.local_addr,
        }
    }
}

pub fn router<B: BlobStore>(state: AppState<B>, body_limit: usize) -> Router {
    Router::new()
        .route("/video", get(list_videos::<B>).post(add_video::<B>))
        .route(
            "/video/{id}/data",
            get(download_data::<B>).post(upload_data::<B>),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves the video API on `listener` until `shutdown` resolves.
pub async fn serve<B: BlobStore>(
    listener: TcpListener,
    registry: Arc<VideoRegistry<B>>,
    body_limit: usize,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let local_addr = listener.local_addr()?;
    let app = router(
        AppState {
            registry,
            local_addr,
        },
        body_limit,
    );

    tracing::info!(%local_addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}

async fn list_videos<B: BlobStore>(State(state): State<AppState<B>>) -> Json<Vec<Video>> {
    Json(state.registry.list_videos().await)
}

async fn add_video<B: BlobStore>(
    State(state): State<AppState<B>>,
    uri: Uri,
    headers: HeaderMap,
    input: Result<Json<VideoInput>, JsonRejection>,
) -> Result<Json<Video>, ApiError> {
    let Json(input) = input.map_err(|rejection| {
        RegistryError::InvalidArgument(format!("video metadata: {}", rejection.body_text()))
    })?;

    let base = request_base_url(&uri, &headers)
        .unwrap_or_else(|| BaseUrl::from_socket_addr(state.local_addr));
    let video = state.registry.add_video(input, &base).await?;
    Ok(Json(video))
}

async fn upload_data<B: BlobStore>(
    State(state): State<AppState<B>>,
    Path(id): Path<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<VideoStatus>, ApiError> {
    let id = parse_id(&id)?;
    // answer 404 for unknown ids before looking at the body
    state.registry.get_video(id).await?;

    let mut multipart = multipart
        .map_err(|rejection| RegistryError::InvalidArgument(rejection.body_text()))?;

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(DATA_FIELD) {
            continue;
        }

        let stream = field.map(|result| result.map_err(std::io::Error::other));
        let status = state
            .registry
            .attach_data(id, StreamReader::new(stream))
            .await
            .map_err(upload_error)?;
        return Ok(Json(status));
    }

    Err(RegistryError::InvalidArgument(format!("missing multipart field `{DATA_FIELD}`")).into())
}

async fn download_data<B: BlobStore>(
    State(state): State<AppState<B>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let id = parse_id(&id)?;
    let (video, reader) = state.registry.open_data(id).await?;

    let content_type = HeaderValue::from_str(&video.content_type)
        .ok()
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| HeaderValue::from_static(FALLBACK_CONTENT_TYPE));

    let body = Body::from_stream(ReaderStream::new(reader));
    Ok(([(header::CONTENT_TYPE, content_type)], body).into_response())
}

/// Field errors travel through the blob store as I/O errors. Those are the
/// client's fault (body too large, truncated, malformed), not the storage's.
fn upload_error(err: RegistryError) -> ApiError {
    let (id, io) = match err {
        RegistryError::StorageFailure {
            id,
            source: BlobError::Io(io),
        } => (id, io),
        err => return err.into(),
    };

    let request_error = io
        .get_ref()
        .and_then(|inner| inner.downcast_ref::<MultipartError>())
        .map(|multipart| (multipart.status(), multipart.body_text()));
    match request_error {
        Some((status, message)) => ApiError::Request { status, message },
        None => RegistryError::StorageFailure {
            id,
            source: BlobError::Io(io),
        }
        .into(),
    }
}

/// A path segment that is not a number cannot name a video.
fn parse_id(raw: &str) -> Result<VideoId, RegistryError> {
    raw.parse()
        .map(VideoId)
        .map_err(|_| RegistryError::NotFound(VideoId(0)))
}

/// The base URL as the client addressed us: the request target's authority
/// (HTTP/2, absolute-form requests), or else the `Host` header.
fn request_base_url(uri: &Uri, headers: &HeaderMap) -> Option<BaseUrl> {
    if let Some(authority) = uri.authority() {
        return BaseUrl::from_host_header(authority.as_str());
    }
    let host = headers.get(header::HOST)?.to_str().ok()?;
    BaseUrl::from_host_header(host)
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
}

/// Everything a handler can fail with, rendered as an HTTP response.
#[derive(Debug)]
pub enum ApiError {
    Registry(RegistryError),
    /// The request body could not be read, e.g. it exceeded the body limit.
    Request { status: StatusCode, message: String },
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        Self::Registry(err)
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        Self::Request {
            status: err.status(),
            message: err.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, error) = match self {
            Self::Registry(err) => {
                let (status, code) = match &err {
                    RegistryError::InvalidArgument(_) => {
                        (StatusCode::BAD_REQUEST, "invalid_argument")
                    }
                    RegistryError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
                    RegistryError::StorageFailure { .. } => {
                        (StatusCode::INTERNAL_SERVER_ERROR, "storage_failure")
                    }
                };
                if status.is_server_error() {
                    tracing::error!(error = ?err, "request failed");
                } else {
                    tracing::debug!(error = %err, "request rejected");
                }
                (status, code, err.to_string())
            }
            Self::Request { status, message } => {
                tracing::debug!(%status, error = %message, "unreadable request body");
                let code = if status == StatusCode::PAYLOAD_TOO_LARGE {
                    "payload_too_large"
                } else {
                    "invalid_request"
                };
                (status, code, message)
            }
        };

        (status, Json(ErrorResponse { error, code })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_numeric_ids_are_not_found() {
        assert_eq!(parse_id("12").unwrap(), VideoId(12));
        assert_eq!(parse_id("-3").unwrap(), VideoId(-3));
        assert!(matches!(parse_id("abc"), Err(RegistryError::NotFound(_))));
        assert!(matches!(parse_id(""), Err(RegistryError::NotFound(_))));
    }

    #[test]
    fn base_url_prefers_the_request_authority() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("videos.example:8080"));

        let uri: Uri = "/video".parse().unwrap();
        let base = request_base_url(&uri, &headers).unwrap();
        assert_eq!(base.as_str(), "http://videos.example:8080");

        let uri: Uri = "http://other.example/video".parse().unwrap();
        let base = request_base_url(&uri, &headers).unwrap();
        assert_eq!(base.as_str(), "http://other.example");

        let uri: Uri = "/video".parse().unwrap();
        assert!(request_base_url(&uri, &HeaderMap::new()).is_none());
    }

    #[test]
    fn errors_map_to_status_codes() {
        let cases = [
            (RegistryError::InvalidArgument("nope".into()), StatusCode::BAD_REQUEST),
            (RegistryError::NotFound(VideoId(1)), StatusCode::NOT_FOUND),
            (
                RegistryError::StorageFailure {
                    id: VideoId(1),
                    source: std::io::Error::other("boom").into(),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), status);
        }
    }

    #[test]
    fn only_blobstore_errors_are_storage_failures() {
        let disk = upload_error(RegistryError::StorageFailure {
            id: VideoId(1),
            source: std::io::Error::other("disk full").into(),
        });
        assert_eq!(
            disk.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );

        let not_found = upload_error(RegistryError::NotFound(VideoId(1)));
        assert_eq!(not_found.into_response().status(), StatusCode::NOT_FOUND);
    }
}
