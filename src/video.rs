use core::fmt;
use std::net::SocketAddr;

use axum::http::uri::Authority;
use serde::{Deserialize, Serialize};

/// The registry-assigned identifier of a `Video`.
///
/// Valid ids are strictly positive. The inner value is signed so that
/// non-positive ids coming in from a request can be represented and rejected.
#[derive(Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct VideoId(pub i64);

impl VideoId {
    pub fn is_valid(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Debug for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VideoId({})", self.0)
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Video metadata as stored in the registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    pub id: VideoId,
    pub title: String,
    pub duration: i64,
    pub content_type: String,
    pub data_url: String,
}

/// Caller-supplied metadata for a new `Video`.
///
/// `id` and `dataUrl` are server-assigned, so they are not part of this type
/// and are silently dropped if a client sends them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VideoInput {
    pub title: String,
    #[serde(default)]
    pub duration: i64,
    #[serde(default)]
    pub content_type: String,
}

impl VideoInput {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VideoState {
    Ready,
    /// Not produced by anything yet.
    Processing,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct VideoStatus {
    pub state: VideoState,
}

impl VideoStatus {
    pub const READY: Self = Self {
        state: VideoState::Ready,
    };
}

const DEFAULT_HTTP_PORT: u16 = 80;

/// The `http://host[:port]` prefix that data URLs are built on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseUrl(String);

impl BaseUrl {
    /// The port is only spelled out when it differs from the HTTP default.
    pub fn new(host: &str, port: u16) -> Self {
        if port == DEFAULT_HTTP_PORT {
            Self(format!("http://{host}"))
        } else {
            Self(format!("http://{host}:{port}"))
        }
    }

    /// Builds a base from a `Host` header value such as `example.com:8080`.
    ///
    /// Returns `None` when the value is not a valid authority.
    pub fn from_host_header(host: &str) -> Option<Self> {
        let authority: Authority = host.parse().ok()?;
        let port = authority.port_u16().unwrap_or(DEFAULT_HTTP_PORT);
        Some(Self::new(authority.host(), port))
    }

    /// Builds a base from the address the server is listening on.
    pub fn from_socket_addr(addr: SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(addr) => Self::new(&addr.ip().to_string(), addr.port()),
            SocketAddr::V6(addr) => Self::new(&format!("[{}]", addr.ip()), addr.port()),
        }
    }

    pub fn data_url(&self, id: VideoId) -> String {
        format!("{}/video/{id}/data", self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BaseUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
