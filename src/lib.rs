//! A minimal video-upload registry.
//!
//! Clients register video metadata, receive an id and a data URL, and then
//! upload and download the video payload through that URL. The
//! [`registry::VideoRegistry`] owns all metadata and delegates payloads to a
//! [`blobstore::BlobStore`]; [`server`] exposes both over HTTP.

pub mod blobstore;
pub mod config;
pub mod registry;
pub mod server;
pub mod video;

pub use registry::{RegistryError, VideoRegistry};
pub use video::{BaseUrl, Video, VideoId, VideoInput, VideoState, VideoStatus};
