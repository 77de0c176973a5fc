#![forbid(unsafe_code)]

//! Contract between the HTTP layer and whatever turns a video id into
//! metadata and stream formats.
//!
//! The router only ever talks to [`Extractor`]. Everything the platform
//! returns is treated as opaque except the handful of fields the endpoints
//! filter, sort, or derive filenames from; the rest rides along in the
//! flattened `extra` maps and is serialized back out untouched.

mod ytdlp;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use ytdlp::YtDlpExtractor;

/// Length of a platform video id.
pub const VIDEO_ID_LEN: usize = 11;

/// One downloadable stream variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatDescriptor {
    pub itag: u32,
    pub mime_type: String,
    pub audio_bitrate: Option<u32>,
    pub quality_label: Option<String>,
    pub url: String,
    #[serde(default)]
    pub has_video: bool,
    #[serde(default)]
    pub has_audio: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Video metadata. Only `title` is read by the router.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoDetails {
    pub video_id: String,
    pub title: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Everything a single extraction call yields.
#[derive(Debug, Clone)]
pub struct VideoInfo {
    pub details: VideoDetails,
    pub streaming_data: Value,
    /// `None` only when the platform reported no captions structure at all.
    pub captions: Option<Value>,
    pub formats: Vec<FormatDescriptor>,
}

#[async_trait]
pub trait Extractor: Send + Sync {
    /// Identifies the backend in logs.
    fn id(&self) -> &'static str;

    fn validate_id(&self, id: &str) -> bool {
        is_valid_video_id(id)
    }

    /// Fetches metadata and the format list for `id`. Network, process and
    /// parse failures all surface as errors.
    async fn fetch_info(&self, id: &str) -> Result<VideoInfo>;

    fn filter_audio_only(&self, formats: &[FormatDescriptor]) -> Vec<FormatDescriptor> {
        audio_only(formats)
    }
}

/// Accepts exactly 11 characters from `[A-Za-z0-9_-]`.
pub fn is_valid_video_id(id: &str) -> bool {
    id.len() == VIDEO_ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Keeps formats that carry audio and no video, preserving order.
pub fn audio_only(formats: &[FormatDescriptor]) -> Vec<FormatDescriptor> {
    formats
        .iter()
        .filter(|format| format.has_audio && !format.has_video)
        .cloned()
        .collect()
}
