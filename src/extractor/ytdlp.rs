#![forbid(unsafe_code)]

//! `Extractor` backed by the `yt-dlp` executable.
//!
//! We call `yt-dlp --dump-single-json` once per request and translate its
//! info JSON into the player-response flavoured shape the HTTP API serves:
//! numeric itags, `mimeType` strings with codecs, `audioBitrate` in kbps and
//! `qualityLabel`s such as `1080p60`.

use std::{
    path::{Path, PathBuf},
    process::Stdio,
};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tokio::process::Command;

use super::{Extractor, FormatDescriptor, VideoDetails, VideoInfo};

const STDERR_TAIL_LINES: usize = 20;

pub struct YtDlpExtractor {
    binary: PathBuf,
    cookies: Option<PathBuf>,
}

impl YtDlpExtractor {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            cookies: None,
        }
    }

    /// Passes `--cookies` when the file exists at request time.
    pub fn with_cookies(mut self, cookies: Option<PathBuf>) -> Self {
        self.cookies = cookies;
        self
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    fn command(&self, video_url: &str) -> Command {
        let mut command = Command::new(&self.binary);
        command
            .arg("--dump-single-json")
            .arg("--skip-download")
            .arg("--no-warnings")
            .arg("--no-progress")
            .arg("--no-playlist");

        if let Some(cookies) = &self.cookies
            && cookies.exists()
        {
            command.arg("--cookies").arg(cookies);
        }

        command
            .arg(video_url)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl Extractor for YtDlpExtractor {
    fn id(&self) -> &'static str {
        "yt-dlp"
    }

    async fn fetch_info(&self, id: &str) -> Result<VideoInfo> {
        let video_url = watch_url(id);
        let output = self
            .command(&video_url)
            .output()
            .await
            .with_context(|| format!("launching {}", self.binary.display()))?;

        if !output.status.success() {
            bail!(
                "yt-dlp failed for {} (status {}): {}",
                video_url,
                output.status,
                stderr_tail(&output.stderr)
            );
        }

        let info: RawInfo =
            serde_json::from_slice(&output.stdout).context("parsing yt-dlp metadata response")?;
        info.into_video_info(id)
    }
}

fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={video_id}")
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().filter(|line| !line.trim().is_empty()).collect();
    if lines.is_empty() {
        return "no stderr output captured".to_string();
    }
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

#[derive(Debug, Deserialize, Clone)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    fn first(&self) -> Option<&T> {
        match self {
            OneOrMany::One(value) => Some(value),
            OneOrMany::Many(values) => values.first(),
        }
    }
}

/// Subset of the `--dump-single-json` payload. Everything is optional
/// because older or live uploads omit fields freely.
#[derive(Debug, Deserialize)]
struct RawInfo {
    id: Option<String>,
    title: Option<String>,
    fulltitle: Option<String>,
    description: Option<String>,
    duration: Option<f64>,
    channel_id: Option<String>,
    channel: Option<OneOrMany<String>>,
    uploader: Option<OneOrMany<String>>,
    view_count: Option<u64>,
    tags: Option<Vec<String>>,
    thumbnail: Option<String>,
    is_live: Option<bool>,
    was_live: Option<bool>,
    #[serde(default)]
    formats: Vec<RawFormat>,
    subtitles: Option<Value>,
    automatic_captions: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RawFormat {
    format_id: Option<String>,
    url: Option<String>,
    ext: Option<String>,
    vcodec: Option<String>,
    acodec: Option<String>,
    abr: Option<f64>,
    tbr: Option<f64>,
    format_note: Option<String>,
    width: Option<u64>,
    height: Option<u64>,
    fps: Option<f64>,
    filesize: Option<u64>,
    filesize_approx: Option<u64>,
}

impl RawInfo {
    fn into_video_info(self, requested_id: &str) -> Result<VideoInfo> {
        let formats: Vec<FormatDescriptor> =
            self.formats.iter().filter_map(RawFormat::to_descriptor).collect();
        let streaming_data = streaming_data(&formats)?;

        let captions = if self.subtitles.is_none() && self.automatic_captions.is_none() {
            None
        } else {
            Some(json!({
                "subtitles": self.subtitles,
                "automaticCaptions": self.automatic_captions,
            }))
        };

        let mut extra = Map::new();
        if let Some(duration) = self.duration {
            extra.insert(
                "lengthSeconds".into(),
                Value::String((duration.round() as u64).to_string()),
            );
        }
        if let Some(channel_id) = self.channel_id {
            extra.insert("channelId".into(), Value::String(channel_id));
        }
        let author = self
            .channel
            .as_ref()
            .and_then(OneOrMany::first)
            .or_else(|| self.uploader.as_ref().and_then(OneOrMany::first));
        if let Some(author) = author {
            extra.insert("author".into(), Value::String(author.clone()));
        }
        if let Some(description) = self.description {
            extra.insert("shortDescription".into(), Value::String(description));
        }
        if let Some(views) = self.view_count {
            extra.insert("viewCount".into(), Value::String(views.to_string()));
        }
        if let Some(tags) = self.tags {
            extra.insert(
                "keywords".into(),
                Value::Array(tags.into_iter().map(Value::String).collect()),
            );
        }
        if let Some(thumbnail) = self.thumbnail {
            extra.insert(
                "thumbnail".into(),
                json!({ "thumbnails": [{ "url": thumbnail }] }),
            );
        }
        if self.is_live.is_some() || self.was_live.is_some() {
            let live = self.is_live.unwrap_or(false) || self.was_live.unwrap_or(false);
            extra.insert("isLiveContent".into(), Value::Bool(live));
        }

        let details = VideoDetails {
            video_id: self.id.unwrap_or_else(|| requested_id.to_string()),
            title: self.title.or(self.fulltitle).unwrap_or_default(),
            extra,
        };

        Ok(VideoInfo {
            details,
            streaming_data,
            captions,
            formats,
        })
    }
}

impl RawFormat {
    /// Storyboards, manifests and other entries without a numeric itag or a
    /// direct URL have no place in the API and are dropped.
    fn to_descriptor(&self) -> Option<FormatDescriptor> {
        let itag = self.format_id.as_deref()?.trim().parse::<u32>().ok()?;
        let url = self.url.clone()?;
        let ext = self.ext.as_deref()?;

        let has_video = codec_present(self.vcodec.as_deref());
        let has_audio = codec_present(self.acodec.as_deref());
        let kind = if has_video || !has_audio { "video" } else { "audio" };

        let codecs: Vec<&str> = [self.vcodec.as_deref(), self.acodec.as_deref()]
            .into_iter()
            .flatten()
            .filter(|codec| codec_present(Some(*codec)))
            .collect();
        let container = mime_container(ext);
        let mime_type = if codecs.is_empty() {
            format!("{kind}/{container}")
        } else {
            format!("{kind}/{container}; codecs=\"{}\"", codecs.join(", "))
        };

        let audio_bitrate = if has_audio {
            self.abr.map(|abr| abr.round() as u32)
        } else {
            None
        };
        let quality_label = if has_video {
            self.format_note
                .as_deref()
                .filter(|note| looks_like_quality_label(note))
                .map(str::to_string)
                .or_else(|| self.height.map(|height| format!("{height}p")))
        } else {
            None
        };

        let mut extra = Map::new();
        if let Some(width) = self.width {
            extra.insert("width".into(), width.into());
        }
        if let Some(height) = self.height {
            extra.insert("height".into(), height.into());
        }
        if let Some(fps) = self.fps {
            extra.insert("fps".into(), json!(fps));
        }
        if let Some(size) = self.filesize.or(self.filesize_approx) {
            extra.insert("contentLength".into(), Value::String(size.to_string()));
        }
        if let Some(tbr) = self.tbr {
            extra.insert("bitrate".into(), ((tbr * 1000.0).round() as u64).into());
        }

        Some(FormatDescriptor {
            itag,
            mime_type,
            audio_bitrate,
            quality_label,
            url,
            has_video,
            has_audio,
            extra,
        })
    }
}

fn codec_present(codec: Option<&str>) -> bool {
    matches!(codec, Some(codec) if !codec.is_empty() && codec != "none")
}

fn mime_container(ext: &str) -> &str {
    match ext {
        "m4a" | "mp4" => "mp4",
        "3gp" => "3gpp",
        other => other,
    }
}

/// `720p`, `1080p60`, `2160p HDR` and the like.
fn looks_like_quality_label(note: &str) -> bool {
    let digits = note.bytes().take_while(u8::is_ascii_digit).count();
    digits > 0 && note.as_bytes().get(digits) == Some(&b'p')
}

/// Muxed formats go under `formats`, single-stream ones under
/// `adaptiveFormats`, matching the platform's own streaming data layout.
fn streaming_data(formats: &[FormatDescriptor]) -> Result<Value> {
    let (muxed, adaptive): (Vec<&FormatDescriptor>, Vec<&FormatDescriptor>) = formats
        .iter()
        .partition(|format| format.has_video && format.has_audio);
    Ok(json!({
        "formats": serde_json::to_value(muxed).context("serializing muxed formats")?,
        "adaptiveFormats": serde_json::to_value(adaptive).context("serializing adaptive formats")?,
    }))
}
