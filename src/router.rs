#![forbid(unsafe_code)]

//! HTTP surface of the proxy.
//!
//! Every handler follows the same path: pull query parameters, reject bad
//! input with a specific message, ask the [`Extractor`] for the video, then
//! reshape the result. Failures from the extractor or the filesystem turn
//! into the generic 500 through [`ApiError`]'s `From<anyhow::Error>`.

use std::{cmp::Reverse, sync::Arc};

use anyhow::{Context, anyhow};
use axum::{
    Router,
    extract::{Query, Request, State},
    handler::Handler,
    http::{Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{MethodRouter, get},
};
use serde::Serialize;
use serde_json::Value;
use tower_http::{
    catch_panic::CatchPanicLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::{
    assets::{AssetStore, INDEX_ASSET, STYLESHEET_ASSET},
    error::{ApiError, ApiResult, panic_response},
    extractor::{Extractor, FormatDescriptor, VideoDetails, VideoInfo},
    response::{apply_cors, json_response},
};

pub const DEFAULT_DOWNLOAD_TYPE: &str = "video";

/// Shared, read-only state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub extractor: Arc<dyn Extractor>,
    pub assets: Arc<AssetStore>,
}

impl AppState {
    pub fn new(extractor: Arc<dyn Extractor>, assets: AssetStore) -> Self {
        Self {
            extractor,
            assets: Arc::new(assets),
        }
    }

    fn ensure_valid(&self, id: &str) -> ApiResult<()> {
        if self.extractor.validate_id(id) {
            Ok(())
        } else {
            Err(ApiError::invalid_video_id())
        }
    }

    async fn fetch(&self, id: &str) -> ApiResult<VideoInfo> {
        let info = self
            .extractor
            .fetch_info(id)
            .await
            .with_context(|| format!("fetching info for {id} via {}", self.extractor.id()))?;
        Ok(info)
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get_only(index))
        .route("/style.css", get_only(stylesheet))
        .route("/vid", get_only(video_info))
        .route("/audio", get_only(audio_formats))
        .route("/download", get_only(download))
        .fallback(endpoint_not_found)
        .with_state(state)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(middleware::from_fn(cors))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}

/// `get` alone would also serve HEAD; every method but GET is a 404 here.
fn get_only<H, T>(handler: H) -> MethodRouter<AppState>
where
    H: Handler<T, AppState>,
    T: 'static,
{
    get(handler)
        .head(endpoint_not_found)
        .fallback(endpoint_not_found)
}

/// Answers every OPTIONS request, on any path, with an empty 200, whether
/// or not it is a real CORS preflight. Stamps CORS headers on everything
/// else, including errors and recovered panics.
async fn cors(req: Request, next: Next) -> Response {
    let mut response = if req.method() == Method::OPTIONS {
        StatusCode::OK.into_response()
    } else {
        next.run(req).await
    };
    apply_cors(response.headers_mut());
    response
}

async fn endpoint_not_found() -> ApiError {
    ApiError::endpoint_not_found()
}

async fn index(State(state): State<AppState>) -> ApiResult<Response> {
    Ok(state.assets.load(INDEX_ASSET).await?.into_response())
}

async fn stylesheet(State(state): State<AppState>) -> ApiResult<Response> {
    Ok(state.assets.load(STYLESHEET_ASSET).await?.into_response())
}

#[derive(Serialize)]
struct VideoPayload<'a> {
    video: &'a VideoDetails,
    stream: &'a Value,
    captions: Option<&'a Value>,
    formats: &'a [FormatDescriptor],
}

async fn video_info(
    State(state): State<AppState>,
    Query(params): Query<QueryPairs>,
) -> ApiResult<Response> {
    let id = query_param(&params, "id").ok_or_else(ApiError::missing_video_id)?;
    state.ensure_valid(id)?;
    let info = state.fetch(id).await?;

    Ok(json_response(
        StatusCode::OK,
        &VideoPayload {
            video: &info.details,
            stream: &info.streaming_data,
            captions: info.captions.as_ref(),
            formats: &info.formats,
        },
    ))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AudioPayload<'a> {
    audio: Vec<FormatDescriptor>,
    video_details: &'a VideoDetails,
}

async fn audio_formats(
    State(state): State<AppState>,
    Query(params): Query<QueryPairs>,
) -> ApiResult<Response> {
    let id = query_param(&params, "id").ok_or_else(ApiError::missing_video_id)?;
    state.ensure_valid(id)?;
    let info = state.fetch(id).await?;

    let mut audio = state.extractor.filter_audio_only(&info.formats);
    sort_by_audio_bitrate(&mut audio);

    Ok(json_response(
        StatusCode::OK,
        &AudioPayload {
            audio,
            video_details: &info.details,
        },
    ))
}

#[derive(Debug, Serialize)]
struct DownloadPayload {
    url: String,
    filename: String,
    title: String,
    quality: String,
    #[serde(rename = "type")]
    kind: String,
}

async fn download(
    State(state): State<AppState>,
    Query(params): Query<QueryPairs>,
) -> ApiResult<Response> {
    let (Some(id), Some(itag)) = (query_param(&params, "id"), query_param(&params, "itag")) else {
        return Err(ApiError::missing_parameters());
    };
    let kind = query_param(&params, "type").unwrap_or(DEFAULT_DOWNLOAD_TYPE);

    state.ensure_valid(id)?;
    let itag = parse_itag(itag)?;
    let info = state.fetch(id).await?;

    let format = info
        .formats
        .iter()
        .find(|format| i64::from(format.itag) == itag)
        .ok_or_else(ApiError::format_not_found)?;

    let title = info.details.title.clone();
    let filename = format!(
        "{}.{}",
        sanitize_title(&title),
        download_extension(kind, &format.mime_type)
    );

    Ok(json_response(
        StatusCode::OK,
        &DownloadPayload {
            url: format.url.clone(),
            filename,
            title,
            quality: quality_text(format),
            kind: kind.to_string(),
        },
    ))
}

/// Query pairs in request order, duplicates kept.
type QueryPairs = Vec<(String, String)>;

/// First value for `key`; an empty first value counts as missing.
fn query_param<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(name, _)| name == key)
        .map(|(_, value)| value.as_str())
        .filter(|value| !value.is_empty())
}

fn parse_itag(raw: &str) -> anyhow::Result<i64> {
    raw.trim()
        .parse::<i64>()
        .map_err(|err| anyhow!("invalid itag {raw:?}: {err}"))
}

/// Highest bitrate first; a missing bitrate counts as zero. The sort is
/// stable, so equal bitrates keep the extractor's order.
pub fn sort_by_audio_bitrate(formats: &mut [FormatDescriptor]) {
    formats.sort_by_key(|format| Reverse(format.audio_bitrate.unwrap_or(0)));
}

/// Lowercases ASCII letters and digits and turns everything else into `_`.
pub fn sanitize_title(title: &str) -> String {
    title
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

pub fn download_extension(kind: &str, mime_type: &str) -> &'static str {
    let mp4 = mime_type.contains("mp4");
    match (kind == "audio", mp4) {
        (true, true) => "m4a",
        (false, true) => "mp4",
        (_, false) => "webm",
    }
}

fn quality_text(format: &FormatDescriptor) -> String {
    format
        .quality_label
        .clone()
        .filter(|label| !label.is_empty())
        .unwrap_or_else(|| format!("{}kbps", format.audio_bitrate.unwrap_or(0)))
}
