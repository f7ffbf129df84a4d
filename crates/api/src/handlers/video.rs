//! Handler for serving local feed videos with HTTP range support.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header::{self, HeaderMap};
use axum::http::StatusCode;
use axum::response::Response;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

use crowdwatch_core::error::CoreError;
use crowdwatch_monitor::sampler::resolve_video_path;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Guess a Content-Type from a file extension.
fn content_type_for_extension(path: &str) -> &'static str {
    let ext = path.rsplit('.').next().unwrap_or("").to_lowercase();
    match ext.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "mkv" => "video/x-matroska",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        _ => "application/octet-stream",
    }
}

/// Parse a `Range: bytes=START-END` header value.
/// Returns `(start, optional_end)`.
fn parse_range_header(range: &str) -> Option<(u64, Option<u64>)> {
    let (start, end) = range.trim().strip_prefix("bytes=")?.split_once('-')?;
    let start = start.trim().parse::<u64>().ok()?;
    let end = match end.trim() {
        "" => None,
        end => Some(end.parse::<u64>().ok()?),
    };
    Some((start, end))
}

fn io_error(err: std::io::Error) -> AppError {
    AppError::InternalError(err.to_string())
}

fn build(builder: axum::http::response::Builder, body: Body) -> AppResult<Response> {
    builder
        .body(body)
        .map_err(|e| AppError::InternalError(e.to_string()))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /api/video/{*filename}
///
/// Serves a file under the video root. A satisfiable `Range` header yields
/// 206 with exactly the requested bytes; an open-ended range runs to the
/// end of the file. Ranges starting past the end are 416.
pub async fn stream_video(
    State(state): State<AppState>,
    Path(filename): Path<String>,
    headers: HeaderMap,
) -> AppResult<Response> {
    let path = resolve_video_path(&state.config.video_root, &filename)
        .map_err(|_| AppError::BadRequest(format!("Invalid video path '{filename}'")))?;

    let metadata = match tokio::fs::metadata(&path).await {
        Ok(m) if m.is_file() => m,
        _ => {
            return Err(AppError::Core(CoreError::NotFound {
                entity: "Video",
                id: filename,
            }))
        }
    };
    let file_size = metadata.len();
    let content_type = content_type_for_extension(&filename);

    let range = headers
        .get(header::RANGE)
        .map(|v| {
            v.to_str()
                .map_err(|_| AppError::BadRequest("Invalid Range header".into()))
        })
        .transpose()?
        .and_then(parse_range_header);

    if let Some((start, end)) = range {
        if start >= file_size || end.is_some_and(|e| e < start) {
            return build(
                Response::builder()
                    .status(StatusCode::RANGE_NOT_SATISFIABLE)
                    .header(header::CONTENT_RANGE, format!("bytes */{file_size}")),
                Body::empty(),
            );
        }
        let end = end.map_or(file_size - 1, |e| e.min(file_size - 1));
        let length = end - start + 1;

        let mut file = tokio::fs::File::open(&path).await.map_err(io_error)?;
        file.seek(std::io::SeekFrom::Start(start))
            .await
            .map_err(io_error)?;
        let stream = ReaderStream::new(file.take(length));

        return build(
            Response::builder()
                .status(StatusCode::PARTIAL_CONTENT)
                .header(header::CONTENT_TYPE, content_type)
                .header(header::CONTENT_LENGTH, length.to_string())
                .header(
                    header::CONTENT_RANGE,
                    format!("bytes {start}-{end}/{file_size}"),
                )
                .header(header::ACCEPT_RANGES, "bytes"),
            Body::from_stream(stream),
        );
    }

    // No Range header, serve the full file.
    let file = tokio::fs::File::open(&path).await.map_err(io_error)?;
    build(
        Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, content_type)
            .header(header::CONTENT_LENGTH, file_size.to_string())
            .header(header::ACCEPT_RANGES, "bytes"),
        Body::from_stream(ReaderStream::new(file)),
    )
}
