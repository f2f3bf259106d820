//! Manifest and segment delivery from `<output_dir>/<stream>/<file>`.

use std::path::PathBuf;

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::context::AppContext;
use crate::error::{AppError, Missing};

pub const CONTENT_TYPE_MPD: &str = "application/dash+xml";
pub const CONTENT_TYPE_MP4: &str = "video/mp4";

/// Split `/<stream>/<file>` into its two parts. The file part may be empty.
pub fn split_path(path: &str) -> (&str, &str) {
    let rest = path.strip_prefix('/').unwrap_or(path);
    rest.split_once('/').unwrap_or((rest, ""))
}

/// True when every component of `file` stays inside the stream directory.
pub fn is_safe_file_name(file: &str) -> bool {
    !file.is_empty()
        && !file.contains('\\')
        && file
            .split('/')
            .all(|part| !part.is_empty() && !part.starts_with('.'))
}

/// Resolve the stream through the registry before touching the filesystem.
fn resolve(ctx: &AppContext, path: &str, missing_file: Missing) -> Result<PathBuf, AppError> {
    let (stream, file) = split_path(path);
    if !ctx.registry.contains(stream) {
        tracing::debug!(stream, "unknown stream");
        return Err(Missing::Stream.into());
    }
    if !is_safe_file_name(file) {
        tracing::debug!(stream, file, "rejected file name");
        return Err(missing_file.into());
    }
    Ok(ctx.output_dir().join(stream).join(file))
}

async fn read_file(path: PathBuf, missing: Missing) -> Result<Vec<u8>, AppError> {
    match tokio::fs::read(&path).await {
        Ok(bytes) => Ok(bytes),
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %path.display(), "read failed: {e}");
            }
            Err(missing.into())
        }
    }
}

fn file_response(content_type: &'static str, bytes: Vec<u8>) -> Response {
    (StatusCode::OK, [(header::CONTENT_TYPE, content_type)], bytes).into_response()
}

/// `GET /<stream>/<name>.mpd`
pub async fn manifest(ctx: &AppContext, path: &str) -> Result<Response, AppError> {
    let file = resolve(ctx, path, Missing::Manifest)?;
    let bytes = read_file(file, Missing::Manifest).await?;
    tracing::debug!(path, len = bytes.len(), "serving manifest");
    Ok(file_response(CONTENT_TYPE_MPD, bytes))
}

/// `GET /<stream>/<name>.m4s` or `.mp4`
pub async fn segment(ctx: &AppContext, path: &str) -> Result<Response, AppError> {
    let file = resolve(ctx, path, Missing::Segment)?;
    let bytes = read_file(file, Missing::Segment).await?;
    tracing::debug!(path, len = bytes.len(), "serving segment");
    Ok(file_response(CONTENT_TYPE_MP4, bytes))
}
