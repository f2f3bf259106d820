//! Error-to-HTTP response conversion.
//!
//! Every failure the origin serves is a small HTML page. Missing resources
//! are always 404; other [`dd_core::Error`]s map through
//! [`dd_core::Error::http_status`].

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

/// Which lookup failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Missing {
    /// Unsupported method or unrecognised path.
    Route,
    Stream,
    Manifest,
    Segment,
}

impl Missing {
    fn detail(self) -> Option<&'static str> {
        match self {
            Missing::Route => None,
            Missing::Stream => Some("Stream not found"),
            Missing::Manifest => Some("MPD file not found"),
            Missing::Segment => Some("Segment file not found"),
        }
    }
}

/// Error returned by request handlers.
#[derive(Debug)]
pub enum AppError {
    NotFound(Missing),
    Core(dd_core::Error),
}

impl From<dd_core::Error> for AppError {
    fn from(e: dd_core::Error) -> Self {
        Self::Core(e)
    }
}

impl From<Missing> for AppError {
    fn from(m: Missing) -> Self {
        Self::NotFound(m)
    }
}

pub(crate) fn html_page(status: StatusCode, body: String) -> Response {
    (status, [(header::CONTENT_TYPE, "text/html")], body).into_response()
}

fn status_heading(status: StatusCode) -> String {
    format!(
        "{} {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or("Error")
    )
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::NotFound(missing) => {
                let heading = status_heading(StatusCode::NOT_FOUND);
                let body = match missing.detail() {
                    Some(detail) => {
                        format!("<html><body><h1>{heading}</h1><p>{detail}</p></body></html>")
                    }
                    None => format!("<html><body><h1>{heading}</h1></body></html>"),
                };
                html_page(StatusCode::NOT_FOUND, body)
            }
            AppError::Core(err) => {
                let status = StatusCode::from_u16(err.http_status())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                if status.is_server_error() {
                    tracing::error!(status = %status, error = %err, "request failed");
                }
                let heading = status_heading(status);
                html_page(
                    status,
                    format!("<html><body><h1>{heading}</h1></body></html>"),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_text(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn stream_not_found_page() {
        let response = AppError::from(Missing::Stream).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            body_text(response).await,
            "<html><body><h1>404 Not Found</h1><p>Stream not found</p></body></html>"
        );
    }

    #[tokio::test]
    async fn bare_route_page() {
        let response = AppError::from(Missing::Route).into_response();
        assert_eq!(
            body_text(response).await,
            "<html><body><h1>404 Not Found</h1></body></html>"
        );
    }

    #[test]
    fn internal_error_is_500() {
        let response = AppError::from(dd_core::Error::Internal("boom".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
