//! Request dispatch.
//!
//! The origin has no route table: like a plain file server it looks at the
//! method and at the request path's extension.
//!
//! | Path                   | Handler                 |
//! |------------------------|-------------------------|
//! | `/`                    | [`index::index`]        |
//! | contains `.mpd`        | [`stream::manifest`]    |
//! | contains `.m4s`/`.mp4` | [`stream::segment`]     |
//! | anything else          | 404                     |

pub mod index;
pub mod stream;

use axum::extract::State;
use axum::http::{Method, Uri};
use axum::response::{IntoResponse, Response};

use crate::context::AppContext;
use crate::error::{AppError, Missing};

/// Fallback handler for every request.
pub async fn dispatch(State(ctx): State<AppContext>, method: Method, uri: Uri) -> Response {
    if method != Method::GET {
        tracing::debug!(%method, path = uri.path(), "method not served");
        return AppError::from(Missing::Route).into_response();
    }

    let path = uri.path();
    let result = if path == "/" {
        Ok(index::index(&ctx))
    } else if path.contains(".mpd") {
        stream::manifest(&ctx, path).await
    } else if path.contains(".m4s") || path.contains(".mp4") {
        stream::segment(&ctx, path).await
    } else {
        Err(AppError::from(Missing::Route))
    };

    match result {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}
