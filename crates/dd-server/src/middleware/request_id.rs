//! Per-request correlation id.
//!
//! A well-formed incoming `x-request-id` is kept, anything else is replaced
//! with a fresh UUID. Handlers run inside a span carrying the id, and the
//! response echoes it back.

use axum::body::Body;
use axum::http::{HeaderName, HeaderValue, Request};
use axum::middleware::Next;
use axum::response::Response;
use tracing::Instrument;
use uuid::Uuid;

pub static X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

const MAX_ID_LEN: usize = 64;

fn usable_id(value: &HeaderValue) -> Option<HeaderValue> {
    let len = value.as_bytes().len();
    let printable = value.as_bytes().iter().all(u8::is_ascii_graphic);
    (len > 0 && len <= MAX_ID_LEN && printable).then(|| value.clone())
}

pub async fn tag_request(request: Request<Body>, next: Next) -> Response {
    let id = request
        .headers()
        .get(&X_REQUEST_ID)
        .and_then(usable_id)
        .or_else(|| HeaderValue::from_str(&Uuid::new_v4().to_string()).ok());

    let span = tracing::debug_span!(
        "request",
        id = id.as_ref().and_then(|v| v.to_str().ok()).unwrap_or_default(),
        method = %request.method(),
        path = request.uri().path(),
    );
    let mut response = next.run(request).instrument(span).await;

    if let Some(id) = id {
        response.headers_mut().insert(X_REQUEST_ID.clone(), id);
    }
    response
}
