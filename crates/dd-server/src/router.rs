//! Axum router construction.

use axum::http::{header, HeaderValue};
use axum::middleware;
use axum::Router;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::context::AppContext;
use crate::middleware::request_id::tag_request;
use crate::routes;

/// Build the origin router. Every request lands in [`routes::dispatch`].
pub fn build_router(ctx: AppContext) -> Router {
    Router::new()
        .fallback(routes::dispatch)
        .with_state(ctx)
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(middleware::from_fn(tag_request))
        .layer(TraceLayer::new_for_http())
}
