//! HTTP server assembly.
//!
//! Builds the axum router for the OCSP endpoint. Every path serves the same
//! handler: RFC 6960 A.1 clients `GET` the base64 request as the last path
//! segment, everything else `POST`s to any path.

use crate::handler::{handle_ocsp_request, method_gate, size_gate, CacheHandler};
use axum::middleware;
use axum::routing::any;
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Assembles the OCSP service router. Layers run outside-in: access-log
/// trace, request timeout, method gate, size gate, then the handler.
pub fn app(handler: CacheHandler, request_timeout: Duration) -> Router {
    let handler = Arc::new(handler);

    Router::new()
        .route("/", any(handle_ocsp_request))
        .route("/*request", any(handle_ocsp_request))
        .layer(middleware::from_fn_with_state(Arc::clone(&handler), size_gate))
        .layer(middleware::from_fn(method_gate))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .with_state(handler)
}
