//! The OCSP request handler.
//!
//! A read-only consumer of the cache store: parse the request, authenticate
//! the issuer, look the serial up, check freshness, and write the
//! pre-signed DER verbatim with the RFC 5019 section 5 caching headers.
//! Error outcomes are HTTP 200 with the unsigned OCSP error DER constants;
//! an unknown serial is deliberately answered `unauthorized`, because this
//! responder only signs for its own CA's scope.

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use base64::prelude::{Engine as _, BASE64_STANDARD};
use chrono::{DateTime, Utc};
use ocspd_proto::responder::{MALFORMED_REQUEST_RESPONSE, UNAUTHORIZED_RESPONSE};
use ocspd_proto::{parse_ocsp_request, CachedResponse, ReadOnlyCacheStore, ResponderIdentity};
use std::sync::Arc;
use tracing::{debug, error};

/// RFC 6960 A.1: GET requests encode the whole request in the URL and are
/// only admitted for small requests.
pub const GET_METHOD_MAX_REQUEST_SIZE: u64 = 255;

const OCSP_RESPONSE_CONTENT_TYPE: &str = "application/ocsp-response";

/// Read end of the responder: looks up pre-signed responses for incoming
/// OCSP requests.
pub struct CacheHandler {
    store: ReadOnlyCacheStore,
    responder: Arc<ResponderIdentity>,
    max_request_bytes: usize,
    max_age: u64,
}

impl CacheHandler {
    /// `max_request_bytes` of zero disables the request size gate;
    /// `max_age` caps the `Cache-Control: max-age` directive.
    pub fn new(
        store: ReadOnlyCacheStore,
        responder: Arc<ResponderIdentity>,
        max_request_bytes: usize,
        max_age: u64,
    ) -> Self {
        Self { store, responder, max_request_bytes, max_age }
    }
}

fn content_length(headers: &HeaderMap) -> u64 {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse().ok())
        .unwrap_or(0)
}

/// Admits `POST` unconditionally and `GET` up to the RFC 6960 A.1 size;
/// everything else is 405.
pub async fn method_gate(request: Request, next: Next) -> Response {
    if request.method() == Method::GET {
        if content_length(request.headers()) > GET_METHOD_MAX_REQUEST_SIZE {
            return StatusCode::METHOD_NOT_ALLOWED.into_response();
        }
    } else if request.method() != Method::POST {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }

    next.run(request).await
}

/// Rejects requests whose `Content-Length` exceeds the configured maximum
/// with 413. Disabled when the maximum is zero.
pub async fn size_gate(
    State(handler): State<Arc<CacheHandler>>,
    request: Request,
    next: Next,
) -> Response {
    if handler.max_request_bytes > 0
        && content_length(request.headers()) > handler.max_request_bytes as u64
    {
        return StatusCode::PAYLOAD_TOO_LARGE.into_response();
    }

    next.run(request).await
}

/// Extracts the OCSP request DER from the HTTP request: the raw body for
/// `POST`, the URL-decoded base64 (standard alphabet) last path segment for
/// `GET`.
async fn extract_body(request: Request, max_request_bytes: usize) -> Result<Vec<u8>, Response> {
    if request.method() == Method::GET {
        let path = request.uri().path().to_string();
        let segment = path.rsplit('/').next().unwrap_or_default();
        debug!(segment = %segment, "ocsp request path");

        let decoded = urlencoding::decode(segment).map_err(|err| {
            error!(error = %err, "failed to url-decode request path");
            StatusCode::OK.into_response()
        })?;

        return BASE64_STANDARD.decode(decoded.as_bytes()).map_err(|err| {
            error!(error = %err, "failed to base64-decode request path");
            StatusCode::OK.into_response()
        });
    }

    let limit = if max_request_bytes > 0 { max_request_bytes } else { 1 << 20 };
    match axum::body::to_bytes(request.into_body(), limit).await {
        Ok(bytes) => Ok(bytes.to_vec()),
        Err(err) => {
            error!(error = %err, "failed to read request body");
            Err(StatusCode::OK.into_response())
        }
    }
}

fn ocsp_error_body(der: &'static [u8]) -> Response {
    ([(header::CONTENT_TYPE, OCSP_RESPONSE_CONTENT_TYPE)], der).into_response()
}

fn http_date(instant: DateTime<Utc>) -> String {
    instant.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn success_response(cache: &CachedResponse, now: DateTime<Utc>, configured_max_age: u64) -> Response {
    let template = cache.template();

    // The configured max-age never outlives the response itself.
    let to_next_update = (template.next_update - now).num_seconds().max(0) as u64;
    let max_age = configured_max_age.min(to_next_update);

    let last_modified = template.produced_at.unwrap_or(template.this_update);

    (
        [
            (header::CONTENT_TYPE, OCSP_RESPONSE_CONTENT_TYPE.to_string()),
            (
                header::CACHE_CONTROL,
                format!("max-age={max_age}, public, no-transform, must-revalidate"),
            ),
            (header::LAST_MODIFIED, http_date(last_modified)),
            (header::EXPIRES, http_date(template.next_update)),
            (header::DATE, http_date(now)),
            (header::ETAG, cache.sha1_hex()),
        ],
        Body::from(cache.response().to_vec()),
    )
        .into_response()
}

/// Serves one OCSP request (RFC 6960 over HTTP, RFC 5019 caching profile).
pub async fn handle_ocsp_request(
    State(handler): State<Arc<CacheHandler>>,
    request: Request,
) -> Response {
    let body = match extract_body(request, handler.max_request_bytes).await {
        Ok(body) => body,
        Err(response) => return response,
    };

    let parsed = match parse_ocsp_request(&body) {
        Ok(parsed) => parsed,
        Err(err) => {
            debug!(error = %err, "malformed ocsp request");
            return ocsp_error_body(&MALFORMED_REQUEST_RESPONSE);
        }
    };

    if let Err(err) = handler.responder.verify_issuer(&parsed) {
        error!(error = %err, "request issuer rejected");
        return ocsp_error_body(&UNAUTHORIZED_RESPONSE);
    }

    let Some(cache) = handler.store.get(&parsed.serial) else {
        error!(serial = %ocspd_proto::entry::serial_hex(&parsed.serial), "request serial not matched");
        return ocsp_error_body(&UNAUTHORIZED_RESPONSE);
    };

    let now = Utc::now();
    if now > cache.template().next_update {
        error!(serial = %ocspd_proto::entry::serial_hex(&parsed.serial), "nextUpdate of the cached response is in the past");
        return ocsp_error_body(&UNAUTHORIZED_RESPONSE);
    }

    success_response(&cache, now, handler.max_age)
}
