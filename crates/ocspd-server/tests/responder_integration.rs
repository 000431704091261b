//! End-to-end tests: one batch pass over a fake revocation source, then
//! OCSP requests served through the full router.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use base64::prelude::{Engine as _, BASE64_STANDARD};
use chrono::Utc;
use num_bigint::BigUint;
use ocspd_proto::{
    AuthorizedType, RawEntry, ReadOnlyCacheStore, ResponderIdentity, ResponseCacheStore,
    ResponseStatus, SigningKey,
};
use ocspd_server::batch::CacheBatch;
use ocspd_server::handler::CacheHandler;
use ocspd_server::source::{RevocationSource, SourceError};
use ring::signature::{EcdsaKeyPair, ECDSA_P256_SHA256_ASN1_SIGNING};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;

const ISSUER_NAME_HASH: [u8; 20] = [0x11; 20];
const ISSUER_KEY_HASH: [u8; 20] = [0x22; 20];

const SERIAL_GOOD: &str = "8CA7C5F5";
const SERIAL_EXPIRED: &str = "8CA7C5F9";
const SERIAL_REVOKED: &str = "8CA7C5F7";

const MALFORMED_REQUEST_RESPONSE: [u8; 5] = [0x30, 0x03, 0x0a, 0x01, 0x01];
const UNAUTHORIZED_RESPONSE: [u8; 5] = [0x30, 0x03, 0x0a, 0x01, 0x06];

struct FakeSource {
    entries: Mutex<Vec<RawEntry>>,
}

#[async_trait]
impl RevocationSource for FakeSource {
    async fn scan(&self) -> Result<Vec<RawEntry>, SourceError> {
        Ok(self.entries.lock().unwrap().clone())
    }
}

fn raw(serial: &str, rev_type: &str, exp: &str, rev: &str, reason: &str) -> RawEntry {
    RawEntry {
        ca: "sub-ca".to_string(),
        serial: serial.to_string(),
        rev_type: rev_type.to_string(),
        exp_date: exp.to_string(),
        rev_date: rev.to_string(),
        crl_reason: reason.to_string(),
    }
}

fn scenario_rows() -> Vec<RawEntry> {
    vec![
        raw(SERIAL_GOOD, "V", "330925234911Z", "", ""),
        raw(SERIAL_EXPIRED, "E", "230825234911Z", "", ""),
        raw(SERIAL_REVOKED, "R", "330823234911Z", "230826234911Z", "unspecified"),
    ]
}

fn test_responder(authorized_type: AuthorizedType) -> Arc<ResponderIdentity> {
    let rng = ring::rand::SystemRandom::new();
    let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, &rng).unwrap();
    let pair =
        EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, pkcs8.as_ref(), &rng).unwrap();
    Arc::new(ResponderIdentity::from_parts(
        b"test responder certificate".to_vec(),
        SigningKey::Ecdsa(pair),
        ISSUER_NAME_HASH,
        ISSUER_KEY_HASH,
        [0x33; 20],
        authorized_type,
    ))
}

/// Runs one batch pass with a 200s interval and returns the populated store
/// plus a router serving it.
async fn responder_under_test(
    rows: Vec<RawEntry>,
    authorized_type: AuthorizedType,
    max_age: u64,
) -> (Arc<ResponseCacheStore>, Router) {
    let store = Arc::new(ResponseCacheStore::new());
    let responder = test_responder(authorized_type);

    let batch = CacheBatch::builder(
        "sub-ca",
        Arc::clone(&store),
        Arc::new(FakeSource { entries: Mutex::new(rows) }),
        Arc::clone(&responder),
        Utc::now(),
    )
    .interval_secs(200)
    .build()
    .unwrap();

    let rejected = store.replace(batch.run_once().await.unwrap());
    assert!(rejected.is_empty());

    let handler =
        CacheHandler::new(ReadOnlyCacheStore::new(Arc::clone(&store)), responder, 256, max_age);
    (store, ocspd_server::server::app(handler, Duration::from_secs(30)))
}

/// Hand-assembles a single-CertID SHA-1 OCSP request.
fn build_request_der(name_hash: &[u8; 20], key_hash: &[u8; 20], serial: &[u8]) -> Vec<u8> {
    let algorithm = [0x30, 0x09, 0x06, 0x05, 0x2b, 0x0e, 0x03, 0x02, 0x1a, 0x05, 0x00];

    let mut inner = Vec::new();
    inner.extend_from_slice(&algorithm);
    inner.extend_from_slice(&[0x04, 0x14]);
    inner.extend_from_slice(name_hash);
    inner.extend_from_slice(&[0x04, 0x14]);
    inner.extend_from_slice(key_hash);
    inner.push(0x02);
    inner.push(serial.len() as u8);
    inner.extend_from_slice(serial);

    // CertID, Request, requestList, TBSRequest, OCSPRequest
    for _ in 0..5 {
        let mut wrapped = vec![0x30, inner.len() as u8];
        wrapped.append(&mut inner);
        inner = wrapped;
    }
    inner
}

fn request_for(serial_hex: &str) -> Vec<u8> {
    let serial = BigUint::parse_bytes(serial_hex.as_bytes(), 16).unwrap();
    let mut bytes = serial.to_bytes_be();
    if bytes[0] & 0x80 != 0 {
        bytes.insert(0, 0x00);
    }
    build_request_der(&ISSUER_NAME_HASH, &ISSUER_KEY_HASH, &bytes)
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), 1 << 20).await.unwrap().to_vec()
}

async fn post_ocsp(app: Router, body: Vec<u8>) -> axum::response::Response {
    app.oneshot(
        Request::builder()
            .method("POST")
            .uri("/")
            .header(header::CONTENT_TYPE, "application/ocsp-request")
            .body(Body::from(body))
            .unwrap(),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn pass_publishes_exactly_good_and_revoked_serials() {
    let (store, _) = responder_under_test(scenario_rows(), AuthorizedType::Itself, 200).await;

    assert_eq!(store.snapshot().len(), 2);
    let good = store.get(&BigUint::parse_bytes(SERIAL_GOOD.as_bytes(), 16).unwrap()).unwrap();
    assert_eq!(good.template().status, ResponseStatus::Good);
    let revoked =
        store.get(&BigUint::parse_bytes(SERIAL_REVOKED.as_bytes(), 16).unwrap()).unwrap();
    assert_eq!(revoked.template().status, ResponseStatus::Revoked);
    assert!(store.get(&BigUint::parse_bytes(SERIAL_EXPIRED.as_bytes(), 16).unwrap()).is_none());
}

#[tokio::test]
async fn delegated_responder_embeds_certificate_direct_does_not() {
    let (store, _) = responder_under_test(scenario_rows(), AuthorizedType::Delegation, 200).await;
    let cached = store.get(&BigUint::parse_bytes(SERIAL_GOOD.as_bytes(), 16).unwrap()).unwrap();
    assert!(cached.template().certificate.is_some());

    let (store, _) = responder_under_test(scenario_rows(), AuthorizedType::Itself, 200).await;
    let cached = store.get(&BigUint::parse_bytes(SERIAL_GOOD.as_bytes(), 16).unwrap()).unwrap();
    assert!(cached.template().certificate.is_none());
}

#[tokio::test]
async fn garbage_post_body_yields_malformed_request_response() {
    let (_, app) = responder_under_test(scenario_rows(), AuthorizedType::Itself, 200).await;
    let response = post_ocsp(app, vec![0xff, 0xff, 0xff]).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/ocsp-response"
    );
    assert_eq!(body_bytes(response).await, MALFORMED_REQUEST_RESPONSE);
}

#[tokio::test]
async fn unknown_serial_yields_unauthorized_response() {
    let (_, app) = responder_under_test(scenario_rows(), AuthorizedType::Itself, 200).await;
    let response = post_ocsp(app, request_for("0123456789")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, UNAUTHORIZED_RESPONSE);
}

#[tokio::test]
async fn wrong_issuer_hash_yields_unauthorized_response() {
    let (_, app) = responder_under_test(scenario_rows(), AuthorizedType::Itself, 200).await;
    let der = build_request_der(&[0xaa; 20], &ISSUER_KEY_HASH, &[0x8c, 0xa7, 0xc5, 0xf5]);
    let response = post_ocsp(app, der).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, UNAUTHORIZED_RESPONSE);
}

#[tokio::test]
async fn cache_hit_serves_presigned_bytes_with_rfc5019_headers() {
    let (store, app) = responder_under_test(scenario_rows(), AuthorizedType::Itself, 256).await;
    let cached = store.get(&BigUint::parse_bytes(SERIAL_GOOD.as_bytes(), 16).unwrap()).unwrap();

    let response = post_ocsp(app, request_for(SERIAL_GOOD)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let headers = response.headers().clone();
    assert_eq!(headers.get(header::CONTENT_TYPE).unwrap(), "application/ocsp-response");
    assert_eq!(headers.get(header::ETAG).unwrap().to_str().unwrap(), cached.sha1_hex());
    assert!(headers.get(header::LAST_MODIFIED).is_some());
    assert!(headers.get(header::EXPIRES).is_some());
    assert!(headers.get(header::DATE).is_some());

    let cache_control = headers.get(header::CACHE_CONTROL).unwrap().to_str().unwrap().to_string();
    let max_age: u64 = cache_control
        .strip_prefix("max-age=")
        .and_then(|rest| rest.split(',').next())
        .and_then(|n| n.parse().ok())
        .unwrap();
    // interval 200s, request right after thisUpdate: never above either cap
    assert!(max_age <= 200, "max-age={max_age}");
    assert!(cache_control.ends_with("public, no-transform, must-revalidate"));

    assert_eq!(body_bytes(response).await, cached.response());
}

#[tokio::test]
async fn get_with_base64_path_serves_cache_hit() {
    let (store, app) = responder_under_test(scenario_rows(), AuthorizedType::Itself, 200).await;
    let cached = store.get(&BigUint::parse_bytes(SERIAL_GOOD.as_bytes(), 16).unwrap()).unwrap();

    let encoded = BASE64_STANDARD.encode(request_for(SERIAL_GOOD));
    let uri = format!("/{}", urlencoding::encode(&encoded));
    let response = app
        .oneshot(Request::builder().method("GET").uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, cached.response());
}

#[tokio::test]
async fn stale_cache_entry_yields_unauthorized_response() {
    // Anchor the pass far enough in the past that nextUpdate already elapsed.
    let store = Arc::new(ResponseCacheStore::new());
    let responder = test_responder(AuthorizedType::Itself);
    let batch = CacheBatch::builder(
        "sub-ca",
        Arc::clone(&store),
        Arc::new(FakeSource { entries: Mutex::new(scenario_rows()) }),
        Arc::clone(&responder),
        Utc::now() - chrono::Duration::seconds(600),
    )
    .interval_secs(200)
    .build()
    .unwrap();
    store.replace(batch.run_once().await.unwrap());

    let handler =
        CacheHandler::new(ReadOnlyCacheStore::new(Arc::clone(&store)), responder, 256, 200);
    let app = ocspd_server::server::app(handler, Duration::from_secs(30));

    let response = post_ocsp(app, request_for(SERIAL_GOOD)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, UNAUTHORIZED_RESPONSE);
}

#[tokio::test]
async fn revocation_flip_is_served_after_further_passes() {
    let store = Arc::new(ResponseCacheStore::new());
    let responder = test_responder(AuthorizedType::Itself);
    let source = Arc::new(FakeSource { entries: Mutex::new(scenario_rows()) });
    let batch = CacheBatch::builder(
        "sub-ca",
        Arc::clone(&store),
        Arc::clone(&source) as Arc<dyn RevocationSource>,
        Arc::clone(&responder),
        Utc::now(),
    )
    .interval_secs(200)
    .build()
    .unwrap();

    store.replace(batch.run_once().await.unwrap());

    *source.entries.lock().unwrap() = vec![
        raw(SERIAL_GOOD, "R", "330925234911Z", "230826234911Z", "unspecified"),
        raw(SERIAL_REVOKED, "R", "330823234911Z", "230826234911Z", "unspecified"),
    ];
    store.replace(batch.run_once().await.unwrap());
    store.replace(batch.run_once().await.unwrap());

    let flipped = store.get(&BigUint::parse_bytes(SERIAL_GOOD.as_bytes(), 16).unwrap()).unwrap();
    assert_eq!(flipped.template().status, ResponseStatus::Revoked);
}
