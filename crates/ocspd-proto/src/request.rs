//! Incoming OCSP request parsing.
//!
//! RFC 5019 profiles requests down to a single `CertID`; the handler only
//! needs the serial number, the two issuer hashes, and whether the hash
//! algorithm is SHA-1.

use crate::responder::ALGO_SHA1_DOT;
use num_bigint::BigUint;
use ocsp::common::asn1::Oid;
use ocsp::request::OcspRequest;

/// The fields of an OCSP request's first `CertID`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedOcspRequest {
    pub serial: BigUint,
    pub issuer_name_hash: Vec<u8>,
    pub issuer_key_hash: Vec<u8>,
    /// Whether the request's `hashAlgorithm` is SHA-1, the only algorithm
    /// this responder accepts.
    pub sha1_algorithm: bool,
}

/// The request body is not a well-formed OCSP request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed OCSP request: {0}")]
pub struct RequestParseError(pub String);

/// Parses a DER-encoded OCSP request and extracts its first `CertID`.
pub fn parse_ocsp_request(der: &[u8]) -> Result<ParsedOcspRequest, RequestParseError> {
    let request = pollster::block_on(OcspRequest::parse(der))
        .map_err(|err| RequestParseError(err.to_string()))?;

    let cert_id = pollster::block_on(request.extract_certid_owned())
        .into_iter()
        .next()
        .ok_or_else(|| RequestParseError("request carries no CertID".to_string()))?;

    let sha1_oid = pollster::block_on(Oid::new_from_dot(ALGO_SHA1_DOT))
        .map_err(|err| RequestParseError(err.to_string()))?;

    Ok(ParsedOcspRequest {
        serial: BigUint::from_bytes_be(&cert_id.serial_num),
        issuer_name_hash: cert_id.issuer_name_hash,
        issuer_key_hash: cert_id.issuer_key_hash,
        sha1_algorithm: cert_id.hash_algo == sha1_oid,
    })
}
