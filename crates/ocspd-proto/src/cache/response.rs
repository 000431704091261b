//! Pre-signed response templates and the cached response they become.

use crate::entry::{
    serial_hex, CertificateEntry, CrlReasonCode, RevocationType, SERIAL_MAX_HEX_CHARS,
};
use chrono::{DateTime, Duration, Utc};
use num_bigint::BigUint;

/// Certificate status carried by a single OCSP response (RFC 6960 4.2.1).
/// `Unknown` is never pre-signed: a serial outside the CA's scope simply has
/// no cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    Good,
    Revoked,
}

/// The single-response template handed to the signer.
///
/// `this_update` is the batch's current nextUpdate anchor and `next_update`
/// is one interval later; `produced_at` is stamped at signing time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseTemplate {
    pub serial: BigUint,
    pub status: ResponseStatus,
    /// Revocation instant for revoked entries; for valid entries the
    /// expiration date stands in (it is not emitted for a Good status).
    pub revoked_at: DateTime<Utc>,
    pub revocation_reason: CrlReasonCode,
    pub this_update: DateTime<Utc>,
    pub next_update: DateTime<Utc>,
    pub produced_at: Option<DateTime<Utc>>,
    /// DER of the responder certificate, attached when the responder is a
    /// delegated OCSP signer so the encoder can embed it in the response.
    pub certificate: Option<Vec<u8>>,
}

/// Why a template could not be created from an entry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResponseCacheNotCreated {
    #[error("pre-signed cache could not be created: entry already contains a previously identified error")]
    OutstandingFaults,
    #[error("pre-signed cache could not be created: entry has no serial number")]
    MissingSerial,
    #[error("pre-signed cache could not be created: serial {0} exceeds 20 octets")]
    SerialTooLong(String),
}

/// Builds a [`ResponseTemplate`] from a validated entry.
///
/// `this_update` is the batch anchor; `next_update` becomes
/// `this_update + interval`. Valid entries map to a Good status with the
/// expiration date as the revocation placeholder; revoked entries map to
/// Revoked with their revocation date.
pub fn build_template(
    entry: &CertificateEntry,
    this_update: DateTime<Utc>,
    interval: Duration,
) -> Result<ResponseTemplate, ResponseCacheNotCreated> {
    if !entry.is_valid() {
        return Err(ResponseCacheNotCreated::OutstandingFaults);
    }

    let serial = entry.serial.clone().ok_or(ResponseCacheNotCreated::MissingSerial)?;
    let serial_text = serial_hex(&serial);
    if serial_text.len() > SERIAL_MAX_HEX_CHARS {
        return Err(ResponseCacheNotCreated::SerialTooLong(serial_text));
    }

    let status = match entry.rev_type {
        Some(RevocationType::Revoked) => ResponseStatus::Revoked,
        _ => ResponseStatus::Good,
    };

    let revoked_at = entry.rev_date.or(entry.exp_date).unwrap_or(this_update);

    let revocation_reason = match entry.crl_reason {
        CrlReasonCode::NotRevoked => CrlReasonCode::Unspecified,
        reason => reason,
    };

    Ok(ResponseTemplate {
        serial,
        status,
        revoked_at,
        revocation_reason,
        this_update,
        next_update: this_update + interval,
        produced_at: None,
        certificate: None,
    })
}

/// A pre-produced OCSP response (RFC 5019): the validated source entry, the
/// template it was built from, the signed DER bytes, and the SHA-1 of those
/// bytes used as the HTTP `ETag`. Immutable after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    entry: CertificateEntry,
    template: ResponseTemplate,
    response: Vec<u8>,
    sha1: Vec<u8>,
}

impl CachedResponse {
    pub fn new(
        entry: CertificateEntry,
        template: ResponseTemplate,
        response: Vec<u8>,
        sha1: Vec<u8>,
    ) -> Self {
        Self { entry, template, response, sha1 }
    }

    pub fn entry(&self) -> &CertificateEntry {
        &self.entry
    }

    pub fn template(&self) -> &ResponseTemplate {
        &self.template
    }

    /// The signed OCSP response DER, written to clients verbatim.
    pub fn response(&self) -> &[u8] {
        &self.response
    }

    /// Lowercase hex of the response SHA-1, the HTTP `ETag` value.
    pub fn sha1_hex(&self) -> String {
        hex::encode(&self.sha1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{RawEntry, ValidationFault};
    use crate::validation::EntryValidator;
    use chrono::TimeZone;
    use std::collections::BTreeMap;

    const SERIAL: &str = "72344BF34067BBA31EF44587CBFB16631332CD23";

    fn parse(serial: &str, rev_type: &str, exp: &str, rev: &str, reason: &str) -> CertificateEntry {
        EntryValidator::new().parse_entry(&RawEntry {
            ca: "sub-ca".to_string(),
            serial: serial.to_string(),
            rev_type: rev_type.to_string(),
            exp_date: exp.to_string(),
            rev_date: rev.to_string(),
            crl_reason: reason.to_string(),
        })
    }

    fn anchor() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 8, 9, 12, 30, 0).unwrap()
    }

    #[test]
    fn valid_entry_maps_to_good_status() {
        let entry = parse(SERIAL, "V", "330809123317Z", "", "");
        let template = build_template(&entry, anchor(), Duration::seconds(60)).unwrap();
        assert_eq!(template.status, ResponseStatus::Good);
        assert_eq!(template.revoked_at, entry.exp_date.unwrap());
        assert_eq!(template.revocation_reason, CrlReasonCode::Unspecified);
        assert_eq!(template.this_update, anchor());
        assert_eq!(template.next_update, anchor() + Duration::seconds(60));
        assert_eq!(template.produced_at, None);
        assert_eq!(template.certificate, None);
    }

    #[test]
    fn revoked_entry_maps_to_revoked_status() {
        let entry = parse(SERIAL, "R", "330809123317Z", "230813125631Z", "keyCompromise");
        let template = build_template(&entry, anchor(), Duration::seconds(60)).unwrap();
        assert_eq!(template.status, ResponseStatus::Revoked);
        assert_eq!(template.revoked_at, entry.rev_date.unwrap());
        assert_eq!(template.revocation_reason, CrlReasonCode::KeyCompromise);
    }

    #[test]
    fn entry_with_faults_is_rejected() {
        let entry = parse("ZZZZ", "V", "330809123317Z", "", "");
        assert!(entry.faults.contains_key(&ValidationFault::MalformedSerial));
        assert_eq!(
            build_template(&entry, anchor(), Duration::seconds(60)),
            Err(ResponseCacheNotCreated::OutstandingFaults)
        );
    }

    #[test]
    fn entry_without_serial_is_rejected() {
        let mut entry = parse(SERIAL, "V", "330809123317Z", "", "");
        entry.serial = None;
        entry.faults = BTreeMap::new();
        assert_eq!(
            build_template(&entry, anchor(), Duration::seconds(60)),
            Err(ResponseCacheNotCreated::MissingSerial)
        );
    }

    #[test]
    fn serial_over_twenty_octets_is_rejected() {
        let mut entry = parse(SERIAL, "V", "330809123317Z", "", "");
        entry.serial = Some(num_bigint::BigUint::from_bytes_be(&[0xffu8; 21]));
        assert!(matches!(
            build_template(&entry, anchor(), Duration::seconds(60)),
            Err(ResponseCacheNotCreated::SerialTooLong(_))
        ));
    }
}
