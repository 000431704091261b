//! Revocation status entries scanned from a CA database.
//!
//! A [`RawEntry`] is the untyped row a revocation source hands back; it is
//! parsed into a [`CertificateEntry`] by [`crate::validation::EntryValidator`].
//! Validation never short-circuits: every field fault is recorded in the
//! entry's fault set and an entry with any fault is dropped before signing.

use chrono::{DateTime, Utc};
use num_bigint::BigUint;
use std::collections::BTreeMap;

/// Maximum serial number length per RFC 5280 4.1.2.2.
pub const SERIAL_MAX_OCTETS: usize = 20;

/// Maximum serial number length in base-16 text form.
pub const SERIAL_MAX_HEX_CHARS: usize = SERIAL_MAX_OCTETS * 2;

/// Canonical textual form of a serial number: uppercase base-16 of the
/// magnitude. Both the cache writer and the request reader key on this form.
pub fn serial_hex(serial: &BigUint) -> String {
    serial.to_str_radix(16).to_uppercase()
}

/// One raw row from a revocation source, unvalidated.
///
/// The field layout matches the OpenSSL `index.txt` database: revocation
/// type `V`/`R`/`E`, expiration date, revocation date, CRL reason label,
/// and the serial number in hex text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawEntry {
    pub ca: String,
    pub serial: String,
    pub rev_type: String,
    pub exp_date: String,
    pub rev_date: String,
    pub crl_reason: String,
}

/// Certificate revocation status after validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevocationType {
    /// The certificate is valid (`V`).
    Valid,
    /// The certificate has been revoked (`R`).
    Revoked,
}

/// RFC 5280 5.3.1 reason codes, plus a marker for entries that are not
/// revoked at all (empty reason column).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrlReasonCode {
    NotRevoked,
    Unspecified,
    KeyCompromise,
    CaCompromise,
    AffiliationChanged,
    Superseded,
    CessationOfOperation,
    CertificateHold,
    RemoveFromCrl,
    PrivilegeWithdrawn,
    AaCompromise,
}

impl CrlReasonCode {
    /// Parses the OpenSSL index reason label. Matching is case-sensitive;
    /// the empty string means "not revoked".
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "" => Some(Self::NotRevoked),
            "unspecified" => Some(Self::Unspecified),
            "keyCompromise" => Some(Self::KeyCompromise),
            "CACompromise" => Some(Self::CaCompromise),
            "affiliationChanged" => Some(Self::AffiliationChanged),
            "superseded" => Some(Self::Superseded),
            "cessationOfOperation" => Some(Self::CessationOfOperation),
            "certificateHold" => Some(Self::CertificateHold),
            "removeFromCRL" => Some(Self::RemoveFromCrl),
            "privilegeWithdrawn" => Some(Self::PrivilegeWithdrawn),
            "AACompromise" => Some(Self::AaCompromise),
            _ => None,
        }
    }
}

/// Tags identifying which field of an entry failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ValidationFault {
    MalformedSerial,
    UndefinedRevType,
    MalformedExpDate,
    MalformedRevDate,
    UndefinedCrlReason,
}

/// Why a single field of a scanned entry is invalid.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {attr}: {value}")]
pub struct InvalidEntryError {
    pub attr: &'static str,
    pub value: String,
}

/// A revocation status entry used to create a pre-signed response cache.
///
/// Fields that failed to parse are left unset and the corresponding
/// [`ValidationFault`] is recorded in `faults`. An entry is only eligible
/// for pre-signing when `faults` is empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateEntry {
    pub ca: String,
    pub serial: Option<BigUint>,
    pub rev_type: Option<RevocationType>,
    pub exp_date: Option<DateTime<Utc>>,
    /// Revocation instant; `None` when the certificate is not revoked.
    pub rev_date: Option<DateTime<Utc>>,
    pub crl_reason: CrlReasonCode,
    pub faults: BTreeMap<ValidationFault, InvalidEntryError>,
}

impl CertificateEntry {
    /// True when no field of the entry failed validation.
    pub fn is_valid(&self) -> bool {
        self.faults.is_empty()
    }

    /// Canonical serial text for logging, or `-` when the serial itself
    /// failed to parse.
    pub fn serial_text(&self) -> String {
        self.serial.as_ref().map(serial_hex).unwrap_or_else(|| "-".to_string())
    }
}
