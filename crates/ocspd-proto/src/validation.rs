//! Raw entry validation.
//!
//! [`EntryValidator`] parses a [`RawEntry`] into a [`CertificateEntry`],
//! collecting one fault per bad field instead of short-circuiting so that a
//! single log pass can report everything wrong with a row.

use crate::asn1time::parse_asn1_time;
use crate::entry::{
    CertificateEntry, CrlReasonCode, InvalidEntryError, RawEntry, RevocationType, ValidationFault,
    SERIAL_MAX_HEX_CHARS,
};
use chrono::{DateTime, Utc};
use num_bigint::BigUint;
use std::collections::BTreeMap;

/// Parses raw revocation rows into typed certificate entries.
#[derive(Debug, Clone, Copy, Default)]
pub struct EntryValidator;

impl EntryValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validates the serial column: non-empty case-insensitive hex, at most
    /// 40 characters (20 octets, RFC 5280 4.1.2.2).
    pub fn verify_serial(&self, target: &str) -> Result<BigUint, InvalidEntryError> {
        if target.is_empty() || target.len() > SERIAL_MAX_HEX_CHARS {
            return Err(InvalidEntryError { attr: "serial", value: target.to_string() });
        }

        BigUint::parse_bytes(target.as_bytes(), 16)
            .ok_or_else(|| InvalidEntryError { attr: "serial", value: target.to_string() })
    }

    /// Validates the revocation type column and cross-checks it against the
    /// revocation date and CRL reason columns. Only `V` and `R` are
    /// accepted; a `V` entry must carry neither a revocation date nor a
    /// reason, and an `R` entry must carry both.
    pub fn verify_rev_type(
        &self,
        target: &str,
        rev_date: &str,
        crl_reason: &str,
    ) -> Result<RevocationType, InvalidEntryError> {
        match target {
            "V" => {
                if !rev_date.is_empty() {
                    return Err(InvalidEntryError {
                        attr: "rev_type",
                        value: "rev_type is V but rev_date exists".to_string(),
                    });
                }
                if !crl_reason.is_empty() {
                    return Err(InvalidEntryError {
                        attr: "rev_type",
                        value: "rev_type is V but crl_reason exists".to_string(),
                    });
                }
                Ok(RevocationType::Valid)
            }
            "R" => {
                if rev_date.is_empty() {
                    return Err(InvalidEntryError {
                        attr: "rev_type",
                        value: "rev_type is R but rev_date does not exist".to_string(),
                    });
                }
                if crl_reason.is_empty() {
                    return Err(InvalidEntryError {
                        attr: "rev_type",
                        value: "rev_type is R but crl_reason does not exist".to_string(),
                    });
                }
                Ok(RevocationType::Revoked)
            }
            other => Err(InvalidEntryError { attr: "rev_type", value: other.to_string() }),
        }
    }

    /// Validates the expiration date column (UTCTime or GeneralizedTime).
    pub fn verify_exp_date(&self, target: &str) -> Result<DateTime<Utc>, InvalidEntryError> {
        parse_asn1_time(target)
            .map_err(|_| InvalidEntryError { attr: "exp_date", value: target.to_string() })
    }

    /// Validates the revocation date column. An empty column is valid and
    /// means "not revoked".
    pub fn verify_rev_date(&self, target: &str) -> Result<Option<DateTime<Utc>>, InvalidEntryError> {
        if target.is_empty() {
            return Ok(None);
        }

        parse_asn1_time(target)
            .map(Some)
            .map_err(|_| InvalidEntryError { attr: "rev_date", value: target.to_string() })
    }

    /// Validates the CRL reason column (case-sensitive label match).
    pub fn verify_crl_reason(&self, target: &str) -> Result<CrlReasonCode, InvalidEntryError> {
        CrlReasonCode::from_label(target)
            .ok_or_else(|| InvalidEntryError { attr: "crl_reason", value: target.to_string() })
    }

    /// Parses a [`CertificateEntry`] from a raw row, recording a
    /// [`ValidationFault`] for every column that fails.
    pub fn parse_entry(&self, raw: &RawEntry) -> CertificateEntry {
        let mut faults = BTreeMap::new();

        let serial = match self.verify_serial(&raw.serial) {
            Ok(serial) => Some(serial),
            Err(err) => {
                faults.insert(ValidationFault::MalformedSerial, err);
                None
            }
        };

        let exp_date = match self.verify_exp_date(&raw.exp_date) {
            Ok(date) => Some(date),
            Err(err) => {
                faults.insert(ValidationFault::MalformedExpDate, err);
                None
            }
        };

        let rev_date = match self.verify_rev_date(&raw.rev_date) {
            Ok(date) => date,
            Err(err) => {
                faults.insert(ValidationFault::MalformedRevDate, err);
                None
            }
        };

        let crl_reason = match self.verify_crl_reason(&raw.crl_reason) {
            Ok(reason) => reason,
            Err(err) => {
                faults.insert(ValidationFault::UndefinedCrlReason, err);
                CrlReasonCode::NotRevoked
            }
        };

        let rev_type = match self.verify_rev_type(&raw.rev_type, &raw.rev_date, &raw.crl_reason) {
            Ok(rev_type) => Some(rev_type),
            Err(err) => {
                faults.insert(ValidationFault::UndefinedRevType, err);
                None
            }
        };

        CertificateEntry {
            ca: raw.ca.clone(),
            serial,
            rev_type,
            exp_date,
            rev_date,
            crl_reason,
            faults,
        }
    }
}
