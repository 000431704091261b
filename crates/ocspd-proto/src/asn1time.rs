//! ASN.1 time parsing for revocation database columns.
//!
//! Revocation sources store dates the way certificates do: UTCTime
//! (`YYMMDDhhmmssZ`, RFC 5280 4.1.2.5.1) or GeneralizedTime
//! (`YYYYMMDDhhmmssZ`, RFC 5280 4.1.2.5.2), always Zulu.

use chrono::{DateTime, NaiveDateTime, Utc};

/// RFC 5280 4.1.2.5.1: `YY >= 50` is interpreted as `19YY`, `YY < 50`
/// as `20YY`.
pub const UTC_TIME_YY_BOUNDARY: u32 = 50;

const UTC_TIME_LEN: usize = 13;
const GENERALIZED_TIME_LEN: usize = 15;
const GENERALIZED_TIME_FORMAT: &str = "%Y%m%d%H%M%SZ";

/// A date column that is neither a valid UTCTime nor a valid
/// GeneralizedTime.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("not an ASN.1 UTCTime or GeneralizedTime: {0}")]
pub struct Asn1TimeError(pub String);

/// Current wall clock in UTC. OCSP timestamps are GeneralizedTime, which is
/// always expressed in Greenwich Mean Time (RFC 6960 4.2.2.1).
pub fn now_gmt() -> DateTime<Utc> {
    Utc::now()
}

/// Parses a UTCTime or GeneralizedTime string into a UTC instant.
pub fn parse_asn1_time(value: &str) -> Result<DateTime<Utc>, Asn1TimeError> {
    let expanded = match value.len() {
        UTC_TIME_LEN => {
            let yy: u32 = value
                .get(..2)
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| Asn1TimeError(value.to_string()))?;
            if yy < UTC_TIME_YY_BOUNDARY {
                format!("20{value}")
            } else {
                format!("19{value}")
            }
        }
        GENERALIZED_TIME_LEN => value.to_string(),
        _ => return Err(Asn1TimeError(value.to_string())),
    };

    NaiveDateTime::parse_from_str(&expanded, GENERALIZED_TIME_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|_| Asn1TimeError(value.to_string()))
}
