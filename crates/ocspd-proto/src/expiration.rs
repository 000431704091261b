//! Expiration policy for still-valid entries past their expiration date.
//!
//! Revoked entries always survive this filter: an expired certificate that
//! was revoked keeps answering `Revoked` until the CA database drops the
//! row. Still-valid entries past their expiration date are handled per the
//! configured policy.

use crate::entry::{CertificateEntry, RevocationType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// What to do with a `V` entry whose expiration date has passed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpirationPolicy {
    /// Drop the entry silently.
    #[default]
    Ignore,
    /// Keep the entry but emit a warning.
    Warn,
    /// Drop the entry with a log line.
    Invalid,
}

/// Applies an [`ExpirationPolicy`] to a batch of validated entries. The
/// control is stateless and is re-applied on every batch pass.
#[derive(Debug, Clone, Copy)]
pub struct ExpirationControl {
    policy: ExpirationPolicy,
}

impl ExpirationControl {
    pub fn new(policy: ExpirationPolicy) -> Self {
        Self { policy }
    }

    /// Filters `entries` against `now`. Revoked entries pass through
    /// unconditionally; valid entries pass iff `now` is before their
    /// expiration date, otherwise the policy applies.
    pub fn apply(&self, now: DateTime<Utc>, entries: Vec<CertificateEntry>) -> Vec<CertificateEntry> {
        let mut survivors = Vec::with_capacity(entries.len());

        for entry in entries {
            if entry.rev_type == Some(RevocationType::Revoked) {
                survivors.push(entry);
                continue;
            }

            if entry.exp_date.is_some_and(|exp| now < exp) {
                survivors.push(entry);
                continue;
            }

            match self.policy {
                ExpirationPolicy::Ignore => {}
                ExpirationPolicy::Warn => {
                    warn!(
                        serial = %entry.serial_text(),
                        "certificate is valid but has exceeded its expiration date"
                    );
                    survivors.push(entry);
                }
                ExpirationPolicy::Invalid => {
                    info!(
                        serial = %entry.serial_text(),
                        "certificate is no longer valid because it has exceeded its expiration date"
                    );
                }
            }
        }

        survivors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{CrlReasonCode, RawEntry};
    use crate::validation::EntryValidator;
    use chrono::TimeZone;

    fn entry(rev_type: &str, exp: &str, rev: &str, reason: &str) -> CertificateEntry {
        let entry = EntryValidator::new().parse_entry(&RawEntry {
            ca: "sub-ca".to_string(),
            serial: "01AB".to_string(),
            rev_type: rev_type.to_string(),
            exp_date: exp.to_string(),
            rev_date: rev.to_string(),
            crl_reason: reason.to_string(),
        });
        assert!(entry.is_valid(), "fixture entry must be valid: {:?}", entry.faults);
        entry
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 9, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn revoked_entries_survive_even_when_expired() {
        let expired_revoked = entry("R", "230101000000Z", "220813125631Z", "unspecified");
        for policy in [ExpirationPolicy::Ignore, ExpirationPolicy::Warn, ExpirationPolicy::Invalid] {
            let kept = ExpirationControl::new(policy).apply(now(), vec![expired_revoked.clone()]);
            assert_eq!(kept.len(), 1, "policy: {policy:?}");
        }
    }

    #[test]
    fn unexpired_valid_entries_survive() {
        let valid = entry("V", "330809123317Z", "", "");
        let kept = ExpirationControl::new(ExpirationPolicy::Ignore).apply(now(), vec![valid]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].crl_reason, CrlReasonCode::NotRevoked);
    }

    #[test]
    fn ignore_drops_expired_valid_entries() {
        let expired = entry("V", "230101000000Z", "", "");
        let kept = ExpirationControl::new(ExpirationPolicy::Ignore).apply(now(), vec![expired]);
        assert!(kept.is_empty());
    }

    #[test]
    fn warn_keeps_expired_valid_entries() {
        let expired = entry("V", "230101000000Z", "", "");
        let kept = ExpirationControl::new(ExpirationPolicy::Warn).apply(now(), vec![expired]);
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn invalid_drops_expired_valid_entries() {
        let expired = entry("V", "230101000000Z", "", "");
        let kept = ExpirationControl::new(ExpirationPolicy::Invalid).apply(now(), vec![expired]);
        assert!(kept.is_empty());
    }

    #[test]
    fn expiration_boundary_is_exclusive() {
        let exp_at_now = entry("V", "230901000000Z", "", "");
        let kept = ExpirationControl::new(ExpirationPolicy::Ignore).apply(now(), vec![exp_at_now]);
        assert!(kept.is_empty(), "an entry expiring exactly now is no longer valid");
    }
}
