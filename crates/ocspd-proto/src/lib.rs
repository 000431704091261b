//! OCSP Responder Domain Library
//!
//! This crate provides the domain logic for a pre-signing OCSP responder:
//! revocation entries scanned from a CA database, per-field entry validation,
//! the expiration policy, the responder identity (PKI material loading,
//! verification, and response signing), and the pre-signed response cache.
//!
//! # Overview
//!
//! A pre-signing responder never signs at request time. A periodic batch
//! scans the CA's revocation database, validates each entry, builds one OCSP
//! response template per certificate, signs it, and publishes the whole set
//! as an immutable cache snapshot. Request handlers only parse the incoming
//! OCSP request, authenticate the issuer, and serve the matching pre-signed
//! DER bytes.
//!
//! The pieces compose in that order:
//!
//! - [`entry`] / [`validation`]: raw scan rows to typed [`entry::CertificateEntry`]
//!   values carrying a per-field fault set.
//! - [`expiration`]: drops or keeps entries past their expiration date.
//! - [`cache::response`]: builds a [`cache::ResponseTemplate`] from a
//!   validated entry.
//! - [`responder`]: signs templates into [`cache::CachedResponse`] values and
//!   authenticates request issuers.
//! - [`cache::store`]: serial number to pre-signed response, replaced
//!   wholesale by each batch pass.

pub mod asn1time;
pub mod cache;
pub mod entry;
pub mod expiration;
pub mod request;
pub mod responder;
pub mod spki;
pub mod validation;

pub use cache::{CacheSnapshot, CachedResponse, ReadOnlyCacheStore, ResponseCacheStore, ResponseStatus, ResponseTemplate};
pub use entry::{CertificateEntry, CrlReasonCode, RawEntry, RevocationType, ValidationFault};
pub use expiration::{ExpirationControl, ExpirationPolicy};
pub use request::{parse_ocsp_request, ParsedOcspRequest, RequestParseError};
pub use responder::{AuthorizedType, InvalidIssuerError, InvalidPkiResource, KeyAlgorithm, ResponderIdentity, SignError, SigningKey};
pub use validation::EntryValidator;
