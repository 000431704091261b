//! Pre-signing OCSP responder service.
//!
//! Wires the domain library (`ocspd-proto`) into a running responder: a
//! YAML [`config`], the revocation [`source`] backends, the periodic cache
//! [`batch`], and the axum HTTP [`handler`] serving pre-signed responses
//! with RFC 5019 caching headers.

pub mod batch;
pub mod config;
pub mod handler;
pub mod server;
pub mod source;

pub use batch::{quiesce_channel, BatchBuildError, BatchError, CacheBatch, CacheBatchBuilder, Quiesce, QuiesceHandle};
pub use config::{Config, ConfigError};
pub use handler::CacheHandler;
pub use source::{FileSource, RevocationSource, SourceError};
