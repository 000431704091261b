//! Revocation-source backends.
//!
//! A [`RevocationSource`] produces the flat list of raw revocation records
//! for one CA that each batch pass starts from. Ordering is not guaranteed
//! and duplicates may appear; the validator and the cache store reject them
//! downstream. Errors surface to the batch, which logs and continues with
//! an empty pass (or aborts in strict mode).

mod dynamo;
mod file;

pub use dynamo::DynamoSource;
pub use file::FileSource;

use async_trait::async_trait;
use ocspd_proto::RawEntry;

/// A revocation database that can be scanned for one CA's entries.
#[async_trait]
pub trait RevocationSource: Send + Sync {
    async fn scan(&self) -> Result<Vec<RawEntry>, SourceError>;
}

/// A failed or timed-out scan.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("could not read revocation database {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("revocation database scan timed out after {0}s")]
    Timeout(u64),
    #[error("revocation database scan failed: {0}")]
    Backend(String),
}
