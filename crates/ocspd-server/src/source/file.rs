//! Flat-file revocation source.
//!
//! Reads an OpenSSL `index.txt`-style database: one entry per line,
//! tab-separated columns `rev_type`, `exp_date`, `rev_date,crl_reason`,
//! `serial`. The third column is comma-split only when both halves are
//! present. Malformed rows are passed through and rejected by validation.

use super::{RevocationSource, SourceError};
use async_trait::async_trait;
use ocspd_proto::RawEntry;
use std::path::PathBuf;

const COL_REV_TYPE: usize = 0;
const COL_EXP_DATE: usize = 1;
const COL_REV_DATE_AND_REASON: usize = 2;
const COL_SERIAL: usize = 3;

pub struct FileSource {
    ca: String,
    path: PathBuf,
}

impl FileSource {
    pub fn new(ca: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self { ca: ca.into(), path: path.into() }
    }

    fn parse_line(&self, line: &str) -> RawEntry {
        let mut entry = RawEntry { ca: self.ca.clone(), ..RawEntry::default() };

        for (idx, col) in line.split('\t').enumerate() {
            match idx {
                COL_REV_TYPE => entry.rev_type = col.to_string(),
                COL_EXP_DATE => entry.exp_date = col.to_string(),
                COL_REV_DATE_AND_REASON => {
                    let parts: Vec<&str> = col.split(',').collect();
                    if parts.len() == 2 {
                        entry.rev_date = parts[0].to_string();
                        entry.crl_reason = parts[1].to_string();
                    }
                }
                COL_SERIAL => entry.serial = col.to_string(),
                _ => {}
            }
        }

        entry
    }
}

#[async_trait]
impl RevocationSource for FileSource {
    async fn scan(&self) -> Result<Vec<RawEntry>, SourceError> {
        let contents = tokio::fs::read_to_string(&self.path).await.map_err(|source| {
            SourceError::Io { path: self.path.display().to_string(), source }
        })?;

        Ok(contents.lines().map(|line| self.parse_line(line)).collect())
    }
}
