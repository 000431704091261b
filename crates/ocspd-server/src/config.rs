//! Service configuration.
//!
//! The configuration file is YAML. Optional fields have serde defaults;
//! cross-field constraints are checked by [`Config::validate`], which
//! collects every fault instead of stopping at the first so an operator can
//! fix a config file in one round.

use ocspd_proto::ExpirationPolicy;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_INTERVAL_SEC: u64 = 60;
pub const DEFAULT_DELAY_SEC: u64 = 5;
pub const DEFAULT_READ_TIMEOUT_SEC: u64 = 30;
pub const DEFAULT_MAX_REQUEST_BYTES: usize = 256;
pub const DEFAULT_DYNAMODB_TIMEOUT_SEC: u64 = 60;

/// A configuration file that cannot be loaded or does not satisfy the
/// cross-field constraints.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("could not parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("'{param}' parameter is not set or contains an empty value")]
    MissingParameter { param: &'static str },
    #[error("'{param}' parameter is invalid: {reason}")]
    InvalidParameter { param: &'static str, reason: &'static str },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub strict: bool,
    #[serde(default)]
    pub expiration: ExpirationPolicy,
    #[serde(default)]
    pub log: LogConfig,
    pub responder: ResponderConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    pub db: DbConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// One of `error`, `warn`, `info`, `debug`.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { level: default_log_level(), format: LogFormat::default() }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponderConfig {
    /// CA label the revocation source is scanned for.
    pub ca: String,
    /// Path to the PEM responder certificate.
    pub certificate: PathBuf,
    /// Path to the PEM PKCS#8 responder key. May be omitted when the key is
    /// passed in the `OCSPD_PRIVATE_KEY` environment variable instead.
    #[serde(default)]
    pub key: Option<PathBuf>,
    /// Path to the PEM issuer certificate.
    pub issuer_certificate: PathBuf,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CacheConfig {
    /// Seconds between one `nextUpdate` and the next.
    #[serde(default = "default_interval")]
    pub interval: u64,
    /// Head start in seconds: each pass begins this long before its anchor.
    #[serde(default = "default_delay")]
    pub delay: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { interval: default_interval(), delay: default_delay() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DbConfig {
    #[serde(default)]
    pub file: Option<FileDbConfig>,
    #[serde(default)]
    pub dynamodb: Option<DynamoDbConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileDbConfig {
    /// OpenSSL `index.txt`-format revocation database.
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DynamoDbConfig {
    pub region: String,
    pub table_name: String,
    /// Global secondary index keyed on the `ca` attribute.
    pub ca_gsi: String,
    /// Endpoint override, e.g. a local DynamoDB for testing.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub retry_max_attempts: u32,
    /// Scan deadline in seconds.
    #[serde(default = "default_dynamodb_timeout")]
    pub timeout: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_read_timeout")]
    pub read_timeout: u64,
    /// Requests with a larger `Content-Length` are answered with 413.
    /// `0` disables the check.
    #[serde(default = "default_max_request_bytes")]
    pub max_request_bytes: usize,
    /// Ceiling for the `Cache-Control: max-age` directive. Defaults to the
    /// cache interval and must not exceed it.
    #[serde(default)]
    pub cache_control_max_age: Option<u64>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            read_timeout: default_read_timeout(),
            max_request_bytes: default_max_request_bytes(),
            cache_control_max_age: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_interval() -> u64 {
    DEFAULT_INTERVAL_SEC
}

fn default_delay() -> u64 {
    DEFAULT_DELAY_SEC
}

fn default_listen() -> String {
    "0.0.0.0:80".to_string()
}

fn default_read_timeout() -> u64 {
    DEFAULT_READ_TIMEOUT_SEC
}

fn default_max_request_bytes() -> usize {
    DEFAULT_MAX_REQUEST_BYTES
}

fn default_dynamodb_timeout() -> u64 {
    DEFAULT_DYNAMODB_TIMEOUT_SEC
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_yaml::from_str(&contents)?)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// The effective `Cache-Control: max-age` ceiling.
    pub fn cache_control_max_age(&self) -> u64 {
        self.http.cache_control_max_age.unwrap_or(self.cache.interval)
    }

    /// Checks cross-field constraints, returning every violation.
    pub fn validate(&self) -> Result<(), Vec<ConfigError>> {
        let mut errs = Vec::new();

        if self.responder.ca.is_empty() {
            errs.push(ConfigError::MissingParameter { param: "responder.ca" });
        }
        if self.responder.certificate.as_os_str().is_empty() {
            errs.push(ConfigError::MissingParameter { param: "responder.certificate" });
        }
        if self.responder.issuer_certificate.as_os_str().is_empty() {
            errs.push(ConfigError::MissingParameter { param: "responder.issuer_certificate" });
        }

        if !matches!(self.log.level.as_str(), "error" | "warn" | "info" | "debug") {
            errs.push(ConfigError::InvalidParameter {
                param: "log.level",
                reason: "[error|warn|info|debug]",
            });
        }

        if self.cache.interval == 0 {
            errs.push(ConfigError::InvalidParameter {
                param: "cache.interval",
                reason: "the number of seconds must be > 0",
            });
        } else if self.cache.delay > self.cache.interval {
            errs.push(ConfigError::InvalidParameter {
                param: "cache.delay",
                reason: "cache.delay must be <= cache.interval",
            });
        }

        match (&self.db.file, &self.db.dynamodb) {
            (None, None) => errs.push(ConfigError::MissingParameter { param: "db.<db-type>" }),
            (Some(_), Some(_)) => errs.push(ConfigError::InvalidParameter {
                param: "db.<db-type>",
                reason: "DB type is exclusive",
            }),
            _ => {}
        }

        if let Some(dynamodb) = &self.db.dynamodb {
            if dynamodb.timeout == 0 {
                errs.push(ConfigError::InvalidParameter {
                    param: "db.dynamodb.timeout",
                    reason: "the number of seconds for timeout must be > 0",
                });
            }
            if let Some(endpoint) = &dynamodb.endpoint {
                if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                    errs.push(ConfigError::InvalidParameter {
                        param: "db.dynamodb.endpoint",
                        reason: "url must start with 'http://' or 'https://'",
                    });
                }
            }
        }

        if let Some(max_age) = self.http.cache_control_max_age {
            if max_age == 0 {
                errs.push(ConfigError::InvalidParameter {
                    param: "http.cache_control_max_age",
                    reason: "cache-control max-age must be > 0",
                });
            } else if max_age > self.cache.interval {
                errs.push(ConfigError::InvalidParameter {
                    param: "http.cache_control_max_age",
                    reason: "cache-control max-age must be <= cache.interval",
                });
            }
        }

        if errs.is_empty() {
            Ok(())
        } else {
            Err(errs)
        }
    }
}
