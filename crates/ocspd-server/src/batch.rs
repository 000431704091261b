//! The cache generation batch.
//!
//! A single long-running producer that scans the revocation source,
//! validates the entries, pre-signs one response per certificate, and
//! replaces the cache snapshot, over and over on a wall-clock `nextUpdate`
//! cadence. A pass never fails as a whole because of one bad entry: bad
//! entries are logged and skipped, and a failed scan yields an empty pass
//! unless strict mode is on.

use crate::source::{RevocationSource, SourceError};
use chrono::{DateTime, Duration, Utc};
use ocspd_proto::cache::response::build_template;
use ocspd_proto::{
    AuthorizedType, CachedResponse, EntryValidator, ExpirationControl, ExpirationPolicy,
    ResponderIdentity, ResponseCacheStore,
};
use std::cmp::Ordering;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, Instrument};

pub const DEFAULT_INTERVAL_SEC: u64 = 60;

/// Batch-side end of the quiesce rendezvous: receives a reason, answers
/// with a confirmation once the loop has returned from its wait.
pub struct Quiesce {
    request_rx: mpsc::Receiver<String>,
    ack_tx: mpsc::Sender<String>,
}

/// Supervisor-side end of the quiesce rendezvous.
pub struct QuiesceHandle {
    request_tx: mpsc::Sender<String>,
    ack_rx: mpsc::Receiver<String>,
}

impl QuiesceHandle {
    /// Asks the batch loop to stop and waits for its confirmation. `None`
    /// when the loop is already gone.
    pub async fn quiesce(mut self, reason: impl Into<String>) -> Option<String> {
        self.request_tx.send(reason.into()).await.ok()?;
        self.ack_rx.recv().await
    }
}

/// Creates the single-slot quiesce channel pair.
pub fn quiesce_channel() -> (QuiesceHandle, Quiesce) {
    let (request_tx, request_rx) = mpsc::channel(1);
    let (ack_tx, ack_rx) = mpsc::channel(1);
    (QuiesceHandle { request_tx, ack_rx }, Quiesce { request_rx, ack_tx })
}

/// A batch configuration that cannot be constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BatchBuildError {
    #[error("delay must be less than or equal to interval")]
    DelayExceedsInterval,
}

/// A condition the batch cannot continue from.
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("revocation database scan failed in strict mode: {0}")]
    StrictScan(#[from] SourceError),
}

enum LoopControl {
    Continue,
    Stop,
}

/// Builder for [`CacheBatch`]; construction enforces the cross-field
/// constraints.
pub struct CacheBatchBuilder {
    ca: String,
    store: Arc<ResponseCacheStore>,
    source: Arc<dyn RevocationSource>,
    responder: Arc<ResponderIdentity>,
    next_update: DateTime<Utc>,
    interval_secs: u64,
    delay_secs: u64,
    strict: bool,
    expiration: ExpirationPolicy,
    quiesce: Option<Quiesce>,
}

impl CacheBatchBuilder {
    /// Interval in seconds between one `nextUpdate` and the next. Zero
    /// falls back to the default.
    pub fn interval_secs(mut self, secs: u64) -> Self {
        self.interval_secs = secs;
        self
    }

    /// Head start in seconds: the next pass begins this long before its
    /// nominal anchor, so a pass can finish before clients see the previous
    /// `nextUpdate` expire.
    pub fn delay_secs(mut self, secs: u64) -> Self {
        self.delay_secs = secs;
        self
    }

    /// In strict mode a scan error aborts the batch instead of producing an
    /// empty pass.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn expiration(mut self, policy: ExpirationPolicy) -> Self {
        self.expiration = policy;
        self
    }

    /// Attaches the quiesce channel that stops the loop cooperatively.
    pub fn quiesce(mut self, quiesce: Quiesce) -> Self {
        self.quiesce = Some(quiesce);
        self
    }

    pub fn build(self) -> Result<CacheBatch, BatchBuildError> {
        let interval_secs =
            if self.interval_secs == 0 { DEFAULT_INTERVAL_SEC } else { self.interval_secs };

        if self.delay_secs > interval_secs {
            return Err(BatchBuildError::DelayExceedsInterval);
        }

        Ok(CacheBatch {
            ca: self.ca,
            store: self.store,
            source: self.source,
            responder: self.responder,
            next_update: self.next_update,
            batch_serial: 0,
            interval: Duration::seconds(interval_secs as i64),
            delay: Duration::seconds(self.delay_secs as i64),
            strict: self.strict,
            expiration: self.expiration,
            quiesce: self.quiesce,
        })
    }
}

/// The refresh loop over one CA's revocation source.
pub struct CacheBatch {
    ca: String,
    store: Arc<ResponseCacheStore>,
    source: Arc<dyn RevocationSource>,
    responder: Arc<ResponderIdentity>,
    next_update: DateTime<Utc>,
    batch_serial: u64,
    interval: Duration,
    delay: Duration,
    strict: bool,
    expiration: ExpirationPolicy,
    quiesce: Option<Quiesce>,
}

impl CacheBatch {
    /// Starts a builder anchored at `next_update`.
    pub fn builder(
        ca: impl Into<String>,
        store: Arc<ResponseCacheStore>,
        source: Arc<dyn RevocationSource>,
        responder: Arc<ResponderIdentity>,
        next_update: DateTime<Utc>,
    ) -> CacheBatchBuilder {
        CacheBatchBuilder {
            ca: ca.into(),
            store,
            source,
            responder,
            next_update,
            interval_secs: DEFAULT_INTERVAL_SEC,
            delay_secs: 0,
            strict: false,
            expiration: ExpirationPolicy::default(),
            quiesce: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// One pass: scan the source, validate and filter the entries, build
    /// and sign one response cache per surviving entry.
    pub async fn run_once(&self) -> Result<Vec<CachedResponse>, BatchError> {
        info!(ca = %self.ca, "revocation database scan started");
        let raw_entries = match self.source.scan().await {
            Ok(entries) => entries,
            Err(err) => {
                error!(error = %err, "revocation database scan failed");
                if self.strict {
                    return Err(BatchError::StrictScan(err));
                }
                Vec::new()
            }
        };
        info!(entries = raw_entries.len(), "revocation database scan completed");

        let validator = EntryValidator::new();
        let mut entries = Vec::with_capacity(raw_entries.len());
        for raw in &raw_entries {
            // Expired certificates never get a response cache.
            if raw.rev_type == "E" {
                continue;
            }

            let entry = validator.parse_entry(raw);
            if entry.is_valid() {
                entries.push(entry);
            } else {
                for fault in entry.faults.values() {
                    error!(serial = %entry.serial_text(), error = %fault, "entry dropped");
                }
            }
        }

        let entries = ExpirationControl::new(self.expiration).apply(Utc::now(), entries);
        debug!(entries = entries.len(), "entries surviving validation and expiration");

        let mut caches = Vec::with_capacity(entries.len());
        for entry in entries {
            let mut template = match build_template(&entry, self.next_update, self.interval) {
                Ok(template) => template,
                Err(err) => {
                    error!(serial = %entry.serial_text(), error = %err, "entry skipped");
                    continue;
                }
            };

            if self.responder.authorized_type() == AuthorizedType::Delegation {
                template.certificate = Some(self.responder.certificate_der().to_vec());
            }

            let serial_text = entry.serial_text();
            match self.responder.sign(entry, template) {
                Ok(cache) => caches.push(cache),
                Err(err) => error!(serial = %serial_text, error = %err, "failed to sign response cache"),
            }
        }
        debug!(caches = caches.len(), "signed caches prepared");

        Ok(caches)
    }

    /// Wait between the end of a pass at `now` and the start of the next
    /// one, anchored to the current `nextUpdate`:
    ///
    /// - pass finished early (`now < nextUpdate`): `interval + (nextUpdate - now) - delay`
    /// - pass overran (`now > nextUpdate`): `max(0, interval - (now - nextUpdate) - delay)`
    /// - on the anchor exactly: `interval - delay`
    fn sync_wait_duration(&self, now: DateTime<Utc>) -> std::time::Duration {
        let mut wait = self.interval;
        match now.cmp(&self.next_update) {
            Ordering::Less => wait = wait + (self.next_update - now) - self.delay,
            Ordering::Greater => {
                wait = wait - (now - self.next_update) - self.delay;
                if wait < Duration::zero() {
                    wait = Duration::zero();
                }
            }
            Ordering::Equal => wait = wait - self.delay,
        }

        wait.to_std().unwrap_or_default()
    }

    async fn wait_for_next_update(&mut self, wait: std::time::Duration) -> LoopControl {
        info!(wait_secs = wait.as_secs(), next_update = %self.next_update, "waiting for the next update");

        match &mut self.quiesce {
            Some(quiesce) => {
                tokio::select! {
                    _ = tokio::time::sleep(wait) => LoopControl::Continue,
                    message = quiesce.request_rx.recv() => {
                        let reason = message.unwrap_or_else(|| "quiesce channel closed".to_string());
                        info!(reason = %reason, "quiesce message received, stopping loop");
                        let _ = quiesce.ack_tx.send("loop stopped".to_string()).await;
                        LoopControl::Stop
                    }
                }
            }
            None => {
                tokio::time::sleep(wait).await;
                LoopControl::Continue
            }
        }
    }

    /// Runs passes forever on the `nextUpdate` cadence. Returns `Ok(())`
    /// after a quiesce handshake, or the fatal error in strict mode.
    pub async fn run(mut self) -> Result<(), BatchError> {
        loop {
            let span = tracing::info_span!("cache_batch", batch_serial = self.batch_serial);

            let started_at = Utc::now();
            let pass_result = async {
                info!("starting cache generation batch");
                let caches = self.run_once().await?;

                let rejected = self.store.replace(caches);
                for cache in &rejected {
                    error!(serial = %cache.entry().serial_text(), "invalid response cache rejected by store");
                }
                info!("response cache updated");

                let elapsed = Utc::now() - started_at;
                info!(duration_ms = elapsed.num_milliseconds(), "cache generation batch completed");
                Ok::<(), BatchError>(())
            }
            .instrument(span.clone())
            .await;
            pass_result?;

            let wait = self.sync_wait_duration(Utc::now());
            self.next_update = self.next_update + self.interval;

            let control = self.wait_for_next_update(wait).instrument(span).await;
            if matches!(control, LoopControl::Stop) {
                return Ok(());
            }

            self.batch_serial += 1;
        }
    }
}
