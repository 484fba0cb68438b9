//! The pump: one generation's consume -> rate-limit -> produce -> commit
//! hot loop.
//!
//! A pump drains its [`ConsumerSession`] until it is told to stop or the
//! session fails, forwarding every message into the destination producer's
//! send queue. On any terminal transition it closes the consumer session
//! first and only then signals `stopped`, so the controller never builds a
//! new generation while the old group member is still attached to the same
//! partitions.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant};
use tracing::{debug, error, info, warn};

use crate::config::MirrorOptions;
use crate::metrics::MirrorMetrics;
use crate::pipeline::{ConsumerSession, ProduceRequest, SourceMessage};
use crate::ratelimit::LeakyBucket;

/// Without a message for this long the pump flips to the idle sub-state,
/// which only changes logging verbosity.
const IDLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Sleep applied when the bandwidth limiter refuses a message's bytes.
/// The limiter is not re-checked afterwards; this is a throttle, not an
/// admission gate.
const RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(2);

/// Cumulative transfer totals, scoped to the controller's lifetime.
///
/// Written by one pump at a time, read by the controller for the final
/// shutdown report. Survives across pump generations; never persisted.
#[derive(Debug, Default)]
pub struct TransferStats {
    messages: AtomicI64,
    bytes: AtomicI64,
}

impl TransferStats {
    /// Record one forwarded message of `wire_bytes` approximate size and
    /// return the new cumulative message count.
    pub fn record(&self, wire_bytes: i64) -> i64 {
        self.bytes.fetch_add(wire_bytes, Ordering::Relaxed);
        self.messages.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Total messages transferred so far.
    #[must_use]
    pub fn messages_transferred(&self) -> i64 {
        self.messages.load(Ordering::Relaxed)
    }

    /// Total approximate wire bytes transferred so far.
    #[must_use]
    pub fn bytes_transferred(&self) -> i64 {
        self.bytes.load(Ordering::Relaxed)
    }
}

/// Why a pump left its run loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    /// The controller requested a stop (topic change or shutdown).
    Requested,
    /// The consumer message stream ended unexpectedly.
    StreamEnded,
    /// The consumer session reported a fatal error.
    ConsumerError,
}

/// One generation's transfer loop.
pub struct Pump {
    debug: bool,
    auto_commit: bool,
    progress_step: i64,
    limiter: Option<LeakyBucket>,
    stats: Arc<TransferStats>,
    metrics: Arc<MirrorMetrics>,
}

impl Pump {
    /// Build a pump for one generation.
    #[must_use]
    pub fn new(
        options: &MirrorOptions,
        limiter: Option<LeakyBucket>,
        stats: Arc<TransferStats>,
        metrics: Arc<MirrorMetrics>,
    ) -> Self {
        Self {
            debug: options.debug,
            auto_commit: options.auto_commit,
            progress_step: options.progress_step,
            limiter,
            stats,
            metrics,
        }
    }

    /// Drain the session until stopped or failed, then close the session
    /// and signal `stopped` exactly once.
    pub async fn run(
        mut self,
        mut session: ConsumerSession,
        producer: mpsc::Sender<ProduceRequest>,
        mut stop: oneshot::Receiver<()>,
        stopped: oneshot::Sender<()>,
    ) {
        // Verbose per-message logging until the first message arrives,
        // matching the behavior after an idle period.
        let mut active = false;
        let mut errors_open = true;

        let idle = time::sleep(IDLE_TIMEOUT);
        tokio::pin!(idle);

        let reason = loop {
            tokio::select! {
                _ = &mut stop => {
                    debug!("pump received stop signal");
                    break StopReason::Requested;
                }

                () = &mut idle => {
                    active = false;
                    info!(
                        idle_secs = IDLE_TIMEOUT.as_secs(),
                        "no message received, pump idle"
                    );
                    idle.as_mut().reset(Instant::now() + IDLE_TIMEOUT);
                }

                maybe_msg = session.messages.recv() => {
                    let Some(msg) = maybe_msg else {
                        warn!("consumer message stream ended");
                        break StopReason::StreamEnded;
                    };
                    self.forward(msg, &producer, session.consumer.as_ref(), &mut active)
                        .await;
                    idle.as_mut().reset(Instant::now() + IDLE_TIMEOUT);
                }

                maybe_err = session.errors.recv(), if errors_open => {
                    match maybe_err {
                        Some(err) => {
                            error!(error = %err, "consumer session failed, stopping pump");
                            break StopReason::ConsumerError;
                        }
                        None => errors_open = false,
                    }
                }
            }
        };

        debug!(?reason, "closing consumer session");
        if let Err(err) = session.consumer.close().await {
            warn!(error = %err, "consumer session close failed");
        }

        // Cleanup before signal: the controller is free to build the next
        // generation once this fires.
        let _ = stopped.send(());
    }

    async fn forward(
        &mut self,
        msg: SourceMessage,
        producer: &mpsc::Sender<ProduceRequest>,
        consumer: &dyn crate::pipeline::ConsumerHandle,
        active: &mut bool,
    ) {
        if !*active || self.debug {
            info!(
                seq = self.stats.messages_transferred(),
                topic = %msg.topic,
                partition = msg.partition,
                offset = msg.offset,
                bytes = msg.value.len(),
                "forwarding message"
            );
        }
        *active = true;

        let wire_size = msg.wire_size();
        let position = msg.position();

        // Non-blocking handoff into the producer's own buffering; delivery
        // to the destination is fire-and-forget.
        if producer
            .send(ProduceRequest {
                topic: msg.topic,
                key: msg.key,
                value: msg.value,
            })
            .await
            .is_err()
        {
            warn!(topic = %position.topic, "producer input closed, message dropped");
        }

        // At-least-once: committed after the producer handoff, never
        // before. A crash between handoff and a durable destination write
        // redelivers on restart.
        if self.auto_commit {
            if let Err(err) = consumer.commit_up_to(&position).await {
                warn!(
                    topic = %position.topic,
                    partition = position.partition,
                    offset = position.offset,
                    error = %err,
                    "offset commit failed"
                );
            }
        }

        // Bytes are spent against the limiter after the message is already
        // on its way; overruns induce a backoff sleep but the message is
        // never blocked or retried against the bucket.
        if let Some(limiter) = self.limiter.as_mut() {
            if !limiter.try_consume(wire_size) {
                warn!(
                    bytes_transferred = self.stats.bytes_transferred(),
                    backoff_secs = RATE_LIMIT_BACKOFF.as_secs(),
                    "bandwidth limit reached, backing off"
                );
                self.metrics.rate_limit_backoffs.inc();
                time::sleep(RATE_LIMIT_BACKOFF).await;
            }
        }

        let transferred = self.stats.record(wire_size as i64);
        self.metrics.messages_transferred.inc();
        self.metrics.bytes_transferred.inc_by(wire_size as u64);

        if transferred % self.progress_step == 0 {
            info!(
                messages = transferred,
                bytes = self.stats.bytes_transferred(),
                topic = %position.topic,
                "transfer progress"
            );
            self.metrics.progress_reports.inc();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_record_returns_running_count() {
        let stats = TransferStats::default();
        assert_eq!(stats.record(10), 1);
        assert_eq!(stats.record(20), 2);
        assert_eq!(stats.messages_transferred(), 2);
        assert_eq!(stats.bytes_transferred(), 30);
    }

    #[test]
    fn test_stats_start_at_zero() {
        let stats = TransferStats::default();
        assert_eq!(stats.messages_transferred(), 0);
        assert_eq!(stats.bytes_transferred(), 0);
    }
}
