//! The mirror controller: owns the daemon lifecycle and supervises pump
//! generations.
//!
//! The controller is the only task that builds pipelines. Each generation
//! gets a fresh consumer session and a `stop`/`stopped` oneshot pair; a new
//! generation is never started before the previous one's `stopped`
//! acknowledgement arrives, which keeps two group members from racing over
//! the same partitions. The destination producer is built once and shared
//! across generations through its input queue.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::config::MirrorConfig;
use crate::error::{MirrorError, Result};
use crate::metrics::MirrorMetrics;
use crate::pipeline::{group_name, PipelineFactory, ProducerHandle, TopicDiscovery};
use crate::pump::{Pump, TransferStats};
use crate::ratelimit::LeakyBucket;
use crate::topics::select_topics;

/// Bound on how long producer error draining may delay shutdown.
const DRAIN_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Supervises the consume -> produce pipeline between two clusters.
pub struct MirrorController {
    config: MirrorConfig,
    discovery: Arc<dyn TopicDiscovery>,
    factory: Arc<dyn PipelineFactory>,
    metrics: Arc<MirrorMetrics>,
    stats: Arc<TransferStats>,
    shutdown: watch::Receiver<bool>,
}

impl MirrorController {
    /// Create a controller.
    ///
    /// `shutdown` flips to `true` exactly once when the process should
    /// stop; the signal plumbing lives with the caller.
    #[must_use]
    pub fn new(
        config: MirrorConfig,
        discovery: Arc<dyn TopicDiscovery>,
        factory: Arc<dyn PipelineFactory>,
        metrics: Arc<MirrorMetrics>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            config,
            discovery,
            factory,
            metrics,
            stats: Arc::new(TransferStats::default()),
            shutdown,
        }
    }

    /// Cumulative transfer totals, shared across pump generations.
    #[must_use]
    pub fn stats(&self) -> Arc<TransferStats> {
        Arc::clone(&self.stats)
    }

    /// Run the supervision loop until shutdown.
    ///
    /// Discovery and pipeline construction failures are retried with a
    /// fixed delay and never terminate the loop; only the shutdown signal
    /// does.
    ///
    /// # Errors
    ///
    /// Currently always returns `Ok(())` on shutdown; the `Result` is the
    /// seam for future fatal startup conditions.
    pub async fn run(self) -> Result<()> {
        let started_at = Instant::now();
        let group = group_name(&self.config.source, &self.config.destination);
        let mut shutdown = self.shutdown.clone();

        info!(
            source = %self.config.source.label(),
            destination = %self.config.destination.label(),
            group = %group,
            bandwidth_limit_bps = self.config.mirror.bandwidth_limit_bps,
            "starting mirror"
        );

        // The producer survives across generations; construction failures
        // are retried like any other pipeline failure.
        let producer = loop {
            if *shutdown.borrow() {
                info!("shutdown requested before producer was ready");
                return Ok(());
            }
            match self.factory.make_producer().await {
                Ok(producer) => break producer,
                Err(err) => {
                    error!(error = %err, "producer construction failed, retrying");
                    if self.wait_retry(&mut shutdown).await {
                        return Ok(());
                    }
                }
            }
        };
        debug!(destination = %self.config.destination.label(), "producer created");

        let ProducerHandle {
            input: producer_input,
            errors: producer_errors,
        } = producer;
        let mut drain = tokio::spawn(drain_producer_errors(
            producer_errors,
            Arc::clone(&self.metrics),
        ));

        let mut round: u64 = 0;
        loop {
            if *shutdown.borrow() {
                break;
            }
            round += 1;

            let (topics, mut topics_changed) = match self.discovery.watch_topics().await {
                Ok(watch) => watch,
                Err(err) => {
                    error!(round, error = %err, "topic discovery failed, retrying");
                    if self.wait_retry(&mut shutdown).await {
                        break;
                    }
                    continue;
                }
            };

            let selected = select_topics(&topics, &self.config.mirror);
            if selected.is_empty() {
                warn!(
                    round,
                    discovered = topics.len(),
                    "no topics eligible for mirroring, retrying"
                );
                if self.wait_retry(&mut shutdown).await {
                    break;
                }
                continue;
            }

            let session = match self.factory.make_consumer(&group, &selected).await {
                Ok(session) => session,
                Err(err) => {
                    error!(round, error = %err, "consumer construction failed, retrying");
                    if self.wait_retry(&mut shutdown).await {
                        break;
                    }
                    continue;
                }
            };

            self.metrics.generations.inc();
            self.metrics.mirrored_topics.set(selected.len() as i64);
            info!(
                round,
                topics = selected.len(),
                group = %group,
                "starting pump generation"
            );

            let (stop_tx, stop_rx) = oneshot::channel();
            let (stopped_tx, mut stopped_rx) = oneshot::channel();
            let pump = Pump::new(
                &self.config.mirror,
                self.make_limiter(),
                Arc::clone(&self.stats),
                Arc::clone(&self.metrics),
            );
            tokio::spawn(pump.run(session, producer_input.clone(), stop_rx, stopped_tx));

            tokio::select! {
                _ = &mut topics_changed => {
                    warn!(round, "source topic set changed, stopping pump");
                    let _ = stop_tx.send(());
                    let _ = (&mut stopped_rx).await;
                }

                // The `wait_for` guard is dropped inside the async block so
                // the select's output stays `Send`.
                () = async { let _ = shutdown.wait_for(|&quit| quit).await; } => {
                    info!(round, "shutdown requested, awaiting pump cleanup");
                    let _ = stop_tx.send(());
                    let _ = (&mut stopped_rx).await;
                    break;
                }

                _ = &mut stopped_rx => {
                    warn!(round, "pump terminated on its own, rebuilding pipeline");
                    self.metrics.pump_restarts.inc();
                }
            }
        }

        // Dropping the last input handle closes the producer; its
        // implementation flushes buffered messages before exiting, after
        // which the error channel closes and the drain task ends.
        drop(producer_input);
        info!("closing producer");
        if tokio::time::timeout(DRAIN_SHUTDOWN_TIMEOUT, &mut drain)
            .await
            .is_err()
        {
            warn!("producer error drain did not finish in time");
            drain.abort();
        }

        info!(
            messages = self.stats.messages_transferred(),
            bytes = self.stats.bytes_transferred(),
            elapsed_secs = started_at.elapsed().as_secs(),
            "mirror stopped, total transferred"
        );
        Ok(())
    }

    /// Sleep the fixed retry delay. Returns `true` when shutdown was
    /// requested during the wait.
    async fn wait_retry(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        let delay = Duration::from_millis(self.config.mirror.retry_delay_ms);
        tokio::select! {
            () = tokio::time::sleep(delay) => false,
            _ = shutdown.wait_for(|&quit| quit) => true,
        }
    }

    fn make_limiter(&self) -> Option<LeakyBucket> {
        let bps = self.config.mirror.bandwidth_limit_bps;
        if bps <= 0 {
            return None;
        }
        // Capacity is 10x the per-second byte rate over a 10 second
        // window: sustained throughput is bounded while short bursts pass.
        let bytes_per_sec = (bps / 8).max(1) as u64;
        Some(LeakyBucket::new(
            bytes_per_sec * 10,
            Duration::from_secs(10),
        ))
    }
}

/// Drain destination delivery failures.
///
/// Producer errors are fire-and-forget by design: they are logged and
/// counted, never propagated, and never stop the pipe.
async fn drain_producer_errors(
    mut errors: mpsc::Receiver<MirrorError>,
    metrics: Arc<MirrorMetrics>,
) {
    while let Some(err) = errors.recv().await {
        error!(error = %err, "destination delivery failed");
        metrics.producer_errors.inc();
    }
}
