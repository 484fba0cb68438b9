//! Prometheus metrics for the mirror daemon.

use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

/// Mirror metrics collection.
pub struct MirrorMetrics {
    /// The Prometheus registry.
    pub registry: Registry,

    /// Total messages forwarded to the destination cluster.
    pub messages_transferred: IntCounter,

    /// Total approximate wire bytes forwarded.
    pub bytes_transferred: IntCounter,

    /// Pump generations started (includes rebuilds).
    pub generations: IntCounter,

    /// Generations rebuilt because the pump terminated on its own.
    pub pump_restarts: IntCounter,

    /// Destination delivery failures (logged, never propagated).
    pub producer_errors: IntCounter,

    /// Backoff sleeps induced by the bandwidth limiter.
    pub rate_limit_backoffs: IntCounter,

    /// Progress report log lines emitted.
    pub progress_reports: IntCounter,

    /// Topics covered by the current generation.
    pub mirrored_topics: IntGauge,
}

impl MirrorMetrics {
    /// Create a new metrics collection.
    ///
    /// # Panics
    ///
    /// Panics if metric registration fails (should not happen with unique names).
    #[must_use]
    pub fn new() -> Self {
        let registry = Registry::new();

        let messages_transferred = IntCounter::new(
            "kafka_mirror_messages_transferred_total",
            "Total messages forwarded to the destination cluster",
        )
        .expect("metric creation should succeed");

        let bytes_transferred = IntCounter::new(
            "kafka_mirror_bytes_transferred_total",
            "Total approximate wire bytes forwarded",
        )
        .expect("metric creation should succeed");

        let generations = IntCounter::new(
            "kafka_mirror_generations_total",
            "Pump generations started, including rebuilds",
        )
        .expect("metric creation should succeed");

        let pump_restarts = IntCounter::new(
            "kafka_mirror_pump_restarts_total",
            "Generations rebuilt after the pump terminated on its own",
        )
        .expect("metric creation should succeed");

        let producer_errors = IntCounter::new(
            "kafka_mirror_producer_errors_total",
            "Destination delivery failures after all retries",
        )
        .expect("metric creation should succeed");

        let rate_limit_backoffs = IntCounter::new(
            "kafka_mirror_rate_limit_backoffs_total",
            "Backoff sleeps induced by the bandwidth limiter",
        )
        .expect("metric creation should succeed");

        let progress_reports = IntCounter::new(
            "kafka_mirror_progress_reports_total",
            "Progress report log lines emitted",
        )
        .expect("metric creation should succeed");

        let mirrored_topics = IntGauge::new(
            "kafka_mirror_mirrored_topics",
            "Topics covered by the current pump generation",
        )
        .expect("metric creation should succeed");

        registry
            .register(Box::new(messages_transferred.clone()))
            .expect("metric registration should succeed");
        registry
            .register(Box::new(bytes_transferred.clone()))
            .expect("metric registration should succeed");
        registry
            .register(Box::new(generations.clone()))
            .expect("metric registration should succeed");
        registry
            .register(Box::new(pump_restarts.clone()))
            .expect("metric registration should succeed");
        registry
            .register(Box::new(producer_errors.clone()))
            .expect("metric registration should succeed");
        registry
            .register(Box::new(rate_limit_backoffs.clone()))
            .expect("metric registration should succeed");
        registry
            .register(Box::new(progress_reports.clone()))
            .expect("metric registration should succeed");
        registry
            .register(Box::new(mirrored_topics.clone()))
            .expect("metric registration should succeed");

        Self {
            registry,
            messages_transferred,
            bytes_transferred,
            generations,
            pump_restarts,
            producer_errors,
            rate_limit_backoffs,
            progress_reports,
            mirrored_topics,
        }
    }

    /// Encode all metrics in the Prometheus text format.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn encode(&self) -> prometheus::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

impl Default for MirrorMetrics {
    fn default() -> Self {
        Self::new()
    }
}
