//! Test harness wiring a real controller to the scripted mocks.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::{
    ClusterConfig, ConsumerTuning, DiscoveryTuning, LoggingConfig, MetricsConfig, MirrorConfig,
    MirrorOptions, ProducerTuning,
};
use crate::controller::MirrorController;
use crate::error::{MirrorError, Result};
use crate::metrics::MirrorMetrics;
use crate::pipeline::SourceMessage;
use crate::pump::TransferStats;

use super::mock::{MirrorEvent, MockDiscovery, MockPipelineFactory};

/// A controller running against mock collaborators.
pub struct MirrorTestHarness {
    pub discovery: Arc<MockDiscovery>,
    pub factory: Arc<MockPipelineFactory>,
    pub metrics: Arc<MirrorMetrics>,
    pub stats: Arc<TransferStats>,
    shutdown_tx: watch::Sender<bool>,
    controller: Option<JoinHandle<Result<()>>>,
}

impl MirrorTestHarness {
    /// Build and start a controller mirroring `initial_topics` with the
    /// default test configuration.
    #[must_use]
    pub fn start(initial_topics: &[&str]) -> Self {
        Self::start_with(initial_topics, |_| {})
    }

    /// Build and start a controller with adjusted mirror options.
    #[must_use]
    pub fn start_with(
        initial_topics: &[&str],
        adjust: impl FnOnce(&mut MirrorOptions),
    ) -> Self {
        let mut config = test_config();
        adjust(&mut config.mirror);

        let discovery = Arc::new(MockDiscovery::new(
            initial_topics.iter().map(|s| (*s).to_string()).collect(),
        ));
        let factory = Arc::new(MockPipelineFactory::new());
        let metrics = Arc::new(MirrorMetrics::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let discovery_dyn: Arc<dyn crate::pipeline::TopicDiscovery> = discovery.clone();
        let factory_dyn: Arc<dyn crate::pipeline::PipelineFactory> = factory.clone();
        let controller = MirrorController::new(
            config,
            discovery_dyn,
            factory_dyn,
            Arc::clone(&metrics),
            shutdown_rx,
        );
        let stats = controller.stats();
        let handle = tokio::spawn(controller.run());

        Self {
            discovery,
            factory,
            metrics,
            stats,
            shutdown_tx,
            controller: Some(handle),
        }
    }

    /// Push a message into the most recent consumer session.
    ///
    /// # Panics
    ///
    /// Panics if no consumer session has been built yet.
    pub async fn feed_message(&self, topic: &str, offset: i64, value: &[u8]) {
        let session = self
            .factory
            .latest_session()
            .expect("no consumer session built yet");
        session
            .messages
            .send(SourceMessage {
                topic: topic.to_string(),
                partition: 0,
                offset,
                key: None,
                value: value.to_vec(),
            })
            .await
            .expect("pump dropped the message channel");
    }

    /// Push a fatal error into the most recent consumer session.
    ///
    /// # Panics
    ///
    /// Panics if no consumer session has been built yet.
    pub async fn fail_consumer(&self, message: &str) {
        let session = self
            .factory
            .latest_session()
            .expect("no consumer session built yet");
        let _ = session
            .errors
            .send(MirrorError::Consumer {
                message: message.to_string(),
            })
            .await;
    }

    /// Fire the outstanding topic-change notifications.
    pub fn fire_topic_change(&self) {
        self.discovery.fire_topic_change();
    }

    /// Request shutdown (idempotent).
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Shut the controller down and wait for it to return.
    ///
    /// # Panics
    ///
    /// Panics if the controller task panicked or does not stop in time.
    pub async fn finish(mut self) -> Result<()> {
        self.shutdown();
        let handle = self.controller.take().expect("controller already joined");
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("controller did not shut down in time")
            .expect("controller task panicked")
    }

    /// Recorded mock events so far, in order.
    #[must_use]
    pub fn events(&self) -> Vec<MirrorEvent> {
        self.factory.events()
    }

    /// Poll until `predicate` holds or `timeout` elapses. Returns whether
    /// the predicate held.
    pub async fn wait_until(
        &self,
        predicate: impl Fn(&Self) -> bool,
        timeout: Duration,
    ) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if predicate(self) {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

/// Default configuration for harness runs: short retry delay, metrics
/// endpoint disabled.
#[must_use]
fn test_config() -> MirrorConfig {
    MirrorConfig {
        source: ClusterConfig {
            zone: "prod".to_string(),
            cluster: "source".to_string(),
            brokers: vec!["localhost:9092".to_string()],
        },
        destination: ClusterConfig {
            zone: "dr".to_string(),
            cluster: "sink".to_string(),
            brokers: vec!["localhost:9093".to_string()],
        },
        mirror: MirrorOptions {
            retry_delay_ms: 25,
            ..MirrorOptions::default()
        },
        consumer: ConsumerTuning::default(),
        producer: ProducerTuning::default(),
        discovery: DiscoveryTuning::default(),
        metrics: MetricsConfig {
            enabled: false,
            ..MetricsConfig::default()
        },
        logging: LoggingConfig::default(),
    }
}
