//! rdkafka-backed implementations of the pipeline collaborators.

mod consumer;
mod discovery;
mod producer;

pub use discovery::KafkaTopicDiscovery;

use async_trait::async_trait;

use crate::config::MirrorConfig;
use crate::error::Result;
use crate::pipeline::{ConsumerSession, PipelineFactory, ProducerHandle};

/// Builds rdkafka consumers and producers from the mirror configuration.
pub struct KafkaPipelineFactory {
    config: MirrorConfig,
}

impl KafkaPipelineFactory {
    /// Create a factory bound to the configured source and destination
    /// clusters.
    #[must_use]
    pub fn new(config: MirrorConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl PipelineFactory for KafkaPipelineFactory {
    async fn make_producer(&self) -> Result<ProducerHandle> {
        producer::create_producer(&self.config)
    }

    async fn make_consumer(&self, group: &str, topics: &[String]) -> Result<ConsumerSession> {
        consumer::join_group(&self.config, group, topics)
    }
}
