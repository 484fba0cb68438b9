//! Topic discovery against the source cluster.
//!
//! Discovers topics from broker metadata and emulates a change watch by
//! polling: the returned channel fires at most once, when the topic set
//! observed by a poll differs from the set handed out with the watch.

use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{BaseConsumer, Consumer};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::config::{ClusterConfig, DiscoveryTuning};
use crate::error::{MirrorError, Result};
use crate::pipeline::TopicDiscovery;

/// Metadata-poll topic discovery for one cluster.
pub struct KafkaTopicDiscovery {
    cluster: ClusterConfig,
    tuning: DiscoveryTuning,
}

impl KafkaTopicDiscovery {
    /// Create a discovery client for `cluster`.
    #[must_use]
    pub fn new(cluster: ClusterConfig, tuning: DiscoveryTuning) -> Self {
        Self { cluster, tuning }
    }

    async fn fetch_topics(&self) -> Result<Vec<String>> {
        let brokers = self.cluster.broker_list();
        let timeout = Duration::from_millis(self.tuning.timeout_ms);

        tokio::task::spawn_blocking(move || fetch_topic_names(&brokers, timeout))
            .await
            .map_err(|err| MirrorError::Discovery {
                message: format!("metadata fetch task failed: {err}"),
            })?
    }
}

#[async_trait]
impl TopicDiscovery for KafkaTopicDiscovery {
    async fn topics(&self) -> Result<Vec<String>> {
        self.fetch_topics().await
    }

    async fn watch_topics(&self) -> Result<(Vec<String>, oneshot::Receiver<()>)> {
        let baseline = self.fetch_topics().await?;
        let (tx, rx) = oneshot::channel();

        let brokers = self.cluster.broker_list();
        let label = self.cluster.label();
        let timeout = Duration::from_millis(self.tuning.timeout_ms);
        let poll_interval = Duration::from_secs(self.tuning.poll_interval_secs.max(1));
        let watched = baseline.clone();

        tokio::spawn(async move {
            loop {
                tokio::time::sleep(poll_interval).await;
                if tx.is_closed() {
                    debug!(cluster = %label, "topic watch abandoned");
                    return;
                }

                let brokers = brokers.clone();
                let polled =
                    tokio::task::spawn_blocking(move || fetch_topic_names(&brokers, timeout))
                        .await;
                match polled {
                    Ok(Ok(current)) => {
                        if current != watched {
                            info!(
                                cluster = %label,
                                before = watched.len(),
                                after = current.len(),
                                "topic set changed"
                            );
                            let _ = tx.send(());
                            return;
                        }
                    }
                    Ok(Err(err)) => {
                        warn!(cluster = %label, error = %err, "topic poll failed");
                    }
                    Err(err) => {
                        warn!(cluster = %label, error = %err, "topic poll task failed");
                        return;
                    }
                }
            }
        });

        Ok((baseline, rx))
    }
}

/// Fetch the cluster's topic names, sorted, with internal topics filtered.
fn fetch_topic_names(brokers: &str, timeout: Duration) -> Result<Vec<String>> {
    let consumer: BaseConsumer = ClientConfig::new()
        .set("bootstrap.servers", brokers)
        .create()
        .map_err(|err| MirrorError::Discovery {
            message: format!("metadata client creation failed: {err}"),
        })?;

    let metadata = consumer
        .fetch_metadata(None, timeout)
        .map_err(|err| MirrorError::Discovery {
            message: format!("metadata fetch failed: {err}"),
        })?;

    let mut topics: Vec<String> = metadata
        .topics()
        .iter()
        .map(|t| t.name().to_string())
        .filter(|name| !name.starts_with("__"))
        .collect();
    topics.sort();
    Ok(topics)
}
