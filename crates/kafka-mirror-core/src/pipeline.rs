//! Pipeline abstractions: the seams between the mirror core and the
//! broker-client collaborators.
//!
//! The controller and pump only ever see these traits and channel bundles;
//! the rdkafka-backed implementations live in [`crate::kafka`] and the
//! scripted mocks in `crate::testing`.

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::config::ClusterConfig;
use crate::error::{MirrorError, Result};

/// Fixed per-message wire overhead added on top of topic/key/value bytes
/// when accounting against the bandwidth limiter.
pub const MESSAGE_OVERHEAD_BYTES: usize = 20;

/// A message read from the source cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub value: Vec<u8>,
}

impl SourceMessage {
    /// The commit position identified by this message.
    #[must_use]
    pub fn position(&self) -> TopicPosition {
        TopicPosition {
            topic: self.topic.clone(),
            partition: self.partition,
            offset: self.offset,
        }
    }

    /// Approximate wire size used for bandwidth accounting.
    #[must_use]
    pub fn wire_size(&self) -> usize {
        self.topic.len()
            + self.key.as_ref().map_or(0, Vec::len)
            + self.value.len()
            + MESSAGE_OVERHEAD_BYTES
    }
}

/// A per-partition consumption position on the source cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPosition {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

/// A message handed to the destination producer's send queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProduceRequest {
    pub topic: String,
    pub key: Option<Vec<u8>>,
    pub value: Vec<u8>,
}

impl From<&SourceMessage> for ProduceRequest {
    fn from(msg: &SourceMessage) -> Self {
        Self {
            topic: msg.topic.clone(),
            key: msg.key.clone(),
            value: msg.value.clone(),
        }
    }
}

/// One generation's consumer side: the message stream, the dedicated error
/// stream, and the handle used to commit offsets and close the session.
///
/// Exclusively owned by the pump task of its generation.
pub struct ConsumerSession {
    /// Messages consumed from the source cluster.
    pub messages: mpsc::Receiver<SourceMessage>,
    /// Fatal consumer errors. Any message here terminates the generation.
    pub errors: mpsc::Receiver<MirrorError>,
    /// Commit/close handle for the underlying group member.
    pub consumer: Box<dyn ConsumerHandle>,
}

/// The destination producer: a send queue plus a drain-only error stream.
///
/// Dropping `input` closes the producer; the implementation flushes
/// buffered messages before releasing its resources.
pub struct ProducerHandle {
    /// Fire-and-forget send queue.
    pub input: mpsc::Sender<ProduceRequest>,
    /// Delivery failures, surfaced after all retries are exhausted.
    pub errors: mpsc::Receiver<MirrorError>,
}

/// Commit/close operations on a joined consumer-group member.
#[async_trait]
pub trait ConsumerHandle: Send + Sync {
    /// Mark everything up to and including `position` as consumed.
    async fn commit_up_to(&self, position: &TopicPosition) -> Result<()>;

    /// Leave the group and release the session's resources.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Topic discovery against the source cluster.
#[async_trait]
pub trait TopicDiscovery: Send + Sync {
    /// The cluster's current topic list.
    async fn topics(&self) -> Result<Vec<String>>;

    /// The current topic list plus a change-notification channel.
    ///
    /// The channel fires at most once; callers re-request the watch after
    /// it fires (or after tearing down the generation built from it).
    async fn watch_topics(&self) -> Result<(Vec<String>, oneshot::Receiver<()>)>;
}

/// Builds the two halves of a pump generation's pipeline.
#[async_trait]
pub trait PipelineFactory: Send + Sync {
    /// Build an async producer bound to the destination cluster.
    async fn make_producer(&self) -> Result<ProducerHandle>;

    /// Join the consumer group on the source cluster for `topics`.
    async fn make_consumer(&self, group: &str, topics: &[String]) -> Result<ConsumerSession>;
}

/// Deterministic consumer-group name for a source/destination pair.
///
/// The group identity carries the offset bookkeeping on the source
/// cluster, so re-running the mirror with the same pair resumes from the
/// last committed offset. Two concurrent mirrors with the same pair will
/// share partitions under group coordination; operators avoid that by
/// convention.
#[must_use]
pub fn group_name(source: &ClusterConfig, destination: &ClusterConfig) -> String {
    format!(
        "mirror.{}.{}.{}.{}",
        source.zone, source.cluster, destination.zone, destination.cluster
    )
}
