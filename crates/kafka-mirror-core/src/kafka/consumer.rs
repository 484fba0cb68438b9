//! Consumer-group session against the source cluster.
//!
//! Joins the group with rdkafka's `StreamConsumer` and bridges it into the
//! channel bundle the pump consumes: a forwarding task pumps messages into
//! a bounded channel and surfaces the first fatal error on a dedicated
//! error channel, after which the session is considered dead.

use std::sync::Arc;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::{Offset, TopicPartitionList};
use tokio::sync::{mpsc, watch};
use tracing::debug;

use crate::config::MirrorConfig;
use crate::error::{MirrorError, Result};
use crate::pipeline::{ConsumerHandle, ConsumerSession, SourceMessage, TopicPosition};

/// Join the consumer group on the source cluster for `topics`.
pub(crate) fn join_group(
    config: &MirrorConfig,
    group: &str,
    topics: &[String],
) -> Result<ConsumerSession> {
    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", config.source.broker_list())
        .set("group.id", group)
        .set("enable.auto.commit", "true")
        .set(
            "auto.commit.interval.ms",
            config.consumer.auto_commit_interval_ms.to_string(),
        )
        .set(
            "max.poll.interval.ms",
            config.consumer.max_poll_interval_ms.to_string(),
        )
        .set("auto.offset.reset", "earliest")
        .create()
        .map_err(|err| MirrorError::Pipeline {
            message: format!("consumer creation failed: {err}"),
        })?;

    let topic_refs: Vec<&str> = topics.iter().map(String::as_str).collect();
    consumer
        .subscribe(&topic_refs)
        .map_err(|err| MirrorError::Pipeline {
            message: format!("subscribe failed: {err}"),
        })?;

    let consumer = Arc::new(consumer);
    let (msg_tx, msg_rx) = mpsc::channel(config.consumer.channel_buffer_size);
    let (err_tx, err_rx) = mpsc::channel(16);
    let (close_tx, mut close_rx) = watch::channel(false);

    let task_consumer = Arc::clone(&consumer);
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = close_rx.changed() => {
                    if *close_rx.borrow() {
                        debug!("consumer forwarding task closing");
                        return;
                    }
                }

                polled = task_consumer.recv() => match polled {
                    Ok(borrowed) => {
                        let msg = SourceMessage {
                            topic: borrowed.topic().to_string(),
                            partition: borrowed.partition(),
                            offset: borrowed.offset(),
                            key: borrowed.key().map(<[u8]>::to_vec),
                            value: borrowed.payload().map(<[u8]>::to_vec).unwrap_or_default(),
                        };
                        drop(borrowed);
                        if msg_tx.send(msg).await.is_err() {
                            // Pump gone; the session is being torn down.
                            return;
                        }
                    }
                    Err(err) => {
                        let _ = err_tx
                            .send(MirrorError::Consumer {
                                message: err.to_string(),
                            })
                            .await;
                        return;
                    }
                }
            }
        }
    });

    Ok(ConsumerSession {
        messages: msg_rx,
        errors: err_rx,
        consumer: Box::new(KafkaConsumerHandle {
            consumer,
            close: close_tx,
        }),
    })
}

struct KafkaConsumerHandle {
    consumer: Arc<StreamConsumer>,
    close: watch::Sender<bool>,
}

#[async_trait]
impl ConsumerHandle for KafkaConsumerHandle {
    async fn commit_up_to(&self, position: &TopicPosition) -> Result<()> {
        let mut assignment = TopicPartitionList::new();
        assignment.add_partition_offset(
            &position.topic,
            position.partition,
            Offset::Offset(position.offset + 1),
        )?;

        self.consumer
            .commit(&assignment, CommitMode::Async)
            .map_err(|err| MirrorError::Commit {
                topic: position.topic.clone(),
                partition: position.partition,
                message: err.to_string(),
            })
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let _ = self.close.send(true);
        self.consumer.unsubscribe();
        Ok(())
    }
}
