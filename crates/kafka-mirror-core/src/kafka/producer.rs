//! Async producer against the destination cluster.
//!
//! Wraps rdkafka's `ThreadedProducer` behind the fire-and-forget
//! [`ProducerHandle`] contract: the forwarding task enqueues whatever
//! arrives on the input channel, delivery failures surface on the error
//! channel after the client's retries are exhausted, and closing the
//! input flushes buffered messages before the producer is released.

use std::time::Duration;

use rdkafka::config::ClientConfig;
use rdkafka::message::DeliveryResult;
use rdkafka::producer::{BaseRecord, Producer, ProducerContext, ThreadedProducer};
use rdkafka::ClientContext;
use rdkafka::Message;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::MirrorConfig;
use crate::error::{MirrorError, Result};
use crate::pipeline::{ProduceRequest, ProducerHandle};

const INPUT_BUFFER: usize = 1024;
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(30);

/// Delivery-callback context that forwards failures to the error channel.
struct ForwardingContext {
    errors: mpsc::Sender<MirrorError>,
}

impl ClientContext for ForwardingContext {}

impl ProducerContext for ForwardingContext {
    type DeliveryOpaque = ();

    fn delivery(&self, delivery_result: &DeliveryResult<'_>, (): Self::DeliveryOpaque) {
        if let Err((err, message)) = delivery_result {
            // Best effort: when the channel is full the failure is still
            // visible in the drain task's backlog, just not this one.
            let _ = self.errors.try_send(MirrorError::Producer {
                topic: message.topic().to_string(),
                message: err.to_string(),
            });
        }
    }
}

/// Build the destination producer and its forwarding task.
pub(crate) fn create_producer(config: &MirrorConfig) -> Result<ProducerHandle> {
    let (err_tx, err_rx) = mpsc::channel(64);
    let (input_tx, mut input_rx) = mpsc::channel::<ProduceRequest>(INPUT_BUFFER);

    let producer: ThreadedProducer<ForwardingContext> = ClientConfig::new()
        .set("bootstrap.servers", config.destination.broker_list())
        .set(
            "queue.buffering.max.ms",
            config.producer.flush_interval_ms.to_string(),
        )
        .set(
            "batch.num.messages",
            config.producer.flush_messages.to_string(),
        )
        // Leader-only acknowledgement bounds latency; full-ISR durability
        // is out of scope for the mirror.
        .set("request.required.acks", "1")
        .set(
            "message.send.max.retries",
            config.producer.retry_max.to_string(),
        )
        .set(
            "retry.backoff.ms",
            config.producer.retry_backoff_ms.to_string(),
        )
        .set("compression.codec", config.mirror.compression.codec_name())
        .create_with_context(ForwardingContext {
            errors: err_tx.clone(),
        })
        .map_err(|err| MirrorError::Pipeline {
            message: format!("producer creation failed: {err}"),
        })?;

    tokio::spawn(async move {
        while let Some(request) = input_rx.recv().await {
            let result = match &request.key {
                Some(key) => producer.send(
                    BaseRecord::to(&request.topic)
                        .payload(request.value.as_slice())
                        .key(key.as_slice()),
                ),
                None => producer.send(
                    BaseRecord::<[u8], [u8]>::to(&request.topic)
                        .payload(request.value.as_slice()),
                ),
            };
            if let Err((err, _)) = result {
                warn!(topic = %request.topic, error = %err, "producer enqueue failed");
                let _ = err_tx.try_send(MirrorError::Producer {
                    topic: request.topic.clone(),
                    message: err.to_string(),
                });
            }
        }

        // Input closed: flush whatever the client still buffers, then let
        // the producer (and with it the error channel) go.
        debug!("producer input closed, flushing");
        let flush = tokio::task::spawn_blocking(move || producer.flush(CLOSE_FLUSH_TIMEOUT)).await;
        match flush {
            Ok(Ok(())) => debug!("producer flushed"),
            Ok(Err(err)) => warn!(error = %err, "producer flush failed"),
            Err(err) => warn!(error = %err, "producer flush task failed"),
        }
    });

    Ok(ProducerHandle {
        input: input_tx,
        errors: err_rx,
    })
}
