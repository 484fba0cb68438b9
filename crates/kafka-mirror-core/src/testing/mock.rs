//! Scripted mock implementations of the pipeline collaborators.
//!
//! Every observable action is recorded in a shared event log so tests can
//! assert on ordering across the controller, the pump, and the mocks.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::error::{MirrorError, Result};
use crate::pipeline::{
    ConsumerHandle, ConsumerSession, PipelineFactory, ProduceRequest, ProducerHandle,
    SourceMessage, TopicDiscovery, TopicPosition,
};

/// An observable action taken against the mocks, in global order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorEvent {
    /// `make_producer` succeeded.
    ProducerCreated,
    /// `make_consumer` succeeded.
    Joined { group: String, topics: Vec<String> },
    /// A produce request arrived on the producer input channel.
    Produced { topic: String },
    /// `commit_up_to` was called.
    Committed { topic: String, offset: i64 },
    /// The consumer session was closed.
    ConsumerClosed,
}

type EventLog = Arc<Mutex<Vec<MirrorEvent>>>;

/// Scripted topic discovery.
///
/// `set_topics` replaces the list returned by subsequent calls,
/// `fail_next` makes the next N `watch_topics`/`topics` calls fail, and
/// `fire_topic_change` fires every outstanding change notification.
pub struct MockDiscovery {
    topics: Mutex<Vec<String>>,
    failures: AtomicUsize,
    change_senders: Mutex<Vec<oneshot::Sender<()>>>,
}

impl MockDiscovery {
    #[must_use]
    pub fn new(initial_topics: Vec<String>) -> Self {
        Self {
            topics: Mutex::new(initial_topics),
            failures: AtomicUsize::new(0),
            change_senders: Mutex::new(Vec::new()),
        }
    }

    /// Replace the topic list returned by subsequent discovery calls.
    pub fn set_topics(&self, topics: Vec<String>) {
        *self.topics.lock().unwrap() = topics;
    }

    /// Make the next `n` discovery calls fail.
    pub fn fail_next(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    /// Fire every outstanding change notification.
    pub fn fire_topic_change(&self) {
        for tx in self.change_senders.lock().unwrap().drain(..) {
            let _ = tx.send(());
        }
    }

    fn next_topics(&self) -> Result<Vec<String>> {
        loop {
            let failures = self.failures.load(Ordering::SeqCst);
            if failures == 0 {
                break;
            }
            if self
                .failures
                .compare_exchange(failures, failures - 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return Err(MirrorError::Discovery {
                    message: "scripted discovery failure".to_string(),
                });
            }
        }

        Ok(self.topics.lock().unwrap().clone())
    }
}

#[async_trait]
impl TopicDiscovery for MockDiscovery {
    async fn topics(&self) -> Result<Vec<String>> {
        self.next_topics()
    }

    async fn watch_topics(&self) -> Result<(Vec<String>, oneshot::Receiver<()>)> {
        let topics = self.next_topics()?;
        let (tx, rx) = oneshot::channel();
        self.change_senders.lock().unwrap().push(tx);
        Ok((topics, rx))
    }
}

/// The feed side of one mock consumer session.
#[derive(Clone)]
pub struct SessionHandles {
    /// Push messages to the pump.
    pub messages: mpsc::Sender<SourceMessage>,
    /// Push a fatal consumer error to the pump.
    pub errors: mpsc::Sender<MirrorError>,
}

/// Scripted pipeline factory.
///
/// Produces mock consumer sessions whose feed handles are retained for
/// the test to drive, and a mock producer that records every request.
pub struct MockPipelineFactory {
    log: EventLog,
    consumer_failures: AtomicUsize,
    sessions: Mutex<Vec<SessionHandles>>,
    produced: Arc<Mutex<Vec<ProduceRequest>>>,
}

impl MockPipelineFactory {
    #[must_use]
    pub fn new() -> Self {
        Self {
            log: Arc::new(Mutex::new(Vec::new())),
            consumer_failures: AtomicUsize::new(0),
            sessions: Mutex::new(Vec::new()),
            produced: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Make the next `n` `make_consumer` calls fail.
    pub fn fail_next_consumers(&self, n: usize) {
        self.consumer_failures.store(n, Ordering::SeqCst);
    }

    /// Everything recorded so far, in order.
    #[must_use]
    pub fn events(&self) -> Vec<MirrorEvent> {
        self.log.lock().unwrap().clone()
    }

    /// All produce requests received so far.
    #[must_use]
    pub fn produced(&self) -> Vec<ProduceRequest> {
        self.produced.lock().unwrap().clone()
    }

    /// Number of successful consumer joins so far.
    #[must_use]
    pub fn join_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    /// Feed handles of the most recent consumer session.
    #[must_use]
    pub fn latest_session(&self) -> Option<SessionHandles> {
        self.sessions.lock().unwrap().last().cloned()
    }

    fn record(&self, event: MirrorEvent) {
        self.log.lock().unwrap().push(event);
    }
}

impl Default for MockPipelineFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PipelineFactory for MockPipelineFactory {
    async fn make_producer(&self) -> Result<ProducerHandle> {
        let (input_tx, mut input_rx) = mpsc::channel::<ProduceRequest>(1024);
        let (err_tx, err_rx) = mpsc::channel(16);

        let log = Arc::clone(&self.log);
        let produced = Arc::clone(&self.produced);
        tokio::spawn(async move {
            // err_tx lives in this task so the error channel closes as
            // soon as the input does, like the real producer's flush path.
            let _err_tx = err_tx;
            while let Some(request) = input_rx.recv().await {
                log.lock().unwrap().push(MirrorEvent::Produced {
                    topic: request.topic.clone(),
                });
                produced.lock().unwrap().push(request);
            }
        });

        self.record(MirrorEvent::ProducerCreated);
        Ok(ProducerHandle {
            input: input_tx,
            errors: err_rx,
        })
    }

    async fn make_consumer(&self, group: &str, topics: &[String]) -> Result<ConsumerSession> {
        loop {
            let failures = self.consumer_failures.load(Ordering::SeqCst);
            if failures == 0 {
                break;
            }
            if self
                .consumer_failures
                .compare_exchange(failures, failures - 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return Err(MirrorError::Pipeline {
                    message: "scripted consumer failure".to_string(),
                });
            }
        }

        let (msg_tx, msg_rx) = mpsc::channel(128);
        let (err_tx, err_rx) = mpsc::channel(16);

        self.sessions.lock().unwrap().push(SessionHandles {
            messages: msg_tx,
            errors: err_tx,
        });
        self.record(MirrorEvent::Joined {
            group: group.to_string(),
            topics: topics.to_vec(),
        });

        Ok(ConsumerSession {
            messages: msg_rx,
            errors: err_rx,
            consumer: Box::new(MockConsumerHandle {
                log: Arc::clone(&self.log),
            }),
        })
    }
}

struct MockConsumerHandle {
    log: EventLog,
}

#[async_trait]
impl ConsumerHandle for MockConsumerHandle {
    async fn commit_up_to(&self, position: &TopicPosition) -> Result<()> {
        self.log.lock().unwrap().push(MirrorEvent::Committed {
            topic: position.topic.clone(),
            offset: position.offset,
        });
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.log.lock().unwrap().push(MirrorEvent::ConsumerClosed);
        Ok(())
    }
}
