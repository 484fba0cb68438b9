//! Pump loop tests driving `Pump::run` directly through the channel
//! bundles, with test-local consumer handles that observe ordering.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use kafka_mirror_core::config::MirrorOptions;
use kafka_mirror_core::error::Result;
use kafka_mirror_core::metrics::MirrorMetrics;
use kafka_mirror_core::pipeline::{
    ConsumerHandle, ConsumerSession, ProduceRequest, SourceMessage, TopicPosition,
};
use kafka_mirror_core::pump::{Pump, TransferStats};
use kafka_mirror_core::MirrorError;

const WAIT: Duration = Duration::from_secs(5);

/// Consumer handle that checks, at commit time, whether the committed
/// message had already been handed to the producer channel.
struct VerifyingHandle {
    producer_output: Arc<Mutex<mpsc::Receiver<ProduceRequest>>>,
    /// (offset, message was on the producer channel before the commit)
    commits: Arc<Mutex<Vec<(i64, bool)>>>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl ConsumerHandle for VerifyingHandle {
    async fn commit_up_to(&self, position: &TopicPosition) -> Result<()> {
        let produced = self.producer_output.lock().unwrap().try_recv().is_ok();
        self.commits
            .lock()
            .unwrap()
            .push((position.offset, produced));
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct PumpRun {
    messages: mpsc::Sender<SourceMessage>,
    errors: mpsc::Sender<MirrorError>,
    producer_output: Arc<Mutex<mpsc::Receiver<ProduceRequest>>>,
    commits: Arc<Mutex<Vec<(i64, bool)>>>,
    closed: Arc<AtomicBool>,
    stats: Arc<TransferStats>,
    metrics: Arc<MirrorMetrics>,
    stop: oneshot::Sender<()>,
    stopped: oneshot::Receiver<()>,
    task: tokio::task::JoinHandle<()>,
}

fn spawn_pump(options: MirrorOptions) -> PumpRun {
    let (msg_tx, msg_rx) = mpsc::channel(256);
    let (err_tx, err_rx) = mpsc::channel(16);
    let (prod_tx, prod_rx) = mpsc::channel(256);
    let producer_output = Arc::new(Mutex::new(prod_rx));
    let commits = Arc::new(Mutex::new(Vec::new()));
    let closed = Arc::new(AtomicBool::new(false));

    let session = ConsumerSession {
        messages: msg_rx,
        errors: err_rx,
        consumer: Box::new(VerifyingHandle {
            producer_output: Arc::clone(&producer_output),
            commits: Arc::clone(&commits),
            closed: Arc::clone(&closed),
        }),
    };

    let stats = Arc::new(TransferStats::default());
    let metrics = Arc::new(MirrorMetrics::new());
    let (stop_tx, stop_rx) = oneshot::channel();
    let (stopped_tx, stopped_rx) = oneshot::channel();

    let pump = Pump::new(&options, None, Arc::clone(&stats), Arc::clone(&metrics));
    let task = tokio::spawn(pump.run(session, prod_tx, stop_rx, stopped_tx));

    PumpRun {
        messages: msg_tx,
        errors: err_tx,
        producer_output,
        commits,
        closed,
        stats,
        metrics,
        stop: stop_tx,
        stopped: stopped_rx,
        task,
    }
}

fn message(topic: &str, offset: i64) -> SourceMessage {
    SourceMessage {
        topic: topic.to_string(),
        partition: 0,
        offset,
        key: None,
        value: b"payload".to_vec(),
    }
}

async fn wait_for(predicate: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        if predicate() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn test_every_message_is_produced_before_its_commit() {
    let run = spawn_pump(MirrorOptions::default());

    for offset in 0..20 {
        run.messages.send(message("orders", offset)).await.unwrap();
    }
    let stats = Arc::clone(&run.stats);
    assert!(wait_for(move || stats.messages_transferred() == 20).await);

    run.stop.send(()).unwrap();
    run.stopped.await.unwrap();
    run.task.await.unwrap();

    let commits = run.commits.lock().unwrap();
    assert_eq!(commits.len(), 20);
    for (offset, produced_first) in commits.iter() {
        assert!(
            produced_first,
            "offset {offset} was committed before reaching the producer"
        );
    }
}

#[tokio::test]
async fn test_auto_commit_disabled_never_commits() {
    let run = spawn_pump(MirrorOptions {
        auto_commit: false,
        ..MirrorOptions::default()
    });

    for offset in 0..10 {
        run.messages.send(message("orders", offset)).await.unwrap();
    }
    let stats = Arc::clone(&run.stats);
    assert!(wait_for(move || stats.messages_transferred() == 10).await);

    run.stop.send(()).unwrap();
    run.stopped.await.unwrap();
    run.task.await.unwrap();

    assert!(run.commits.lock().unwrap().is_empty());
    // Messages still flow to the producer.
    let mut forwarded = 0;
    while run.producer_output.lock().unwrap().try_recv().is_ok() {
        forwarded += 1;
    }
    assert_eq!(forwarded, 10);
}

#[tokio::test]
async fn test_progress_reported_every_step() {
    let run = spawn_pump(MirrorOptions {
        progress_step: 50,
        ..MirrorOptions::default()
    });

    for offset in 0..150 {
        run.messages.send(message("orders", offset)).await.unwrap();
    }
    let stats = Arc::clone(&run.stats);
    assert!(wait_for(move || stats.messages_transferred() == 150).await);

    run.stop.send(()).unwrap();
    run.stopped.await.unwrap();
    run.task.await.unwrap();

    assert_eq!(run.metrics.progress_reports.get(), 3);
    assert_eq!(run.stats.messages_transferred(), 150);
    let per_message = message("orders", 0).wire_size() as i64;
    assert_eq!(run.stats.bytes_transferred(), 150 * per_message);
}

#[tokio::test]
async fn test_stream_end_closes_session_then_signals_stopped() {
    let run = spawn_pump(MirrorOptions::default());

    run.messages.send(message("orders", 0)).await.unwrap();
    let stats = Arc::clone(&run.stats);
    assert!(wait_for(move || stats.messages_transferred() == 1).await);

    // Drop the feed side; the pump sees the stream end.
    drop(run.messages);

    run.stopped.await.unwrap();
    // Close happened before the stopped signal fired.
    assert!(run.closed.load(Ordering::SeqCst));
    run.task.await.unwrap();
}

#[tokio::test]
async fn test_consumer_error_closes_session_then_signals_stopped() {
    let run = spawn_pump(MirrorOptions::default());

    run.errors
        .send(MirrorError::Consumer {
            message: "broker gone".to_string(),
        })
        .await
        .unwrap();

    run.stopped.await.unwrap();
    assert!(run.closed.load(Ordering::SeqCst));
    run.task.await.unwrap();
}

#[tokio::test]
async fn test_stop_request_wins_without_traffic() {
    let run = spawn_pump(MirrorOptions::default());

    run.stop.send(()).unwrap();
    run.stopped.await.unwrap();
    assert!(run.closed.load(Ordering::SeqCst));
    run.task.await.unwrap();

    assert_eq!(run.stats.messages_transferred(), 0);
}
