//! Kafka Mirror CLI
//!
//! A daemon that continuously copies messages for a selected set of topics
//! from a source Kafka cluster to a destination Kafka cluster.

use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, Level};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use kafka_mirror_core::config::{LoggingConfig, MirrorConfig};
use kafka_mirror_core::controller::MirrorController;
use kafka_mirror_core::kafka::{KafkaPipelineFactory, KafkaTopicDiscovery};
use kafka_mirror_core::metrics::MirrorMetrics;
use kafka_mirror_core::pipeline::{group_name, PipelineFactory, TopicDiscovery};

/// Cross-cluster Kafka mirror daemon.
#[derive(Parser)]
#[command(name = "kafka-mirror")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file.
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    /// Override the sustained bandwidth limit in bits per second.
    #[arg(long)]
    bandwidth_limit_bps: Option<i64>,

    /// Log every forwarded message.
    #[arg(long)]
    debug: bool,

    /// Increase logging verbosity (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = MirrorConfig::from_file(&args.config)?;

    // Apply CLI overrides
    if let Some(limit) = args.bandwidth_limit_bps {
        config.mirror.bandwidth_limit_bps = limit;
    }
    if args.debug {
        config.mirror.debug = true;
    }
    config.validate()?;

    // Override log level from verbosity flag
    let log_config = match args.verbose {
        0 => config.logging.clone(),
        1 => LoggingConfig {
            level: "debug".to_string(),
            ..config.logging.clone()
        },
        _ => LoggingConfig {
            level: "trace".to_string(),
            ..config.logging.clone()
        },
    };

    // Setup tracing
    setup_tracing(&log_config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        source = %config.source.label(),
        destination = %config.destination.label(),
        group = %group_name(&config.source, &config.destination),
        bandwidth_limit_bps = config.mirror.bandwidth_limit_bps,
        "starting kafka mirror"
    );

    // Run the async runtime
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move { run_mirror(config).await })
}

fn setup_tracing(config: &LoggingConfig) {
    let level = match config.level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber.with(fmt::layer()).init();
    }
}

async fn run_mirror(config: MirrorConfig) -> anyhow::Result<()> {
    let metrics = Arc::new(MirrorMetrics::new());

    // Start metrics server if enabled
    if config.metrics.enabled {
        let metrics_clone = Arc::clone(&metrics);
        let metrics_addr = config.metrics.address.clone();
        tokio::spawn(async move {
            if let Err(e) = start_metrics_server(&metrics_addr, metrics_clone).await {
                tracing::error!(error = %e, "metrics server error");
            }
        });
        info!(address = %config.metrics.address, "metrics server started");
    }

    // Flip the shutdown flag on the first termination signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received, stopping mirror");
        let _ = shutdown_tx.send(true);
    });

    let discovery: Arc<dyn TopicDiscovery> = Arc::new(KafkaTopicDiscovery::new(
        config.source.clone(),
        config.discovery.clone(),
    ));
    let factory: Arc<dyn PipelineFactory> = Arc::new(KafkaPipelineFactory::new(config.clone()));

    let controller = MirrorController::new(config, discovery, factory, metrics, shutdown_rx);
    controller.run().await?;

    info!("mirror shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl+c");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to listen for SIGTERM")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

async fn start_metrics_server(
    addr: &str,
    metrics: Arc<MirrorMetrics>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    use http_body_util::Full;
    use hyper::body::Bytes;
    use hyper::server::conn::http1;
    use hyper::service::service_fn;
    use hyper::{Request, Response};
    use hyper_util::rt::TokioIo;
    use std::net::SocketAddr;
    use tokio::net::TcpListener;

    let addr: SocketAddr = addr.parse()?;
    let listener = TcpListener::bind(addr).await?;

    info!(address = %addr, "metrics server listening");

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let metrics = Arc::clone(&metrics);

        tokio::spawn(async move {
            let service = service_fn(move |_req: Request<hyper::body::Incoming>| {
                let metrics = Arc::clone(&metrics);
                async move {
                    let body = metrics.encode().unwrap_or_default();
                    Ok::<_, hyper::Error>(Response::new(Full::new(Bytes::from(body))))
                }
            });

            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                tracing::debug!(error = %e, "metrics connection error");
            }
        });
    }
}
