//! Kafka Mirror Core Library
//!
//! This library implements a cross-cluster replication pump: a long-running
//! daemon that continuously copies messages for a selected set of topics
//! from a source Kafka cluster to a destination Kafka cluster, tolerating
//! topic-set churn, broker unavailability, and bandwidth constraints,
//! without an external coordinator.
//!
//! # Architecture
//!
//! - [`config`] - Configuration loading and validation
//! - [`error`] - Domain-specific error types
//! - [`topics`] - Topic selection policy (whitelist/blacklist)
//! - [`ratelimit`] - Leaky-bucket bandwidth limiter
//! - [`pipeline`] - Collaborator traits and message types
//! - [`kafka`] - rdkafka-backed pipeline implementations
//! - [`pump`] - The consume -> rate-limit -> produce -> commit hot loop
//! - [`controller`] - Generation supervision and lifecycle
//! - [`metrics`] - Prometheus metrics collection
//!
//! # Example
//!
//! ```rust,ignore
//! use kafka_mirror_core::config::MirrorConfig;
//!
//! // Load configuration
//! let config = MirrorConfig::from_file("config.yaml")?;
//!
//! // Wire up the controller and run until shutdown
//! // ...
//! ```

#![forbid(unsafe_code)]

pub mod config;
pub mod controller;
pub mod error;
pub mod kafka;
pub mod metrics;
pub mod pipeline;
pub mod pump;
pub mod ratelimit;
pub mod topics;

/// Test utilities: mock collaborators and a controller harness.
///
/// This module is only available when compiling tests or when the
/// `testing` feature is enabled.
#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export commonly used types
pub use config::{ClusterConfig, Compression, MirrorConfig, MirrorOptions};
pub use controller::MirrorController;
pub use error::{ConfigError, MirrorError, Result};
pub use kafka::{KafkaPipelineFactory, KafkaTopicDiscovery};
pub use metrics::MirrorMetrics;
pub use pipeline::{group_name, PipelineFactory, TopicDiscovery};
pub use pump::TransferStats;
pub use ratelimit::LeakyBucket;
pub use topics::select_topics;
