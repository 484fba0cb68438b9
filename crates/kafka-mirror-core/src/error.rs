//! Domain error types for the mirror daemon.
//!
//! Uses `thiserror` for ergonomic error definitions with proper context.

use thiserror::Error;

/// Errors related to configuration parsing and validation.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A cluster section has no bootstrap brokers.
    #[error("{side} cluster has no bootstrap brokers configured")]
    EmptyBrokers { side: &'static str },

    /// A cluster section is missing its zone name.
    #[error("{side} cluster is missing a zone name")]
    MissingZone { side: &'static str },

    /// A cluster section is missing its cluster name.
    #[error("{side} cluster is missing a cluster name")]
    MissingCluster { side: &'static str },

    /// Progress reporting step must be at least 1.
    #[error("progress_step must be at least 1, got {0}")]
    InvalidProgressStep(i64),

    /// Bandwidth limit must be zero (unlimited) or positive.
    #[error("bandwidth_limit_bps must be >= 0, got {0}")]
    NegativeBandwidthLimit(i64),

    /// Channel buffer sizes must be at least 1.
    #[error("{field} must be at least 1, got {value}")]
    InvalidBufferSize { field: &'static str, value: usize },

    /// Failed to read configuration file.
    #[error("failed to read config file '{path}': {source}")]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse YAML configuration.
    #[error("failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
}

/// Errors that occur while the mirror is running.
///
/// Every variant is recoverable at some layer of the daemon: discovery and
/// pipeline failures are retried by the controller, consumer failures tear
/// down the current generation, and producer failures are logged and
/// dropped (fire-and-forget delivery).
#[derive(Error, Debug)]
pub enum MirrorError {
    /// Could not list or watch topics on the source cluster.
    #[error("topic discovery failed: {message}")]
    Discovery { message: String },

    /// Could not build a consumer session or producer handle.
    #[error("pipeline construction failed: {message}")]
    Pipeline { message: String },

    /// The consumer session reported a fatal error.
    #[error("consumer session failed: {message}")]
    Consumer { message: String },

    /// A message could not be delivered to the destination cluster.
    #[error("producer failed for topic {topic}: {message}")]
    Producer { topic: String, message: String },

    /// An offset commit against the source cluster failed.
    #[error("offset commit failed for {topic}/{partition}: {message}")]
    Commit {
        topic: String,
        partition: i32,
        message: String,
    },

    /// Underlying Kafka client error.
    #[error("kafka client error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),
}

/// Result type alias for mirror operations.
pub type Result<T> = std::result::Result<T, MirrorError>;

/// Result type alias for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::EmptyBrokers { side: "source" };
        assert!(err.to_string().contains("source"));

        let err = ConfigError::InvalidProgressStep(0);
        assert!(err.to_string().contains('0'));
    }

    #[test]
    fn test_mirror_error_display() {
        let err = MirrorError::Commit {
            topic: "orders".to_string(),
            partition: 3,
            message: "broker not available".to_string(),
        };
        assert!(err.to_string().contains("orders/3"));
    }

    #[test]
    fn test_mirror_error_from_kafka() {
        let kafka_err = rdkafka::error::KafkaError::Canceled;
        let err: MirrorError = kafka_err.into();
        assert!(matches!(err, MirrorError::Kafka(_)));
    }
}
