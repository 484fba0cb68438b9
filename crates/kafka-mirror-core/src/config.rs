//! Configuration types for the mirror daemon.
//!
//! Configuration is loaded from YAML files and validated before use. The
//! whole tree is immutable after construction and passed into the
//! controller by value; nothing in the core reads process-wide state.

use std::collections::HashSet;
use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Root configuration for the mirror daemon.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MirrorConfig {
    /// Source cluster (messages are consumed from here).
    pub source: ClusterConfig,

    /// Destination cluster (messages are produced here).
    pub destination: ClusterConfig,

    /// Mirroring policy: topic selection, bandwidth, commit behavior.
    #[serde(default)]
    pub mirror: MirrorOptions,

    /// Source-side consumer tuning.
    #[serde(default)]
    pub consumer: ConsumerTuning,

    /// Destination-side producer tuning.
    #[serde(default)]
    pub producer: ProducerTuning,

    /// Topic discovery tuning.
    #[serde(default)]
    pub discovery: DiscoveryTuning,

    /// Prometheus metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Identity and bootstrap addresses of one broker cluster.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClusterConfig {
    /// Zone (datacenter) the cluster lives in, e.g. "prod".
    pub zone: String,

    /// Cluster name within the zone, e.g. "logstash".
    pub cluster: String,

    /// Bootstrap broker addresses. Entries support environment variable
    /// expansion: "${KAFKA_BROKERS}".
    pub brokers: Vec<String>,
}

impl ClusterConfig {
    /// Bootstrap brokers as a comma-separated list with environment
    /// variables expanded.
    #[must_use]
    pub fn broker_list(&self) -> String {
        self.brokers
            .iter()
            .map(|b| expand_env_vars(b))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Human-readable `zone/cluster` label for logs.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{}/{}", self.zone, self.cluster)
    }
}

/// Mirroring policy options.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MirrorOptions {
    /// Topics never mirrored. Ignored when `topics_only` is non-empty.
    #[serde(default)]
    pub excluded_topics: HashSet<String>,

    /// When non-empty, only these topics are mirrored (whitelist wins
    /// over `excluded_topics`).
    #[serde(default)]
    pub topics_only: HashSet<String>,

    /// Compression codec applied by the destination producer.
    #[serde(default)]
    pub compression: Compression,

    /// Sustained bandwidth limit in bits per second. 0 means unlimited.
    #[serde(default)]
    pub bandwidth_limit_bps: i64,

    /// Commit the source offset after each forwarded message.
    #[serde(default = "default_auto_commit")]
    pub auto_commit: bool,

    /// Messages between progress log lines.
    #[serde(default = "default_progress_step")]
    pub progress_step: i64,

    /// Log every forwarded message regardless of the idle/active state.
    #[serde(default)]
    pub debug: bool,

    /// Delay before retrying after a discovery or pipeline failure.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

/// Producer compression codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// No compression.
    #[default]
    None,
    /// gzip compression.
    Gzip,
    /// snappy compression.
    Snappy,
}

impl Compression {
    /// Codec name as understood by the Kafka client.
    #[must_use]
    pub fn codec_name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Gzip => "gzip",
            Self::Snappy => "snappy",
        }
    }
}

/// Source-side consumer tuning.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConsumerTuning {
    /// Capacity of the channel between the consumer session and the pump.
    #[serde(default = "default_channel_buffer_size")]
    pub channel_buffer_size: usize,

    /// Interval of the client's periodic offset auto-commit, distinct
    /// from the pump's explicit per-message commit.
    #[serde(default = "default_auto_commit_interval_ms")]
    pub auto_commit_interval_ms: u64,

    /// Upper bound on per-partition processing time before the group
    /// considers the member failed.
    #[serde(default = "default_max_poll_interval_ms")]
    pub max_poll_interval_ms: u64,
}

/// Destination-side producer tuning.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProducerTuning {
    /// Batches are flushed after this long, even when not full.
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    /// Batches are flushed once they hold this many messages.
    #[serde(default = "default_flush_messages")]
    pub flush_messages: usize,

    /// Retries per message on transient send failure.
    #[serde(default = "default_retry_max")]
    pub retry_max: u32,

    /// Fixed backoff between send retries.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

/// Topic discovery tuning.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DiscoveryTuning {
    /// Interval between metadata polls when watching for topic changes.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Timeout for a single metadata request.
    #[serde(default = "default_discovery_timeout_ms")]
    pub timeout_ms: u64,
}

/// Prometheus metrics configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetricsConfig {
    /// Whether to enable the metrics endpoint.
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,

    /// Address for the metrics HTTP server.
    #[serde(default = "default_metrics_address")]
    pub address: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output logs in JSON format (for production).
    #[serde(default)]
    pub json: bool,
}

// Default value functions

fn default_auto_commit() -> bool {
    true
}

fn default_progress_step() -> i64 {
    5000
}

fn default_retry_delay_ms() -> u64 {
    10_000
}

fn default_channel_buffer_size() -> usize {
    100
}

fn default_auto_commit_interval_ms() -> u64 {
    10_000
}

fn default_max_poll_interval_ms() -> u64 {
    300_000
}

fn default_flush_interval_ms() -> u64 {
    10_000
}

fn default_flush_messages() -> usize {
    1000
}

fn default_retry_max() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    10
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_discovery_timeout_ms() -> u64 {
    10_000
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_metrics_address() -> String {
    "0.0.0.0:9090".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

// Default implementations

impl Default for MirrorOptions {
    fn default() -> Self {
        Self {
            excluded_topics: HashSet::new(),
            topics_only: HashSet::new(),
            compression: Compression::default(),
            bandwidth_limit_bps: 0,
            auto_commit: default_auto_commit(),
            progress_step: default_progress_step(),
            debug: false,
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl Default for ConsumerTuning {
    fn default() -> Self {
        Self {
            channel_buffer_size: default_channel_buffer_size(),
            auto_commit_interval_ms: default_auto_commit_interval_ms(),
            max_poll_interval_ms: default_max_poll_interval_ms(),
        }
    }
}

impl Default for ProducerTuning {
    fn default() -> Self {
        Self {
            flush_interval_ms: default_flush_interval_ms(),
            flush_messages: default_flush_messages(),
            retry_max: default_retry_max(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl Default for DiscoveryTuning {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            timeout_ms: default_discovery_timeout_ms(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            address: default_metrics_address(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Expand environment variables in a string.
///
/// Replaces `${VAR_NAME}` with the value of the environment variable
/// `VAR_NAME`. If the variable is not set, replaces with an empty string.
fn expand_env_vars(s: &str) -> String {
    let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid regex");
    re.replace_all(s, |caps: &regex::Captures| {
        std::env::var(&caps[1]).unwrap_or_default()
    })
    .to_string()
}

// Configuration loading and validation

impl MirrorConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if
    /// validation fails.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;

        Self::from_str(&content)
    }

    /// Load configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if parsing or validation fails.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> ConfigResult<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any validation check fails.
    pub fn validate(&self) -> ConfigResult<()> {
        validate_cluster(&self.source, "source")?;
        validate_cluster(&self.destination, "destination")?;

        if self.mirror.progress_step < 1 {
            return Err(ConfigError::InvalidProgressStep(self.mirror.progress_step));
        }

        if self.mirror.bandwidth_limit_bps < 0 {
            return Err(ConfigError::NegativeBandwidthLimit(
                self.mirror.bandwidth_limit_bps,
            ));
        }

        if self.consumer.channel_buffer_size == 0 {
            return Err(ConfigError::InvalidBufferSize {
                field: "consumer.channel_buffer_size",
                value: self.consumer.channel_buffer_size,
            });
        }

        if self.producer.flush_messages == 0 {
            return Err(ConfigError::InvalidBufferSize {
                field: "producer.flush_messages",
                value: self.producer.flush_messages,
            });
        }

        Ok(())
    }
}

fn validate_cluster(cluster: &ClusterConfig, side: &'static str) -> ConfigResult<()> {
    if cluster.zone.is_empty() {
        return Err(ConfigError::MissingZone { side });
    }
    if cluster.cluster.is_empty() {
        return Err(ConfigError::MissingCluster { side });
    }
    if cluster.brokers.is_empty() {
        return Err(ConfigError::EmptyBrokers { side });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> MirrorConfig {
        MirrorConfig {
            source: ClusterConfig {
                zone: "prod".to_string(),
                cluster: "logstash".to_string(),
                brokers: vec!["kafka-1:9092".to_string()],
            },
            destination: ClusterConfig {
                zone: "mirror".to_string(),
                cluster: "aggregator".to_string(),
                brokers: vec!["kafka-remote:9092".to_string()],
            },
            mirror: MirrorOptions::default(),
            consumer: ConsumerTuning::default(),
            producer: ProducerTuning::default(),
            discovery: DiscoveryTuning::default(),
            metrics: MetricsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    #[test]
    fn test_valid_config_passes_validation() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_empty_brokers_rejected() {
        let mut config = valid_config();
        config.destination.brokers.clear();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::EmptyBrokers {
                side: "destination"
            })
        ));
    }

    #[test]
    fn test_missing_zone_rejected() {
        let mut config = valid_config();
        config.source.zone.clear();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingZone { side: "source" })
        ));
    }

    #[test]
    fn test_invalid_progress_step_rejected() {
        let mut config = valid_config();
        config.mirror.progress_step = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidProgressStep(0))
        ));
    }

    #[test]
    fn test_negative_bandwidth_rejected() {
        let mut config = valid_config();
        config.mirror.bandwidth_limit_bps = -1;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NegativeBandwidthLimit(-1))
        ));
    }

    #[test]
    fn test_from_yaml_string() {
        let yaml = r"
source:
  zone: prod
  cluster: logstash
  brokers:
    - 'kafka-1:9092'
destination:
  zone: mirror
  cluster: aggregator
  brokers:
    - 'kafka-remote:9092'
mirror:
  excluded_topics: [users]
  bandwidth_limit_bps: 104857600
  progress_step: 2000
";
        let config = MirrorConfig::from_str(yaml).unwrap();
        assert!(config.mirror.excluded_topics.contains("users"));
        assert_eq!(config.mirror.bandwidth_limit_bps, 104_857_600);
        assert_eq!(config.mirror.progress_step, 2000);
        assert_eq!(config.source.label(), "prod/logstash");
    }

    #[test]
    fn test_default_values_applied() {
        let yaml = r"
source:
  zone: prod
  cluster: logstash
  brokers: ['kafka-1:9092']
destination:
  zone: mirror
  cluster: aggregator
  brokers: ['kafka-remote:9092']
";
        let config = MirrorConfig::from_str(yaml).unwrap();
        assert!(config.mirror.auto_commit);
        assert_eq!(config.mirror.progress_step, 5000);
        assert_eq!(config.mirror.bandwidth_limit_bps, 0);
        assert_eq!(config.mirror.compression, Compression::None);
        assert_eq!(config.consumer.channel_buffer_size, 100);
        assert_eq!(config.producer.flush_messages, 1000);
        assert!(config.metrics.enabled);
    }

    #[test]
    fn test_compression_parsing() {
        let yaml = r"
source:
  zone: prod
  cluster: logstash
  brokers: ['kafka-1:9092']
destination:
  zone: mirror
  cluster: aggregator
  brokers: ['kafka-remote:9092']
mirror:
  compression: snappy
";
        let config = MirrorConfig::from_str(yaml).unwrap();
        assert_eq!(config.mirror.compression, Compression::Snappy);
        assert_eq!(config.mirror.compression.codec_name(), "snappy");
    }

    #[test]
    fn test_env_var_expansion_in_brokers() {
        std::env::set_var("TEST_MIRROR_BROKER", "kafka-env:9092");

        let cluster = ClusterConfig {
            zone: "prod".to_string(),
            cluster: "logstash".to_string(),
            brokers: vec!["${TEST_MIRROR_BROKER}".to_string(), "kafka-2:9092".to_string()],
        };
        assert_eq!(cluster.broker_list(), "kafka-env:9092,kafka-2:9092");

        std::env::remove_var("TEST_MIRROR_BROKER");
    }

    #[test]
    fn test_env_var_expansion_missing_var() {
        assert_eq!(expand_env_vars("${NONEXISTENT_MIRROR_VAR}"), "");
        assert_eq!(expand_env_vars("literal:9092"), "literal:9092");
    }

    #[test]
    fn test_codec_names() {
        assert_eq!(Compression::None.codec_name(), "none");
        assert_eq!(Compression::Gzip.codec_name(), "gzip");
        assert_eq!(Compression::Snappy.codec_name(), "snappy");
    }
}
