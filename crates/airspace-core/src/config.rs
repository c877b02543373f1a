//! Configuration structures for the airspace pipeline.
//!
//! Configuration is loaded from an optional TOML file, overlaid with
//! environment variables, and can finally be overridden via CLI flags.
//! Every section has defaults matching the reference deployment, so an
//! empty file (or no file at all) plus credentials is a working setup.

use crate::opensky::BoundingBox;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Seconds in a day, used to derive the minimum poll interval from a quota.
const SECONDS_PER_DAY: u64 = 86_400;

/// Default hard cap on buffered records, as a multiple of the flush threshold.
const MAX_RECORDS_FACTOR: usize = 4;

/// Main configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Kafka configuration
    #[serde(default)]
    pub kafka: KafkaConfig,

    /// State-vector API configuration
    #[serde(default)]
    pub opensky: OpenSkyConfig,

    /// Token endpoint and client credentials
    #[serde(default)]
    pub auth: AuthConfig,

    /// Consumer batch buffer configuration
    #[serde(default)]
    pub buffer: BufferConfig,

    /// Analytical store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Monitoring configuration
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

/// Kafka client configuration shared by the producer and the consumer.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KafkaConfig {
    /// Kafka bootstrap servers
    #[serde(default = "default_bootstrap_servers")]
    pub bootstrap_servers: Vec<String>,

    /// Topic carrying state vectors
    #[serde(default = "default_topic")]
    pub topic: String,

    /// Consumer group ID
    #[serde(default = "default_consumer_group")]
    pub consumer_group: String,

    /// Session timeout in milliseconds
    #[serde(default = "default_session_timeout_ms")]
    pub session_timeout_ms: u32,

    /// Heartbeat interval in milliseconds
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u32,

    /// Max poll interval in milliseconds (must exceed the longest flush)
    #[serde(default = "default_max_poll_interval_ms")]
    pub max_poll_interval_ms: u32,

    /// Auto offset reset strategy
    #[serde(default)]
    pub auto_offset_reset: OffsetReset,

    /// Producer tuning
    #[serde(default)]
    pub producer: KafkaProducerConfig,

    /// Topic settings applied when provisioning
    #[serde(default)]
    pub topic_settings: TopicSettings,

    /// Security configuration
    #[serde(default)]
    pub security: KafkaSecurityConfig,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            bootstrap_servers: default_bootstrap_servers(),
            topic: default_topic(),
            consumer_group: default_consumer_group(),
            session_timeout_ms: default_session_timeout_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            max_poll_interval_ms: default_max_poll_interval_ms(),
            auto_offset_reset: OffsetReset::default(),
            producer: KafkaProducerConfig::default(),
            topic_settings: TopicSettings::default(),
            security: KafkaSecurityConfig::default(),
        }
    }
}

impl KafkaConfig {
    /// Comma-joined broker list as librdkafka expects it.
    pub fn brokers(&self) -> String {
        self.bootstrap_servers.join(",")
    }
}

/// Kafka auto offset reset strategy.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum OffsetReset {
    /// Start from earliest offset
    #[default]
    Earliest,
    /// Start from latest offset
    Latest,
}

impl OffsetReset {
    pub fn as_str(&self) -> &'static str {
        match self {
            OffsetReset::Earliest => "earliest",
            OffsetReset::Latest => "latest",
        }
    }
}

/// Producer tuning.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KafkaProducerConfig {
    /// linger.ms
    #[serde(default = "default_linger_ms")]
    pub linger_ms: u32,

    /// batch.size in bytes
    #[serde(default = "default_producer_batch_size")]
    pub batch_size: u32,

    /// acks
    #[serde(default = "default_acks")]
    pub acks: String,

    /// message.timeout.ms
    #[serde(default = "default_message_timeout_ms")]
    pub message_timeout_ms: u32,

    /// Upper bound for the end-of-tick flush in milliseconds
    #[serde(default = "default_flush_timeout_ms")]
    pub flush_timeout_ms: u64,
}

impl Default for KafkaProducerConfig {
    fn default() -> Self {
        Self {
            linger_ms: default_linger_ms(),
            batch_size: default_producer_batch_size(),
            acks: default_acks(),
            message_timeout_ms: default_message_timeout_ms(),
            flush_timeout_ms: default_flush_timeout_ms(),
        }
    }
}

/// Settings used by `topic init`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TopicSettings {
    #[serde(default = "default_num_partitions")]
    pub num_partitions: i32,

    #[serde(default = "default_replication_factor")]
    pub replication_factor: i32,

    /// retention.ms, -1 keeps records forever
    #[serde(default = "default_retention_ms")]
    pub retention_ms: i64,
}

impl Default for TopicSettings {
    fn default() -> Self {
        Self {
            num_partitions: default_num_partitions(),
            replication_factor: default_replication_factor(),
            retention_ms: default_retention_ms(),
        }
    }
}

/// Kafka security configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct KafkaSecurityConfig {
    /// Security protocol (PLAINTEXT, SSL, SASL_SSL, SASL_PLAINTEXT)
    pub protocol: Option<String>,

    /// SASL mechanism (PLAIN, SCRAM-SHA-256, SCRAM-SHA-512)
    pub sasl_mechanism: Option<String>,

    /// SASL username
    pub sasl_username: Option<String>,

    /// SASL password
    pub sasl_password: Option<String>,

    /// SSL CA certificate location
    pub ssl_ca_location: Option<PathBuf>,
}

/// State-vector API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OpenSkyConfig {
    /// `states/all` endpoint
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Region polled every tick
    #[serde(default)]
    pub bounding_box: BoundingBox,

    /// Sleep between ticks in seconds
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Calls per day allowed by the account
    #[serde(default = "default_daily_request_quota")]
    pub daily_request_quota: u64,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for OpenSkyConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            bounding_box: BoundingBox::default(),
            poll_interval_secs: default_poll_interval_secs(),
            daily_request_quota: default_daily_request_quota(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// OAuth client-credentials configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// Token endpoint
    #[serde(default = "default_token_url")]
    pub token_url: String,

    /// Client id, usually from OPENSKY_CLIENTID
    pub client_id: Option<String>,

    /// Client secret, usually from OPENSKY_CLIENTSECRET
    #[serde(skip_serializing)]
    pub client_secret: Option<String>,

    /// Token request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_url: default_token_url(),
            client_id: None,
            client_secret: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Consumer batch buffer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BufferConfig {
    /// Buffered record count that triggers a flush
    #[serde(default = "default_flush_threshold")]
    pub flush_threshold: usize,

    /// Hard cap; reaching it pauses consumption until a flush succeeds.
    /// Unset means four times the flush threshold.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_records: Option<usize>,

    /// Log poll timeout in milliseconds
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,

    /// First delay after a failed flush
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Upper bound for the flush retry delay
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            flush_threshold: default_flush_threshold(),
            max_records: None,
            poll_timeout_ms: default_poll_timeout_ms(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

impl BufferConfig {
    /// Effective hard cap on buffered records.
    pub fn max_records(&self) -> usize {
        self.max_records
            .unwrap_or_else(|| self.flush_threshold.saturating_mul(MAX_RECORDS_FACTOR))
    }
}

/// Analytical store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    /// Database file
    #[serde(default = "default_store_path")]
    pub path: PathBuf,

    /// Busy timeout in milliseconds
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

/// Monitoring configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitoringConfig {
    /// Health and metrics HTTP port of `airspace produce`
    #[serde(default = "default_producer_port")]
    pub producer_port: u16,

    /// Health and metrics HTTP port of `airspace consume`
    #[serde(default = "default_consumer_port")]
    pub consumer_port: u16,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Log format
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            producer_port: default_producer_port(),
            consumer_port: default_consumer_port(),
            log_level: LogLevel::default(),
            log_format: LogFormat::default(),
        }
    }
}

/// Log level.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Log format.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format (default)
    #[default]
    Json,
    /// Plain text format
    Text,
}

// Default value functions
fn default_bootstrap_servers() -> Vec<String> {
    vec![
        "127.0.0.1:19092".into(),
        "127.0.0.1:29092".into(),
        "127.0.0.1:39092".into(),
    ]
}
fn default_topic() -> String {
    "airspace-events".into()
}
fn default_consumer_group() -> String {
    "airspace-consumer".into()
}
fn default_session_timeout_ms() -> u32 {
    30000
}
fn default_heartbeat_interval_ms() -> u32 {
    3000
}
fn default_max_poll_interval_ms() -> u32 {
    300000 // 5 minutes
}
fn default_linger_ms() -> u32 {
    5
}
fn default_producer_batch_size() -> u32 {
    10000
}
fn default_acks() -> String {
    "all".into()
}
fn default_message_timeout_ms() -> u32 {
    30000
}
fn default_flush_timeout_ms() -> u64 {
    30000
}
fn default_num_partitions() -> i32 {
    3
}
fn default_replication_factor() -> i32 {
    3
}
fn default_retention_ms() -> i64 {
    -1
}
fn default_api_url() -> String {
    "https://opensky-network.org/api/states/all".into()
}
fn default_token_url() -> String {
    "https://auth.opensky-network.org/auth/realms/opensky-network/protocol/openid-connect/token"
        .into()
}
fn default_poll_interval_secs() -> u64 {
    22
}
fn default_daily_request_quota() -> u64 {
    4000
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_flush_threshold() -> usize {
    2000
}
fn default_poll_timeout_ms() -> u64 {
    1000
}
fn default_retry_base_delay_ms() -> u64 {
    500
}
fn default_retry_max_delay_ms() -> u64 {
    30000
}
fn default_store_path() -> PathBuf {
    PathBuf::from("airspace-events.db")
}
fn default_busy_timeout_ms() -> u64 {
    5000
}
fn default_producer_port() -> u16 {
    8080
}
fn default_consumer_port() -> u16 {
    8081
}

impl Config {
    /// Parse a TOML document without validating it.
    pub fn from_toml_str(content: &str) -> crate::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults or file contents, overlaid with the process environment.
    ///
    /// Not validated: callers apply CLI overrides first.
    pub fn load(path: Option<&Path>) -> crate::Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_toml_str(&std::fs::read_to_string(path)?)?,
            None => Self::default(),
        };
        config.apply_env_from(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Overlay values found through `lookup`, keyed by environment variable name.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> crate::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(brokers) = get("KAFKA_BROKER") {
            self.kafka.bootstrap_servers = brokers
                .split(',')
                .map(|b| b.trim().to_string())
                .filter(|b| !b.is_empty())
                .collect();
        }
        if let Some(topic) = get("AIRSPACE_TOPIC") {
            self.kafka.topic = topic;
        }
        if let Some(group) = get("AIRSPACE_CONSUMER_GROUP") {
            self.kafka.consumer_group = group;
        }
        if let Some(id) = get("OPENSKY_CLIENTID") {
            self.auth.client_id = Some(id);
        }
        if let Some(secret) = get("OPENSKY_CLIENTSECRET") {
            self.auth.client_secret = Some(secret);
        }
        if let Some(url) = get("OPENSKY_AUTH_URL") {
            self.auth.token_url = url;
        }
        if let Some(url) = get("OPENSKY_API_URL") {
            self.opensky.api_url = url;
        }

        let bbox = &mut self.opensky.bounding_box;
        for (key, slot) in [
            ("OPENSKY_LAMIN", &mut bbox.lamin),
            ("OPENSKY_LOMIN", &mut bbox.lomin),
            ("OPENSKY_LAMAX", &mut bbox.lamax),
            ("OPENSKY_LOMAX", &mut bbox.lomax),
        ] {
            if let Some(raw) = get(key) {
                *slot = parse_env(key, &raw)?;
            }
        }

        if let Some(raw) = get("POLL_INTERVAL_SECS") {
            self.opensky.poll_interval_secs = parse_env("POLL_INTERVAL_SECS", &raw)?;
        }
        if let Some(raw) = get("FLUSH_THRESHOLD") {
            self.buffer.flush_threshold = parse_env("FLUSH_THRESHOLD", &raw)?;
        }
        if let Some(path) = get("AIRSPACE_STORE_PATH") {
            self.store.path = PathBuf::from(path);
        }

        Ok(())
    }

    /// Smallest poll interval that stays inside the daily quota.
    pub fn min_poll_interval_secs(&self) -> u64 {
        let quota = self.opensky.daily_request_quota.max(1);
        SECONDS_PER_DAY.div_ceil(quota)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> crate::Result<()> {
        if self.kafka.bootstrap_servers.is_empty() {
            return Err(crate::Error::Config(
                "At least one bootstrap server required".into(),
            ));
        }

        if self.kafka.topic.is_empty() {
            return Err(crate::Error::Config("Kafka topic is required".into()));
        }

        if self.kafka.consumer_group.is_empty() {
            return Err(crate::Error::Config("Consumer group is required".into()));
        }

        if self.opensky.daily_request_quota == 0 {
            return Err(crate::Error::Config(
                "Daily request quota must be positive".into(),
            ));
        }

        let min_interval = self.min_poll_interval_secs();
        if self.opensky.poll_interval_secs < min_interval {
            return Err(crate::Error::Config(format!(
                "Poll interval {}s is below the {}s minimum for a quota of {} calls/day",
                self.opensky.poll_interval_secs, min_interval, self.opensky.daily_request_quota
            )));
        }

        self.opensky
            .bounding_box
            .validate()
            .map_err(crate::Error::Config)?;

        if self.buffer.flush_threshold == 0 {
            return Err(crate::Error::Config(
                "Flush threshold must be positive".into(),
            ));
        }

        if self.buffer.max_records() < self.buffer.flush_threshold {
            return Err(crate::Error::Config(format!(
                "buffer.max_records ({}) must be at least the flush threshold ({})",
                self.buffer.max_records(),
                self.buffer.flush_threshold
            )));
        }

        if self.store.path.as_os_str().is_empty() {
            return Err(crate::Error::Config("Store path is required".into()));
        }

        if self.monitoring.producer_port == self.monitoring.consumer_port {
            return Err(crate::Error::Config(format!(
                "monitoring.producer_port and monitoring.consumer_port are both {}",
                self.monitoring.producer_port
            )));
        }

        Ok(())
    }

    /// Producer-side checks, run before the first tick.
    pub fn validate_credentials(&self) -> crate::Result<()> {
        use crate::error::AuthError;

        if self.auth.client_id.as_deref().map_or(true, str::is_empty) {
            return Err(AuthError::MissingCredentials("OPENSKY_CLIENTID").into());
        }
        if self.auth.client_secret.as_deref().map_or(true, str::is_empty) {
            return Err(AuthError::MissingCredentials("OPENSKY_CLIENTSECRET").into());
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, raw: &str) -> crate::Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| crate::Error::Config(format!("{}={:?} is invalid: {}", key, raw, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_match_reference_deployment() {
        let config = Config::default();
        assert_eq!(config.kafka.topic, "airspace-events");
        assert_eq!(config.kafka.consumer_group, "airspace-consumer");
        assert_eq!(
            config.kafka.brokers(),
            "127.0.0.1:19092,127.0.0.1:29092,127.0.0.1:39092"
        );
        assert_eq!(config.kafka.auto_offset_reset, OffsetReset::Earliest);
        assert_eq!(config.kafka.producer.linger_ms, 5);
        assert_eq!(config.kafka.producer.batch_size, 10000);
        assert_eq!(config.kafka.topic_settings.num_partitions, 3);
        assert_eq!(config.kafka.topic_settings.retention_ms, -1);
        assert_eq!(config.opensky.poll_interval_secs, 22);
        assert_eq!(config.buffer.flush_threshold, 2000);
        assert_eq!(config.buffer.max_records(), 8000);
        assert_eq!(config.buffer.poll_timeout_ms, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_min_poll_interval_from_quota() {
        let mut config = Config::default();
        assert_eq!(config.min_poll_interval_secs(), 22);

        config.opensky.daily_request_quota = 8000;
        assert_eq!(config.min_poll_interval_secs(), 11);

        config.opensky.daily_request_quota = 86400;
        assert_eq!(config.min_poll_interval_secs(), 1);
    }

    #[test]
    fn test_poll_interval_below_quota_minimum_is_rejected() {
        let mut config = Config::default();
        config.opensky.poll_interval_secs = 10;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("below the 22s minimum"));
    }

    #[test]
    fn test_config_validation_empty_servers() {
        let mut config = Config::default();
        config.kafka.bootstrap_servers.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_empty_topic_and_group() {
        let mut config = Config::default();
        config.kafka.topic.clear();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.kafka.consumer_group.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_inverted_bounding_box_is_rejected() {
        let mut config = Config::default();
        config.opensky.bounding_box.lamin = 50.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_buffer_limits() {
        let mut config = Config::default();
        config.buffer.flush_threshold = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.buffer.max_records = Some(1999);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_monitoring_ports_differ_per_process() {
        let config = Config::default();
        assert_eq!(config.monitoring.producer_port, 8080);
        assert_eq!(config.monitoring.consumer_port, 8081);

        let mut config = Config::default();
        config.monitoring.consumer_port = 8080;
        assert!(matches!(config.validate(), Err(crate::Error::Config(_))));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            [kafka]
            bootstrap_servers = ["broker:9092"]

            [opensky.bounding_box]
            lamin = 45.8
            lomin = 5.9
            lamax = 47.8
            lomax = 10.5

            [buffer]
            flush_threshold = 500

            [monitoring]
            consumer_port = 9091
            log_format = "text"
            "#,
        )
        .unwrap();

        assert_eq!(config.kafka.bootstrap_servers, vec!["broker:9092"]);
        assert_eq!(config.kafka.topic, "airspace-events");
        assert_eq!(config.opensky.bounding_box.lamin, 45.8);
        assert_eq!(config.buffer.flush_threshold, 500);
        assert_eq!(config.buffer.max_records(), 2000);
        assert_eq!(config.monitoring.producer_port, 8080);
        assert_eq!(config.monitoring.consumer_port, 9091);
        assert_eq!(config.monitoring.log_format, LogFormat::Text);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overlay() {
        let mut config = Config::default();
        config
            .apply_env_from(env(&[
                ("KAFKA_BROKER", "k1:9092, k2:9092"),
                ("OPENSKY_CLIENTID", "client"),
                ("OPENSKY_CLIENTSECRET", "secret"),
                ("OPENSKY_LAMIN", "38.5"),
                ("POLL_INTERVAL_SECS", "60"),
                ("FLUSH_THRESHOLD", "100"),
                ("AIRSPACE_STORE_PATH", "/data/air.db"),
                ("AIRSPACE_TOPIC", ""),
            ]))
            .unwrap();

        assert_eq!(config.kafka.bootstrap_servers, vec!["k1:9092", "k2:9092"]);
        assert_eq!(config.auth.client_id.as_deref(), Some("client"));
        assert_eq!(config.auth.client_secret.as_deref(), Some("secret"));
        assert_eq!(config.opensky.bounding_box.lamin, 38.5);
        assert_eq!(config.opensky.poll_interval_secs, 60);
        assert_eq!(config.buffer.flush_threshold, 100);
        assert_eq!(config.store.path, PathBuf::from("/data/air.db"));
        // Blank values are ignored.
        assert_eq!(config.kafka.topic, "airspace-events");
    }

    #[test]
    fn test_flush_threshold_from_env_scales_the_cap() {
        let mut config = Config::default();
        config
            .apply_env_from(env(&[("FLUSH_THRESHOLD", "10000")]))
            .unwrap();

        assert_eq!(config.buffer.flush_threshold, 10000);
        assert_eq!(config.buffer.max_records(), 40000);
        assert!(config.validate().is_ok());

        // An explicit cap is kept as given.
        config.buffer.max_records = Some(12000);
        assert_eq!(config.buffer.max_records(), 12000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overlay_rejects_unparseable_numbers() {
        let mut config = Config::default();
        let err = config
            .apply_env_from(env(&[("FLUSH_THRESHOLD", "lots")]))
            .unwrap_err();
        assert!(err.to_string().contains("FLUSH_THRESHOLD"));
    }

    #[test]
    fn test_missing_credentials() {
        let mut config = Config::default();
        let err = config.validate_credentials().unwrap_err();
        assert!(err.to_string().contains("OPENSKY_CLIENTID"));
        assert!(err.is_fatal());

        config.auth.client_id = Some("id".into());
        config.auth.client_secret = Some("secret".into());
        assert!(config.validate_credentials().is_ok());
    }

    #[test]
    fn test_offset_reset_variants() {
        assert_eq!(OffsetReset::Earliest.as_str(), "earliest");
        assert_eq!(OffsetReset::Latest.as_str(), "latest");
    }
}
