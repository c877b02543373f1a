//! Pipeline tests for airspace-core.
//!
//! The in-process tests run both engines against a partitioned in-memory
//! log and a SQLite file. The Kafka tests require Docker and are marked
//! with #[ignore] to avoid running them in normal test runs.
//!
//! Run with: cargo test --test pipeline_tests -- --ignored

use airspace_core::auth::{CredentialExchange, TokenGrant, TokenManager};
use airspace_core::clock::SystemClock;
use airspace_core::config::{BufferConfig, StoreConfig};
use airspace_core::engine::{ProducerSettings, TickOutcome};
use airspace_core::kafka::{EventPublisher, EventSource, KafkaMessage, PollResult};
use airspace_core::opensky::{BoundingBox, StateVectorSource, StatesResponse};
use airspace_core::store::SqliteStore;
use airspace_core::{
    ApiError, AuthError, ConsumerEngine, Error, KafkaError, Monitors, ProducerEngine, Result,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const TOPIC: &str = "airspace-events";
const PARTITIONS: usize = 3;

// ---------------------------------------------------------------------------
// In-memory event log
// ---------------------------------------------------------------------------

#[derive(Default)]
struct LogState {
    partitions: Vec<Vec<(String, Vec<u8>)>>,
    staged: Vec<(String, Vec<u8>)>,
    committed: BTreeMap<i32, i64>,
    fail_commits: bool,
}

/// Keyed, partitioned log with the same ordering contract as the topic.
#[derive(Clone)]
struct MemoryLog(Arc<Mutex<LogState>>);

impl MemoryLog {
    fn new() -> Self {
        let state = LogState {
            partitions: vec![Vec::new(); PARTITIONS],
            ..LogState::default()
        };
        Self(Arc::new(Mutex::new(state)))
    }

    fn partition_for(key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % PARTITIONS as u64) as usize
    }

    /// Keys in log order for the partition `key` maps to.
    fn keys_in_partition_of(&self, key: &str) -> Vec<String> {
        self.0.lock().partitions[Self::partition_for(key)]
            .iter()
            .map(|(k, _)| k.clone())
            .collect()
    }

    fn len(&self) -> usize {
        self.0.lock().partitions.iter().map(Vec::len).sum()
    }

    fn committed(&self) -> BTreeMap<i32, i64> {
        self.0.lock().committed.clone()
    }

    fn fail_commits(&self, fail: bool) {
        self.0.lock().fail_commits = fail;
    }

    /// A consumer resuming after the last committed offsets.
    fn subscribe(&self) -> MemorySubscriber {
        let cursors = {
            let state = self.0.lock();
            (0..PARTITIONS as i32)
                .map(|p| state.committed.get(&p).map_or(0, |o| (*o + 1) as usize))
                .collect()
        };
        MemorySubscriber {
            log: self.clone(),
            cursors,
            next_partition: 0,
            paused: false,
        }
    }
}

#[async_trait]
impl EventPublisher for MemoryLog {
    async fn publish(&self, key: &str, payload: Vec<u8>) -> Result<()> {
        self.0.lock().staged.push((key.to_string(), payload));
        Ok(())
    }

    async fn flush(&self) -> Result<usize> {
        let mut state = self.0.lock();
        let staged = std::mem::take(&mut state.staged);
        let count = staged.len();
        for (key, payload) in staged {
            state.partitions[Self::partition_for(&key)].push((key, payload));
        }
        Ok(count)
    }
}

struct MemorySubscriber {
    log: MemoryLog,
    cursors: Vec<usize>,
    next_partition: usize,
    paused: bool,
}

impl MemorySubscriber {
    fn next_message(&mut self) -> Option<KafkaMessage> {
        if self.paused {
            return None;
        }
        let state = self.log.0.lock();
        for step in 0..PARTITIONS {
            let partition = (self.next_partition + step) % PARTITIONS;
            let cursor = self.cursors[partition];
            if let Some((key, payload)) = state.partitions[partition].get(cursor) {
                self.cursors[partition] += 1;
                self.next_partition = (partition + 1) % PARTITIONS;
                return Some(KafkaMessage {
                    key: Some(key.as_bytes().to_vec()),
                    value: Some(payload.clone()),
                    topic: TOPIC.to_string(),
                    partition: partition as i32,
                    offset: cursor as i64,
                    timestamp: 0,
                });
            }
        }
        None
    }
}

#[async_trait]
impl EventSource for MemorySubscriber {
    async fn poll(&mut self, timeout: Duration) -> PollResult {
        match self.next_message() {
            Some(msg) => PollResult::Message(msg),
            None => {
                tokio::time::sleep(timeout).await;
                PollResult::Timeout
            }
        }
    }

    async fn commit(&mut self, offsets: &[(String, i32, i64)]) -> Result<()> {
        let mut state = self.log.0.lock();
        if state.fail_commits {
            return Err(KafkaError::OffsetCommit("coordinator not available".into()).into());
        }
        for (_, partition, offset) in offsets {
            state.committed.insert(*partition, *offset);
        }
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.paused = true;
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        self.paused = false;
        Ok(())
    }

    fn is_paused(&self) -> bool {
        self.paused
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Upstream fakes
// ---------------------------------------------------------------------------

struct StaticExchange;

#[async_trait]
impl CredentialExchange for StaticExchange {
    async fn exchange(&self) -> std::result::Result<TokenGrant, AuthError> {
        Ok(TokenGrant {
            access_token: "test-token".into(),
            expires_in: Some(1800),
        })
    }
}

/// Returns queued snapshots in order, then empty ones.
#[derive(Default)]
struct ScriptedSource {
    snapshots: Mutex<VecDeque<Vec<Vec<Value>>>>,
}

impl ScriptedSource {
    fn with(snapshots: Vec<Vec<Vec<Value>>>) -> Arc<Self> {
        Arc::new(Self {
            snapshots: Mutex::new(snapshots.into()),
        })
    }
}

#[async_trait]
impl StateVectorSource for ScriptedSource {
    async fn fetch_states(
        &self,
        _bbox: &BoundingBox,
        token: &str,
    ) -> std::result::Result<StatesResponse, ApiError> {
        assert_eq!(token, "test-token");
        Ok(StatesResponse {
            time: 1_700_000_000,
            states: self.snapshots.lock().pop_front(),
        })
    }
}

fn raw_state(icao24: &str, last_contact: i64, latitude: f64) -> Vec<Value> {
    vec![
        json!(icao24),
        json!("SWA1234 "),
        json!("United States"),
        json!(last_contact),
        json!(last_contact),
        json!(-111.5),
        json!(latitude),
        json!(9144.0),
        json!(false),
        json!(220.1),
        json!(12.0),
        json!(0.0),
        Value::Null,
        json!(9300.2),
        Value::Null,
        json!(false),
        json!(0),
    ]
}

fn producer(source: Arc<ScriptedSource>, log: &MemoryLog) -> ProducerEngine {
    ProducerEngine::new(
        ProducerSettings {
            bounding_box: BoundingBox::default(),
            poll_interval: Duration::from_secs(22),
        },
        TokenManager::new(Arc::new(StaticExchange), Arc::new(SystemClock)),
        source,
        Arc::new(log.clone()),
        Monitors::new(),
    )
}

fn store_config(dir: &Path) -> StoreConfig {
    StoreConfig {
        path: dir.join("airspace.db"),
        ..StoreConfig::default()
    }
}

fn buffer_config() -> BufferConfig {
    BufferConfig {
        poll_timeout_ms: 10,
        ..BufferConfig::default()
    }
}

async fn consumer(log: &MemoryLog, store: &StoreConfig) -> ConsumerEngine {
    let store = SqliteStore::open(store).await.unwrap();
    ConsumerEngine::new(
        Box::new(log.subscribe()),
        Arc::new(store),
        &buffer_config(),
        Monitors::new(),
    )
}

/// Drain everything currently on the log, then stop with a final flush.
async fn drain(engine: &mut ConsumerEngine, expected: usize) {
    while engine.offsets().get_all_partitions().is_empty() || engine.buffered() < expected {
        engine.poll_once().await.unwrap();
    }
    engine.shutdown_signal().send(()).unwrap();
    engine.run().await.unwrap();
}

// ---------------------------------------------------------------------------
// In-process pipeline
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_two_aircraft_reach_the_store() {
    let dir = TempDir::new().unwrap();
    let store = store_config(dir.path());
    let log = MemoryLog::new();

    let source = ScriptedSource::with(vec![vec![
        raw_state("a1b2c3", 1_700_000_000, 40.1),
        raw_state("d4e5f6", 1_700_000_003, 41.9),
    ]]);
    let mut producer = producer(source, &log);

    let outcome = producer.tick().await.unwrap();
    assert_eq!(
        outcome,
        TickOutcome::Published {
            records: 2,
            dropped: 0
        }
    );
    assert_eq!(log.len(), 2);
    assert!(log.keys_in_partition_of("a1b2c3").contains(&"a1b2c3".to_string()));
    assert!(log.keys_in_partition_of("d4e5f6").contains(&"d4e5f6".to_string()));

    let mut consumer = consumer(&log, &store).await;
    drain(&mut consumer, 2).await;
    assert_eq!(consumer.monitors().metrics.flushes_total(), 1);
    assert_eq!(consumer.monitors().metrics.rows_written_total(), 2);

    let reader = SqliteStore::open(&store).await.unwrap();
    assert_eq!(reader.count().await.unwrap(), 2);

    let latest = reader.latest_positions().await.unwrap();
    let keys: Vec<_> = latest.iter().map(|r| r.primary_key()).collect();
    assert_eq!(
        keys,
        vec![("a1b2c3", 1_700_000_000), ("d4e5f6", 1_700_000_003)]
    );

    let committed: usize = log.committed().len();
    assert!(committed >= 1);
}

#[tokio::test]
async fn test_same_aircraft_stays_ordered() {
    let dir = TempDir::new().unwrap();
    let store = store_config(dir.path());
    let log = MemoryLog::new();

    let source = ScriptedSource::with(vec![
        vec![raw_state("abc123", 100, 40.0)],
        vec![raw_state("abc123", 122, 40.2)],
        vec![raw_state("ABC123", 144, 40.4)],
    ]);
    let mut producer = producer(source, &log);
    for _ in 0..3 {
        producer.tick().await.unwrap();
    }
    assert_eq!(log.keys_in_partition_of("abc123"), vec!["abc123"; 3]);

    let mut consumer = consumer(&log, &store).await;
    drain(&mut consumer, 3).await;

    let reader = SqliteStore::open(&store).await.unwrap();
    let track = reader.track("abc123").await.unwrap();
    let contacts: Vec<_> = track.iter().map(|r| r.last_contact).collect();
    assert_eq!(contacts, vec![100, 122, 144]);
    let latitudes: Vec<_> = track.iter().map(|r| r.latitude).collect();
    assert_eq!(latitudes, vec![Some(40.0), Some(40.2), Some(40.4)]);
}

#[tokio::test]
async fn test_redelivery_after_lost_commit_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let store = store_config(dir.path());
    let log = MemoryLog::new();

    let source = ScriptedSource::with(vec![vec![
        raw_state("a1b2c3", 1_700_000_000, 40.1),
        raw_state("d4e5f6", 1_700_000_003, 41.9),
    ]]);
    producer(source, &log).tick().await.unwrap();

    // First run writes but never gets its offsets committed.
    log.fail_commits(true);
    let mut first = consumer(&log, &store).await;
    drain(&mut first, 2).await;
    assert!(log.committed().is_empty());
    assert_eq!(first.monitors().metrics.rows_written_total(), 2);

    // The restart sees the same two messages again.
    log.fail_commits(false);
    let mut second = consumer(&log, &store).await;
    drain(&mut second, 2).await;
    assert_eq!(second.monitors().metrics.rows_written_total(), 2);
    assert!(!log.committed().is_empty());

    let reader = SqliteStore::open(&store).await.unwrap();
    assert_eq!(reader.count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_invalid_rows_never_reach_the_log() {
    let log = MemoryLog::new();
    let mut too_short = raw_state("bad001", 10, 40.0);
    too_short.truncate(9);

    let source = ScriptedSource::with(vec![vec![
        too_short,
        raw_state("", 11, 40.0),
        raw_state("c0ffee", 12, 40.0),
    ]]);
    let mut producer = producer(source, &log);

    let outcome = producer.tick().await.unwrap();
    assert_eq!(
        outcome,
        TickOutcome::Published {
            records: 1,
            dropped: 2
        }
    );
    assert_eq!(log.len(), 1);
    assert_eq!(producer.monitors().metrics.records_dropped_total(), 2);
}

#[tokio::test]
async fn test_unopenable_store_is_fatal() {
    let dir = TempDir::new().unwrap();
    let config = StoreConfig {
        path: dir.path().join("missing").join("nested").join("airspace.db"),
        ..StoreConfig::default()
    };

    let err = SqliteStore::open(&config).await.err().unwrap();
    assert!(matches!(err, Error::Store(_)));
    assert!(err.is_fatal());
}

// ---------------------------------------------------------------------------
// Kafka (Docker)
// ---------------------------------------------------------------------------

mod kafka_integration {
    use super::*;
    use airspace_core::config::KafkaConfig;
    use airspace_core::kafka::{
        ensure_topic, KafkaConsumerBuilder, KafkaEventPublisher, TopicStatus,
    };
    use airspace_core::StateVector;
    use testcontainers::runners::AsyncRunner;
    use testcontainers_modules::kafka::Kafka;

    fn kafka_config(bootstrap: String, topic: &str) -> KafkaConfig {
        let mut config = KafkaConfig {
            bootstrap_servers: vec![bootstrap],
            topic: topic.to_string(),
            consumer_group: format!("{}-test", topic),
            ..KafkaConfig::default()
        };
        config.topic_settings.replication_factor = 1;
        config
    }

    /// Topic creation is idempotent against a real broker.
    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_ensure_topic_twice() {
        let kafka = Kafka::default()
            .start()
            .await
            .expect("Failed to start Kafka container");
        let port = kafka
            .get_host_port_ipv4(9093)
            .await
            .expect("Failed to get Kafka port");
        let config = kafka_config(format!("127.0.0.1:{}", port), "airspace-topic-test");

        assert_eq!(ensure_topic(&config).await.unwrap(), TopicStatus::Created);
        assert_eq!(
            ensure_topic(&config).await.unwrap(),
            TopicStatus::AlreadyExists
        );
    }

    /// Publish, consume and commit through a real broker.
    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_publish_then_consume() {
        let kafka = Kafka::default()
            .start()
            .await
            .expect("Failed to start Kafka container");
        let port = kafka
            .get_host_port_ipv4(9093)
            .await
            .expect("Failed to get Kafka port");
        let config = kafka_config(format!("127.0.0.1:{}", port), "airspace-roundtrip");
        ensure_topic(&config).await.expect("Failed to create topic");

        let record = StateVector::from_positional(&raw_state("a1b2c3", 1_700_000_000, 40.1))
            .expect("valid record");
        let publisher = KafkaEventPublisher::new(&config).expect("producer");
        publisher
            .publish(record.key(), record.to_json_bytes().unwrap())
            .await
            .expect("enqueue");
        assert_eq!(publisher.flush().await.expect("flush"), 1);

        let mut consumer = KafkaConsumerBuilder::new(config)
            .build()
            .expect("consumer");
        let mut received = None;
        for _ in 0..30 {
            if let PollResult::Message(msg) = consumer.poll(Duration::from_secs(1)).await {
                received = Some(msg);
                break;
            }
        }

        let msg = received.expect("message within 30s");
        assert_eq!(msg.key_str(), Some("a1b2c3"));
        assert_eq!(StateVector::from_json_slice(msg.payload()).unwrap(), record);

        consumer
            .commit(&[(msg.topic.clone(), msg.partition, msg.offset)])
            .await
            .expect("commit");
        consumer.close().await.expect("close");
    }
}
