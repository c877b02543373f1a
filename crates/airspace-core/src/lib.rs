//! Airspace core: aircraft state-vector ingestion.
//!
//! Two independent pipelines share one Kafka topic:
//!
//! - the producer polls the OpenSky state-vector API for a bounding box,
//!   maps each positional row to a [`StateVector`] and publishes it keyed by
//!   aircraft address
//! - the consumer reads the topic, buffers records and upserts them into a
//!   local analytical store in bulk, committing offsets only after each
//!   write succeeds
//!
//! Delivery is at-least-once end to end; the store's primary key
//! `(icao24, last_contact)` makes redelivery idempotent.

pub mod auth;
pub mod buffer;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod health;
pub mod kafka;
pub mod metrics;
pub mod opensky;
pub mod record;
pub mod retry;
pub mod store;

// Re-export commonly used types
pub use config::Config;
pub use engine::{ConsumerEngine, Monitors, ProducerEngine};
pub use error::{ApiError, AuthError, KafkaError, RecordError, StoreError};
pub use error::{Error, ErrorKind, Result};
pub use record::StateVector;
