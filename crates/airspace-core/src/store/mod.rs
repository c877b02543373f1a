//! Analytical store for materialized state vectors.
//!
//! One table, `airspace`, keyed by `(icao24, last_contact)`. Writes are
//! insert-or-replace so redelivered records overwrite instead of duplicating.

mod sqlite;

pub use sqlite::SqliteStore;

use crate::record::StateVector;
use crate::Result;
use async_trait::async_trait;

/// Bulk upsert target used by the consumer engine.
#[async_trait]
pub trait StateVectorStore: Send + Sync {
    /// Write every record in one all-or-nothing operation.
    ///
    /// Returns the number of rows written.
    async fn upsert_batch(&self, records: &[StateVector]) -> Result<u64>;

    /// Release the connection.
    async fn close(&self);
}
