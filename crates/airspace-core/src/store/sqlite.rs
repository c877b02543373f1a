//! SQLite-backed store.

use super::StateVectorStore;
use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::record::StateVector;
use crate::Result;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS airspace (
    icao24          TEXT    NOT NULL,
    callsign        TEXT,
    origin_country  TEXT,
    time_position   INTEGER,
    last_contact    INTEGER NOT NULL,
    longitude       REAL,
    latitude        REAL,
    baro_altitude   REAL,
    on_ground       INTEGER NOT NULL,
    velocity        REAL,
    true_track      REAL,
    vertical_rate   REAL,
    sensors         TEXT,
    geo_altitude    REAL,
    squawk          TEXT,
    spi             INTEGER NOT NULL,
    position_source INTEGER,
    category        INTEGER,
    PRIMARY KEY (icao24, last_contact)
)
"#;

const UPSERT: &str = r#"
INSERT OR REPLACE INTO airspace (
    icao24, callsign, origin_country, time_position, last_contact,
    longitude, latitude, baro_altitude, on_ground, velocity,
    true_track, vertical_rate, sensors, geo_altitude, squawk,
    spi, position_source, category
) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

const COLUMNS: &str = "icao24, callsign, origin_country, time_position, last_contact, \
     longitude, latitude, baro_altitude, on_ground, velocity, true_track, vertical_rate, \
     sensors, geo_altitude, squawk, spi, position_source, category";

/// Table row; `sensors` is stored as a JSON array.
#[derive(Debug, FromRow)]
struct AirspaceRow {
    icao24: String,
    callsign: Option<String>,
    origin_country: Option<String>,
    time_position: Option<i64>,
    last_contact: i64,
    longitude: Option<f64>,
    latitude: Option<f64>,
    baro_altitude: Option<f64>,
    on_ground: bool,
    velocity: Option<f64>,
    true_track: Option<f64>,
    vertical_rate: Option<f64>,
    sensors: Option<String>,
    geo_altitude: Option<f64>,
    squawk: Option<String>,
    spi: bool,
    position_source: Option<i64>,
    category: Option<i64>,
}

impl AirspaceRow {
    fn into_record(self) -> Result<StateVector> {
        let sensors = self
            .sensors
            .as_deref()
            .map(serde_json::from_str::<Vec<i64>>)
            .transpose()
            .map_err(|e| StoreError::Query(format!("sensors column: {}", e)))?;

        Ok(StateVector {
            icao24: self.icao24,
            callsign: self.callsign,
            origin_country: self.origin_country,
            time_position: self.time_position,
            last_contact: self.last_contact,
            longitude: self.longitude,
            latitude: self.latitude,
            baro_altitude: self.baro_altitude,
            on_ground: self.on_ground,
            velocity: self.velocity,
            true_track: self.true_track,
            vertical_rate: self.vertical_rate,
            sensors,
            geo_altitude: self.geo_altitude,
            squawk: self.squawk,
            spi: self.spi,
            position_source: self.position_source,
            category: self.category,
        })
    }
}

/// Store backed by a single SQLite connection.
pub struct SqliteStore {
    pool: SqlitePool,
    location: String,
}

impl SqliteStore {
    /// Open (creating if needed) the database file and bootstrap the table.
    pub async fn open(config: &StoreConfig) -> Result<Self> {
        let location = config.path.display().to_string();
        let options = SqliteConnectOptions::new()
            .filename(&config.path)
            .create_if_missing(true)
            .busy_timeout(Duration::from_millis(config.busy_timeout_ms));

        Self::connect(options, location).await
    }

    /// Private in-memory database, used by tests and dry runs.
    pub async fn open_in_memory() -> Result<Self> {
        let options =
            SqliteConnectOptions::from_str("sqlite::memory:").map_err(|e| StoreError::Open {
                path: ":memory:".into(),
                message: e.to_string(),
            })?;

        Self::connect(options, ":memory:".into()).await
    }

    async fn connect(options: SqliteConnectOptions, location: String) -> Result<Self> {
        // One connection: a single writer, and in-memory databases are per connection.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Open {
                path: location.clone(),
                message: e.to_string(),
            })?;

        sqlx::query(CREATE_TABLE)
            .execute(&pool)
            .await
            .map_err(|e| StoreError::Schema(e.to_string()))?;

        info!(path = %location, "Analytical store opened");
        Ok(Self { pool, location })
    }

    /// Total rows.
    pub async fn count(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM airspace")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(count)
    }

    /// Every observation of one aircraft, oldest first.
    pub async fn track(&self, icao24: &str) -> Result<Vec<StateVector>> {
        let sql = format!(
            "SELECT {} FROM airspace WHERE icao24 = ? ORDER BY last_contact",
            COLUMNS
        );
        let rows: Vec<AirspaceRow> = sqlx::query_as(&sql)
            .bind(icao24.to_ascii_lowercase())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        rows.into_iter().map(AirspaceRow::into_record).collect()
    }

    /// Most recent observation per aircraft, ordered by icao24.
    pub async fn latest_positions(&self) -> Result<Vec<StateVector>> {
        let sql = format!(
            "SELECT {cols} FROM airspace a \
             WHERE a.last_contact = (SELECT MAX(b.last_contact) FROM airspace b WHERE b.icao24 = a.icao24) \
             ORDER BY a.icao24",
            cols = COLUMNS
        );
        let rows: Vec<AirspaceRow> = sqlx::query_as(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        rows.into_iter().map(AirspaceRow::into_record).collect()
    }
}

#[async_trait]
impl StateVectorStore for SqliteStore {
    async fn upsert_batch(&self, records: &[StateVector]) -> Result<u64> {
        if records.is_empty() {
            return Ok(0);
        }

        let write_err = |e: sqlx::Error| StoreError::Write {
            rows: records.len(),
            message: e.to_string(),
        };

        let mut tx = self.pool.begin().await.map_err(write_err)?;
        let mut written = 0u64;

        for record in records {
            let sensors = record
                .sensors
                .as_ref()
                .map(serde_json::to_string)
                .transpose()
                .map_err(|e| StoreError::Write {
                    rows: records.len(),
                    message: e.to_string(),
                })?;

            let result = sqlx::query(UPSERT)
                .bind(&record.icao24)
                .bind(&record.callsign)
                .bind(&record.origin_country)
                .bind(record.time_position)
                .bind(record.last_contact)
                .bind(record.longitude)
                .bind(record.latitude)
                .bind(record.baro_altitude)
                .bind(record.on_ground)
                .bind(record.velocity)
                .bind(record.true_track)
                .bind(record.vertical_rate)
                .bind(sensors)
                .bind(record.geo_altitude)
                .bind(&record.squawk)
                .bind(record.spi)
                .bind(record.position_source)
                .bind(record.category)
                .execute(&mut *tx)
                .await
                .map_err(write_err)?;

            written += result.rows_affected().min(1);
        }

        // Dropping `tx` on an early return rolls the whole batch back.
        tx.commit().await.map_err(write_err)?;

        debug!(rows = written, "Batch upserted");
        Ok(written)
    }

    async fn close(&self) {
        self.pool.close().await;
        info!(path = %self.location, "Analytical store closed");
    }
}
