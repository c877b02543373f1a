//! State vector record model.
//!
//! The OpenSky API returns each aircraft observation as a positional JSON
//! array. [`StateVector`] gives those positions names and types, and enforces
//! the required fields once, at construction. The same struct is the JSON
//! payload on the event log and the row shape in the analytical store.

use crate::error::RecordError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

/// Field names in the order the API emits them. `category` is only present
/// when the request asks for extended data.
pub const STATE_VECTOR_FIELDS: [&str; 18] = [
    "icao24",
    "callsign",
    "origin_country",
    "time_position",
    "last_contact",
    "longitude",
    "latitude",
    "baro_altitude",
    "on_ground",
    "velocity",
    "true_track",
    "vertical_rate",
    "sensors",
    "geo_altitude",
    "squawk",
    "spi",
    "position_source",
    "category",
];

/// Number of positions every state vector must carry.
pub const MIN_STATE_VECTOR_LEN: usize = 17;

/// One observation of one aircraft at one instant.
///
/// Timestamps are epoch seconds; `None` means unknown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireStateVector")]
pub struct StateVector {
    /// ICAO 24-bit transponder address, 6 lowercase hex characters.
    pub icao24: String,
    pub callsign: Option<String>,
    pub origin_country: Option<String>,
    pub time_position: Option<i64>,
    pub last_contact: i64,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    /// Meters.
    pub baro_altitude: Option<f64>,
    pub on_ground: bool,
    /// Meters per second over ground.
    pub velocity: Option<f64>,
    /// Degrees clockwise from north.
    pub true_track: Option<f64>,
    pub vertical_rate: Option<f64>,
    pub sensors: Option<Vec<i64>>,
    pub geo_altitude: Option<f64>,
    pub squawk: Option<String>,
    pub spi: bool,
    pub position_source: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<i64>,
}

/// Permissive mirror of [`StateVector`] used on the way in from the log.
#[derive(Deserialize)]
struct WireStateVector {
    icao24: Option<String>,
    callsign: Option<String>,
    origin_country: Option<String>,
    time_position: Option<i64>,
    last_contact: Option<i64>,
    longitude: Option<f64>,
    latitude: Option<f64>,
    baro_altitude: Option<f64>,
    on_ground: Option<bool>,
    velocity: Option<f64>,
    true_track: Option<f64>,
    vertical_rate: Option<f64>,
    sensors: Option<Vec<i64>>,
    geo_altitude: Option<f64>,
    squawk: Option<String>,
    spi: Option<bool>,
    position_source: Option<i64>,
    category: Option<i64>,
}

impl TryFrom<WireStateVector> for StateVector {
    type Error = RecordError;

    fn try_from(wire: WireStateVector) -> Result<Self, Self::Error> {
        let icao24 = normalize_icao24(wire.icao24.as_deref())?;
        Ok(Self {
            icao24,
            callsign: wire.callsign,
            origin_country: wire.origin_country,
            time_position: wire.time_position,
            last_contact: wire
                .last_contact
                .ok_or(RecordError::MissingField("last_contact"))?,
            longitude: wire.longitude,
            latitude: wire.latitude,
            baro_altitude: wire.baro_altitude,
            on_ground: wire.on_ground.ok_or(RecordError::MissingField("on_ground"))?,
            velocity: wire.velocity,
            true_track: wire.true_track,
            vertical_rate: wire.vertical_rate,
            sensors: wire.sensors,
            geo_altitude: wire.geo_altitude,
            squawk: wire.squawk,
            spi: wire.spi.ok_or(RecordError::MissingField("spi"))?,
            position_source: wire.position_source,
            category: wire.category,
        })
    }
}

impl StateVector {
    /// Build a record from one positional array of the API response.
    pub fn from_positional(values: &[Value]) -> Result<Self, RecordError> {
        if values.len() < MIN_STATE_VECTOR_LEN {
            return Err(RecordError::Arity {
                expected: MIN_STATE_VECTOR_LEN,
                actual: values.len(),
            });
        }

        let icao24 = normalize_icao24(opt_str(&values[0], "icao24")?.as_deref())?;

        Ok(Self {
            icao24,
            callsign: opt_str(&values[1], "callsign")?,
            origin_country: opt_str(&values[2], "origin_country")?,
            time_position: opt_i64(&values[3], "time_position")?,
            last_contact: opt_i64(&values[4], "last_contact")?
                .ok_or(RecordError::MissingField("last_contact"))?,
            longitude: opt_f64(&values[5], "longitude")?,
            latitude: opt_f64(&values[6], "latitude")?,
            baro_altitude: opt_f64(&values[7], "baro_altitude")?,
            on_ground: opt_bool(&values[8], "on_ground")?
                .ok_or(RecordError::MissingField("on_ground"))?,
            velocity: opt_f64(&values[9], "velocity")?,
            true_track: opt_f64(&values[10], "true_track")?,
            vertical_rate: opt_f64(&values[11], "vertical_rate")?,
            sensors: opt_sensors(&values[12])?,
            geo_altitude: opt_f64(&values[13], "geo_altitude")?,
            squawk: opt_str(&values[14], "squawk")?,
            spi: opt_bool(&values[15], "spi")?.ok_or(RecordError::MissingField("spi"))?,
            position_source: opt_i64(&values[16], "position_source")?,
            category: match values.get(17) {
                Some(v) => opt_i64(v, "category")?,
                None => None,
            },
        })
    }

    /// Partition key on the event log: the aircraft identifier.
    ///
    /// Keying by aircraft keeps one aircraft's history in one partition, in
    /// publish order.
    pub fn key(&self) -> &str {
        &self.icao24
    }

    /// Storage identity.
    pub fn primary_key(&self) -> (&str, i64) {
        (&self.icao24, self.last_contact)
    }

    /// JSON payload for the event log.
    pub fn to_json_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    /// Parse an event log payload.
    pub fn from_json_slice(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

/// Result of mapping one API snapshot.
#[derive(Debug, Default)]
pub struct MappedStates {
    /// Valid records in response order.
    pub records: Vec<StateVector>,
    /// Rejected positions with the reason.
    pub rejected: Vec<(usize, RecordError)>,
}

/// Map every positional array of a snapshot, dropping invalid ones.
pub fn map_states(states: &[Vec<Value>]) -> MappedStates {
    let mut mapped = MappedStates {
        records: Vec::with_capacity(states.len()),
        rejected: Vec::new(),
    };

    for (index, raw) in states.iter().enumerate() {
        match StateVector::from_positional(raw) {
            Ok(record) => mapped.records.push(record),
            Err(e) => {
                debug!(index, error = %e, "Dropping state vector");
                mapped.rejected.push((index, e));
            }
        }
    }

    if !mapped.rejected.is_empty() {
        warn!(
            dropped = mapped.rejected.len(),
            kept = mapped.records.len(),
            "Dropped invalid state vectors"
        );
    }

    mapped
}

fn normalize_icao24(raw: Option<&str>) -> Result<String, RecordError> {
    let raw = raw.ok_or(RecordError::MissingField("icao24"))?;
    let icao24 = raw.trim().to_ascii_lowercase();
    if icao24.is_empty() {
        return Err(RecordError::MissingField("icao24"));
    }
    if icao24.len() != 6 || !icao24.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(RecordError::InvalidField {
            field: "icao24",
            reason: format!("{:?} is not a 6-character hex address", raw),
        });
    }
    Ok(icao24)
}

fn invalid(field: &'static str, expected: &str, value: &Value) -> RecordError {
    RecordError::InvalidField {
        field,
        reason: format!("expected {}, got {}", expected, value),
    }
}

fn opt_str(value: &Value, field: &'static str) -> Result<Option<String>, RecordError> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        other => Err(invalid(field, "string", other)),
    }
}

fn opt_f64(value: &Value, field: &'static str) -> Result<Option<f64>, RecordError> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_f64()
            .map(Some)
            .ok_or_else(|| invalid(field, "number", value)),
        other => Err(invalid(field, "number", other)),
    }
}

fn opt_i64(value: &Value, field: &'static str) -> Result<Option<i64>, RecordError> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return Ok(Some(i));
            }
            // Integral floats such as 1700000000.0 are accepted.
            match n.as_f64() {
                Some(f) if f.fract() == 0.0 && f.is_finite() => Ok(Some(f as i64)),
                _ => Err(invalid(field, "integer", value)),
            }
        }
        other => Err(invalid(field, "integer", other)),
    }
}

fn opt_bool(value: &Value, field: &'static str) -> Result<Option<bool>, RecordError> {
    match value {
        Value::Null => Ok(None),
        Value::Bool(b) => Ok(Some(*b)),
        other => Err(invalid(field, "boolean", other)),
    }
}

fn opt_sensors(value: &Value) -> Result<Option<Vec<i64>>, RecordError> {
    match value {
        Value::Null => Ok(None),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_i64()
                    .ok_or_else(|| invalid("sensors", "integer array", value))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some),
        other => Err(invalid("sensors", "integer array", other)),
    }
}
