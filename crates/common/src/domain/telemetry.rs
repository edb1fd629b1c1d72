use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A validated telemetry report, ready to be persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryReading {
    pub bin_id: String,
    pub ts: DateTime<Utc>,
    pub fill_pct: f64,
    pub batt_v: Option<f64>,
    pub temp_c: Option<f64>,
    pub emptied: bool,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

impl TelemetryReading {
    /// Both coordinates, when the device reported a full position
    pub fn position(&self) -> Option<(f64, f64)> {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }
}

/// Persisted, immutable telemetry row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub id: i64,
    pub ts: DateTime<Utc>,
    pub bin_id: String,
    pub fill_pct: f64,
    pub batt_v: Option<f64>,
    pub temp_c: Option<f64>,
    pub emptied: bool,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub received_at: DateTime<Utc>,
}

/// Input for the atomic telemetry write: the reading plus the zone it resolved to
#[derive(Debug, Clone, PartialEq)]
pub struct RecordTelemetryInput {
    pub reading: TelemetryReading,
    pub district_id: Option<String>,
    pub zone_id: Option<String>,
}
