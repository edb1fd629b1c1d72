use crate::domain::command::CommandTarget;
use crate::domain::result::{DomainError, DomainResult};
use crate::domain::telemetry::{RecordTelemetryInput, TelemetryReading, TelemetryRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Connectivity state last observed for a bin's sensor unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    #[default]
    Unknown,
    Online,
    Offline,
}

impl DeviceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceStatus::Unknown => "unknown",
            DeviceStatus::Online => "online",
            DeviceStatus::Offline => "offline",
        }
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unknown" => Ok(DeviceStatus::Unknown),
            "online" => Ok(DeviceStatus::Online),
            "offline" => Ok(DeviceStatus::Offline),
            other => Err(DomainError::RepositoryError(anyhow::anyhow!(
                "unexpected device status '{}'",
                other
            ))),
        }
    }
}

/// Household or operator a bin is registered to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinOwner {
    pub user_id: String,
    pub user_name: Option<String>,
    pub user_phone: Option<String>,
}

/// Canonical persisted state of a waste bin
///
/// `sleep_mode` and `last_wake_command` hold the state the backend last *requested*;
/// the state the device actually reached only shows up in its next telemetry report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bin {
    pub bin_id: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub last_seen: Option<DateTime<Utc>>,
    pub last_emptied: Option<DateTime<Utc>>,
    pub device_status: DeviceStatus,
    pub sleep_mode: bool,
    pub last_wake_command: Option<DateTime<Utc>>,
    pub owner: Option<BinOwner>,
    pub wifi_ssid: Option<String>,
    pub registered_at: Option<DateTime<Utc>>,
    pub district_id: Option<String>,
    pub zone_id: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Position and liveness update applied on every accepted telemetry message
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertBinInput {
    pub bin_id: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub last_seen: DateTime<Utc>,
    pub district_id: Option<String>,
    pub zone_id: Option<String>,
}

/// Explicit registration of a bin to an owner
#[derive(Debug, Clone, PartialEq, Validate)]
pub struct RegisterBinInput {
    #[garde(length(min = 1, max = 64))]
    pub bin_id: String,
    #[garde(length(min = 1))]
    pub user_id: String,
    #[garde(skip)]
    pub user_name: Option<String>,
    #[garde(skip)]
    pub user_phone: Option<String>,
    #[garde(skip)]
    pub wifi_ssid: Option<String>,
    #[garde(range(min = -90.0, max = 90.0))]
    pub lat: Option<f64>,
    #[garde(range(min = -180.0, max = 180.0))]
    pub lon: Option<f64>,
}

/// Intended lifecycle state recorded ahead of a wake/sleep dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleIntent {
    Wake { requested_at: DateTime<Utc> },
    Sleep,
}

/// Repository trait for bin and telemetry persistence
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait BinRepository: Send + Sync {
    /// Insert the bin or update its position and last_seen
    async fn upsert_bin(&self, input: UpsertBinInput) -> DomainResult<()>;

    async fn update_device_status(&self, bin_id: &str, status: DeviceStatus) -> DomainResult<()>;

    async fn update_emptied(&self, bin_id: &str, emptied_at: DateTime<Utc>) -> DomainResult<()>;

    /// Append a telemetry row; the bin must already exist
    async fn insert_telemetry(&self, reading: TelemetryReading) -> DomainResult<TelemetryRecord>;

    /// Upsert bin, mark it online, update last_emptied when flagged and append the
    /// telemetry row, all in one transaction
    async fn record_telemetry(&self, input: RecordTelemetryInput) -> DomainResult<TelemetryRecord>;

    /// Register (or re-register) a bin to an owner
    async fn register_bin(&self, input: RegisterBinInput) -> DomainResult<Bin>;

    async fn get_bin(&self, bin_id: &str) -> DomainResult<Option<Bin>>;

    async fn list_bins(&self) -> DomainResult<Vec<Bin>>;

    /// List bins linked to an owner
    async fn list_owned_bins(&self) -> DomainResult<Vec<Bin>>;

    /// Most recent telemetry for a bin, newest first
    async fn recent_telemetry(&self, bin_id: &str, limit: i64)
        -> DomainResult<Vec<TelemetryRecord>>;

    /// Record intended sleep/wake state for one bin or every bin; returns rows touched
    async fn apply_lifecycle_intent(
        &self,
        target: &CommandTarget,
        intent: LifecycleIntent,
    ) -> DomainResult<u64>;

    /// Purge a bin with its telemetry, alerts and command log; false if it did not exist
    async fn delete_bin(&self, bin_id: &str) -> DomainResult<bool>;
}
