use crate::domain::{parse_telemetry, TelemetryRejection};
use common::domain::{
    AlertKind, AlertRepository, AlertSeverity, BinRepository, CreateAlertInput, DomainError,
    RecordTelemetryInput, TelemetryRecord,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, instrument};
use zone_resolver::ZoneResolver;

/// Levels at which a stored reading raises a derived alert
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlertThresholds {
    /// `bin_full` when fill_pct is at or above this value
    pub fill_alert_pct: f64,
    /// `low_battery` when batt_v is below this value
    pub low_battery_v: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            fill_alert_pct: 90.0,
            low_battery_v: 3.3,
        }
    }
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("message rejected: {0}")]
    Rejected(#[from] TelemetryRejection),

    #[error("failed to store telemetry: {0}")]
    Persistence(#[from] DomainError),
}

/// Domain service that turns one inbound message into registry updates
///
/// Flow:
/// 1. Parse and validate the payload (drop on any rejection)
/// 2. Resolve the reported position to a district/zone
/// 3. Upsert bin, mark online, stamp emptied, append telemetry (one transaction)
/// 4. Raise derived alerts for the stored reading
pub struct TelemetryIngestionService {
    bin_repository: Arc<dyn BinRepository>,
    alert_repository: Arc<dyn AlertRepository>,
    zone_resolver: Arc<ZoneResolver>,
    thresholds: AlertThresholds,
}

impl TelemetryIngestionService {
    pub fn new(
        bin_repository: Arc<dyn BinRepository>,
        alert_repository: Arc<dyn AlertRepository>,
        zone_resolver: Arc<ZoneResolver>,
        thresholds: AlertThresholds,
    ) -> Self {
        Self {
            bin_repository,
            alert_repository,
            zone_resolver,
            thresholds,
        }
    }

    #[instrument(skip(self, payload), fields(topic = %topic, payload_size = payload.len()))]
    pub async fn ingest(&self, topic: &str, payload: &[u8]) -> Result<TelemetryRecord, IngestError> {
        let reading = parse_telemetry(topic, payload)?;

        let (district_id, zone_id) = match reading
            .position()
            .and_then(|(lat, lon)| self.zone_resolver.assign(lat, lon))
        {
            Some(assignment) => (
                Some(assignment.district_id().to_string()),
                Some(assignment.zone_id().to_string()),
            ),
            None => (None, None),
        };

        debug!(
            bin_id = %reading.bin_id,
            zone_id = ?zone_id,
            "storing telemetry"
        );

        let record = self
            .bin_repository
            .record_telemetry(RecordTelemetryInput {
                reading,
                district_id,
                zone_id,
            })
            .await?;

        info!(
            bin_id = %record.bin_id,
            fill_pct = record.fill_pct,
            "stored telemetry"
        );

        self.raise_derived_alerts(&record).await;

        Ok(record)
    }

    async fn raise_derived_alerts(&self, record: &TelemetryRecord) {
        if record.fill_pct >= self.thresholds.fill_alert_pct {
            self.raise(CreateAlertInput {
                bin_id: record.bin_id.clone(),
                alert_type: AlertKind::BinFull,
                severity: AlertSeverity::Warning,
                message: format!("Bin {} is {:.0}% full", record.bin_id, record.fill_pct),
            })
            .await;
        }

        if let Some(batt_v) = record.batt_v {
            if batt_v < self.thresholds.low_battery_v {
                self.raise(CreateAlertInput {
                    bin_id: record.bin_id.clone(),
                    alert_type: AlertKind::LowBattery,
                    severity: AlertSeverity::Warning,
                    message: format!("Bin {} battery low: {:.2} V", record.bin_id, batt_v),
                })
                .await;
            }
        }
    }

    async fn raise(&self, input: CreateAlertInput) {
        let bin_id = input.bin_id.clone();
        let alert_type = input.alert_type;

        match self.alert_repository.raise_alert_once(input).await {
            Ok(Some(alert)) => {
                info!(bin_id = %bin_id, alert_type = %alert_type, alert_id = alert.id, "raised alert");
            }
            Ok(None) => {
                debug!(bin_id = %bin_id, alert_type = %alert_type, "alert already open");
            }
            Err(e) => {
                error!(bin_id = %bin_id, alert_type = %alert_type, error = %e, "failed to raise alert");
            }
        }
    }
}
