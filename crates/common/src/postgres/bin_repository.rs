use crate::domain::{
    Bin, BinOwner, BinRepository, CommandTarget, DeviceStatus, DomainError, DomainResult,
    LifecycleIntent, RecordTelemetryInput, RegisterBinInput, TelemetryReading, TelemetryRecord,
    UpsertBinInput,
};
use crate::garde::validate_struct;
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_postgres::Row;
use tracing::{debug, instrument};

const BIN_COLUMNS: &str = "bin_id, lat, lon, last_seen, last_emptied, device_status, sleep_mode,
     last_wake_command, user_id, user_name, user_phone, wifi_ssid, registered_at,
     district_id, zone_id, created_at";

const TELEMETRY_COLUMNS: &str =
    "id, ts, bin_id, fill_pct, batt_v, temp_c, emptied, lat, lon, received_at";

// Position is only overwritten by a complete lat/lon pair; the zone follows the position.
const UPSERT_BIN_SQL: &str = "INSERT INTO bins (bin_id, lat, lon, last_seen, district_id, zone_id)
     VALUES ($1, $2, $3, $4, $5, $6)
     ON CONFLICT (bin_id) DO UPDATE SET
         lat = CASE WHEN EXCLUDED.lat IS NOT NULL AND EXCLUDED.lon IS NOT NULL
                    THEN EXCLUDED.lat ELSE bins.lat END,
         lon = CASE WHEN EXCLUDED.lat IS NOT NULL AND EXCLUDED.lon IS NOT NULL
                    THEN EXCLUDED.lon ELSE bins.lon END,
         last_seen = EXCLUDED.last_seen,
         district_id = CASE WHEN EXCLUDED.lat IS NOT NULL AND EXCLUDED.lon IS NOT NULL
                            THEN EXCLUDED.district_id ELSE bins.district_id END,
         zone_id = CASE WHEN EXCLUDED.lat IS NOT NULL AND EXCLUDED.lon IS NOT NULL
                        THEN EXCLUDED.zone_id ELSE bins.zone_id END";

const UPDATE_STATUS_SQL: &str = "UPDATE bins SET device_status = $1 WHERE bin_id = $2";

const UPDATE_EMPTIED_SQL: &str = "UPDATE bins SET last_emptied = $1 WHERE bin_id = $2";

const INSERT_TELEMETRY_SQL: &str =
    "INSERT INTO telemetry (ts, bin_id, fill_pct, batt_v, temp_c, emptied, lat, lon)
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
     RETURNING id, received_at";

/// Bin row for PostgreSQL storage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinRow {
    pub bin_id: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub last_seen: Option<DateTime<Utc>>,
    pub last_emptied: Option<DateTime<Utc>>,
    pub device_status: String,
    pub sleep_mode: bool,
    pub last_wake_command: Option<DateTime<Utc>>,
    pub user_id: Option<String>,
    pub user_name: Option<String>,
    pub user_phone: Option<String>,
    pub wifi_ssid: Option<String>,
    pub registered_at: Option<DateTime<Utc>>,
    pub district_id: Option<String>,
    pub zone_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&Row> for BinRow {
    fn from(row: &Row) -> Self {
        BinRow {
            bin_id: row.get("bin_id"),
            lat: row.get("lat"),
            lon: row.get("lon"),
            last_seen: row.get("last_seen"),
            last_emptied: row.get("last_emptied"),
            device_status: row.get("device_status"),
            sleep_mode: row.get("sleep_mode"),
            last_wake_command: row.get("last_wake_command"),
            user_id: row.get("user_id"),
            user_name: row.get("user_name"),
            user_phone: row.get("user_phone"),
            wifi_ssid: row.get("wifi_ssid"),
            registered_at: row.get("registered_at"),
            district_id: row.get("district_id"),
            zone_id: row.get("zone_id"),
            created_at: row.get("created_at"),
        }
    }
}

/// Convert database BinRow to domain Bin
impl TryFrom<BinRow> for Bin {
    type Error = DomainError;

    fn try_from(row: BinRow) -> Result<Self, Self::Error> {
        let owner = row.user_id.map(|user_id| BinOwner {
            user_id,
            user_name: row.user_name,
            user_phone: row.user_phone,
        });

        Ok(Bin {
            bin_id: row.bin_id,
            lat: row.lat,
            lon: row.lon,
            last_seen: row.last_seen,
            last_emptied: row.last_emptied,
            device_status: row.device_status.parse()?,
            sleep_mode: row.sleep_mode,
            last_wake_command: row.last_wake_command,
            owner,
            wifi_ssid: row.wifi_ssid,
            registered_at: row.registered_at,
            district_id: row.district_id,
            zone_id: row.zone_id,
            created_at: Some(row.created_at),
        })
    }
}

fn telemetry_from_row(row: &Row) -> TelemetryRecord {
    TelemetryRecord {
        id: row.get("id"),
        ts: row.get("ts"),
        bin_id: row.get("bin_id"),
        fill_pct: row.get("fill_pct"),
        batt_v: row.get("batt_v"),
        temp_c: row.get("temp_c"),
        emptied: row.get("emptied"),
        lat: row.get("lat"),
        lon: row.get("lon"),
        received_at: row.get("received_at"),
    }
}

fn record_from_reading(reading: TelemetryReading, row: &Row) -> TelemetryRecord {
    TelemetryRecord {
        id: row.get("id"),
        ts: reading.ts,
        bin_id: reading.bin_id,
        fill_pct: reading.fill_pct,
        batt_v: reading.batt_v,
        temp_c: reading.temp_c,
        emptied: reading.emptied,
        lat: reading.lat,
        lon: reading.lon,
        received_at: row.get("received_at"),
    }
}

fn repo_err(e: tokio_postgres::Error) -> DomainError {
    DomainError::RepositoryError(e.into())
}

/// PostgreSQL implementation of BinRepository trait
#[derive(Clone)]
pub struct PostgresBinRepository {
    client: PostgresClient,
}

impl PostgresBinRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BinRepository for PostgresBinRepository {
    #[instrument(skip(self, input), fields(bin_id = %input.bin_id))]
    async fn upsert_bin(&self, input: UpsertBinInput) -> DomainResult<()> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        conn.execute(
            UPSERT_BIN_SQL,
            &[
                &input.bin_id,
                &input.lat,
                &input.lon,
                &input.last_seen,
                &input.district_id,
                &input.zone_id,
            ],
        )
        .await
        .map_err(repo_err)?;

        debug!(bin_id = %input.bin_id, "upserted bin");
        Ok(())
    }

    #[instrument(skip(self), fields(bin_id = %bin_id, status = %status))]
    async fn update_device_status(&self, bin_id: &str, status: DeviceStatus) -> DomainResult<()> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        conn.execute(UPDATE_STATUS_SQL, &[&status.as_str(), &bin_id])
            .await
            .map_err(repo_err)?;

        Ok(())
    }

    #[instrument(skip(self), fields(bin_id = %bin_id))]
    async fn update_emptied(&self, bin_id: &str, emptied_at: DateTime<Utc>) -> DomainResult<()> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        conn.execute(UPDATE_EMPTIED_SQL, &[&emptied_at, &bin_id])
            .await
            .map_err(repo_err)?;

        Ok(())
    }

    #[instrument(skip(self, reading), fields(bin_id = %reading.bin_id))]
    async fn insert_telemetry(&self, reading: TelemetryReading) -> DomainResult<TelemetryRecord> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let row = conn
            .query_one(
                INSERT_TELEMETRY_SQL,
                &[
                    &reading.ts,
                    &reading.bin_id,
                    &reading.fill_pct,
                    &reading.batt_v,
                    &reading.temp_c,
                    &reading.emptied,
                    &reading.lat,
                    &reading.lon,
                ],
            )
            .await
            .map_err(|e| {
                if let Some(db_err) = e.as_db_error() {
                    // PostgreSQL error code 23503 is foreign_key_violation
                    if db_err.code().code() == "23503" {
                        return DomainError::BinNotFound(reading.bin_id.clone());
                    }
                }
                repo_err(e)
            })?;

        Ok(record_from_reading(reading, &row))
    }

    #[instrument(skip(self, input), fields(bin_id = %input.reading.bin_id, ts = %input.reading.ts))]
    async fn record_telemetry(&self, input: RecordTelemetryInput) -> DomainResult<TelemetryRecord> {
        let mut conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        // Dropping the transaction without commit rolls every step back
        let tx = conn.transaction().await.map_err(repo_err)?;
        let reading = input.reading;

        tx.execute(
            UPSERT_BIN_SQL,
            &[
                &reading.bin_id,
                &reading.lat,
                &reading.lon,
                &reading.ts,
                &input.district_id,
                &input.zone_id,
            ],
        )
        .await
        .map_err(repo_err)?;

        tx.execute(
            UPDATE_STATUS_SQL,
            &[&DeviceStatus::Online.as_str(), &reading.bin_id],
        )
        .await
        .map_err(repo_err)?;

        if reading.emptied {
            tx.execute(UPDATE_EMPTIED_SQL, &[&reading.ts, &reading.bin_id])
                .await
                .map_err(repo_err)?;
        }

        let row = tx
            .query_one(
                INSERT_TELEMETRY_SQL,
                &[
                    &reading.ts,
                    &reading.bin_id,
                    &reading.fill_pct,
                    &reading.batt_v,
                    &reading.temp_c,
                    &reading.emptied,
                    &reading.lat,
                    &reading.lon,
                ],
            )
            .await
            .map_err(repo_err)?;

        tx.commit().await.map_err(repo_err)?;

        debug!(bin_id = %reading.bin_id, emptied = reading.emptied, "recorded telemetry");
        Ok(record_from_reading(reading, &row))
    }

    #[instrument(skip(self, input), fields(bin_id = %input.bin_id, user_id = %input.user_id))]
    async fn register_bin(&self, input: RegisterBinInput) -> DomainResult<Bin> {
        validate_struct(&input)?;

        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let now = Utc::now();
        let sql = format!(
            "INSERT INTO bins (bin_id, user_id, user_name, user_phone, wifi_ssid, lat, lon, registered_at, device_status)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'offline')
             ON CONFLICT (bin_id) DO UPDATE SET
                 user_id = EXCLUDED.user_id,
                 user_name = EXCLUDED.user_name,
                 user_phone = EXCLUDED.user_phone,
                 wifi_ssid = EXCLUDED.wifi_ssid,
                 lat = CASE WHEN EXCLUDED.lat IS NOT NULL AND EXCLUDED.lon IS NOT NULL
                            THEN EXCLUDED.lat ELSE bins.lat END,
                 lon = CASE WHEN EXCLUDED.lat IS NOT NULL AND EXCLUDED.lon IS NOT NULL
                            THEN EXCLUDED.lon ELSE bins.lon END,
                 registered_at = EXCLUDED.registered_at
             RETURNING {}",
            BIN_COLUMNS
        );

        let row = conn
            .query_one(
                sql.as_str(),
                &[
                    &input.bin_id,
                    &input.user_id,
                    &input.user_name,
                    &input.user_phone,
                    &input.wifi_ssid,
                    &input.lat,
                    &input.lon,
                    &now,
                ],
            )
            .await
            .map_err(repo_err)?;

        debug!(bin_id = %input.bin_id, "registered bin");
        Bin::try_from(BinRow::from(&row))
    }

    #[instrument(skip(self), fields(bin_id = %bin_id))]
    async fn get_bin(&self, bin_id: &str) -> DomainResult<Option<Bin>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let sql = format!("SELECT {} FROM bins WHERE bin_id = $1", BIN_COLUMNS);
        let row = conn
            .query_opt(sql.as_str(), &[&bin_id])
            .await
            .map_err(repo_err)?;

        match row {
            Some(row) => Ok(Some(Bin::try_from(BinRow::from(&row))?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self))]
    async fn list_bins(&self) -> DomainResult<Vec<Bin>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let sql = format!("SELECT {} FROM bins ORDER BY bin_id", BIN_COLUMNS);
        let rows = conn.query(sql.as_str(), &[]).await.map_err(repo_err)?;

        let bins = rows
            .iter()
            .map(|row| Bin::try_from(BinRow::from(row)))
            .collect::<DomainResult<Vec<_>>>()?;

        debug!("found {} bins", bins.len());
        Ok(bins)
    }

    #[instrument(skip(self))]
    async fn list_owned_bins(&self) -> DomainResult<Vec<Bin>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let sql = format!(
            "SELECT {} FROM bins WHERE user_id IS NOT NULL ORDER BY bin_id",
            BIN_COLUMNS
        );
        let rows = conn.query(sql.as_str(), &[]).await.map_err(repo_err)?;

        let bins = rows
            .iter()
            .map(|row| Bin::try_from(BinRow::from(row)))
            .collect::<DomainResult<Vec<_>>>()?;

        debug!("found {} owned bins", bins.len());
        Ok(bins)
    }

    #[instrument(skip(self), fields(bin_id = %bin_id))]
    async fn recent_telemetry(
        &self,
        bin_id: &str,
        limit: i64,
    ) -> DomainResult<Vec<TelemetryRecord>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let sql = format!(
            "SELECT {} FROM telemetry WHERE bin_id = $1 ORDER BY ts DESC LIMIT $2",
            TELEMETRY_COLUMNS
        );
        let rows = conn
            .query(sql.as_str(), &[&bin_id, &limit])
            .await
            .map_err(repo_err)?;

        Ok(rows.iter().map(telemetry_from_row).collect())
    }

    #[instrument(skip(self, target), fields(command_target = %target))]
    async fn apply_lifecycle_intent(
        &self,
        target: &CommandTarget,
        intent: LifecycleIntent,
    ) -> DomainResult<u64> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let updated = match (target, intent) {
            (CommandTarget::Bin(bin_id), LifecycleIntent::Wake { requested_at }) => conn
                .execute(
                    "UPDATE bins SET last_wake_command = $1, sleep_mode = FALSE WHERE bin_id = $2",
                    &[&requested_at, bin_id],
                )
                .await,
            (CommandTarget::Broadcast, LifecycleIntent::Wake { requested_at }) => conn
                .execute(
                    "UPDATE bins SET last_wake_command = $1, sleep_mode = FALSE",
                    &[&requested_at],
                )
                .await,
            (CommandTarget::Bin(bin_id), LifecycleIntent::Sleep) => conn
                .execute("UPDATE bins SET sleep_mode = TRUE WHERE bin_id = $1", &[bin_id])
                .await,
            (CommandTarget::Broadcast, LifecycleIntent::Sleep) => {
                conn.execute("UPDATE bins SET sleep_mode = TRUE", &[]).await
            }
        }
        .map_err(repo_err)?;

        debug!(command_target = %target, updated, "applied lifecycle intent");
        Ok(updated)
    }

    #[instrument(skip(self), fields(bin_id = %bin_id))]
    async fn delete_bin(&self, bin_id: &str) -> DomainResult<bool> {
        let mut conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let tx = conn.transaction().await.map_err(repo_err)?;

        tx.execute("DELETE FROM telemetry WHERE bin_id = $1", &[&bin_id])
            .await
            .map_err(repo_err)?;
        tx.execute("DELETE FROM alerts WHERE bin_id = $1", &[&bin_id])
            .await
            .map_err(repo_err)?;
        tx.execute("DELETE FROM commands_log WHERE bin_id = $1", &[&bin_id])
            .await
            .map_err(repo_err)?;
        let deleted = tx
            .execute("DELETE FROM bins WHERE bin_id = $1", &[&bin_id])
            .await
            .map_err(repo_err)?;

        tx.commit().await.map_err(repo_err)?;

        debug!(bin_id = %bin_id, deleted = deleted > 0, "purged bin");
        Ok(deleted > 0)
    }
}
