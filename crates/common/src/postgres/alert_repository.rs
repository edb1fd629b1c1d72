use crate::domain::{
    Alert, AlertRepository, CreateAlertInput, DomainError, DomainResult,
};
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_postgres::Row;
use tracing::{debug, instrument};

const ALERT_COLUMNS: &str =
    "id, bin_id, alert_type, severity, message, created_at, resolved, resolved_at";

/// Alert row for PostgreSQL storage
#[derive(Debug, Clone)]
pub struct AlertRow {
    pub id: i64,
    pub bin_id: String,
    pub alert_type: String,
    pub severity: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl From<&Row> for AlertRow {
    fn from(row: &Row) -> Self {
        AlertRow {
            id: row.get("id"),
            bin_id: row.get("bin_id"),
            alert_type: row.get("alert_type"),
            severity: row.get("severity"),
            message: row.get("message"),
            created_at: row.get("created_at"),
            resolved: row.get("resolved"),
            resolved_at: row.get("resolved_at"),
        }
    }
}

impl TryFrom<AlertRow> for Alert {
    type Error = DomainError;

    fn try_from(row: AlertRow) -> Result<Self, Self::Error> {
        Ok(Alert {
            id: row.id,
            bin_id: row.bin_id,
            alert_type: row.alert_type.parse()?,
            severity: row.severity.parse()?,
            message: row.message,
            created_at: row.created_at,
            resolved: row.resolved,
            resolved_at: row.resolved_at,
        })
    }
}

fn map_insert_error(e: tokio_postgres::Error, bin_id: &str) -> DomainError {
    if let Some(db_err) = e.as_db_error() {
        // PostgreSQL error code 23503 is foreign_key_violation
        if db_err.code().code() == "23503" {
            return DomainError::BinNotFound(bin_id.to_string());
        }
    }
    DomainError::RepositoryError(e.into())
}

/// PostgreSQL implementation of AlertRepository trait
#[derive(Clone)]
pub struct PostgresAlertRepository {
    client: PostgresClient,
}

impl PostgresAlertRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AlertRepository for PostgresAlertRepository {
    #[instrument(skip(self, input), fields(bin_id = %input.bin_id, alert_type = %input.alert_type))]
    async fn create_alert(&self, input: CreateAlertInput) -> DomainResult<Alert> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let sql = format!(
            "INSERT INTO alerts (bin_id, alert_type, severity, message)
             VALUES ($1, $2, $3, $4)
             RETURNING {}",
            ALERT_COLUMNS
        );

        let row = conn
            .query_one(
                sql.as_str(),
                &[
                    &input.bin_id,
                    &input.alert_type.as_str(),
                    &input.severity.as_str(),
                    &input.message,
                ],
            )
            .await
            .map_err(|e| map_insert_error(e, &input.bin_id))?;

        let alert = Alert::try_from(AlertRow::from(&row))?;
        debug!(alert_id = alert.id, "created alert");
        Ok(alert)
    }

    #[instrument(skip(self, input), fields(bin_id = %input.bin_id, alert_type = %input.alert_type))]
    async fn raise_alert_once(&self, input: CreateAlertInput) -> DomainResult<Option<Alert>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let sql = format!(
            "INSERT INTO alerts (bin_id, alert_type, severity, message)
             SELECT $1::TEXT, $2::TEXT, $3::TEXT, $4::TEXT
             WHERE NOT EXISTS (
                 SELECT 1 FROM alerts
                 WHERE bin_id = $1 AND alert_type = $2 AND resolved = FALSE
             )
             RETURNING {}",
            ALERT_COLUMNS
        );

        let row = conn
            .query_opt(
                sql.as_str(),
                &[
                    &input.bin_id,
                    &input.alert_type.as_str(),
                    &input.severity.as_str(),
                    &input.message,
                ],
            )
            .await
            .map_err(|e| map_insert_error(e, &input.bin_id))?;

        match row {
            Some(row) => {
                let alert = Alert::try_from(AlertRow::from(&row))?;
                debug!(alert_id = alert.id, "raised alert");
                Ok(Some(alert))
            }
            None => {
                debug!("alert already open, skipping");
                Ok(None)
            }
        }
    }

    #[instrument(skip(self), fields(alert_id = alert_id))]
    async fn resolve_alert(&self, alert_id: i64) -> DomainResult<bool> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let updated = conn
            .execute(
                "UPDATE alerts SET resolved = TRUE, resolved_at = NOW() WHERE id = $1",
                &[&alert_id],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(updated > 0)
    }

    #[instrument(skip(self))]
    async fn list_unresolved_alerts(&self, bin_id: Option<String>) -> DomainResult<Vec<Alert>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let rows = match &bin_id {
            Some(bin_id) => {
                let sql = format!(
                    "SELECT {} FROM alerts WHERE resolved = FALSE AND bin_id = $1
                     ORDER BY created_at DESC",
                    ALERT_COLUMNS
                );
                conn.query(sql.as_str(), &[bin_id]).await
            }
            None => {
                let sql = format!(
                    "SELECT {} FROM alerts WHERE resolved = FALSE ORDER BY created_at DESC",
                    ALERT_COLUMNS
                );
                conn.query(sql.as_str(), &[]).await
            }
        }
        .map_err(|e| DomainError::RepositoryError(e.into()))?;

        let alerts = rows
            .iter()
            .map(|row| Alert::try_from(AlertRow::from(row)))
            .collect::<DomainResult<Vec<_>>>()?;

        debug!("found {} unresolved alerts", alerts.len());
        Ok(alerts)
    }
}
