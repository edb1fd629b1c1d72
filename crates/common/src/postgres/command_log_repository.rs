use crate::domain::{
    CommandLogEntry, CommandLogRepository, CreateCommandLogInput, DomainError, DomainResult,
};
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use tokio_postgres::Row;
use tracing::{debug, instrument};

const COMMAND_LOG_COLUMNS: &str =
    "id, bin_id, command_type, payload, sent_at, acknowledged, ack_at";

impl From<&Row> for CommandLogEntry {
    fn from(row: &Row) -> Self {
        CommandLogEntry {
            id: row.get("id"),
            bin_id: row.get("bin_id"),
            command_type: row.get("command_type"),
            payload: row.get("payload"),
            sent_at: row.get("sent_at"),
            acknowledged: row.get("acknowledged"),
            ack_at: row.get("ack_at"),
        }
    }
}

/// PostgreSQL implementation of CommandLogRepository trait
#[derive(Clone)]
pub struct PostgresCommandLogRepository {
    client: PostgresClient,
}

impl PostgresCommandLogRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CommandLogRepository for PostgresCommandLogRepository {
    #[instrument(skip(self, input), fields(bin_id = %input.bin_id, command_type = %input.command_type))]
    async fn log_command(&self, input: CreateCommandLogInput) -> DomainResult<CommandLogEntry> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let sql = format!(
            "INSERT INTO commands_log (bin_id, command_type, payload)
             VALUES ($1, $2, $3)
             RETURNING {}",
            COMMAND_LOG_COLUMNS
        );

        let row = conn
            .query_one(
                sql.as_str(),
                &[&input.bin_id, &input.command_type, &input.payload],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        let entry = CommandLogEntry::from(&row);
        debug!(command_id = entry.id, "logged command");
        Ok(entry)
    }

    #[instrument(skip(self), fields(bin_id = %bin_id, limit = limit))]
    async fn command_history(
        &self,
        bin_id: &str,
        limit: i64,
    ) -> DomainResult<Vec<CommandLogEntry>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let sql = format!(
            "SELECT {} FROM commands_log WHERE bin_id = $1 ORDER BY sent_at DESC, id DESC LIMIT $2",
            COMMAND_LOG_COLUMNS
        );

        let rows = conn
            .query(sql.as_str(), &[&bin_id, &limit])
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(rows.iter().map(CommandLogEntry::from).collect())
    }

    #[instrument(skip(self), fields(command_id = command_id))]
    async fn acknowledge_command(&self, command_id: i64) -> DomainResult<bool> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let updated = conn
            .execute(
                "UPDATE commands_log SET acknowledged = TRUE, ack_at = NOW() WHERE id = $1",
                &[&command_id],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(updated > 0)
    }
}
