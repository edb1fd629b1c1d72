use crate::domain::CommandDispatcher;
use chrono::{DateTime, Utc};
use common::domain::{
    AlertKind, AlertRepository, AlertSeverity, BinRepository, CreateAlertInput, DomainError,
    DomainResult,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionDayStarted {
    pub success: bool,
    pub bins_notified: usize,
    pub collection_hours: u32,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionDayEnded {
    pub success: bool,
    pub ended_at: DateTime<Utc>,
}

/// Two-phase collection-day workflow over the dispatcher and the registry
///
/// Nothing is rolled back: a failed broadcast shows up as `success = false`, and owners
/// are still reminded.
pub struct CollectionDayService {
    dispatcher: Arc<CommandDispatcher>,
    bin_repository: Arc<dyn BinRepository>,
    alert_repository: Arc<dyn AlertRepository>,
}

impl CollectionDayService {
    pub fn new(
        dispatcher: Arc<CommandDispatcher>,
        bin_repository: Arc<dyn BinRepository>,
        alert_repository: Arc<dyn AlertRepository>,
    ) -> Self {
        Self {
            dispatcher,
            bin_repository,
            alert_repository,
        }
    }

    /// Wake every bin, then leave a reminder alert for each registered owner
    #[instrument(skip(self))]
    pub async fn start_collection_day(&self, collection_hours: u32) -> DomainResult<CollectionDayStarted> {
        let started_at = Utc::now();

        let success = match self.dispatcher.broadcast_wake_up(collection_hours).await {
            Ok(sent) => sent,
            Err(e @ DomainError::ValidationError(_)) => return Err(e),
            Err(e) => {
                error!(error = %e, "broadcast wake-up failed");
                false
            }
        };

        let owned_bins = self.bin_repository.list_owned_bins().await?;
        let mut bins_notified = 0;

        for bin in owned_bins {
            let Some(owner) = bin.owner else {
                continue;
            };
            let user_name = owner.user_name.unwrap_or(owner.user_id);

            match self
                .alert_repository
                .create_alert(CreateAlertInput {
                    bin_id: bin.bin_id.clone(),
                    alert_type: AlertKind::CollectionReminder,
                    severity: AlertSeverity::Info,
                    message: format!(
                        "Collection day today! Please ensure your bin device is turned on. User: {}",
                        user_name
                    ),
                })
                .await
            {
                Ok(_) => bins_notified += 1,
                Err(e) => {
                    warn!(bin_id = %bin.bin_id, error = %e, "failed to create collection reminder");
                }
            }
        }

        info!(success, bins_notified, collection_hours, "collection day started");

        Ok(CollectionDayStarted {
            success,
            bins_notified,
            collection_hours,
            started_at,
        })
    }

    /// Put every bin back to sleep
    #[instrument(skip(self))]
    pub async fn end_collection_day(&self) -> CollectionDayEnded {
        let ended_at = Utc::now();

        let success = match self.dispatcher.broadcast_sleep().await {
            Ok(sent) => sent,
            Err(e) => {
                error!(error = %e, "broadcast sleep failed");
                false
            }
        };

        info!(success, "collection day ended");

        CollectionDayEnded { success, ended_at }
    }
}
