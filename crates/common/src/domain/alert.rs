use crate::domain::result::{DomainError, DomainResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    CollectionReminder,
    BinFull,
    LowBattery,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::CollectionReminder => "collection_reminder",
            AlertKind::BinFull => "bin_full",
            AlertKind::LowBattery => "low_battery",
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "collection_reminder" => Ok(AlertKind::CollectionReminder),
            "bin_full" => Ok(AlertKind::BinFull),
            "low_battery" => Ok(AlertKind::LowBattery),
            other => Err(DomainError::RepositoryError(anyhow::anyhow!(
                "unexpected alert type '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Info => "info",
            AlertSeverity::Warning => "warning",
            AlertSeverity::Critical => "critical",
        }
    }
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertSeverity {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(AlertSeverity::Info),
            "warning" => Ok(AlertSeverity::Warning),
            "critical" => Ok(AlertSeverity::Critical),
            other => Err(DomainError::RepositoryError(anyhow::anyhow!(
                "unexpected alert severity '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: i64,
    pub bin_id: String,
    pub alert_type: AlertKind,
    pub severity: AlertSeverity,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateAlertInput {
    pub bin_id: String,
    pub alert_type: AlertKind,
    pub severity: AlertSeverity,
    pub message: String,
}

/// Repository trait for alert persistence
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait AlertRepository: Send + Sync {
    async fn create_alert(&self, input: CreateAlertInput) -> DomainResult<Alert>;

    /// Create the alert unless the bin already has an unresolved alert of the same type
    async fn raise_alert_once(&self, input: CreateAlertInput) -> DomainResult<Option<Alert>>;

    /// Mark an alert resolved; false if no such alert exists
    async fn resolve_alert(&self, alert_id: i64) -> DomainResult<bool>;

    /// Unresolved alerts, newest first, optionally for a single bin
    async fn list_unresolved_alerts(&self, bin_id: Option<String>) -> DomainResult<Vec<Alert>>;
}
