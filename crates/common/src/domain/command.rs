use crate::domain::result::DomainResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

/// Reserved target token meaning "every bin"
pub const BROADCAST_TARGET: &str = "broadcast";

/// Telemetry cadence requested from a woken device unless configured otherwise
pub const DEFAULT_TELEMETRY_INTERVAL_MINUTES: u32 = 60;

/// Addressee of a downlink command
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CommandTarget {
    Bin(String),
    Broadcast,
}

impl CommandTarget {
    pub fn bin(bin_id: impl Into<String>) -> Self {
        CommandTarget::Bin(bin_id.into())
    }

    /// Identifier recorded in the command log and used in the topic path
    pub fn as_str(&self) -> &str {
        match self {
            CommandTarget::Bin(bin_id) => bin_id,
            CommandTarget::Broadcast => BROADCAST_TARGET,
        }
    }

    pub fn is_broadcast(&self) -> bool {
        matches!(self, CommandTarget::Broadcast)
    }
}

impl fmt::Display for CommandTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport delivery tier for a command publish
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryGuarantee {
    AtMostOnce,
    #[default]
    AtLeastOnce,
    ExactlyOnce,
}

#[derive(Debug, Clone, PartialEq, Serialize, Validate)]
pub struct WakeUpParams {
    #[garde(range(min = 1))]
    pub collection_hours: u32,
    #[garde(range(min = 1, max = 1440))]
    pub telemetry_interval_minutes: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Validate)]
pub struct UpdateConfigParams {
    #[garde(range(min = 1, max = 1440))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telemetry_interval_minutes: Option<u32>,
    #[garde(range(min = 2.0, max = 5.0))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery_threshold_v: Option<f64>,
}

/// Downlink commands understood by the bin firmware
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    WakeUp(WakeUpParams),
    Sleep,
    ResetEmptied,
    GetStatus,
    UpdateConfig(UpdateConfigParams),
}

impl Command {
    pub fn command_type(&self) -> &'static str {
        match self {
            Command::WakeUp(_) => "wake_up",
            Command::Sleep => "sleep",
            Command::ResetEmptied => "reset_emptied",
            Command::GetStatus => "get_status",
            Command::UpdateConfig(_) => "update_config",
        }
    }

    pub fn params(&self) -> Value {
        match self {
            Command::WakeUp(params) => json!({
                "collection_hours": params.collection_hours,
                "telemetry_interval_minutes": params.telemetry_interval_minutes,
            }),
            Command::Sleep | Command::GetStatus => json!({}),
            Command::ResetEmptied => json!({ "emptied": false }),
            Command::UpdateConfig(params) => {
                serde_json::to_value(params).unwrap_or_else(|_| json!({}))
            }
        }
    }
}

/// Wire envelope published to a command topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub command: String,
    pub timestamp: DateTime<Utc>,
    pub params: Value,
}

impl CommandEnvelope {
    pub fn new(command: &Command, issued_at: DateTime<Utc>) -> Self {
        Self {
            command: command.command_type().to_string(),
            timestamp: issued_at,
            params: command.params(),
        }
    }
}

/// Audit row written for every dispatch attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandLogEntry {
    pub id: i64,
    pub bin_id: String,
    pub command_type: String,
    pub payload: Value,
    pub sent_at: DateTime<Utc>,
    pub acknowledged: bool,
    pub ack_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateCommandLogInput {
    pub bin_id: String,
    pub command_type: String,
    pub payload: Value,
}

/// Trait for publishing serialized commands to the device transport
///
/// Implementations should:
/// - Map the delivery guarantee onto the transport's QoS tiers
/// - Return error if the publish cannot be handed to the transport
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait CommandPublisher: Send + Sync {
    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        guarantee: DeliveryGuarantee,
        retain: bool,
    ) -> DomainResult<()>;
}

/// Repository trait for the command audit log
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait CommandLogRepository: Send + Sync {
    async fn log_command(&self, input: CreateCommandLogInput) -> DomainResult<CommandLogEntry>;

    /// Most recent commands sent to a bin, newest first
    async fn command_history(&self, bin_id: &str, limit: i64) -> DomainResult<Vec<CommandLogEntry>>;

    /// Mark an entry as acknowledged by the device; false if it does not exist
    async fn acknowledge_command(&self, command_id: i64) -> DomainResult<bool>;
}
