use chrono::Utc;
use common::domain::{
    BinRepository, Command, CommandEnvelope, CommandLogRepository, CommandPublisher, CommandTarget,
    CreateCommandLogInput, DeliveryGuarantee, DomainError, DomainResult, LifecycleIntent,
    UpdateConfigParams, WakeUpParams, DEFAULT_TELEMETRY_INTERVAL_MINUTES,
};
use common::garde::validate_struct;
use common::mqtt::command_topic;
use std::sync::Arc;
use tracing::{error, info, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandDispatcherConfig {
    /// Retained flag on every command publish
    pub retain_commands: bool,
    /// Telemetry cadence sent along with wake-up commands
    pub telemetry_interval_minutes: u32,
}

impl Default for CommandDispatcherConfig {
    fn default() -> Self {
        Self {
            retain_commands: false,
            telemetry_interval_minutes: DEFAULT_TELEMETRY_INTERVAL_MINUTES,
        }
    }
}

/// Publishes commands to bins and keeps the command log and lifecycle flags in step
///
/// Every dispatch writes a command log entry before publishing, whatever the publish
/// outcome. Wake and sleep record the requested state on the bin row first and never roll
/// it back; the device's next telemetry report is the source of truth.
pub struct CommandDispatcher {
    publisher: Arc<dyn CommandPublisher>,
    bin_repository: Arc<dyn BinRepository>,
    command_log_repository: Arc<dyn CommandLogRepository>,
    config: CommandDispatcherConfig,
}

impl CommandDispatcher {
    pub fn new(
        publisher: Arc<dyn CommandPublisher>,
        bin_repository: Arc<dyn BinRepository>,
        command_log_repository: Arc<dyn CommandLogRepository>,
        config: CommandDispatcherConfig,
    ) -> Self {
        Self {
            publisher,
            bin_repository,
            command_log_repository,
            config,
        }
    }

    /// Log and publish one command; true when the transport accepted it
    #[instrument(skip_all, fields(command_target = %target, command = command.command_type(), guarantee = ?guarantee))]
    pub async fn send(
        &self,
        target: &CommandTarget,
        command: Command,
        guarantee: DeliveryGuarantee,
    ) -> bool {
        let envelope = CommandEnvelope::new(&command, Utc::now());
        let payload = match serde_json::to_value(&envelope) {
            Ok(payload) => payload,
            Err(e) => {
                error!(error = %e, "failed to encode command envelope");
                return false;
            }
        };
        let topic = command_topic(target);

        if let Err(e) = self
            .command_log_repository
            .log_command(CreateCommandLogInput {
                bin_id: target.as_str().to_string(),
                command_type: envelope.command.clone(),
                payload: payload.clone(),
            })
            .await
        {
            error!(error = %e, "failed to write command log");
        }

        match self
            .publisher
            .publish(
                &topic,
                payload.to_string().into_bytes(),
                guarantee,
                self.config.retain_commands,
            )
            .await
        {
            Ok(()) => {
                info!(topic = %topic, "command sent");
                true
            }
            Err(e) => {
                error!(topic = %topic, error = %e, "failed to publish command");
                false
            }
        }
    }

    /// Wake one bin for a collection window of `collection_hours`
    pub async fn wake_up(&self, bin_id: &str, collection_hours: u32) -> DomainResult<bool> {
        self.wake(bin_target(bin_id)?, collection_hours).await
    }

    pub async fn sleep(&self, bin_id: &str) -> DomainResult<bool> {
        self.put_to_sleep(bin_target(bin_id)?).await
    }

    /// Wake every bin with one registry update and one broadcast publish
    pub async fn broadcast_wake_up(&self, collection_hours: u32) -> DomainResult<bool> {
        self.wake(CommandTarget::Broadcast, collection_hours).await
    }

    pub async fn broadcast_sleep(&self) -> DomainResult<bool> {
        self.put_to_sleep(CommandTarget::Broadcast).await
    }

    /// Tell the device to clear its emptied flag
    pub async fn reset_emptied(&self, bin_id: &str) -> DomainResult<bool> {
        let target = bin_target(bin_id)?;
        Ok(self
            .send(&target, Command::ResetEmptied, DeliveryGuarantee::default())
            .await)
    }

    /// Ask the device for an immediate telemetry report
    pub async fn request_status(&self, bin_id: &str) -> DomainResult<bool> {
        let target = bin_target(bin_id)?;
        Ok(self
            .send(&target, Command::GetStatus, DeliveryGuarantee::default())
            .await)
    }

    /// Push new settings; only the fields that are set are sent
    pub async fn update_config(
        &self,
        bin_id: &str,
        params: UpdateConfigParams,
    ) -> DomainResult<bool> {
        let target = bin_target(bin_id)?;
        validate_struct(&params)?;
        Ok(self
            .send(
                &target,
                Command::UpdateConfig(params),
                DeliveryGuarantee::default(),
            )
            .await)
    }

    async fn wake(&self, target: CommandTarget, collection_hours: u32) -> DomainResult<bool> {
        let params = WakeUpParams {
            collection_hours,
            telemetry_interval_minutes: self.config.telemetry_interval_minutes,
        };
        validate_struct(&params)?;

        let updated = self
            .bin_repository
            .apply_lifecycle_intent(
                &target,
                LifecycleIntent::Wake {
                    requested_at: Utc::now(),
                },
            )
            .await?;
        info!(command_target = %target, updated, collection_hours, "marked bins awake");

        Ok(self
            .send(
                &target,
                Command::WakeUp(params),
                DeliveryGuarantee::default(),
            )
            .await)
    }

    async fn put_to_sleep(&self, target: CommandTarget) -> DomainResult<bool> {
        let updated = self
            .bin_repository
            .apply_lifecycle_intent(&target, LifecycleIntent::Sleep)
            .await?;
        info!(command_target = %target, updated, "marked bins asleep");

        Ok(self
            .send(&target, Command::Sleep, DeliveryGuarantee::default())
            .await)
    }
}

/// Characters that would change the meaning of the command topic
const TOPIC_RESERVED_CHARS: [char; 3] = ['/', '+', '#'];

fn bin_target(bin_id: &str) -> DomainResult<CommandTarget> {
    let bin_id = bin_id.trim();
    if bin_id.is_empty()
        || bin_id == common::domain::BROADCAST_TARGET
        || bin_id.contains(&TOPIC_RESERVED_CHARS[..])
    {
        return Err(DomainError::InvalidBinId(bin_id.to_string()));
    }
    Ok(CommandTarget::bin(bin_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::domain::{
        CommandLogEntry, MockBinRepository, MockCommandLogRepository, MockCommandPublisher,
    };
    use serde_json::{json, Value};

    fn log_entry(input: CreateCommandLogInput) -> CommandLogEntry {
        CommandLogEntry {
            id: 1,
            bin_id: input.bin_id,
            command_type: input.command_type,
            payload: input.payload,
            sent_at: Utc::now(),
            acknowledged: false,
            ack_at: None,
        }
    }

    fn accepting_log() -> MockCommandLogRepository {
        let mut log = MockCommandLogRepository::new();
        log.expect_log_command()
            .times(1)
            .returning(|input| Ok(log_entry(input)));
        log
    }

    fn dispatcher(
        publisher: MockCommandPublisher,
        bins: MockBinRepository,
        log: MockCommandLogRepository,
    ) -> CommandDispatcher {
        CommandDispatcher::new(
            Arc::new(publisher),
            Arc::new(bins),
            Arc::new(log),
            CommandDispatcherConfig::default(),
        )
    }

    fn payload_json(payload: &[u8]) -> Value {
        serde_json::from_slice(payload).unwrap()
    }

    #[tokio::test]
    async fn test_send_logs_then_publishes() {
        let mut log = MockCommandLogRepository::new();
        log.expect_log_command()
            .withf(|input: &CreateCommandLogInput| {
                input.bin_id == "B001"
                    && input.command_type == "get_status"
                    && input.payload["command"] == "get_status"
                    && input.payload["params"] == json!({})
            })
            .times(1)
            .returning(|input| Ok(log_entry(input)));

        let mut publisher = MockCommandPublisher::new();
        publisher
            .expect_publish()
            .withf(|topic: &str, payload: &Vec<u8>, guarantee: &DeliveryGuarantee, retain: &bool| {
                let body = payload_json(payload);
                topic == "cleanroute/bins/B001/command"
                    && body["command"] == "get_status"
                    && body["timestamp"].is_string()
                    && *guarantee == DeliveryGuarantee::AtLeastOnce
                    && !*retain
            })
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let sent = dispatcher(publisher, MockBinRepository::new(), log)
            .send(
                &CommandTarget::bin("B001"),
                Command::GetStatus,
                DeliveryGuarantee::AtLeastOnce,
            )
            .await;
        assert!(sent);
    }

    #[tokio::test]
    async fn test_send_logs_even_when_publish_fails() {
        let mut publisher = MockCommandPublisher::new();
        publisher
            .expect_publish()
            .times(1)
            .returning(|_, _, _, _| Err(DomainError::PublishError("broker gone".to_string())));

        let sent = dispatcher(publisher, MockBinRepository::new(), accepting_log())
            .send(
                &CommandTarget::bin("B001"),
                Command::ResetEmptied,
                DeliveryGuarantee::AtMostOnce,
            )
            .await;
        assert!(!sent);
    }

    #[tokio::test]
    async fn test_log_failure_does_not_block_publish() {
        let mut log = MockCommandLogRepository::new();
        log.expect_log_command()
            .times(1)
            .returning(|_| Err(DomainError::RepositoryError(anyhow::anyhow!("db down"))));

        let mut publisher = MockCommandPublisher::new();
        publisher
            .expect_publish()
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let sent = dispatcher(publisher, MockBinRepository::new(), log)
            .request_status("B001")
            .await
            .unwrap();
        assert!(sent);
    }

    #[tokio::test]
    async fn test_wake_up_marks_bin_before_publish() {
        let mut bins = MockBinRepository::new();
        bins.expect_apply_lifecycle_intent()
            .withf(|target: &CommandTarget, intent: &LifecycleIntent| {
                *target == CommandTarget::bin("B001")
                    && matches!(intent, LifecycleIntent::Wake { .. })
            })
            .times(1)
            .returning(|_, _| Ok(1));

        let mut publisher = MockCommandPublisher::new();
        publisher
            .expect_publish()
            .withf(|topic: &str, payload: &Vec<u8>, _: &DeliveryGuarantee, _: &bool| {
                let body = payload_json(payload);
                topic == "cleanroute/bins/B001/command"
                    && body["command"] == "wake_up"
                    && body["params"]
                        == json!({"collection_hours": 8, "telemetry_interval_minutes": 60})
            })
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let sent = dispatcher(publisher, bins, accepting_log())
            .wake_up("B001", 8)
            .await
            .unwrap();
        assert!(sent);
    }

    #[tokio::test]
    async fn test_sleep_flag_kept_when_publish_fails() {
        let mut bins = MockBinRepository::new();
        bins.expect_apply_lifecycle_intent()
            .withf(|target: &CommandTarget, intent: &LifecycleIntent| {
                *target == CommandTarget::bin("B001") && *intent == LifecycleIntent::Sleep
            })
            .times(1)
            .returning(|_, _| Ok(1));

        let mut publisher = MockCommandPublisher::new();
        publisher
            .expect_publish()
            .times(1)
            .returning(|_, _, _, _| Err(DomainError::PublishError("offline".to_string())));

        let sent = dispatcher(publisher, bins, accepting_log())
            .sleep("B001")
            .await
            .unwrap();
        assert!(!sent);
    }

    #[tokio::test]
    async fn test_broadcast_wake_up_single_publish() {
        let mut bins = MockBinRepository::new();
        bins.expect_apply_lifecycle_intent()
            .withf(|target: &CommandTarget, _: &LifecycleIntent| target.is_broadcast())
            .times(1)
            .returning(|_, _| Ok(3));

        let mut log = MockCommandLogRepository::new();
        log.expect_log_command()
            .withf(|input: &CreateCommandLogInput| input.bin_id == "broadcast")
            .times(1)
            .returning(|input| Ok(log_entry(input)));

        let mut publisher = MockCommandPublisher::new();
        publisher
            .expect_publish()
            .withf(|topic: &str, payload: &Vec<u8>, _: &DeliveryGuarantee, _: &bool| {
                let body = payload_json(payload);
                topic == "cleanroute/bins/broadcast/command"
                    && body["params"]
                        == json!({"collection_hours": 6, "telemetry_interval_minutes": 60})
            })
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let sent = dispatcher(publisher, bins, log)
            .broadcast_wake_up(6)
            .await
            .unwrap();
        assert!(sent);
    }

    #[tokio::test]
    async fn test_wake_up_rejects_invalid_hours() {
        let mut bins = MockBinRepository::new();
        bins.expect_apply_lifecycle_intent().times(0);
        let mut publisher = MockCommandPublisher::new();
        publisher.expect_publish().times(0);
        let mut log = MockCommandLogRepository::new();
        log.expect_log_command().times(0);

        let result = dispatcher(publisher, bins, log).wake_up("B001", 0).await;
        assert!(matches!(result, Err(DomainError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_broadcast_wake_up_accepts_multi_day_window() {
        let mut bins = MockBinRepository::new();
        bins.expect_apply_lifecycle_intent()
            .withf(|target: &CommandTarget, _: &LifecycleIntent| target.is_broadcast())
            .times(1)
            .returning(|_, _| Ok(40));

        let mut publisher = MockCommandPublisher::new();
        publisher
            .expect_publish()
            .withf(|topic: &str, payload: &Vec<u8>, _: &DeliveryGuarantee, _: &bool| {
                topic == "cleanroute/bins/broadcast/command"
                    && payload_json(payload)["params"]["collection_hours"] == 96
            })
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let sent = dispatcher(publisher, bins, accepting_log())
            .broadcast_wake_up(96)
            .await
            .unwrap();
        assert!(sent);
    }

    #[tokio::test]
    async fn test_registry_failure_aborts_wake_up() {
        let mut bins = MockBinRepository::new();
        bins.expect_apply_lifecycle_intent()
            .times(1)
            .returning(|_, _| Err(DomainError::RepositoryError(anyhow::anyhow!("db down"))));
        let mut publisher = MockCommandPublisher::new();
        publisher.expect_publish().times(0);

        let result = dispatcher(publisher, bins, MockCommandLogRepository::new())
            .broadcast_wake_up(6)
            .await;
        assert!(matches!(result, Err(DomainError::RepositoryError(_))));
    }

    #[tokio::test]
    async fn test_update_config_sends_only_set_fields() {
        let mut publisher = MockCommandPublisher::new();
        publisher
            .expect_publish()
            .withf(|_: &str, payload: &Vec<u8>, _: &DeliveryGuarantee, _: &bool| {
                payload_json(payload)["params"] == json!({"battery_threshold_v": 3.4})
            })
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let sent = dispatcher(publisher, MockBinRepository::new(), accepting_log())
            .update_config(
                "B001",
                UpdateConfigParams {
                    telemetry_interval_minutes: None,
                    battery_threshold_v: Some(3.4),
                },
            )
            .await
            .unwrap();
        assert!(sent);
    }

    #[tokio::test]
    async fn test_update_config_rejects_out_of_range() {
        let mut publisher = MockCommandPublisher::new();
        publisher.expect_publish().times(0);

        let result = dispatcher(
            publisher,
            MockBinRepository::new(),
            MockCommandLogRepository::new(),
        )
        .update_config(
            "B001",
            UpdateConfigParams {
                telemetry_interval_minutes: Some(0),
                battery_threshold_v: None,
            },
        )
        .await;
        assert!(matches!(result, Err(DomainError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_reset_emptied_rejects_reserved_target() {
        let result = dispatcher(
            MockCommandPublisher::new(),
            MockBinRepository::new(),
            MockCommandLogRepository::new(),
        )
        .reset_emptied("broadcast")
        .await;
        assert!(matches!(result, Err(DomainError::InvalidBinId(_))));

        let result = dispatcher(
            MockCommandPublisher::new(),
            MockBinRepository::new(),
            MockCommandLogRepository::new(),
        )
        .reset_emptied("  ")
        .await;
        assert!(matches!(result, Err(DomainError::InvalidBinId(_))));
    }

    #[tokio::test]
    async fn test_commands_reject_topic_reserved_characters() {
        for bin_id in ["B001/extra", "bins/+", "#", "B+1"] {
            let mut bins = MockBinRepository::new();
            bins.expect_apply_lifecycle_intent().times(0);
            let mut publisher = MockCommandPublisher::new();
            publisher.expect_publish().times(0);
            let mut log = MockCommandLogRepository::new();
            log.expect_log_command().times(0);

            let result = dispatcher(publisher, bins, log).wake_up(bin_id, 6).await;
            assert!(
                matches!(result, Err(DomainError::InvalidBinId(_))),
                "{bin_id} should be rejected"
            );
        }

        let result = dispatcher(
            MockCommandPublisher::new(),
            MockBinRepository::new(),
            MockCommandLogRepository::new(),
        )
        .request_status("B001/status")
        .await;
        assert!(matches!(result, Err(DomainError::InvalidBinId(_))));
    }
}
