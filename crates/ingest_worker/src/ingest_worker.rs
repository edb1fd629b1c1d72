use crate::domain::{IngestStatusHandle, TelemetryIngestionService};
use crate::mqtt::{run_ingest_loop, RetryPolicy};
use common::domain::{DomainError, DomainResult};
use common::mqtt::{wait_for_connack, MqttSettings};
use rumqttc::{AsyncClient, EventLoop, QoS};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, Clone)]
pub struct IngestWorkerConfig {
    pub mqtt: MqttSettings,
    pub topic: String,
    pub client_id: String,
    pub startup_timeout: Duration,
    pub retry_delay: Duration,
    pub max_retry_attempts: u32,
}

/// Owns the telemetry subscription: its client, event loop and status counters
pub struct IngestWorker {
    client: AsyncClient,
    eventloop: EventLoop,
    topic: String,
    service: Arc<TelemetryIngestionService>,
    status: IngestStatusHandle,
    retry: RetryPolicy,
}

impl IngestWorker {
    /// Connect and subscribe
    ///
    /// Fails when the TLS configuration is incomplete or the broker does not acknowledge
    /// the connection within `startup_timeout`.
    pub async fn connect(
        config: IngestWorkerConfig,
        service: Arc<TelemetryIngestionService>,
    ) -> DomainResult<Self> {
        let options = config.mqtt.mqtt_options(&config.client_id)?;
        let broker = config.mqtt.broker_address();

        info!(
            broker = %broker,
            topic = %config.topic,
            tls_enabled = config.mqtt.use_tls,
            "starting MQTT ingest"
        );

        let (client, mut eventloop) = AsyncClient::new(options, 100);

        client
            .subscribe(&config.topic, QoS::AtLeastOnce)
            .await
            .map_err(|e| DomainError::MqttConnectionError(format!("Failed to subscribe: {}", e)))?;

        wait_for_connack(&mut eventloop, config.startup_timeout).await?;

        let status = IngestStatusHandle::new(
            broker,
            config.topic.clone(),
            config.mqtt.use_tls,
            config.mqtt.authenticated(),
        );
        status.set_connected(true);

        info!(topic = %config.topic, "subscribed to telemetry topic");

        Ok(Self {
            client,
            eventloop,
            topic: config.topic,
            service,
            status,
            retry: RetryPolicy {
                max_retry_attempts: config.max_retry_attempts,
                retry_delay: config.retry_delay,
            },
        })
    }

    /// Handle for reading connection state and the processed-message counter
    pub fn status_handle(&self) -> IngestStatusHandle {
        self.status.clone()
    }

    pub async fn run(self, shutdown_token: CancellationToken) -> DomainResult<()> {
        run_ingest_loop(
            self.client,
            self.eventloop,
            self.topic,
            &self.service,
            self.status,
            self.retry,
            shutdown_token,
        )
        .await
    }

    pub fn into_runner_process(
        self,
    ) -> impl FnOnce(
        CancellationToken,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = anyhow::Result<()>> + Send>>
           + Send
           + 'static {
        move |ctx| Box::pin(async move { Ok(self.run(ctx).await?) })
    }
}
