use async_trait::async_trait;
use common::domain::{CommandPublisher, DeliveryGuarantee, DomainError, DomainResult};
use common::mqtt::{wait_for_connack, MqttSettings};
use rumqttc::{AsyncClient, Event, EventLoop, Packet, QoS};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

pub(crate) fn qos_for(guarantee: DeliveryGuarantee) -> QoS {
    match guarantee {
        DeliveryGuarantee::AtMostOnce => QoS::AtMostOnce,
        DeliveryGuarantee::AtLeastOnce => QoS::AtLeastOnce,
        DeliveryGuarantee::ExactlyOnce => QoS::ExactlyOnce,
    }
}

/// MQTT publisher for downlink commands
///
/// The client only queues requests; `CommandEventLoop::run` must be driven for anything
/// to reach the broker.
#[derive(Clone)]
pub struct MqttCommandPublisher {
    client: AsyncClient,
}

/// Event loop backing an `MqttCommandPublisher`
pub struct CommandEventLoop {
    client: AsyncClient,
    eventloop: EventLoop,
    max_retry_attempts: u32,
    retry_delay: Duration,
}

impl MqttCommandPublisher {
    /// Connect and wait for the broker's CONNACK
    pub async fn connect(
        settings: &MqttSettings,
        client_id: &str,
        startup_timeout: Duration,
        max_retry_attempts: u32,
        retry_delay: Duration,
    ) -> DomainResult<(Self, CommandEventLoop)> {
        let options = settings.mqtt_options(client_id)?;

        info!(
            broker = %settings.broker_address(),
            client_id = %client_id,
            "connecting command publisher"
        );

        let (client, mut eventloop) = AsyncClient::new(options, 100);
        wait_for_connack(&mut eventloop, startup_timeout).await?;

        Ok((
            Self {
                client: client.clone(),
            },
            CommandEventLoop {
                client,
                eventloop,
                max_retry_attempts,
                retry_delay,
            },
        ))
    }
}

#[async_trait]
impl CommandPublisher for MqttCommandPublisher {
    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        guarantee: DeliveryGuarantee,
        retain: bool,
    ) -> DomainResult<()> {
        debug!(
            topic = %topic,
            size_bytes = payload.len(),
            qos = ?guarantee,
            retain,
            "publishing command"
        );

        self.client
            .publish(topic, qos_for(guarantee), retain, payload)
            .await
            .map_err(|e| DomainError::PublishError(format!("Failed to publish to {}: {}", topic, e)))
    }
}

impl CommandEventLoop {
    /// Poll the connection until cancelled, giving up after too many consecutive errors
    #[instrument(name = "command_event_loop", skip_all)]
    pub async fn run(mut self, shutdown_token: CancellationToken) -> DomainResult<()> {
        let mut retry_count = 0;

        let result = loop {
            tokio::select! {
                _ = shutdown_token.cancelled() => {
                    debug!("shutdown signal received");
                    break Ok(());
                }
                event = self.eventloop.poll() => {
                    match event {
                        Ok(Event::Incoming(Packet::ConnAck(_))) => {
                            info!("command publisher reconnected");
                            retry_count = 0;
                        }
                        Ok(Event::Incoming(Packet::PubAck(ack))) => {
                            debug!(pkid = ack.pkid, "command acknowledged by broker");
                        }
                        Ok(_) => {}
                        Err(e) => {
                            error!(error = %e, "command publisher connection error");

                            retry_count += 1;
                            if retry_count >= self.max_retry_attempts {
                                error!(
                                    max_retries = self.max_retry_attempts,
                                    "max retry attempts reached, stopping command publisher"
                                );
                                break Err(DomainError::MqttConnectionError(e.to_string()));
                            }

                            warn!(
                                attempt = retry_count,
                                max_attempts = self.max_retry_attempts,
                                "retrying command publisher connection"
                            );

                            tokio::select! {
                                _ = shutdown_token.cancelled() => break Ok(()),
                                _ = tokio::time::sleep(self.retry_delay) => {}
                            }
                        }
                    }
                }
            }
        };

        let _ = self.client.disconnect().await;
        info!("command publisher stopped");
        result
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
