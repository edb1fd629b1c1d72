use crate::domain::{IngestError, IngestStatusHandle, TelemetryIngestionService};
use common::domain::{DomainError, DomainResult};
use rumqttc::{AsyncClient, Event, EventLoop, Packet, QoS};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, instrument, warn, Instrument, Span};

/// Reconnection policy for the ingest loop
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retry_attempts: u32,
    pub retry_delay: Duration,
}

/// Drive the MQTT event loop, handling telemetry until cancelled
///
/// Messages are handled inline, one at a time; a handler always runs to completion before
/// the next poll or cancellation check. Broker errors are retried (rumqttc reconnects on
/// the next poll) until `max_retry_attempts` consecutive failures.
#[instrument(name = "ingest_loop", skip_all, fields(topic = %topic))]
pub async fn run_ingest_loop(
    client: AsyncClient,
    mut eventloop: EventLoop,
    topic: String,
    service: &TelemetryIngestionService,
    status: IngestStatusHandle,
    retry: RetryPolicy,
    shutdown_token: CancellationToken,
) -> DomainResult<()> {
    let mut retry_count = 0;

    let result = loop {
        tokio::select! {
            _ = shutdown_token.cancelled() => {
                debug!("shutdown signal received");
                break Ok(());
            }
            event = eventloop.poll() => {
                match event {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        handle_mqtt_message(service, &status, &publish.topic, &publish.payload).await;
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("reconnected to MQTT broker");
                        retry_count = 0;
                        status.set_connected(true);
                        // Clean sessions drop subscriptions on reconnect
                        if let Err(e) = client.try_subscribe(&topic, QoS::AtLeastOnce) {
                            warn!(error = %e, "failed to queue resubscribe");
                        }
                    }
                    Ok(Event::Incoming(Packet::SubAck(_))) => {
                        debug!("subscription acknowledged");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        status.set_connected(false);
                        error!(error = %e, "MQTT connection error");

                        retry_count += 1;
                        if retry_count >= retry.max_retry_attempts {
                            error!(
                                max_retries = retry.max_retry_attempts,
                                "max retry attempts reached, stopping ingest"
                            );
                            break Err(DomainError::MqttConnectionError(e.to_string()));
                        }

                        warn!(
                            attempt = retry_count,
                            max_attempts = retry.max_retry_attempts,
                            "retrying MQTT connection"
                        );

                        tokio::select! {
                            _ = shutdown_token.cancelled() => break Ok(()),
                            _ = tokio::time::sleep(retry.retry_delay) => {}
                        }
                    }
                }
            }
        }
    };

    let _ = client.disconnect().await;
    status.set_connected(false);
    info!(
        messages_processed = status.messages_processed(),
        "ingest loop stopped"
    );

    result
}

/// Handle one inbound publish; never propagates a failure to the loop
///
/// Each message gets its own root span rather than nesting under the loop's span.
pub(crate) async fn handle_mqtt_message(
    service: &TelemetryIngestionService,
    status: &IngestStatusHandle,
    topic: &str,
    payload: &[u8],
) {
    let span = info_span!(
        parent: Span::none(),
        "mqtt_message",
        topic = %topic,
        payload_size = payload.len(),
    );

    async {
        match service.ingest(topic, payload).await {
            Ok(record) => {
                let total = status.record_processed();
                debug!(bin_id = %record.bin_id, total, "message processed");
            }
            Err(IngestError::Rejected(reason)) => {
                warn!(reason = %reason, "dropping telemetry message");
            }
            Err(IngestError::Persistence(e)) => {
                error!(error = %e, "failed to persist telemetry, message dropped");
            }
        }
    }
    .instrument(span)
    .await
}
