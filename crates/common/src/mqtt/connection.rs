use crate::domain::{DomainError, DomainResult};
use rumqttc::{ConnectReturnCode, Event, EventLoop, Packet};
use std::time::Duration;
use tracing::{debug, info};

/// Drive the event loop until the broker acknowledges the connection
///
/// Any connection error, a refused CONNACK or no CONNACK within `timeout` is returned as
/// `MqttConnectionError`; callers treat that as fatal at startup.
pub async fn wait_for_connack(eventloop: &mut EventLoop, timeout: Duration) -> DomainResult<()> {
    let connect = async {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    if ack.code == ConnectReturnCode::Success {
                        return Ok(());
                    }
                    return Err(DomainError::MqttConnectionError(format!(
                        "broker refused connection: {:?}",
                        ack.code
                    )));
                }
                Ok(event) => {
                    debug!(?event, "event before CONNACK");
                }
                Err(e) => {
                    return Err(DomainError::MqttConnectionError(e.to_string()));
                }
            }
        }
    };

    match tokio::time::timeout(timeout, connect).await {
        Ok(Ok(())) => {
            info!("connected to MQTT broker");
            Ok(())
        }
        Ok(Err(e)) => Err(e),
        Err(_) => Err(DomainError::MqttConnectionError(format!(
            "no CONNACK within {}s",
            timeout.as_secs()
        ))),
    }
}
