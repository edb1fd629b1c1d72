use crate::domain::{DomainError, DomainResult};
use rumqttc::{MqttOptions, TlsConfiguration, Transport};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Broker connection settings shared by the ingest worker and the command publisher
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttSettings {
    /// Host name, optionally with scheme and port (`mqtt://broker:1883`)
    pub broker: String,
    pub port: u16,
    /// Port used instead of `port` when TLS is on
    pub tls_port: u16,
    pub use_tls: bool,
    pub ca_cert_path: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive_secs: u64,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            broker: "localhost".to_string(),
            port: 1883,
            tls_port: 8883,
            use_tls: false,
            ca_cert_path: "mqtt/certs/ca.crt".to_string(),
            username: None,
            password: None,
            keep_alive_secs: 60,
        }
    }
}

impl MqttSettings {
    /// Resolved `(host, port)` the client connects to
    pub fn endpoint(&self) -> DomainResult<(&str, u16)> {
        let default_port = if self.use_tls { self.tls_port } else { self.port };
        parse_broker_url(&self.broker, default_port)
    }

    /// `host:port` form used in status reports and logs
    pub fn broker_address(&self) -> String {
        match self.endpoint() {
            Ok((host, port)) => format!("{}:{}", host, port),
            Err(_) => self.broker.clone(),
        }
    }

    pub fn authenticated(&self) -> bool {
        self.credentials().is_some()
    }

    fn credentials(&self) -> Option<(&str, &str)> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => Some((user, pass)),
            _ => None,
        }
    }

    /// Build client options for `client_id`
    ///
    /// With TLS enabled both the CA file and credentials are mandatory; a missing one is a
    /// configuration error rather than a silent downgrade.
    pub fn mqtt_options(&self, client_id: &str) -> DomainResult<MqttOptions> {
        let (host, port) = self.endpoint()?;

        let mut options = MqttOptions::new(client_id, host, port);
        options.set_keep_alive(Duration::from_secs(self.keep_alive_secs));
        options.set_clean_session(true);

        if let Some((user, pass)) = self.credentials() {
            options.set_credentials(user, pass);
        }

        if self.use_tls {
            if self.credentials().is_none() {
                return Err(DomainError::InvalidMqttConfig(
                    "TLS is enabled but MQTT username/password are not set".to_string(),
                ));
            }

            let ca = read_ca_cert(&self.ca_cert_path)?;
            options.set_transport(Transport::tls_with_config(TlsConfiguration::Simple {
                ca,
                alpn: None,
                client_auth: None,
            }));
        }

        Ok(options)
    }
}

fn read_ca_cert(path: &str) -> DomainResult<Vec<u8>> {
    if !Path::new(path).is_file() {
        return Err(DomainError::InvalidMqttConfig(format!(
            "CA certificate not found at '{}'",
            path
        )));
    }

    std::fs::read(path).map_err(|e| {
        DomainError::InvalidMqttConfig(format!("Failed to read CA certificate '{}': {}", path, e))
    })
}

/// Parse broker URL in format mqtt://host:port, mqtts://host:port, tcp://host:port, host:port or host
pub fn parse_broker_url(url: &str, default_port: u16) -> DomainResult<(&str, u16)> {
    let url = url
        .trim_start_matches("mqtts://")
        .trim_start_matches("mqtt://")
        .trim_start_matches("tcp://");

    let parts: Vec<&str> = url.split(':').collect();
    match parts.as_slice() {
        [host] if !host.is_empty() => Ok((*host, default_port)),
        [host, port] if !host.is_empty() => {
            let port = port.parse::<u16>().map_err(|_| {
                DomainError::InvalidMqttConfig(format!("Invalid port in broker URL: {}", port))
            })?;
            Ok((*host, port))
        }
        _ => Err(DomainError::InvalidMqttConfig(format!(
            "Invalid broker URL format: {}",
            url
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_broker_url_with_port() {
        let (host, port) = parse_broker_url("mqtt://localhost:1883", 8883).unwrap();
        assert_eq!(host, "localhost");
        assert_eq!(port, 1883);
    }

    #[test]
    fn test_parse_broker_url_default_port() {
        let (host, port) = parse_broker_url("broker.local", 1883).unwrap();
        assert_eq!(host, "broker.local");
        assert_eq!(port, 1883);
    }

    #[test]
    fn test_parse_broker_url_invalid_port() {
        assert!(matches!(
            parse_broker_url("broker.local:abc", 1883),
            Err(DomainError::InvalidMqttConfig(_))
        ));
    }

    #[test]
    fn test_parse_broker_url_empty_host() {
        assert!(parse_broker_url("", 1883).is_err());
    }

    #[test]
    fn test_endpoint_uses_tls_port() {
        let settings = MqttSettings {
            use_tls: true,
            ..Default::default()
        };
        assert_eq!(settings.endpoint().unwrap(), ("localhost", 8883));
        assert_eq!(settings.broker_address(), "localhost:8883");
    }

    #[test]
    fn test_plain_options_without_credentials() {
        let settings = MqttSettings::default();
        assert!(!settings.authenticated());
        assert!(settings.mqtt_options("cleanroute-test").is_ok());
    }

    #[test]
    fn test_tls_requires_credentials() {
        let settings = MqttSettings {
            use_tls: true,
            ..Default::default()
        };
        assert!(matches!(
            settings.mqtt_options("cleanroute-test"),
            Err(DomainError::InvalidMqttConfig(_))
        ));
    }

    #[test]
    fn test_tls_requires_ca_file() {
        let settings = MqttSettings {
            use_tls: true,
            ca_cert_path: "/nonexistent/ca.crt".to_string(),
            username: Some("backend_service".to_string()),
            password: Some("secret".to_string()),
            ..Default::default()
        };
        let result = settings.mqtt_options("cleanroute-test");
        if let Err(DomainError::InvalidMqttConfig(msg)) = result {
            assert!(msg.contains("/nonexistent/ca.crt"));
        } else {
            panic!("Expected InvalidMqttConfig");
        }
    }

    #[test]
    fn test_empty_password_is_not_authenticated() {
        let settings = MqttSettings {
            username: Some("backend_service".to_string()),
            password: Some(String::new()),
            ..Default::default()
        };
        assert!(!settings.authenticated());
    }
}
