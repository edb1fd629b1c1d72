use common::mqtt::{MqttSettings, TELEMETRY_TOPIC};
use common::observability::ObservabilityConfig;
use common::postgres::PostgresConfig;
use config::{Config, ConfigError, Environment};
use ingest_worker::{AlertThresholds, IngestWorkerConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    // MQTT configuration
    /// Broker host name; a `mqtt://` or `mqtts://` URL is also accepted
    #[serde(default = "default_mqtt_broker")]
    pub mqtt_broker: String,

    #[serde(default = "default_mqtt_port")]
    pub mqtt_port: u16,

    #[serde(default = "default_mqtt_tls_port")]
    pub mqtt_tls_port: u16,

    #[serde(default)]
    pub mqtt_use_tls: bool,

    /// PEM CA bundle used to verify the broker when TLS is on
    #[serde(default = "default_mqtt_ca_cert")]
    pub mqtt_ca_cert: String,

    #[serde(default)]
    pub mqtt_username: Option<String>,

    #[serde(default)]
    pub mqtt_password: Option<String>,

    /// Telemetry subscription filter
    #[serde(default = "default_mqtt_topic")]
    pub mqtt_topic: String,

    #[serde(default = "default_mqtt_keep_alive_secs")]
    pub mqtt_keep_alive_secs: u64,

    #[serde(default = "default_mqtt_ingest_client_id")]
    pub mqtt_ingest_client_id: String,

    /// Startup timeout for broker connections in seconds
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,

    /// Delay between event loop retries in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Consecutive connection errors tolerated before an event loop gives up
    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,

    // PostgreSQL configuration
    #[serde(default = "default_postgres_host")]
    pub postgres_host: String,

    #[serde(default = "default_postgres_port")]
    pub postgres_port: u16,

    #[serde(default = "default_postgres_database")]
    pub postgres_database: String,

    #[serde(default = "default_postgres_username")]
    pub postgres_username: String,

    #[serde(default = "default_postgres_password")]
    pub postgres_password: String,

    #[serde(default = "default_postgres_max_pool_size")]
    pub postgres_max_pool_size: usize,

    #[serde(default = "default_postgres_migrations_dir")]
    pub postgres_migrations_dir: String,

    #[serde(default = "default_postgres_goose_binary_path")]
    pub postgres_goose_binary_path: String,

    // Domain configuration
    /// JSON zone table replacing the built-in districts
    #[serde(default)]
    pub zones_file: Option<String>,

    #[serde(default = "default_fill_alert_pct")]
    pub fill_alert_pct: f64,

    #[serde(default = "default_low_battery_v")]
    pub low_battery_v: f64,

    // OpenTelemetry configuration
    /// OpenTelemetry OTLP endpoint (gRPC)
    #[serde(default = "default_otel_endpoint")]
    pub otel_endpoint: String,

    #[serde(default)]
    pub otel_enabled: bool,

    #[serde(default = "default_otel_service_name")]
    pub otel_service_name: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

// MQTT defaults
fn default_mqtt_broker() -> String {
    "localhost".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_mqtt_tls_port() -> u16 {
    8883
}

fn default_mqtt_ca_cert() -> String {
    "mqtt/certs/ca.crt".to_string()
}

fn default_mqtt_topic() -> String {
    TELEMETRY_TOPIC.to_string()
}

fn default_mqtt_keep_alive_secs() -> u64 {
    60
}

fn default_mqtt_ingest_client_id() -> String {
    "cleanroute-ingest".to_string()
}

fn default_startup_timeout_secs() -> u64 {
    30
}

fn default_retry_delay_ms() -> u64 {
    5000
}

fn default_max_retry_attempts() -> u32 {
    10
}

// PostgreSQL defaults
fn default_postgres_host() -> String {
    "localhost".to_string()
}

fn default_postgres_port() -> u16 {
    5432
}

fn default_postgres_database() -> String {
    "cleanroute_db".to_string()
}

fn default_postgres_username() -> String {
    "cleanroute_user".to_string()
}

fn default_postgres_password() -> String {
    "cleanroute_pass".to_string()
}

fn default_postgres_max_pool_size() -> usize {
    10
}

fn default_postgres_migrations_dir() -> String {
    "migrations/postgres".to_string()
}

fn default_postgres_goose_binary_path() -> String {
    "goose".to_string()
}

// Domain defaults
fn default_fill_alert_pct() -> f64 {
    90.0
}

fn default_low_battery_v() -> f64 {
    3.3
}

// OpenTelemetry defaults
fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_otel_service_name() -> String {
    "cleanroute-all-in-one".to_string()
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Environment::with_prefix("CLEANROUTE"))
            .build()?
            .try_deserialize()
    }

    pub fn mqtt_settings(&self) -> MqttSettings {
        MqttSettings {
            broker: self.mqtt_broker.clone(),
            port: self.mqtt_port,
            tls_port: self.mqtt_tls_port,
            use_tls: self.mqtt_use_tls,
            ca_cert_path: self.mqtt_ca_cert.clone(),
            username: self.mqtt_username.clone(),
            password: self.mqtt_password.clone(),
            keep_alive_secs: self.mqtt_keep_alive_secs,
        }
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn ingest_worker_config(&self) -> IngestWorkerConfig {
        IngestWorkerConfig {
            mqtt: self.mqtt_settings(),
            topic: self.mqtt_topic.clone(),
            client_id: self.mqtt_ingest_client_id.clone(),
            startup_timeout: self.startup_timeout(),
            retry_delay: self.retry_delay(),
            max_retry_attempts: self.max_retry_attempts,
        }
    }

    pub fn postgres_config(&self) -> PostgresConfig {
        PostgresConfig {
            host: self.postgres_host.clone(),
            port: self.postgres_port,
            database: self.postgres_database.clone(),
            username: self.postgres_username.clone(),
            password: self.postgres_password.clone(),
            max_pool_size: self.postgres_max_pool_size,
            migrations_dir: self.postgres_migrations_dir.clone(),
            goose_binary_path: self.postgres_goose_binary_path.clone(),
        }
    }

    pub fn alert_thresholds(&self) -> AlertThresholds {
        AlertThresholds {
            fill_alert_pct: self.fill_alert_pct,
            low_battery_v: self.low_battery_v,
        }
    }

    pub fn observability_config(&self) -> ObservabilityConfig {
        ObservabilityConfig {
            service_name: self.otel_service_name.clone(),
            otel_endpoint: self.otel_endpoint.clone(),
            otel_enabled: self.otel_enabled,
            log_level: self.log_level.clone(),
        }
    }
}
