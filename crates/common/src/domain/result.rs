use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Bin not found: {0}")]
    BinNotFound(String),

    #[error("Invalid bin ID: {0}")]
    InvalidBinId(String),

    #[error("Invalid MQTT configuration: {0}")]
    InvalidMqttConfig(String),

    #[error("MQTT connection error: {0}")]
    MqttConnectionError(String),

    #[error("Command publish failed: {0}")]
    PublishError(String),

    #[error("Repository error: {0}")]
    RepositoryError(#[from] anyhow::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),
}
