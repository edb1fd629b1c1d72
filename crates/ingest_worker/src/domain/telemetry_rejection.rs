use thiserror::Error;

/// Reason an inbound telemetry message was dropped before touching the registry
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TelemetryRejection {
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("missing bin_id in payload and topic")]
    MissingBinId,

    #[error("missing timestamp")]
    MissingTimestamp,

    #[error("missing fill_pct")]
    MissingFillPct,

    #[error("fill_pct {0} outside 0-100")]
    FillPctOutOfRange(f64),

    #[error("invalid timestamp '{0}'")]
    InvalidTimestamp(String),
}
