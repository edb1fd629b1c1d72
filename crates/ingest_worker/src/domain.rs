mod ingest_status;
mod telemetry_ingestion_service;
mod telemetry_parser;
mod telemetry_rejection;

pub use ingest_status::*;
pub use telemetry_ingestion_service::*;
pub use telemetry_parser::*;
pub use telemetry_rejection::*;
