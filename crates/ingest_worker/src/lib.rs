pub mod domain;
pub mod ingest_worker;
pub mod mqtt;

pub use domain::*;
pub use ingest_worker::*;
