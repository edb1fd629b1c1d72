mod alert_repository;
mod bin_repository;
mod client;
mod command_log_repository;
mod config;

pub use alert_repository::*;
pub use bin_repository::*;
pub use client::*;
pub use command_log_repository::*;
pub use config::*;
