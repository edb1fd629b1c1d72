mod collection_day_service;
mod command_dispatcher;

pub use collection_day_service::*;
pub use command_dispatcher::*;
