mod alert;
mod bin;
mod command;
mod result;
mod telemetry;

pub use alert::*;
pub use bin::*;
pub use command::*;
pub use result::*;
pub use telemetry::*;
