mod command_publisher;

pub use command_publisher::*;
