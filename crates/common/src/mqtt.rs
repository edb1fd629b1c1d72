mod connection;
mod options;
mod topic;

pub use connection::*;
pub use options::*;
pub use topic::*;
