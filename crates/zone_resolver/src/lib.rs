mod builtin;
mod geo;
mod resolver;

pub use geo::*;
pub use resolver::*;
