pub(crate) mod subscriber;

pub use subscriber::{run_ingest_loop, RetryPolicy};
