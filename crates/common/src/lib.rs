pub mod domain;
pub mod garde;
pub mod mqtt;
pub mod observability;
pub mod postgres;

// Re-export mocks when testing feature is enabled
#[cfg(any(test, feature = "testing"))]
pub use domain::MockAlertRepository;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockBinRepository;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockCommandLogRepository;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockCommandPublisher;
